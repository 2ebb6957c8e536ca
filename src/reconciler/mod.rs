//! C4: the single worker that dequeues tasks from C2 and routes them by
//! kind to the per-kind handlers below (design doc §4.4, §5).

mod configmap;
mod endpoints;
mod ingress;
mod secret;

use std::sync::Arc;

use log::{error, warn};

use crate::context::Context;
use crate::queue::Kind;

/// Runs until the queue is shut down. A single worker, as design doc §4.2
/// requires: no concurrent syncs, so the rendered file for one host is
/// never clobbered by two overlapping passes.
pub async fn run(ctx: Arc<Context>) {
    while let Some(task) = ctx.queue.get().await {
        let (namespace, name) = task.split_key();
        let namespace = namespace.to_string();
        let name = name.to_string();

        let result = match task.kind {
            Kind::Ingress => ingress::sync(&ctx, &namespace, &name).await,
            Kind::ConfigMap => configmap::sync(&ctx, &namespace, &name).await,
            Kind::Service => endpoints::sync_service(&ctx, &namespace, &name).await,
            Kind::Endpoints => endpoints::sync_endpoints(&ctx, &namespace, &name).await,
            Kind::Secret => secret::sync(&ctx, &namespace, &name).await,
        };

        if let Err(err) = result {
            if err.aborts_task() {
                error!("{} {namespace}/{name} failed: {err}", task.kind);
                ctx.queue.requeue_after(task.clone(), &err, std::time::Duration::from_secs(5));
            } else {
                warn!("{} {namespace}/{name}: {err}", task.kind);
            }
        }
    }
}
