//! Service and Endpoints tasks never render anything themselves: they
//! resolve to the ingresses that reference them via C1's reverse lookups
//! and re-enqueue those (design doc §4.1, §4.3).

use crate::context::Context;
use crate::error::Error;
use crate::queue::{Kind, Task};

pub async fn sync_service(ctx: &Context, namespace: &str, name: &str) -> Result<(), Error> {
    for (ns, ing_name) in ctx.cache.ingresses_referencing_service(namespace, name) {
        ctx.queue.add(Task::new(Kind::Ingress, &ns, &ing_name)).await;
    }
    Ok(())
}

pub async fn sync_endpoints(ctx: &Context, namespace: &str, name: &str) -> Result<(), Error> {
    for (ns, ing_name) in ctx.cache.ingresses_referencing_endpoints(namespace, name) {
        ctx.queue.add(Task::new(Kind::Ingress, &ns, &ing_name)).await;
    }
    Ok(())
}
