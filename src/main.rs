mod annotations;
mod assemble;
mod cache;
mod clock;
mod config;
mod context;
mod dispatcher;
mod error;
mod events;
mod model;
mod proxyctl;
mod queue;
mod reconciler;
mod synth;
mod template;

use std::sync::Arc;

use log::info;

use crate::cache::Cache;
use crate::clock::SystemClock;
use crate::config::Config;
use crate::context::Context;
use crate::template::NginxTemplate;

pub const OPERATOR_MANAGER: &str = "nginx-ingress-operator";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = Config::from_env();
    info!(
        "starting ingress operator, class={} variant={:?} local_mode={}",
        config.ingress_class, config.variant, config.local_mode
    );

    let client = kube::Client::try_default().await?;
    let (cache, writers) = Cache::new(client.clone());
    let ctx = Arc::new(Context::new(
        client,
        cache,
        config,
        Arc::new(SystemClock),
        Arc::new(NginxTemplate),
    ));

    let dispatcher_fut = dispatcher::run(ctx.clone(), writers);
    let reconciler_fut = reconciler::run(ctx.clone());

    tokio::select! {
        _ = dispatcher_fut => {}
        _ = reconciler_fut => {}
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received, draining queue");
            ctx.queue.shutdown().await;
        }
    }

    Ok(())
}
