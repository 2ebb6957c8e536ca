//! C3: turns cluster watch events into queue tasks (design doc §4.3, §5).
//! Each watched kind gets its own reflector-backed
//! `reflector(writer, watcher(...)).default_backoff().touched_objects()`
//! pipeline; `touched_objects()` already drops the no-op resyncs the design
//! doc's "update-equality" rule calls for, so no separate shadow map is
//! needed here.

use std::sync::Arc;

use futures_util::StreamExt;
use k8s_openapi::api::core::v1::{ConfigMap, Endpoints, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::runtime::{reflector, watcher, WatchStreamExt};
use kube::{Api, ResourceExt};
use log::{info, warn};

use crate::cache::Writers;
use crate::context::Context;
use crate::queue::{Kind, Task};

const INGRESS_CLASS_ANNOTATION: &str = "kubernetes.io/ingress.class";

fn admitted(ing: &Ingress, ctx: &Context) -> bool {
    let class = ing
        .annotations()
        .get(INGRESS_CLASS_ANNOTATION)
        .cloned()
        .or_else(|| {
            ing.spec
                .as_ref()
                .and_then(|s| s.ingress_class_name.clone())
        });
    match class {
        Some(c) => c == ctx.config.ingress_class,
        None => !ctx.config.strict_class,
    }
}

/// Runs every watch loop concurrently until the process is asked to
/// shut down. Each loop's failure is logged and retried with the watcher's
/// own backoff; a persistent failure of one kind does not stop the others.
/// `writers` is the write half of the very stores `ctx.cache` reads from,
/// built alongside it by `Cache::new` (design doc §4.1, §4.3).
pub async fn run(ctx: Arc<Context>, writers: Writers) {
    let ingresses = watch_ingresses(ctx.clone(), writers.ingresses);
    let services = watch_services(ctx.clone(), writers.services);
    let endpoints = watch_endpoints(ctx.clone(), writers.endpoints);
    let secrets = watch_secrets(ctx.clone(), writers.secrets);
    let configmaps = watch_configmaps(ctx.clone(), writers.configmaps);

    futures_util::future::join5(ingresses, services, endpoints, secrets, configmaps).await;
}

async fn watch_ingresses(ctx: Arc<Context>, writer: reflector::Writer<Ingress>) {
    let api: Api<Ingress> = Api::all(ctx.client.clone());
    let stream = reflector(writer, watcher(api, watcher::Config::default()))
        .default_backoff()
        .touched_objects();
    futures_util::pin_mut!(stream);
    while let Some(event) = stream.next().await {
        match event {
            Ok(ing) => {
                if !admitted(&ing, &ctx) {
                    continue;
                }
                ctx.queue
                    .add(Task::new(
                        Kind::Ingress,
                        &ing.namespace().unwrap_or_default(),
                        &ing.name_any(),
                    ))
                    .await;
            }
            Err(err) => warn!("ingress watch error: {err}"),
        }
    }
}

async fn watch_services(ctx: Arc<Context>, writer: reflector::Writer<Service>) {
    let api: Api<Service> = Api::all(ctx.client.clone());
    let stream = reflector(writer, watcher(api, watcher::Config::default()))
        .default_backoff()
        .touched_objects();
    futures_util::pin_mut!(stream);
    while let Some(event) = stream.next().await {
        match event {
            Ok(svc) => {
                ctx.queue
                    .add(Task::new(Kind::Service, &svc.namespace().unwrap_or_default(), &svc.name_any()))
                    .await;
            }
            Err(err) => warn!("service watch error: {err}"),
        }
    }
}

async fn watch_endpoints(ctx: Arc<Context>, writer: reflector::Writer<Endpoints>) {
    let api: Api<Endpoints> = Api::all(ctx.client.clone());
    let stream = reflector(writer, watcher(api, watcher::Config::default()))
        .default_backoff()
        .touched_objects();
    futures_util::pin_mut!(stream);
    while let Some(event) = stream.next().await {
        match event {
            Ok(eps) => {
                ctx.queue
                    .add(Task::new(Kind::Endpoints, &eps.namespace().unwrap_or_default(), &eps.name_any()))
                    .await;
            }
            Err(err) => warn!("endpoints watch error: {err}"),
        }
    }
}

async fn watch_secrets(ctx: Arc<Context>, writer: reflector::Writer<Secret>) {
    let api: Api<Secret> = Api::all(ctx.client.clone());
    let stream = reflector(writer, watcher(api, watcher::Config::default()))
        .default_backoff()
        .touched_objects();
    futures_util::pin_mut!(stream);
    while let Some(event) = stream.next().await {
        match event {
            Ok(secret) => {
                let ns = secret.namespace().unwrap_or_default();
                let name = secret.name_any();
                let is_default_server_secret = ctx
                    .config
                    .default_server_secret
                    .as_ref()
                    .is_some_and(|(dns, dname)| dns == &ns && dname == &name);
                if is_default_server_secret {
                    info!("default server secret {ns}/{name} changed, resyncing main config");
                    ctx.queue
                        .add(Task::new(Kind::ConfigMap, &ctx.config.configmap_namespace, &ctx.config.configmap_name))
                        .await;
                }
                ctx.queue.add(Task::new(Kind::Secret, &ns, &name)).await;
            }
            Err(err) => warn!("secret watch error: {err}"),
        }
    }
}

async fn watch_configmaps(ctx: Arc<Context>, writer: reflector::Writer<ConfigMap>) {
    let api: Api<ConfigMap> = Api::all(ctx.client.clone());
    let stream = reflector(writer, watcher(api, watcher::Config::default()))
        .default_backoff()
        .touched_objects();
    futures_util::pin_mut!(stream);
    while let Some(event) = stream.next().await {
        match event {
            Ok(cm) => {
                let ns = cm.namespace().unwrap_or_default();
                let name = cm.name_any();
                if ns == ctx.config.configmap_namespace && name == ctx.config.configmap_name {
                    ctx.queue.add(Task::new(Kind::ConfigMap, &ns, &name)).await;
                }
            }
            Err(err) => warn!("configmap watch error: {err}"),
        }
    }
}
