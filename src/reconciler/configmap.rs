//! The watched ConfigMap (or the default-server secret standing in for
//! it) changed: rebuild the effective configuration, re-render the main
//! config file and the dhparam secret, re-synthesize every currently
//! installed ingress, and reload once at the end so a configmap change
//! never costs more than a single reload regardless of how many ingresses
//! it affects (design doc §4.4, §4.6, §4.8).

use k8s_openapi::api::core::v1::ObjectReference;
use kube::ResourceExt;
use log::warn;

use super::ingress::resync_without_reload;
use crate::annotations::build_effective_config;
use crate::context::Context;
use crate::error::Error;
use crate::events::Outcome;

pub async fn sync(ctx: &Context, namespace: &str, name: &str) -> Result<(), Error> {
    let configmap = ctx.cache.get_configmap(namespace, name);
    let object_ref = configmap.as_deref().map(|cm| cm.object_ref(&())).unwrap_or_else(|| {
        ObjectReference {
            kind: Some("ConfigMap".to_string()),
            namespace: Some(namespace.to_string()),
            name: Some(name.to_string()),
            ..Default::default()
        }
    });

    let result = sync_inner(ctx, namespace, name, configmap.and_then(|cm| cm.data.clone())).await;

    match &result {
        Ok(()) => {
            ctx.events
                .emit_for_object_ref(object_ref, Outcome::Updated, "configuration reloaded".to_string())
                .await;
        }
        Err(err) => {
            ctx.events
                .emit_for_object_ref(object_ref, Outcome::UpdatedWithError, err.to_string())
                .await;
        }
    }
    result
}

async fn sync_inner(
    ctx: &Context,
    namespace: &str,
    name: &str,
    data: Option<std::collections::BTreeMap<String, String>>,
) -> Result<(), Error> {
    let data = data.unwrap_or_default();

    let (effective, errors) =
        build_effective_config(&data, ctx.config.variant.is_commercial(), namespace, name);
    for err in &errors {
        warn!("{err}");
    }

    *ctx.effective.write().await = effective.clone();

    let bytes = ctx.template.render_main(&effective)?;
    ctx.writer
        .write_atomic(&ctx.writer.main_config_path(), &bytes)
        .await?;

    match &effective.ssl_dhparam_file {
        Some(contents) => {
            ctx.writer
                .write_secret(&ctx.writer.dhparam_path(), contents.as_bytes(), 0o644)
                .await?;
        }
        None => ctx.writer.remove_secret(&ctx.writer.dhparam_path()).await?,
    }

    let installed: Vec<(String, String)> = ctx
        .registry
        .lock()
        .await
        .values()
        .map(|i| (i.namespace.clone(), i.name.clone()))
        .collect();
    for (ns, ing_name) in installed {
        if let Err(err) = resync_without_reload(ctx, &ns, &ing_name).await {
            warn!("re-synthesizing ingress {ns}/{ing_name} after configmap change: {err}");
        }
    }

    ctx.reload.reload().await?;

    Ok(())
}
