//! The core ingress sync (design doc §4.4): resolves the mergeable group
//! a task belongs to, assembles it, synthesizes a `ConfigurationModel`,
//! renders and writes it, then reloads the proxy (or, for the commercial
//! variant, patches just the changed upstreams when nothing else about
//! the shape of the configuration changed).

use std::collections::HashSet;

use k8s_openapi::api::networking::v1::Ingress;
use kube::ResourceExt;
use log::{info, warn};

use crate::assemble::{self, ingress_conv::routing_resource_from_ingress};
use crate::context::{Context, InstalledIngress};
use crate::error::Error;
use crate::events::Outcome;
use crate::model::{ConfigurationModel, MergeableGroup, MergeableRole, RoutingResource};
use crate::synth;

const INGRESS_CLASS_ANNOTATION: &str = "kubernetes.io/ingress.class";

fn admitted(ing: &Ingress, ctx: &Context) -> bool {
    let class = ing
        .annotations()
        .get(INGRESS_CLASS_ANNOTATION)
        .cloned()
        .or_else(|| ing.spec.as_ref().and_then(|s| s.ingress_class_name.clone()));
    match class {
        Some(c) => c == ctx.config.ingress_class,
        None => !ctx.config.strict_class,
    }
}

/// All admitted routing resources currently in the cache, converted once
/// per sync so mergeable-group lookups (§4.5) scan a consistent snapshot.
fn admitted_routing_resources(ctx: &Context) -> Vec<RoutingResource> {
    ctx.cache
        .list_ingresses()
        .iter()
        .filter(|ing| admitted(ing, ctx))
        .filter_map(|ing| match routing_resource_from_ingress(ing, &ctx.annotation_prefix) {
            Ok(r) => Some(r),
            Err(err) => {
                warn!("skipping ingress {}/{}: {err}", ing.namespace().unwrap_or_default(), ing.name_any());
                None
            }
        })
        .collect()
}

/// Resolves the master + minions group `namespace/name` belongs to. A
/// minion task resolves to its master's group; an orphaned minion (no
/// master yet) resolves to `None` (design doc §4.5).
fn resolve_group(ctx: &Context, namespace: &str, name: &str) -> Option<(RoutingResource, Vec<RoutingResource>)> {
    let all = admitted_routing_resources(ctx);
    let subject = all.iter().find(|r| r.namespace == namespace && r.name == name)?;

    match subject.role {
        MergeableRole::Minion => {
            let master = assemble::mergeable::find_master_for_minion(subject, &all)?.clone();
            let minions = assemble::mergeable::find_minions_for_master(&master, &all)
                .into_iter()
                .cloned()
                .collect();
            Some((master, minions))
        }
        MergeableRole::Master => {
            let minions = assemble::mergeable::find_minions_for_master(subject, &all)
                .into_iter()
                .cloned()
                .collect();
            Some((subject.clone(), minions))
        }
        MergeableRole::None => Some((subject.clone(), Vec::new())),
    }
}

/// Same host+path claimed by a different, unrelated ingress is rejected
/// rather than silently double-installed (design doc §9 open question 1).
/// The resource with the lexicographically smaller `namespace/name` key
/// keeps the claim, since the cache has no reliable notion of which
/// ingress was admitted first.
fn host_path_conflict(group: &MergeableGroup, all: &[RoutingResource]) -> Option<String> {
    let own: HashSet<(String, String)> = std::iter::once(&group.master)
        .chain(group.minions.iter())
        .map(|r| (r.namespace.clone(), r.name.clone()))
        .collect();

    let claims: Vec<(&str, &str)> = std::iter::once(&group.master)
        .chain(group.minions.iter())
        .flat_map(|r| r.rules.iter())
        .flat_map(|rule| rule.paths.iter().map(move |p| (rule.host.as_str(), p.path.as_str())))
        .collect();

    let group_key = (group.master.namespace.clone(), group.master.name.clone());

    for other in all {
        let other_key = (other.namespace.clone(), other.name.clone());
        if own.contains(&other_key) || other_key >= group_key {
            continue;
        }
        let conflicts = other
            .rules
            .iter()
            .flat_map(|rule| rule.paths.iter().map(move |p| (rule.host.as_str(), p.path.as_str())))
            .any(|claim| claims.contains(&claim));
        if conflicts {
            return Some(format!("{}/{}", other.namespace, other.name));
        }
    }
    None
}

pub async fn sync(ctx: &Context, namespace: &str, name: &str) -> Result<(), Error> {
    sync_inner(ctx, namespace, name, true).await
}

/// Re-synthesizes and re-writes an ingress's config without issuing its
/// own reload. Used by the configmap handler, which reloads once after
/// re-running every installed ingress through this path rather than
/// letting each one trigger its own (design doc §4.4, §4.6: "single
/// reload at the end").
pub(super) async fn resync_without_reload(ctx: &Context, namespace: &str, name: &str) -> Result<(), Error> {
    sync_inner(ctx, namespace, name, false).await
}

async fn sync_inner(ctx: &Context, namespace: &str, name: &str, reload: bool) -> Result<(), Error> {
    let Some(ing) = ctx.cache.get_ingress(namespace, name) else {
        return handle_deleted(ctx, namespace, name).await;
    };
    if !admitted(&ing, ctx) {
        return handle_deleted(ctx, namespace, name).await;
    }

    let Some((master, minions)) = resolve_group(ctx, namespace, name) else {
        info!("ingress {namespace}/{name} is a minion with no master yet, nothing to install");
        return Ok(());
    };

    let group = assemble::mergeable::compose_group(master, minions, &ctx.annotation_prefix);
    let file_key = group.master.file_key();

    if let Some(owner) = host_path_conflict(&group, &admitted_routing_resources(ctx)) {
        let err = Error::ValidationFailed(format!("host/path already claimed by ingress {owner}"));
        warn!("ingress {namespace}/{name} rejected: {err}");
        ctx.events.emit(&ing, Outcome::Rejected, err.to_string()).await;
        return Err(err);
    }

    let assembled = match assemble::assemble(
        &ctx.cache,
        group.master.clone(),
        group.minions.clone(),
        &ctx.annotation_prefix,
    )
    .await
    {
        Ok(a) => a,
        Err(err) => {
            warn!("ingress {namespace}/{name} rejected: {err}");
            ctx.events.emit(&ing, Outcome::Rejected, err.to_string()).await;
            return Err(err);
        }
    };

    let effective = ctx.effective.read().await.clone();
    let commercial = ctx.config.variant.is_commercial();
    let (model, synth_errors) = synth::synthesize(
        &effective,
        &assembled,
        &ctx.annotation_prefix,
        commercial,
        &ctx.writer.secrets_dir(),
    );
    for err in &synth_errors {
        warn!("ingress {namespace}/{name}: {err}");
    }

    let previous_model = ctx.registry.lock().await.get(&file_key).map(|i| i.last_model.clone());
    let was_installed = previous_model.is_some();

    let bytes = ctx.template.render_ingress(&file_key, &model)?;
    ctx.writer
        .write_atomic(&ctx.writer.ingress_config_path(&file_key), &bytes)
        .await?;

    if let Err(err) = apply_change(ctx, &file_key, previous_model.as_ref(), &model, reload).await {
        let outcome = if was_installed {
            Outcome::UpdatedWithError
        } else {
            Outcome::AddedOrUpdatedWithError
        };
        ctx.events.emit(&ing, outcome, err.to_string()).await;
        return Err(err);
    }

    let minion_identities: HashSet<String> = group
        .minions
        .iter()
        .map(|m| m.file_key())
        .collect();
    ctx.registry.lock().await.insert(
        file_key,
        InstalledIngress {
            namespace: namespace.to_string(),
            name: name.to_string(),
            minion_identities,
            last_model: model.clone(),
        },
    );

    let outcome = if !synth_errors.is_empty() {
        Outcome::AddedOrUpdatedWithError
    } else if was_installed {
        Outcome::Updated
    } else {
        Outcome::AddedOrUpdated
    };
    ctx.events.emit(&ing, outcome, format!("{} server(s) installed", model.servers.len())).await;

    Ok(())
}

/// Decides between a full reload and a runtime-API-only upstream patch.
/// The commercial variant patches in place when the configuration's shape
/// (upstream names, server/location structure) is unchanged from the last
/// install and only member addresses differ; everything else, including
/// the very first install, gets a full reload (design doc §4.9, §4.10, §9
/// open question on runtime-API ordering).
async fn apply_change(
    ctx: &Context,
    file_key: &str,
    previous: Option<&ConfigurationModel>,
    model: &ConfigurationModel,
    reload: bool,
) -> Result<(), Error> {
    if !reload {
        return Ok(());
    }

    let Some(runtime_api) = ctx.runtime_api.as_ref() else {
        ctx.reload.reload().await?;
        return Ok(());
    };

    let Some(previous) = previous else {
        ctx.reload.reload().await?;
        return Ok(());
    };

    if !same_shape(previous, model) {
        ctx.reload.reload().await?;
        return Ok(());
    }

    let mut needs_full_reload = false;
    for upstream in &model.upstreams {
        let prev_members = previous
            .upstreams
            .iter()
            .find(|u| u.name == upstream.name)
            .map(|u| &u.members);
        if prev_members == Some(&upstream.members) {
            continue;
        }
        let outcome = runtime_api
            .update_upstream(&ctx.reload, &upstream.name, &upstream.members)
            .await?;
        if outcome.fell_back_to_reload {
            needs_full_reload = true;
            break;
        }
        info!(
            "runtime-patched upstream {} for {file_key}: +{} -{}",
            upstream.name, outcome.added, outcome.removed
        );
    }

    if needs_full_reload {
        ctx.reload.reload().await?;
    }
    Ok(())
}

fn same_shape(previous: &ConfigurationModel, model: &ConfigurationModel) -> bool {
    let mut prev_names: Vec<&str> = previous.upstreams.iter().map(|u| u.name.as_str()).collect();
    let mut new_names: Vec<&str> = model.upstreams.iter().map(|u| u.name.as_str()).collect();
    prev_names.sort_unstable();
    new_names.sort_unstable();
    if prev_names != new_names {
        return false;
    }
    if previous.servers.len() != model.servers.len() {
        return false;
    }
    previous.servers.iter().zip(model.servers.iter()).all(|(p, m)| {
        p.host == m.host
            && p.locations.len() == m.locations.len()
            && p.locations
                .iter()
                .zip(m.locations.iter())
                .all(|(pl, ml)| pl.path == ml.path && pl.upstream == ml.upstream)
    })
}

async fn handle_deleted(ctx: &Context, namespace: &str, name: &str) -> Result<(), Error> {
    let file_key = format!("{namespace}-{name}");
    let was_installed = ctx.registry.lock().await.remove(&file_key).is_some();
    if !was_installed {
        return Ok(());
    }
    info!("ingress {namespace}/{name} removed or no longer admitted, uninstalling {file_key}");
    ctx.writer.remove_ingress_config(&file_key).await?;
    ctx.reload.reload().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Backend, PathBackend, Rule, Server, ServicePort};
    use std::collections::BTreeMap;

    fn standalone(namespace: &str, name: &str, host: &str, path: &str) -> RoutingResource {
        RoutingResource {
            namespace: namespace.to_string(),
            name: name.to_string(),
            default_backend: None,
            rules: vec![Rule {
                host: host.to_string(),
                paths: vec![PathBackend {
                    path: path.to_string(),
                    backend: Backend {
                        service_name: "svc".to_string(),
                        service_port: ServicePort::Number(80),
                    },
                }],
            }],
            tls: vec![],
            annotations: BTreeMap::new(),
            role: MergeableRole::None,
        }
    }

    #[test]
    fn earlier_key_wins_a_host_path_conflict() {
        let winner = standalone("default", "cafe-a", "cafe.example.com", "/coffee");
        let loser = standalone("default", "cafe-b", "cafe.example.com", "/coffee");
        let group = MergeableGroup { master: loser.clone(), minions: vec![] };
        let conflict = host_path_conflict(&group, &[winner.clone(), loser]);
        assert_eq!(conflict, Some("default/cafe-a".to_string()));
    }

    #[test]
    fn distinct_paths_do_not_conflict() {
        let a = standalone("default", "cafe-a", "cafe.example.com", "/coffee");
        let b = standalone("default", "cafe-b", "cafe.example.com", "/tea");
        let group = MergeableGroup { master: b.clone(), minions: vec![] };
        assert_eq!(host_path_conflict(&group, &[a, b]), None);
    }

    #[test]
    fn shape_change_requires_full_reload() {
        let base = ConfigurationModel::default();
        let mut changed = base.clone();
        changed.servers.push(Server {
            host: "cafe.example.com".to_string(),
            status_zone: "cafe.example.com".to_string(),
            tls: None,
            policy: crate::model::ServerPolicy::default(),
            locations: vec![],
            grpc_only: false,
            jwt: None,
            jwt_redirect_locations: vec![],
        });
        assert!(!same_shape(&base, &changed));
    }
}
