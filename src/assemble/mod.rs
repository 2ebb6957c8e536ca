//! C5: resolves the secrets, endpoints and (for mergeable groups) minions
//! referenced by a routing resource, validates it, and produces an
//! `AssembledIngress` (design doc §3, §4.5).

pub mod ingress_conv;
pub mod mergeable;
pub mod secret;

use log::warn;

use crate::annotations::JWT_KEY;
use crate::cache::Cache;
use crate::error::Error;
use crate::model::{AssembledDependencies, AssembledIngress, Backend, RoutingResource, SecretMaterial};

pub struct Assembler<'a> {
    pub cache: &'a Cache,
}

impl<'a> Assembler<'a> {
    pub fn new(cache: &'a Cache) -> Self {
        Assembler { cache }
    }

    /// Resolves every backend reachable from `resource` (default backend
    /// plus each rule path) into endpoint address lists, every TLS section
    /// into validated secret material, and a `jwt-key` annotation into its
    /// named JWK secret. Reference resolution failures are absorbed into
    /// an empty endpoint list or a disabled JWT policy rather than
    /// aborting (§4.1, §4.5, §7 ReferenceMissing); TLS/validation failures
    /// are returned as errors for the caller to reject the resource with.
    pub async fn resolve_dependencies(&self, resource: &RoutingResource, prefix: &str) -> Result<AssembledDependencies, Error> {
        let mut deps = AssembledDependencies::default();

        for tls in &resource.tls {
            let Some(secret) = self.cache.get_secret(&resource.namespace, &tls.secret_name) else {
                return Err(Error::ValidationFailed(format!(
                    "secret {}/{} not found",
                    resource.namespace, tls.secret_name
                )));
            };
            match secret::classify(&secret) {
                Some(material @ SecretMaterial::Tls { .. }) => {
                    deps.secrets.insert(tls.secret_name.clone(), material);
                }
                _ => {
                    return Err(Error::ValidationFailed(format!(
                        "secret {}/{} lacks cert or key",
                        resource.namespace, tls.secret_name
                    )));
                }
            }
        }

        if let Some(secret_name) = resource.annotations.get(&format!("{prefix}/{JWT_KEY}")) {
            match self.cache.get_secret(&resource.namespace, secret_name) {
                Some(secret) => match secret::classify(&secret) {
                    Some(material @ SecretMaterial::Jwk { .. }) => {
                        deps.secrets.insert(secret_name.clone(), material);
                    }
                    _ => warn!(
                        "jwt key secret {}/{secret_name} is not a valid JWK secret, disabling JWT",
                        resource.namespace
                    ),
                },
                None => warn!("jwt key secret {}/{secret_name} not found, disabling JWT", resource.namespace),
            }
        }

        let mut backends: Vec<&Backend> = Vec::new();
        if let Some(b) = resource.default_backend.as_ref() {
            backends.push(b);
        }
        for rule in &resource.rules {
            for p in &rule.paths {
                backends.push(&p.backend);
            }
        }

        for backend in backends {
            self.resolve_backend_endpoints(resource, backend, &mut deps).await;
        }

        Ok(deps)
    }

    async fn resolve_backend_endpoints(
        &self,
        resource: &RoutingResource,
        backend: &Backend,
        deps: &mut AssembledDependencies,
    ) {
        let Some(svc) = self.cache.get_service(&resource.namespace, &backend.service_name) else {
            warn!(
                "service {}/{} not found, installing empty upstream",
                resource.namespace, backend.service_name
            );
            return;
        };

        let target_port = match self
            .cache
            .resolve_target_port(&resource.namespace, &svc, &backend.service_port)
            .await
        {
            Ok(p) => p,
            Err(err) => {
                warn!(
                    "failed to resolve port for service {}/{}: {err}",
                    resource.namespace, backend.service_name
                );
                return;
            }
        };

        let addrs = self
            .cache
            .resolve_endpoint_addresses(&resource.namespace, &backend.service_name, target_port);

        deps.endpoints
            .insert((backend.service_name.clone(), target_port), addrs);
    }
}

/// Validates a routing resource per §4.5/§7: rejects with "no valid rules"
/// if there is neither a default backend nor any rule with a path; rejects
/// with "empty host" if a rule has paths but a blank host.
pub fn validate(resource: &RoutingResource) -> Result<(), Error> {
    if !resource.has_installable_content() {
        return Err(Error::ValidationFailed(format!(
            "ingress {}/{}: no valid rules",
            resource.namespace, resource.name
        )));
    }
    for rule in &resource.rules {
        if !rule.paths.is_empty() && rule.host.is_empty() {
            return Err(Error::ValidationFailed(format!(
                "ingress {}/{}: empty host",
                resource.namespace, resource.name
            )));
        }
    }
    Ok(())
}

/// Merges two dependency maps (used when composing a mergeable group):
/// the minion's entries take precedence on key collision.
pub fn merge_dependencies(base: &mut AssembledDependencies, overlay: AssembledDependencies) {
    let AssembledDependencies { secrets, endpoints } = overlay;
    base.secrets.extend(secrets);
    base.endpoints.extend(endpoints);
}

/// Top-level assembly entry point used by the reconciler (§4.4, §4.5):
/// resolves the resource's own dependencies and, for a master, every
/// minion's dependencies too, producing one `AssembledIngress`.
pub async fn assemble(
    cache: &Cache,
    resource: RoutingResource,
    minions: Vec<RoutingResource>,
    annotation_prefix: &str,
) -> Result<AssembledIngress, Error> {
    validate(&resource)?;
    for minion in &minions {
        validate(minion)?;
    }

    let assembler = Assembler::new(cache);
    let mut deps = assembler.resolve_dependencies(&resource, annotation_prefix).await?;

    let mut minion_results = Vec::new();
    for minion in minions {
        let minion_deps = assembler.resolve_dependencies(&minion, annotation_prefix).await?;
        merge_dependencies(&mut deps, minion_deps.clone());
        minion_results.push((minion, minion_deps));
    }

    Ok(AssembledIngress {
        resource,
        minions: minion_results,
        deps,
    })
}
