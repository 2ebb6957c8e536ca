//! C7: produces the `ConfigurationModel` deterministically from an
//! `AssembledIngress` and the effective configuration (design doc §4.7).

pub mod resolve;

use std::collections::BTreeMap;
use std::path::Path;

use log::warn;

use crate::error::Error;
use crate::model::{
    AssembledDependencies, AssembledIngress, Backend, ConfigurationModel, HealthCheck, JwtPolicy,
    Location, RouteOverrides, RoutingResource, Server, ServerPolicy, Upstream, UpstreamMember,
};
use resolve::ResolvedConfig;

/// Loopback sink used when a backend's endpoint list is empty, so the
/// proxy returns a defined error instead of an invalid configuration
/// (design doc §4.7 step 2, §8 boundary behavior).
const SYNTHETIC_MEMBER: &str = "127.0.0.1:8181";

struct Unit {
    resource: RoutingResource,
    deps: AssembledDependencies,
    resolved: ResolvedConfig,
    is_minion: bool,
}

/// Synthesizes the full `ConfigurationModel` for a standalone ingress or a
/// mergeable group (design doc §4.7). Iteration order over maps is
/// stabilized by sorting keys so that two runs over identical input
/// produce byte-identical output (§4.4 Determinism, §8).
pub fn synthesize(
    effective: &crate::model::EffectiveConfig,
    assembled: &AssembledIngress,
    annotation_prefix: &str,
    commercial: bool,
    secrets_root: &Path,
) -> (ConfigurationModel, Vec<Error>) {
    let mut errors = Vec::new();
    let naming_name = assembled.resource.name.clone();

    let (master_resolved, master_errors) = resolve::resolve(
        effective,
        &assembled.resource.annotations,
        annotation_prefix,
        &assembled.resource.namespace,
        &assembled.resource.name,
        commercial,
    );
    errors.extend(master_errors);

    let mut units = vec![Unit {
        resource: assembled.resource.clone(),
        deps: assembled.deps.clone(),
        resolved: master_resolved,
        is_minion: false,
    }];

    for (minion, deps) in &assembled.minions {
        let (resolved, errs) = resolve::resolve(
            effective,
            &minion.annotations,
            annotation_prefix,
            &minion.namespace,
            &minion.name,
            commercial,
        );
        errors.extend(errs);
        units.push(Unit {
            resource: minion.clone(),
            deps: deps.clone(),
            resolved,
            is_minion: true,
        });
    }

    let mut upstreams: BTreeMap<String, Upstream> = BTreeMap::new();
    let mut locations_by_host: BTreeMap<String, Vec<Location>> = BTreeMap::new();
    let mut host_order: Vec<String> = Vec::new();
    let mut health_checks: Vec<HealthCheck> = Vec::new();
    let mut jwt_redirect_locations: Vec<(String, String)> = Vec::new();
    let mut grpc_hosts: BTreeMap<String, (usize, usize)> = BTreeMap::new(); // host -> (grpc paths, total paths)

    for unit in &units {
        for rule in &unit.resource.rules {
            if !host_order.contains(&rule.host) {
                host_order.push(rule.host.clone());
            }
            let entry = grpc_hosts.entry(rule.host.clone()).or_insert((0, 0));

            for path_backend in &rule.paths {
                let upstream_name = upstream_name(
                    &unit.resource.namespace,
                    &naming_name,
                    &rule.host,
                    &path_backend.backend,
                );
                upstreams
                    .entry(upstream_name.clone())
                    .or_insert_with(|| build_upstream(&upstream_name, &path_backend.backend, &unit, commercial));

                let service = &path_backend.backend.service_name;
                entry.1 += 1;
                let is_grpc = unit.resolved.grpc_services.iter().any(|s| s == service);
                if is_grpc {
                    entry.0 += 1;
                }

                let overrides = RouteOverrides {
                    proxy_connect_timeout: Some(unit.resolved.proxy_connect_timeout.clone()),
                    proxy_read_timeout: Some(unit.resolved.proxy_read_timeout.clone()),
                    client_max_body_size: Some(unit.resolved.client_max_body_size.clone()),
                    proxy_buffering: Some(unit.resolved.proxy_buffering),
                    proxy_buffers: unit.resolved.proxy_buffers.clone(),
                    proxy_buffer_size: unit.resolved.proxy_buffer_size.clone(),
                    proxy_max_temp_file_size: unit.resolved.proxy_max_temp_file_size.clone(),
                    rewrite_path: unit.resolved.rewrites.get(service).cloned(),
                    websocket: unit.resolved.websocket_services.iter().any(|s| s == service),
                    ssl_upstream: unit.resolved.ssl_services.iter().any(|s| s == service),
                    grpc: is_grpc,
                    location_snippets: unit.resolved.location_snippets.clone(),
                };

                if unit.resolved.health_checks.iter().any(|s| s == service) {
                    health_checks.push(HealthCheck {
                        upstream: upstream_name.clone(),
                        mandatory: unit.resolved.health_checks_mandatory,
                        mandatory_queue: unit.resolved.health_checks_mandatory_queue,
                    });
                }

                let mut location_jwt = None;
                if unit.is_minion {
                    if let Some(jwt) = attach_jwt(unit, secrets_root, &mut jwt_redirect_locations) {
                        location_jwt = Some(jwt);
                    }
                }

                locations_by_host
                    .entry(rule.host.clone())
                    .or_default()
                    .push(Location {
                        path: path_backend.path.clone(),
                        upstream: upstream_name,
                        overrides,
                        jwt: location_jwt,
                        minion_identity: unit.is_minion.then(|| unit.resource.file_key()),
                    });
            }
        }
    }

    // Step 5: synthesize a root location from the default backend if no
    // rule defines "/" (design doc §4.7 step 5).
    if let Some(default_backend) = &units[0].resource.default_backend {
        let has_root = locations_by_host
            .values()
            .any(|locs| locs.iter().any(|l| l.path == "/"));
        if !has_root {
            let host = host_order.first().cloned().unwrap_or_default();
            let upstream_name = upstream_name(
                &units[0].resource.namespace,
                &naming_name,
                &host,
                default_backend,
            );
            upstreams
                .entry(upstream_name.clone())
                .or_insert_with(|| build_upstream(&upstream_name, default_backend, &units[0], commercial));
            locations_by_host.entry(host.clone()).or_default().push(Location {
                path: "/".to_string(),
                upstream: upstream_name,
                overrides: RouteOverrides::default(),
                jwt: None,
                minion_identity: None,
            });
            if !host_order.contains(&host) {
                host_order.push(host);
            }
        }
    }

    // Step 4: gRPC requires HTTP/2; without it, drop all gRPC tagging and
    // log (design doc §4.7 step 4, §8 boundary behavior).
    let mut grpc_only_hosts: BTreeMap<String, bool> = BTreeMap::new();
    for (host, (grpc_count, total)) in &grpc_hosts {
        let all_grpc = *total > 0 && grpc_count == total;
        if all_grpc && !effective.http2 {
            warn!("host '{host}' has all-gRPC locations but http2 is disabled; dropping gRPC tagging");
            if let Some(locs) = locations_by_host.get_mut(host) {
                for loc in locs.iter_mut() {
                    loc.overrides.grpc = false;
                }
            }
            grpc_only_hosts.insert(host.clone(), false);
        } else {
            grpc_only_hosts.insert(host.clone(), all_grpc);
        }
    }

    // Step 3 + 6: build one server per distinct host.
    let master_resolved = &units[0].resolved;
    let mut servers = Vec::new();
    for (idx, host) in host_order.iter().enumerate() {
        let tls = resolve_tls_for_host(&units[0].resource, &units[0].deps, host, secrets_root);
        let mut jwt = None;
        let mut server_jwt_redirects = Vec::new();
        if !units[0].is_minion {
            if let Some(j) = resolve_jwt(&units[0], secrets_root) {
                if j.login_url.is_some() {
                    server_jwt_redirects.push((
                        format!("@login_url_{}", units[0].resource.file_key()),
                        j.login_url.clone().unwrap(),
                    ));
                    jwt = Some(j);
                }
            }
        }
        // status zone equals the empty host when the rule's host is empty
        // (§4.7 edge case).
        let status_zone = host.clone();

        let locations = locations_by_host.remove(host).unwrap_or_default();

        servers.push(Server {
            host: host.clone(),
            status_zone,
            tls,
            policy: ServerPolicy {
                hsts: master_resolved.hsts,
                hsts_max_age: master_resolved.hsts_max_age,
                hsts_include_subdomains: master_resolved.hsts_include_subdomains,
                ssl_redirect: master_resolved.ssl_redirect,
                redirect_to_https: master_resolved.redirect_to_https,
                server_tokens: master_resolved.server_tokens.clone(),
                proxy_protocol: master_resolved.proxy_protocol,
                real_ip_header: master_resolved.real_ip_header.clone(),
                set_real_ip_from: master_resolved.set_real_ip_from.clone(),
                real_ip_recursive: master_resolved.real_ip_recursive,
                proxy_hide_headers: master_resolved.proxy_hide_headers.clone(),
                proxy_pass_headers: master_resolved.proxy_pass_headers.clone(),
                listen_ports: master_resolved.listen_ports.clone(),
                listen_ports_ssl: master_resolved.listen_ports_ssl.clone(),
                server_snippets: master_resolved.server_snippets.clone(),
            },
            locations,
            grpc_only: *grpc_only_hosts.get(host).unwrap_or(&false),
            jwt,
            jwt_redirect_locations: if idx == 0 {
                let mut all = server_jwt_redirects;
                all.extend(jwt_redirect_locations.clone());
                all
            } else {
                vec![]
            },
        });
    }

    let mut upstreams: Vec<Upstream> = upstreams.into_values().collect();
    upstreams.sort_by(|a, b| a.name.cmp(&b.name));

    let model = ConfigurationModel {
        upstreams,
        servers,
        health_checks,
        keepalive: master_resolved.keepalive.filter(|k| *k > 0),
    };

    (model, errors)
}

fn attach_jwt(
    unit: &Unit,
    secrets_root: &Path,
    jwt_redirect_locations: &mut Vec<(String, String)>,
) -> Option<JwtPolicy> {
    let jwt = resolve_jwt(unit, secrets_root)?;
    if jwt.login_url.is_none() {
        return None;
    }
    jwt_redirect_locations.push((
        format!("@login_url_{}", unit.resource.file_key()),
        jwt.login_url.clone().unwrap(),
    ));
    Some(jwt)
}

/// Resolves a unit's JWT policy's `key_file` (still a bare secret name at
/// this point, §4.7) to the absolute path C8 writes the JWK secret's
/// material to. Disables JWT for the unit if the secret was never resolved
/// into `deps.secrets` as a valid JWK (§7 ReferenceMissing).
fn resolve_jwt(unit: &Unit, secrets_root: &Path) -> Option<JwtPolicy> {
    let jwt = unit.resolved.jwt.clone()?;
    match unit.deps.secrets.get(&jwt.key_file) {
        Some(crate::model::SecretMaterial::Jwk { .. }) => {
            let path = secrets_root
                .join(format!("{}-{}", unit.resource.namespace, jwt.key_file))
                .display()
                .to_string();
            Some(JwtPolicy { key_file: path, ..jwt })
        }
        _ => {
            warn!(
                "jwt key secret {}/{} missing or invalid, disabling JWT for {}",
                unit.resource.namespace,
                jwt.key_file,
                unit.resource.file_key()
            );
            None
        }
    }
}

fn upstream_name(namespace: &str, naming_name: &str, host: &str, backend: &Backend) -> String {
    format!(
        "{namespace}-{naming_name}-{host}-{}-{}",
        backend.service_name, backend.service_port
    )
}

fn build_upstream(name: &str, backend: &Backend, unit: &Unit, commercial: bool) -> Upstream {
    let key = resolved_port_key(unit, backend);
    let members = unit
        .deps
        .endpoints
        .get(&key)
        .filter(|addrs| !addrs.is_empty())
        .map(|addrs| {
            addrs
                .iter()
                .map(|addr| UpstreamMember {
                    address: addr.clone(),
                    max_fails: unit.resolved.max_fails,
                    fail_timeout: unit.resolved.fail_timeout.clone(),
                    slow_start: unit.resolved.slow_start.clone().unwrap_or_default(),
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_else(|| {
            vec![UpstreamMember {
                address: SYNTHETIC_MEMBER.to_string(),
                max_fails: unit.resolved.max_fails,
                fail_timeout: unit.resolved.fail_timeout.clone(),
                slow_start: String::new(),
            }]
        });

    let sticky_cookie = unit
        .resolved
        .sticky_cookies
        .get(&backend.service_name)
        .map(|spec| {
            let mut parts = spec.splitn(2, char::is_whitespace);
            let cookie_name = parts.next().unwrap_or_default().to_string();
            let parameters = parts.next().unwrap_or_default().to_string();
            crate::model::StickyCookie {
                name: cookie_name,
                parameters,
            }
        });

    Upstream {
        name: name.to_string(),
        members,
        lb_method: unit.resolved.lb_method,
        sticky_cookie: if commercial { sticky_cookie } else { None },
        queue: unit.resolved.health_checks_mandatory_queue,
    }
}

/// The endpoint-map key to consult for `backend`: we don't know the
/// resolved target port here (the assembler already folded it into the
/// dependency map's key), so we scan for the matching service name.
fn resolved_port_key(unit: &Unit, backend: &Backend) -> (String, u16) {
    unit.deps
        .endpoints
        .keys()
        .find(|(svc, _)| svc == &backend.service_name)
        .cloned()
        .unwrap_or((backend.service_name.clone(), 0))
}

/// Resolves the TLS section covering `host` to the absolute path C8 writes
/// the secret's combined cert+key material to (§4.8, §6). A section naming
/// a secret that never resolved into `deps.secrets` as valid TLS material
/// covers no server (assembly already rejected the ingress in that case).
fn resolve_tls_for_host(
    resource: &RoutingResource,
    deps: &AssembledDependencies,
    host: &str,
    secrets_root: &Path,
) -> Option<String> {
    for tls in &resource.tls {
        let covers = if tls.hosts.is_empty() {
            host.is_empty()
        } else {
            tls.hosts.iter().any(|h| h == host)
        };
        if covers {
            if let Some(crate::model::SecretMaterial::Tls { .. }) = deps.secrets.get(&tls.secret_name) {
                return Some(
                    secrets_root
                        .join(format!("{}-{}", resource.namespace, tls.secret_name))
                        .display()
                        .to_string(),
                );
            }
        }
    }
    None
}
