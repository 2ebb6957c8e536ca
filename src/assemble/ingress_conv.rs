use std::collections::BTreeMap;

use k8s_openapi::api::networking::v1::Ingress;
use kube::ResourceExt;

use crate::annotations::MERGEABLE_INGRESS_TYPE;
use crate::error::Error;
use crate::model::{Backend, MergeableRole, PathBackend, Rule, RoutingResource, ServicePort, TlsSection};

/// Converts a raw Kubernetes `Ingress` into the crate's `RoutingResource`.
/// Pure structural conversion; no cluster lookups happen here (those are
/// the assembler's job, §4.5).
pub fn routing_resource_from_ingress(ing: &Ingress, annotation_prefix: &str) -> Result<RoutingResource, Error> {
    let namespace = ing
        .namespace()
        .ok_or_else(|| Error::ValidationFailed("ingress has no namespace".to_string()))?;
    let name = ing.name_any();
    let spec = ing
        .spec
        .as_ref()
        .ok_or_else(|| Error::ValidationFailed("ingress has no spec".to_string()))?;

    let default_backend = spec
        .default_backend
        .as_ref()
        .and_then(|b| b.service.as_ref())
        .map(|s| Backend {
            service_name: s.name.clone(),
            service_port: service_port(&s.port),
        });

    let mut rules = Vec::new();
    for rule in spec.rules.iter().flatten() {
        let host = rule.host.clone().unwrap_or_default();
        let mut paths = Vec::new();
        for path in rule.http.iter().flat_map(|h| h.paths.iter()) {
            let Some(svc) = path.backend.service.as_ref() else {
                continue;
            };
            paths.push(PathBackend {
                path: path.path.clone().unwrap_or_else(|| "/".to_string()),
                backend: Backend {
                    service_name: svc.name.clone(),
                    service_port: service_port(&svc.port),
                },
            });
        }
        rules.push(Rule { host, paths });
    }

    let mut tls = Vec::new();
    for t in spec.tls.iter().flatten() {
        let Some(secret_name) = t.secret_name.clone() else {
            continue;
        };
        tls.push(TlsSection {
            hosts: t.hosts.clone().unwrap_or_default(),
            secret_name,
        });
    }

    let annotations: BTreeMap<String, String> = ing
        .annotations()
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let role = match annotations.get(&format!("{annotation_prefix}/{MERGEABLE_INGRESS_TYPE}")).map(String::as_str) {
        Some("master") => MergeableRole::Master,
        Some("minion") => MergeableRole::Minion,
        _ => MergeableRole::None,
    };

    Ok(RoutingResource {
        namespace,
        name,
        default_backend,
        rules,
        tls,
        annotations,
        role,
    })
}

fn service_port(port: &Option<k8s_openapi::api::networking::v1::ServiceBackendPort>) -> ServicePort {
    match port {
        Some(p) => match (&p.name, p.number) {
            (Some(name), _) => ServicePort::Name(name.clone()),
            (None, Some(n)) => ServicePort::Number(n as u16),
            (None, None) => ServicePort::Number(0),
        },
        None => ServicePort::Number(0),
    }
}
