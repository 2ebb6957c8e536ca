//! C1: indexed stores for the watched kinds, plus the three reverse
//! lookups named in design doc §4.1. Backed by `kube::runtime::reflector`
//! stores, one per kind, updated only by the informers (§5): readers here
//! must tolerate non-repeatable reads across calls, so every lookup is a
//! fresh scan of the store's current snapshot rather than a cached index.

use std::collections::HashSet;
use std::sync::Arc;

use k8s_openapi::api::core::v1::{ConfigMap, Endpoints, Pod, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::runtime::reflector::{self, Store, Writer};
use kube::{Api, ResourceExt};

use crate::annotations::JWT_KEY;
use crate::error::Error;

#[derive(Clone)]
pub struct Cache {
    pub ingresses: Store<Ingress>,
    pub services: Store<Service>,
    pub endpoints: Store<Endpoints>,
    pub secrets: Store<Secret>,
    pub configmaps: Store<ConfigMap>,
    pub client: kube::Client,
}

/// The write half of each reflector store, handed to the dispatcher's
/// watch loops so they populate the very stores `Cache` reads from
/// (design doc §4.1, §4.3).
pub struct Writers {
    pub ingresses: Writer<Ingress>,
    pub services: Writer<Service>,
    pub endpoints: Writer<Endpoints>,
    pub secrets: Writer<Secret>,
    pub configmaps: Writer<ConfigMap>,
}

/// A namespace/name identity used as a task key.
pub type Key = (String, String);

impl Cache {
    /// Builds a `Cache` and its matching `Writers`, one reflector store per
    /// watched kind (design doc §4.1).
    pub fn new(client: kube::Client) -> (Cache, Writers) {
        let (ingresses_r, ingresses_w) = reflector::store();
        let (services_r, services_w) = reflector::store();
        let (endpoints_r, endpoints_w) = reflector::store();
        let (secrets_r, secrets_w) = reflector::store();
        let (configmaps_r, configmaps_w) = reflector::store();

        (
            Cache {
                ingresses: ingresses_r,
                services: services_r,
                endpoints: endpoints_r,
                secrets: secrets_r,
                configmaps: configmaps_r,
                client,
            },
            Writers {
                ingresses: ingresses_w,
                services: services_w,
                endpoints: endpoints_w,
                secrets: secrets_w,
                configmaps: configmaps_w,
            },
        )
    }
}

impl Cache {
    pub fn get_ingress(&self, ns: &str, name: &str) -> Option<Arc<Ingress>> {
        self.ingresses.get(&obj_ref::<Ingress>(ns, name))
    }

    pub fn get_service(&self, ns: &str, name: &str) -> Option<Arc<Service>> {
        self.services.get(&obj_ref::<Service>(ns, name))
    }

    pub fn get_endpoints(&self, ns: &str, name: &str) -> Option<Arc<Endpoints>> {
        self.endpoints.get(&obj_ref::<Endpoints>(ns, name))
    }

    pub fn get_secret(&self, ns: &str, name: &str) -> Option<Arc<Secret>> {
        self.secrets.get(&obj_ref::<Secret>(ns, name))
    }

    pub fn get_configmap(&self, ns: &str, name: &str) -> Option<Arc<ConfigMap>> {
        self.configmaps.get(&obj_ref::<ConfigMap>(ns, name))
    }

    pub fn list_ingresses(&self) -> Vec<Arc<Ingress>> {
        self.ingresses.state()
    }

    /// Ingresses in `ns` whose default backend or any rule path references
    /// `service_name` (design doc §4.1).
    pub fn ingresses_referencing_service(&self, ns: &str, service_name: &str) -> Vec<Key> {
        self.list_ingresses()
            .iter()
            .filter(|ing| ing.namespace().as_deref() == Some(ns))
            .filter(|ing| ingress_service_refs(ing).contains(&service_name.to_string()))
            .map(|ing| (ns.to_string(), ing.name_any()))
            .collect()
    }

    /// Resolves `endpoints` to its eponymous service, then reuses
    /// service->ingresses (design doc §4.1).
    pub fn ingresses_referencing_endpoints(&self, ns: &str, endpoints_name: &str) -> Vec<Key> {
        self.ingresses_referencing_service(ns, endpoints_name)
    }

    /// All ingresses that name `secret_name` in a TLS section or in the
    /// JWT-key annotation (design doc §4.1).
    pub fn ingresses_referencing_secret(&self, ns: &str, secret_name: &str) -> Vec<Key> {
        self.list_ingresses()
            .iter()
            .filter(|ing| ing.namespace().as_deref() == Some(ns))
            .filter(|ing| ingress_secret_refs(ing).contains(&secret_name.to_string()))
            .map(|ing| (ns.to_string(), ing.name_any()))
            .collect()
    }

    /// Resolves a named service port to a concrete target port: if the
    /// service port has no explicit target port, the service port number
    /// is used; otherwise the first pod matching the service's selector is
    /// consulted (design doc §4.1). Errors are surfaced, never fatal.
    pub async fn resolve_target_port(
        &self,
        ns: &str,
        svc: &Service,
        port_ref: &crate::model::ServicePort,
    ) -> Result<u16, Error> {
        use crate::model::ServicePort;
        use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

        let ports = svc
            .spec
            .as_ref()
            .and_then(|s| s.ports.as_ref())
            .ok_or_else(|| Error::ReferenceMissing(format!("service {ns}/{} has no ports", svc.name_any())))?;

        let port = match port_ref {
            ServicePort::Number(n) => ports
                .iter()
                .find(|p| p.port as u16 == *n)
                .ok_or_else(|| Error::ReferenceMissing(format!("service port {n} not found")))?,
            ServicePort::Name(n) => ports
                .iter()
                .find(|p| p.name.as_deref() == Some(n.as_str()))
                .ok_or_else(|| Error::ReferenceMissing(format!("service port '{n}' not found")))?,
        };

        match &port.target_port {
            None => Ok(port.port as u16),
            Some(IntOrString::Int(n)) => Ok(*n as u16),
            Some(IntOrString::String(name)) => {
                let selector = svc
                    .spec
                    .as_ref()
                    .and_then(|s| s.selector.as_ref())
                    .ok_or_else(|| Error::ReferenceMissing("service has no selector".to_string()))?;
                let label_selector = selector
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join(",");
                let pod_api: Api<Pod> = Api::namespaced(self.client.clone(), ns);
                let pods = pod_api
                    .list(&kube::api::ListParams::default().labels(&label_selector))
                    .await?;
                let pod = pods
                    .items
                    .first()
                    .ok_or_else(|| Error::ReferenceMissing("no pod matches selector".to_string()))?;
                let container_port = pod
                    .spec
                    .as_ref()
                    .into_iter()
                    .flat_map(|s| s.containers.iter())
                    .filter_map(|c| c.ports.as_ref())
                    .flatten()
                    .find(|p| p.name.as_deref() == Some(name.as_str()))
                    .ok_or_else(|| Error::ReferenceMissing(format!("named port '{name}' not found on pod")))?;
                Ok(container_port.container_port as u16)
            }
        }
    }

    /// Resolves the subset endpoints matching `target_port` into
    /// `address:port` strings. Failures produce an empty list rather than
    /// aborting (design doc §4.1, §4.5).
    pub fn resolve_endpoint_addresses(&self, ns: &str, service_name: &str, target_port: u16) -> Vec<String> {
        let Some(eps) = self.get_endpoints(ns, service_name) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for subset in eps.subsets.iter().flatten() {
            let matches_port = subset
                .ports
                .iter()
                .flatten()
                .any(|p| p.port as u16 == target_port);
            if !matches_port {
                continue;
            }
            for addr in subset.addresses.iter().flatten() {
                out.push(format!("{}:{target_port}", addr.ip));
            }
        }
        out
    }
}

fn obj_ref<K>(ns: &str, name: &str) -> kube::runtime::reflector::ObjectRef<K>
where
    K: kube::Resource,
    K::DynamicType: Default,
{
    kube::runtime::reflector::ObjectRef::new(name).within(ns)
}

fn ingress_service_refs(ing: &Ingress) -> HashSet<String> {
    let mut out = HashSet::new();
    let Some(spec) = ing.spec.as_ref() else {
        return out;
    };
    if let Some(name) = spec
        .default_backend
        .as_ref()
        .and_then(|b| b.service.as_ref())
        .map(|s| s.name.clone())
    {
        out.insert(name);
    }
    for rule in spec.rules.iter().flatten() {
        for path in rule
            .http
            .as_ref()
            .into_iter()
            .flat_map(|h| h.paths.iter())
        {
            if let Some(svc) = path.backend.service.as_ref() {
                out.insert(svc.name.clone());
            }
        }
    }
    out
}

fn ingress_secret_refs(ing: &Ingress) -> HashSet<String> {
    let mut out = HashSet::new();
    let Some(spec) = ing.spec.as_ref() else {
        return out;
    };
    for tls in spec.tls.iter().flatten() {
        if let Some(name) = tls.secret_name.clone() {
            out.insert(name);
        }
    }
    if let Some(key) = ing
        .annotations()
        .iter()
        .find(|(k, _)| k.ends_with(JWT_KEY))
        .map(|(_, v)| v.clone())
    {
        out.insert(key);
    }
    out
}
