use std::collections::HashSet;

use log::warn;

use crate::annotations::{inherit_master_to_minion, strip_master_denylist, strip_minion_denylist};
use crate::model::{MergeableGroup, MergeableRole, RoutingResource};

/// Finds the master for a minion by scanning same-namespace masters with
/// the same host (design doc §4.5).
pub fn find_master_for_minion<'a>(
    minion: &RoutingResource,
    all: &'a [RoutingResource],
) -> Option<&'a RoutingResource> {
    let minion_host = minion.rules.first().map(|r| r.host.as_str())?;
    all.iter().find(|r| {
        r.role == MergeableRole::Master
            && r.namespace == minion.namespace
            && r.rules.iter().any(|rule| rule.host == minion_host)
    })
}

/// Finds the minions of a master symmetrically; drops a minion whose rule
/// lacks any path (design doc §4.5).
pub fn find_minions_for_master<'a>(
    master: &RoutingResource,
    all: &'a [RoutingResource],
) -> Vec<&'a RoutingResource> {
    let master_host = master.rules.first().map(|r| r.host.as_str()).unwrap_or("");
    all.iter()
        .filter(|r| r.role == MergeableRole::Minion)
        .filter(|r| r.namespace == master.namespace)
        .filter(|r| r.rules.iter().any(|rule| rule.host == master_host))
        .filter(|r| r.rules.iter().any(|rule| !rule.paths.is_empty()))
        .collect()
}

/// Composes a master + minions into a `MergeableGroup`: strips the
/// master/minion denylists, applies master->minion inheritance, and drops
/// later minions whose path duplicates an earlier one, in cluster-object
/// order (design doc §3, §4.5, §4.6).
pub fn compose_group(
    mut master: RoutingResource,
    minions_in_cluster_order: Vec<RoutingResource>,
    annotation_prefix: &str,
) -> MergeableGroup {
    strip_master_denylist(&mut master.annotations, annotation_prefix);

    let mut seen_paths: HashSet<String> = HashSet::new();
    let mut kept_minions = Vec::new();

    for mut minion in minions_in_cluster_order {
        strip_minion_denylist(&mut minion.annotations, annotation_prefix);
        inherit_master_to_minion(&master.annotations, &mut minion.annotations, annotation_prefix);

        for rule in &mut minion.rules {
            rule.paths.retain(|p| {
                if seen_paths.contains(&p.path) {
                    warn!(
                        "dropping duplicate minion path '{}' for host '{}' (namespace {})",
                        p.path, rule.host, minion.namespace
                    );
                    false
                } else {
                    seen_paths.insert(p.path.clone());
                    true
                }
            });
        }

        if minion.rules.iter().any(|r| !r.paths.is_empty()) {
            kept_minions.push(minion);
        }
    }

    MergeableGroup {
        master,
        minions: kept_minions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Backend, PathBackend, Rule, ServicePort};
    use std::collections::BTreeMap;

    fn minion(name: &str, host: &str, path: &str) -> RoutingResource {
        RoutingResource {
            namespace: "default".to_string(),
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
            role: MergeableRole::Minion,
        }
    }

    fn master(name: &str, host: &str) -> RoutingResource {
        RoutingResource {
            namespace: "default".to_string(),
            name: name.to_string(),
            default_backend: None,
            rules: vec![Rule {
                host: host.to_string(),
                paths: vec![],
            }],
            tls: vec![],
            annotations: BTreeMap::new(),
            role: MergeableRole::Master,
        }
    }

    #[test]
    fn duplicate_minion_path_drops_the_later_one() {
        let m = master("cafe-master", "cafe.example.com");
        let a = minion("coffee-minion", "cafe.example.com", "/coffee");
        let b = minion("tea-minion", "cafe.example.com", "/coffee");
        let group = compose_group(m, vec![a, b], "nginx.org");
        assert_eq!(group.minions.len(), 1);
        assert_eq!(group.minions[0].name, "coffee-minion");
    }

    #[test]
    fn find_minions_is_symmetric_with_find_master() {
        let m = master("cafe-master", "cafe.example.com");
        let a = minion("coffee-minion", "cafe.example.com", "/coffee");
        let all = vec![m.clone(), a.clone()];
        let minions = find_minions_for_master(&m, &all);
        assert_eq!(minions.len(), 1);
        let found_master = find_master_for_minion(&a, &all).unwrap();
        assert_eq!(found_master.name, "cafe-master");
    }
}
