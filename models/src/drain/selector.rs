//! Pod selection predicates used to decide which pods on a node a drain tactic targets.

use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::api::policy::v1::PodDisruptionBudget;

pub type PodPredicate<'a> = Box<dyn Fn(&Pod) -> bool + 'a>;

/// Retains pods for which every predicate holds.
pub fn filter<'a>(pods: &'a [Pod], predicates: &[PodPredicate<'a>]) -> Vec<&'a Pod> {
    pods.iter()
        .filter(|pod| predicates.iter().all(|p| p(pod)))
        .collect()
}

/// A thin builder so call sites read `Filter::new(&pods).matching(predicate).collect()` rather
/// than threading slices of boxed closures by hand.
pub struct Filter<'a> {
    pods: &'a [Pod],
    predicates: Vec<PodPredicate<'a>>,
}

impl<'a> Filter<'a> {
    pub fn new(pods: &'a [Pod]) -> Self {
        Self {
            pods,
            predicates: Vec::new(),
        }
    }

    pub fn matching(mut self, predicate: PodPredicate<'a>) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn collect(self) -> Vec<&'a Pod> {
        filter(self.pods, &self.predicates)
    }
}

pub fn is_on_node(node_name: &str) -> PodPredicate<'static> {
    let node_name = node_name.to_string();
    Box::new(move |pod: &Pod| {
        pod.spec
            .as_ref()
            .and_then(|s| s.node_name.as_deref())
            .map(|n| n == node_name)
            .unwrap_or(false)
    })
}

pub fn is_daemonset() -> PodPredicate<'static> {
    Box::new(|pod: &Pod| has_owner_kind(pod, "DaemonSet"))
}

pub fn is_not_daemonset() -> PodPredicate<'static> {
    Box::new(|pod: &Pod| !has_owner_kind(pod, "DaemonSet"))
}

fn has_owner_kind(pod: &Pod, kind: &str) -> bool {
    pod.metadata
        .owner_references
        .as_ref()
        .map(|refs| refs.iter().any(|r| r.kind == kind))
        .unwrap_or(false)
}

/// True if any PDB's `selector.matchLabels` shares at least one key/value pair with the pod's
/// labels. This is a deliberate *partial* match — any single pair is sufficient, not all of
/// them — carried over unchanged from the upstream behavior this predicate was ported from.
pub fn is_pdb_pod(pdbs: &[PodDisruptionBudget]) -> PodPredicate<'_> {
    Box::new(move |pod: &Pod| {
        let pod_labels = pod.metadata.labels.as_ref();
        pdbs.iter().any(|pdb| contains_match_label(pdb, pod_labels))
    })
}

pub fn is_not_pdb_pod(pdbs: &[PodDisruptionBudget]) -> PodPredicate<'_> {
    Box::new(move |pod: &Pod| {
        let pod_labels = pod.metadata.labels.as_ref();
        !pdbs.iter().any(|pdb| contains_match_label(pdb, pod_labels))
    })
}

fn contains_match_label(
    pdb: &PodDisruptionBudget,
    pod_labels: Option<&std::collections::BTreeMap<String, String>>,
) -> bool {
    let match_labels = pdb
        .spec
        .as_ref()
        .and_then(|s| s.selector.as_ref())
        .and_then(|s| s.match_labels.as_ref());

    match (match_labels, pod_labels) {
        (Some(match_labels), Some(pod_labels)) => match_labels
            .iter()
            .any(|(k, v)| pod_labels.get(k) == Some(v)),
        _ => false,
    }
}

pub fn has_finalizers() -> PodPredicate<'static> {
    Box::new(|pod: &Pod| {
        pod.metadata
            .finalizers
            .as_ref()
            .map(|f| !f.is_empty())
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, OwnerReference};
    use maplit::btreemap;

    fn pod_with_labels(labels: std::collections::BTreeMap<String, String>) -> Pod {
        Pod {
            metadata: k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
                labels: Some(labels),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn pdb_with_match_labels(labels: std::collections::BTreeMap<String, String>) -> PodDisruptionBudget {
        PodDisruptionBudget {
            spec: Some(k8s_openapi::api::policy::v1::PodDisruptionBudgetSpec {
                selector: Some(LabelSelector {
                    match_labels: Some(labels),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn is_pdb_pod_matches_on_any_single_label_pair() {
        let pdb = pdb_with_match_labels(btreemap! {
            "app".to_string() => "web".to_string(),
            "tier".to_string() => "frontend".to_string(),
        });
        // Pod shares only "tier", not "app" -- partial match still returns true.
        let pod = pod_with_labels(btreemap! { "tier".to_string() => "frontend".to_string() });
        assert!(is_pdb_pod(&[pdb.clone()])(&pod));

        let unrelated = pod_with_labels(btreemap! { "tier".to_string() => "backend".to_string() });
        assert!(!is_pdb_pod(&[pdb])(&unrelated));
    }

    #[test]
    fn is_daemonset_checks_owner_kind() {
        let mut pod = Pod::default();
        pod.metadata.owner_references = Some(vec![OwnerReference {
            kind: "DaemonSet".to_string(),
            name: "foo".to_string(),
            api_version: "apps/v1".to_string(),
            uid: "1".to_string(),
            ..Default::default()
        }]);
        assert!(is_daemonset()(&pod));
        assert!(!is_not_daemonset()(&pod));
    }

    #[test]
    fn filter_requires_all_predicates() {
        let mut on_node = Pod::default();
        on_node.spec = Some(k8s_openapi::api::core::v1::PodSpec {
            node_name: Some("node-a".to_string()),
            ..Default::default()
        });
        let mut off_node = Pod::default();
        off_node.spec = Some(k8s_openapi::api::core::v1::PodSpec {
            node_name: Some("node-b".to_string()),
            ..Default::default()
        });

        let pods = vec![on_node, off_node];
        let matched = Filter::new(&pods).matching(is_on_node("node-a")).collect();
        assert_eq!(matched.len(), 1);
    }
}
