//! Reads a node's cordon time: the drain engine's `startTime` is never stored by this operator,
//! it's inferred from the node itself each time it's needed.

use super::error::{self, DrainError};
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Node;
use snafu::OptionExt;

/// The well-known taint Kubernetes applies when a node is cordoned; its `timeAdded` is the
/// authoritative cordon timestamp.
const UNSCHEDULABLE_TAINT_KEY: &str = "node.kubernetes.io/unschedulable";

/// The time at which `node` was cordoned, read from the `node.kubernetes.io/unschedulable` taint.
///
/// Fails if the node isn't cordoned at all, or is cordoned without a discoverable taint -- the
/// engine has no `startTime` to measure `Δ` from in either case.
pub fn cordoned_at(node: &Node) -> Result<DateTime<Utc>, DrainError> {
    let name = node.metadata.name.clone().unwrap_or_default();

    let unschedulable = node
        .spec
        .as_ref()
        .and_then(|s| s.unschedulable)
        .unwrap_or(false);

    if !unschedulable {
        return error::NodeNotCordonedSnafu { node: name }.fail();
    }

    node.spec
        .as_ref()
        .and_then(|s| s.taints.as_ref())
        .and_then(|taints| taints.iter().find(|t| t.key == UNSCHEDULABLE_TAINT_KEY))
        .and_then(|t| t.time_added.as_ref())
        .map(|t| t.0)
        .context(error::NodeNotCordonedSnafu { node: name })
}

pub fn is_cordoned(node: &Node) -> bool {
    node.spec
        .as_ref()
        .and_then(|s| s.unschedulable)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{NodeSpec, Taint};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

    fn cordoned_node(time_added: Option<DateTime<Utc>>) -> Node {
        Node {
            spec: Some(NodeSpec {
                unschedulable: Some(true),
                taints: Some(vec![Taint {
                    key: UNSCHEDULABLE_TAINT_KEY.to_string(),
                    effect: "NoSchedule".to_string(),
                    time_added: time_added.map(Time),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn reads_taint_time_added() {
        let when = Utc::now();
        let node = cordoned_node(Some(when));
        assert_eq!(cordoned_at(&node).unwrap(), when);
    }

    #[test]
    fn uncordoned_node_fails() {
        let node = Node {
            spec: Some(NodeSpec {
                unschedulable: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(cordoned_at(&node).is_err());
        assert!(!is_cordoned(&node));
    }

    #[test]
    fn cordoned_without_taint_timestamp_fails() {
        let node = cordoned_node(None);
        assert!(cordoned_at(&node).is_err());
    }
}
