//! `ClusterVersion`: the platform-owned resource describing the cluster's current and desired
//! software version. The orchestrator writes `spec.{channel, desiredUpdate}` and never touches
//! status.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "config.openshift.io",
    version = "v1",
    kind = "ClusterVersion",
    status = "ClusterVersionStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterVersionSpec {
    pub channel: String,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub desired_update: Option<DesiredUpdate>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DesiredUpdate {
    pub version: String,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub force: Option<bool>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterVersionStatus {
    #[serde(default)]
    pub available_updates: Vec<AvailableUpdate>,

    #[serde(default)]
    pub history: Vec<VersionHistoryEntry>,

    #[serde(default)]
    pub conditions: Vec<ClusterOperatorCondition>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AvailableUpdate {
    pub version: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VersionHistoryEntry {
    pub version: String,
    pub state: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
pub struct ClusterOperatorCondition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
}

impl ClusterVersionStatus {
    pub fn condition_true(&self, condition_type: &str) -> bool {
        self.conditions
            .iter()
            .any(|c| c.condition_type == condition_type && c.status == "True")
    }

    pub fn condition_false(&self, condition_type: &str) -> bool {
        self.conditions
            .iter()
            .any(|c| c.condition_type == condition_type && c.status == "False")
    }

    pub fn offers_version(&self, version: &str) -> bool {
        self.available_updates.iter().any(|u| u.version == version)
    }

    /// The most recently applied version, per `status.history[0]` (history is newest-first, as
    /// the platform writes it).
    pub fn current_version(&self) -> Option<&str> {
        self.history.first().map(|h| h.version.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_with(available: &[&str], history_version: &str, progressing: &str) -> ClusterVersionStatus {
        ClusterVersionStatus {
            available_updates: available
                .iter()
                .map(|v| AvailableUpdate { version: v.to_string() })
                .collect(),
            history: vec![VersionHistoryEntry {
                version: history_version.to_string(),
                state: "Completed".to_string(),
            }],
            conditions: vec![ClusterOperatorCondition {
                condition_type: "Progressing".to_string(),
                status: progressing.to_string(),
            }],
        }
    }

    #[test]
    fn offers_version_checks_available_updates() {
        let status = status_with(&["4.14.1", "4.14.2"], "4.13.0", "False");
        assert!(status.offers_version("4.14.1"));
        assert!(!status.offers_version("4.15.0"));
    }

    #[test]
    fn progressing_condition_reads_as_bool() {
        let status = status_with(&[], "4.14.1", "False");
        assert!(status.condition_false("Progressing"));
        assert!(!status.condition_true("Progressing"));
    }
}
