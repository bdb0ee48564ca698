//! The `UpgradeConfig` custom resource: the desired state of a single cluster upgrade, and the
//! history of phases it has passed through.

mod phase;

pub use phase::Phase;

use crate::constants::API_VERSION;
use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A user's or fleet-manager's declaration that a cluster should be upgraded to a given version
/// at (or after) a given time.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "upgrade.managed.io",
    version = "v1alpha1",
    kind = "UpgradeConfig",
    namespaced,
    shortname = "uc",
    status = "UpgradeConfigStatus",
    printcolumn = r#"{"name":"Desired", "type":"string", "jsonPath":".spec.desired.version"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.history[0].phase"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeConfigSpec {
    pub desired: UpgradeTarget,

    /// The time, in UTC, at which the upgrade is allowed to begin.
    pub upgrade_at: DateTime<Utc>,

    /// How long a PDB-governed pod may block a drain before the pod is force-deleted.
    #[serde(default = "default_pdb_force_drain_timeout_minutes")]
    pub pdb_force_drain_timeout_minutes: i32,

    pub upgrade_type: UpgradeType,
}

fn default_pdb_force_drain_timeout_minutes() -> i32 {
    60
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeTarget {
    /// The version to upgrade to, validated as semver by admission; read as an opaque string here
    /// since CRD schema validation is out of scope for this process.
    pub version: String,
    pub channel: String,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum UpgradeType {
    Osd,
    Aro,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeConfigStatus {
    #[serde(default)]
    pub history: Vec<UpgradeHistory>,
}

impl UpgradeConfigStatus {
    /// The entry for the version currently (or most recently) being upgraded to, if any.
    /// History is ordered most-recent first, so this is `history[0]`, never `history.last()`.
    pub fn current(&self) -> Option<&UpgradeHistory> {
        self.history.first()
    }

    pub fn current_mut(&mut self) -> Option<&mut UpgradeHistory> {
        self.history.first_mut()
    }

    /// True if an entry for `version` already exists, regardless of its phase. Upgrade history is
    /// append-only and never reprocesses a version once it has an entry.
    pub fn has_entry_for(&self, version: &str) -> bool {
        self.history.iter().any(|h| h.version == version)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeHistory {
    pub version: String,
    pub phase: Phase,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub start_time: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub complete_time: Option<DateTime<Utc>>,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl UpgradeHistory {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            phase: Phase::New,
            start_time: None,
            complete_time: None,
            conditions: Vec::new(),
        }
    }

    /// Records a condition, keeping at most one entry per `condition_type` (last-write-wins), the
    /// way `meta.SetStatusCondition` behaves in the original controller-runtime based operator.
    pub fn set_condition(&mut self, condition: Condition) {
        if let Some(existing) = self
            .conditions
            .iter_mut()
            .find(|c| c.condition_type == condition.condition_type)
        {
            *existing = condition;
        } else {
            self.conditions.push(condition);
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub condition_type: String,
    pub status: bool,
    pub reason: String,
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}

/// The API version string used when constructing a bare `kube::Api` for `UpgradeConfig` outside
/// of code-generated client paths (e.g. in tests that build fixtures by hand).
pub const UPGRADECONFIG_API_VERSION: &str = API_VERSION;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_tracks_most_recent_entry() {
        let mut status = UpgradeConfigStatus::default();
        assert!(status.current().is_none());

        status.history.push(UpgradeHistory::new("4.14.1"));
        assert_eq!(status.current().unwrap().version, "4.14.1");
        assert!(status.has_entry_for("4.14.1"));
        assert!(!status.has_entry_for("4.14.2"));
    }

    #[test]
    fn current_is_history_head_not_oldest_entry() {
        // A second upgrade started after the first completed is inserted at the front; `current`
        // must track that new entry, not the terminal one left behind at the back.
        let mut status = UpgradeConfigStatus::default();
        let mut first = UpgradeHistory::new("4.14.1");
        first.phase = Phase::Upgraded;
        status.history.push(first);

        status.history.insert(0, UpgradeHistory::new("4.14.2"));

        assert_eq!(status.current().unwrap().version, "4.14.2");
        assert_eq!(status.current().unwrap().phase, Phase::New);
    }

    #[test]
    fn set_condition_replaces_same_type() {
        let mut history = UpgradeHistory::new("4.14.1");
        let now = Utc::now();
        history.set_condition(Condition {
            condition_type: "Validated".into(),
            status: false,
            reason: "Pending".into(),
            message: "not yet validated".into(),
            last_transition_time: now,
        });
        history.set_condition(Condition {
            condition_type: "Validated".into(),
            status: true,
            reason: "Validated".into(),
            message: "spec is valid".into(),
            last_transition_time: now,
        });
        assert_eq!(history.conditions.len(), 1);
        assert!(history.conditions[0].status);
    }
}
