//! `MachineSet` and `Machine`: the machine-API resources the capacity scaler clones to create
//! surge worker capacity, and correlates against `Node` objects to check readiness.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "machine.openshift.io",
    version = "v1beta1",
    kind = "MachineSet",
    namespaced,
    status = "MachineSetStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct MachineSetSpec {
    pub replicas: i32,

    #[serde(default)]
    pub selector: LabelSelector,

    pub template: MachineTemplate,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
pub struct LabelSelector {
    #[serde(default, rename = "matchLabels")]
    pub match_labels: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
pub struct MachineTemplate {
    pub metadata: MachineTemplateMetadata,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
pub struct MachineTemplateMetadata {
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MachineSetStatus {
    #[serde(default)]
    pub replicas: i32,

    #[serde(default)]
    pub ready_replicas: i32,
}

impl MachineSetStatus {
    pub fn all_ready(&self) -> bool {
        self.replicas > 0 && self.replicas == self.ready_replicas
    }
}

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "machine.openshift.io",
    version = "v1beta1",
    kind = "Machine",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct MachineSpec {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub provider_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_requires_nonzero_replicas() {
        let status = MachineSetStatus {
            replicas: 0,
            ready_replicas: 0,
        };
        assert!(!status.all_ready());

        let status = MachineSetStatus {
            replicas: 1,
            ready_replicas: 1,
        };
        assert!(status.all_ready());

        let status = MachineSetStatus {
            replicas: 1,
            ready_replicas: 0,
        };
        assert!(!status.all_ready());
    }
}
