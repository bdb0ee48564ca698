//! `MachineConfigPool`: reports whether a pool of nodes (`master` or `worker`) has converged on
//! its current rendered configuration.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const POOL_MASTER: &str = "master";
pub const POOL_WORKER: &str = "worker";

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "machineconfiguration.openshift.io",
    version = "v1",
    kind = "MachineConfigPool",
    status = "MachineConfigPoolStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct MachineConfigPoolSpec {}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MachineConfigPoolStatus {
    #[serde(default)]
    pub machine_count: i32,

    #[serde(default)]
    pub updated_machine_count: i32,
}

impl MachineConfigPoolStatus {
    /// A pool is converged iff all of its machines are on the current rendered config and the
    /// pool actually has machines — an empty pool is not considered converged.
    pub fn converged(&self) -> bool {
        self.machine_count > 0 && self.machine_count == self.updated_machine_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_pool_is_not_converged() {
        let status = MachineConfigPoolStatus::default();
        assert!(!status.converged());
    }

    #[test]
    fn matching_counts_converge() {
        let status = MachineConfigPoolStatus {
            machine_count: 3,
            updated_machine_count: 3,
        };
        assert!(status.converged());
    }

    #[test]
    fn mismatched_counts_do_not_converge() {
        let status = MachineConfigPoolStatus {
            machine_count: 3,
            updated_machine_count: 2,
        };
        assert!(!status.converged());
    }
}
