//! Typed bindings for the cluster-managed custom resources the orchestrator reads and writes but
//! does not own the schema of: `ClusterVersion`, `MachineSet`/`Machine`, and
//! `MachineConfigPool`.

pub mod cluster_version;
pub mod machine;
pub mod machineconfigpool;

pub use cluster_version::{ClusterVersion, ClusterVersionSpec, ClusterVersionStatus, DesiredUpdate};
pub use machine::{Machine, MachineSet, MachineSetSpec, MachineSetStatus};
pub use machineconfigpool::MachineConfigPool;
