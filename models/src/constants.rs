/// Helper macro to avoid retyping the base domain-like name of our system when creating further
/// string constants from it. When given no parameters, this returns the base domain-like name of
/// the system. When given a string literal parameter it adds `/parameter` to the end.
#[macro_export]
macro_rules! upgrade_domain {
    () => {
        "upgrade.managed.io"
    };
    ($s:literal) => {
        concat!(upgrade_domain!(), "/", $s)
    };
}

pub const API_VERSION: &str = upgrade_domain!("v1alpha1");
pub const NAMESPACE: &str = "cluster-upgrade-operator";
pub const OPERATOR_NAME: &str = "cluster-upgrade-operator";

/// The namespace in which machine-API resources (MachineSets, Machines) live.
pub const MACHINE_API_NAMESPACE: &str = "openshift-machine-api";

/// Label applied by the operator to surge MachineSets, Machines, and their template pods.
pub const LABEL_SURGE: &str = upgrade_domain!("surge");

/// Label used to find the platform's original (non-surge) worker MachineSets.
pub const LABEL_WORKER_POOL: &str = "machine.openshift.io/cluster-api-machine-role";
pub const LABEL_WORKER_POOL_VALUE: &str = "worker";

/// Label every Machine carries back to the MachineSet that created it.
pub const LABEL_MACHINESET: &str = "machine.openshift.io/cluster-api-machineset";

/// Node role label carried by control-plane nodes; used to compute non-master node counts.
pub const LABEL_MASTER_ROLE: &str = "node-role.kubernetes.io/master";

/// Node annotation (read-only) linking a Node back to its owning Machine.
pub const ANNOTATION_MACHINE: &str = "machine.openshift.io/machine";

/// Namespace and route/secret naming for the alert-silence collaborator.
pub const ALERTMANAGER_NAMESPACE: &str = "openshift-monitoring";
pub const ALERTMANAGER_ROUTE_NAME: &str = "alertmanager-main";
pub const ALERTMANAGER_TOKEN_SECRET_PREFIX: &str = "prometheus-k8s-token-";
pub const ALERTMANAGER_BASE_PATH: &str = "/api/v2/";
