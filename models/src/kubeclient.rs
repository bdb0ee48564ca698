//! The `KubeClient` capability boundary: every Kubernetes API call the capacity scaler and the
//! drain tactics need, behind one injectable trait -- the same shape `Silencer` and
//! `HealthChecker` already use, so those collaborators can be driven by a fake cluster in tests
//! instead of a live `kube::Client`.

use crate::constants::MACHINE_API_NAMESPACE;
use crate::external::machine::{Machine, MachineSet};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::Api;

#[cfg(feature = "mockall")]
use mockall::mock;

#[async_trait]
pub trait KubeClient: Send + Sync {
    async fn list_machine_sets(&self) -> Result<Vec<MachineSet>, kube::Error>;
    async fn create_machine_set(&self, machine_set: &MachineSet) -> Result<(), kube::Error>;
    async fn delete_machine_set(&self, name: &str) -> Result<(), kube::Error>;
    async fn list_machines(&self) -> Result<Vec<Machine>, kube::Error>;
    async fn list_nodes(&self) -> Result<Vec<Node>, kube::Error>;

    async fn list_pods_on_node(&self, node_name: &str) -> Result<Vec<Pod>, kube::Error>;
    async fn list_pdbs(&self) -> Result<Vec<PodDisruptionBudget>, kube::Error>;

    /// Clears a pod's finalizers via a merge patch, so a subsequent delete isn't held open by
    /// them.
    async fn clear_pod_finalizers(&self, name: &str) -> Result<(), kube::Error>;

    /// Deletes a pod. Returns `Ok(false)` rather than erroring if the pod was already gone.
    async fn delete_pod(&self, name: &str, grace_period_seconds: Option<u32>) -> Result<bool, kube::Error>;
}

#[cfg(feature = "mockall")]
mock! {
    pub KubeClient {}

    #[async_trait]
    impl KubeClient for KubeClient {
        async fn list_machine_sets(&self) -> Result<Vec<MachineSet>, kube::Error>;
        async fn create_machine_set(&self, machine_set: &MachineSet) -> Result<(), kube::Error>;
        async fn delete_machine_set(&self, name: &str) -> Result<(), kube::Error>;
        async fn list_machines(&self) -> Result<Vec<Machine>, kube::Error>;
        async fn list_nodes(&self) -> Result<Vec<Node>, kube::Error>;
        async fn list_pods_on_node(&self, node_name: &str) -> Result<Vec<Pod>, kube::Error>;
        async fn list_pdbs(&self) -> Result<Vec<PodDisruptionBudget>, kube::Error>;
        async fn clear_pod_finalizers(&self, name: &str) -> Result<(), kube::Error>;
        async fn delete_pod(&self, name: &str, grace_period_seconds: Option<u32>) -> Result<bool, kube::Error>;
    }
}

#[async_trait]
impl<T: KubeClient> KubeClient for std::sync::Arc<T> {
    async fn list_machine_sets(&self) -> Result<Vec<MachineSet>, kube::Error> {
        (**self).list_machine_sets().await
    }

    async fn create_machine_set(&self, machine_set: &MachineSet) -> Result<(), kube::Error> {
        (**self).create_machine_set(machine_set).await
    }

    async fn delete_machine_set(&self, name: &str) -> Result<(), kube::Error> {
        (**self).delete_machine_set(name).await
    }

    async fn list_machines(&self) -> Result<Vec<Machine>, kube::Error> {
        (**self).list_machines().await
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, kube::Error> {
        (**self).list_nodes().await
    }

    async fn list_pods_on_node(&self, node_name: &str) -> Result<Vec<Pod>, kube::Error> {
        (**self).list_pods_on_node(node_name).await
    }

    async fn list_pdbs(&self) -> Result<Vec<PodDisruptionBudget>, kube::Error> {
        (**self).list_pdbs().await
    }

    async fn clear_pod_finalizers(&self, name: &str) -> Result<(), kube::Error> {
        (**self).clear_pod_finalizers(name).await
    }

    async fn delete_pod(&self, name: &str, grace_period_seconds: Option<u32>) -> Result<bool, kube::Error> {
        (**self).delete_pod(name, grace_period_seconds).await
    }
}

/// A `KubeClient` backed by a real `kube::Client`.
pub struct KubeApiClient {
    client: kube::Client,
}

impl KubeApiClient {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }

    fn machine_sets(&self) -> Api<MachineSet> {
        Api::namespaced(self.client.clone(), MACHINE_API_NAMESPACE)
    }

    fn machines(&self) -> Api<Machine> {
        Api::namespaced(self.client.clone(), MACHINE_API_NAMESPACE)
    }

    fn nodes(&self) -> Api<Node> {
        Api::all(self.client.clone())
    }

    fn pods(&self) -> Api<Pod> {
        Api::all(self.client.clone())
    }

    fn pdbs(&self) -> Api<PodDisruptionBudget> {
        Api::all(self.client.clone())
    }
}

#[async_trait]
impl KubeClient for KubeApiClient {
    async fn list_machine_sets(&self) -> Result<Vec<MachineSet>, kube::Error> {
        Ok(self.machine_sets().list(&ListParams::default()).await?.items)
    }

    async fn create_machine_set(&self, machine_set: &MachineSet) -> Result<(), kube::Error> {
        self.machine_sets().create(&PostParams::default(), machine_set).await?;
        Ok(())
    }

    async fn delete_machine_set(&self, name: &str) -> Result<(), kube::Error> {
        self.machine_sets().delete(name, &DeleteParams::default()).await?;
        Ok(())
    }

    async fn list_machines(&self) -> Result<Vec<Machine>, kube::Error> {
        Ok(self.machines().list(&ListParams::default()).await?.items)
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, kube::Error> {
        Ok(self.nodes().list(&ListParams::default()).await?.items)
    }

    async fn list_pods_on_node(&self, node_name: &str) -> Result<Vec<Pod>, kube::Error> {
        let params = ListParams {
            field_selector: Some(format!("spec.nodeName={node_name}")),
            ..Default::default()
        };
        Ok(self.pods().list(&params).await?.items)
    }

    async fn list_pdbs(&self) -> Result<Vec<PodDisruptionBudget>, kube::Error> {
        Ok(self.pdbs().list(&ListParams::default()).await?.items)
    }

    async fn clear_pod_finalizers(&self, name: &str) -> Result<(), kube::Error> {
        let patch = serde_json::json!({ "metadata": { "finalizers": [] } });
        self.pods()
            .patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await?;
        Ok(())
    }

    async fn delete_pod(&self, name: &str, grace_period_seconds: Option<u32>) -> Result<bool, kube::Error> {
        let params = DeleteParams {
            grace_period_seconds,
            ..Default::default()
        };
        match self.pods().delete(name, &params).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(false),
            Err(source) => Err(source),
        }
    }
}
