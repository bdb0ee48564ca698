//! Capacity scaler: maintains a surge copy of each worker `MachineSet` during an upgrade so pod
//! capacity is preserved while nodes are drained one at a time.

pub mod error;

use crate::clock::Clock;
use crate::constants::{LABEL_SURGE, LABEL_WORKER_POOL, LABEL_WORKER_POOL_VALUE, MACHINE_API_NAMESPACE};
use crate::external::machine::{LabelSelector, Machine, MachineSet, MachineTemplate, MachineTemplateMetadata};
use crate::kubeclient::KubeClient;
use error::ScalerError;
use k8s_openapi::api::core::v1::Node;
use kube::api::ObjectMeta;
use snafu::{ensure, OptionExt, ResultExt};
use std::collections::BTreeMap;
use std::sync::Arc;

const SURGE_SUFFIX: &str = "-upgrade";

pub struct CapacityScaler {
    kube: Arc<dyn KubeClient>,
    scale_timeout: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl CapacityScaler {
    pub fn new(kube: Arc<dyn KubeClient>, scale_timeout: chrono::Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            kube,
            scale_timeout,
            clock,
        }
    }

    /// Ensures every original worker `MachineSet` has a ready surge sibling. Returns `ready =
    /// true` only once every surge set and its backing node are ready.
    pub async fn scale_up(&self) -> Result<bool, ScalerError> {
        let all = self
            .kube
            .list_machine_sets()
            .await
            .context(error::ListMachineSetsSnafu)?;

        let workers: Vec<_> = all
            .iter()
            .filter(|ms| is_worker_machineset(ms))
            .collect();

        ensure!(!workers.is_empty(), error::NoOriginalMachineSetSnafu);

        let surge_names: std::collections::HashSet<_> = all
            .iter()
            .filter(|ms| is_surge_machineset(ms))
            .filter_map(|ms| ms.metadata.name.clone())
            .collect();

        let mut created_any = false;
        for worker in &workers {
            let name = worker.metadata.name.clone().unwrap_or_default();
            let surge_name = format!("{name}{SURGE_SUFFIX}");
            if surge_names.contains(&surge_name) {
                continue;
            }
            self.create_surge(worker, &surge_name).await?;
            created_any = true;
        }

        if created_any {
            return Ok(false);
        }

        self.check_surge_readiness(&all).await
    }

    async fn create_surge(&self, worker: &MachineSet, surge_name: &str) -> Result<(), ScalerError> {
        let mut clone = worker.clone();
        clone.metadata = ObjectMeta {
            name: Some(surge_name.to_string()),
            namespace: Some(MACHINE_API_NAMESPACE.to_string()),
            labels: Some(BTreeMap::from([(
                LABEL_SURGE.to_string(),
                "true".to_string(),
            )])),
            ..Default::default()
        };
        clone.spec.replicas = 1;

        let mut selector: LabelSelector = clone.spec.selector.clone();
        selector
            .match_labels
            .insert(LABEL_SURGE.to_string(), "true".to_string());
        clone.spec.selector = selector;

        let mut template: MachineTemplate = clone.spec.template.clone();
        let mut labels = template.metadata.labels.clone();
        labels.insert(LABEL_SURGE.to_string(), "true".to_string());
        template.metadata = MachineTemplateMetadata { labels };
        clone.spec.template = template;

        clone.status = Default::default();

        self.kube
            .create_machine_set(&clone)
            .await
            .context(error::CreateMachineSetSnafu {
                name: surge_name.to_string(),
            })?;
        Ok(())
    }

    async fn check_surge_readiness(&self, all: &[MachineSet]) -> Result<bool, ScalerError> {
        let nodes = self.kube.list_nodes().await.context(error::ListNodesSnafu)?;
        let machines = self.kube.list_machines().await.context(error::ListMachinesSnafu)?;

        let surges: Vec<_> = all.iter().filter(|ms| is_surge_machineset(ms)).collect();
        let mut all_ready = true;

        for surge in surges {
            let created_at = surge
                .metadata
                .creation_timestamp
                .as_ref()
                .map(|t| t.0)
                .unwrap_or_else(|| self.clock.now());
            let deadline = created_at + self.scale_timeout;

            if !surge.status.all_ready() {
                ensure!(self.clock.now() <= deadline, error::ScaleTimeoutSnafu { name: surge.metadata.name.clone().unwrap_or_default() });
                all_ready = false;
                continue;
            }

            let surge_name = surge.metadata.name.clone().unwrap_or_default();
            let surge_machine_name = machines
                .iter()
                .find(|m| is_surge_machine(m) && belongs_to_machineset(m, &surge_name))
                .and_then(|m| m.metadata.name.clone());

            let node_ready = surge_machine_name
                .and_then(|machine_name| {
                    let marker = format!("{MACHINE_API_NAMESPACE}/{machine_name}");
                    nodes.iter().find(|n| {
                        n.metadata
                            .annotations
                            .as_ref()
                            .and_then(|a| a.get(crate::constants::ANNOTATION_MACHINE))
                            == Some(&marker)
                    })
                })
                .map(node_is_ready)
                .unwrap_or(false);

            if !node_ready {
                ensure!(self.clock.now() <= deadline, error::ScaleTimeoutSnafu { name: surge.metadata.name.clone().unwrap_or_default() });
                all_ready = false;
            }
        }

        Ok(all_ready)
    }

    /// Deletes every surge `MachineSet` and reports `ready = true` once the non-master node
    /// count matches the sum of replicas across the remaining (non-surge) machine sets.
    pub async fn scale_down(&self) -> Result<bool, ScalerError> {
        let all = self
            .kube
            .list_machine_sets()
            .await
            .context(error::ListMachineSetsSnafu)?;

        for surge in all.iter().filter(|ms| is_surge_machineset(ms)) {
            if surge.metadata.deletion_timestamp.is_some() {
                continue;
            }
            let name = surge.metadata.name.clone().unwrap_or_default();
            self.kube
                .delete_machine_set(&name)
                .await
                .context(error::DeleteMachineSetSnafu { name })?;
        }

        let desired: i32 = all
            .iter()
            .filter(|ms| !is_surge_machineset(ms))
            .map(|ms| ms.spec.replicas)
            .sum();

        let nodes = self.kube.list_nodes().await.context(error::ListNodesSnafu)?;
        let non_master_count = nodes
            .iter()
            .filter(|n| {
                n.metadata
                    .labels
                    .as_ref()
                    .map(|l| !l.contains_key(crate::constants::LABEL_MASTER_ROLE))
                    .unwrap_or(true)
            })
            .count() as i32;

        Ok(desired == non_master_count)
    }
}

fn is_worker_machineset(ms: &MachineSet) -> bool {
    !is_surge_machineset(ms)
        && ms
            .metadata
            .labels
            .as_ref()
            .and_then(|l| l.get(LABEL_WORKER_POOL))
            .map(|v| v == LABEL_WORKER_POOL_VALUE)
            .unwrap_or(false)
}

fn is_surge_machineset(ms: &MachineSet) -> bool {
    ms.metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(LABEL_SURGE))
        .map(|v| v == "true")
        .unwrap_or(false)
}

fn is_surge_machine(m: &Machine) -> bool {
    m.metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(LABEL_SURGE))
        .map(|v| v == "true")
        .unwrap_or(false)
}

/// Whether `machine` was created by the MachineSet named `machineset_name`, per the label the
/// machine-API controller stamps on every Machine it creates.
fn belongs_to_machineset(m: &Machine, machineset_name: &str) -> bool {
    m.metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(crate::constants::LABEL_MACHINESET))
        .map(|v| v == machineset_name)
        .unwrap_or(false)
}

fn node_is_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conds| {
            conds
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machineset(name: &str, labels: BTreeMap<String, String>) -> MachineSet {
        MachineSet {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(labels),
                ..Default::default()
            },
            spec: crate::external::machine::MachineSetSpec {
                replicas: 1,
                selector: Default::default(),
                template: MachineTemplate {
                    metadata: MachineTemplateMetadata {
                        labels: Default::default(),
                    },
                },
            },
            status: Default::default(),
        }
    }

    #[test]
    fn identifies_worker_and_surge_machinesets() {
        let worker = machineset(
            "test-infra",
            BTreeMap::from([(LABEL_WORKER_POOL.to_string(), LABEL_WORKER_POOL_VALUE.to_string())]),
        );
        assert!(is_worker_machineset(&worker));
        assert!(!is_surge_machineset(&worker));

        let surge = machineset(
            "test-infra-upgrade",
            BTreeMap::from([(LABEL_SURGE.to_string(), "true".to_string())]),
        );
        assert!(is_surge_machineset(&surge));
        assert!(!is_worker_machineset(&surge));
    }

    fn machine(name: &str, machineset_name: &str, surge: bool) -> Machine {
        let mut labels = BTreeMap::from([(
            crate::constants::LABEL_MACHINESET.to_string(),
            machineset_name.to_string(),
        )]);
        if surge {
            labels.insert(LABEL_SURGE.to_string(), "true".to_string());
        }
        Machine {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(labels),
                ..Default::default()
            },
            spec: crate::external::machine::MachineSpec { provider_id: None },
        }
    }

    #[test]
    fn belongs_to_machineset_distinguishes_siblings_across_surge_sets() {
        let machine_a = machine("az-a-upgrade-xyz", "az-a-upgrade", true);
        let machine_b = machine("az-b-upgrade-abc", "az-b-upgrade", true);

        assert!(belongs_to_machineset(&machine_a, "az-a-upgrade"));
        assert!(!belongs_to_machineset(&machine_a, "az-b-upgrade"));
        assert!(belongs_to_machineset(&machine_b, "az-b-upgrade"));
        assert!(!belongs_to_machineset(&machine_b, "az-a-upgrade"));
    }

    /// A `KubeClient` backed by in-memory state, so `CapacityScaler` can be driven without a live
    /// cluster. Only the operations the scaler actually calls are meaningfully implemented.
    #[derive(Default)]
    struct FakeKubeClient {
        machine_sets: std::sync::Mutex<Vec<MachineSet>>,
        machines: Vec<Machine>,
        nodes: Vec<Node>,
        created: std::sync::Mutex<Vec<MachineSet>>,
    }

    #[async_trait::async_trait]
    impl KubeClient for FakeKubeClient {
        async fn list_machine_sets(&self) -> Result<Vec<MachineSet>, kube::Error> {
            Ok(self.machine_sets.lock().unwrap().clone())
        }

        async fn create_machine_set(&self, machine_set: &MachineSet) -> Result<(), kube::Error> {
            self.created.lock().unwrap().push(machine_set.clone());
            self.machine_sets.lock().unwrap().push(machine_set.clone());
            Ok(())
        }

        async fn delete_machine_set(&self, name: &str) -> Result<(), kube::Error> {
            self.machine_sets
                .lock()
                .unwrap()
                .retain(|ms| ms.metadata.name.as_deref() != Some(name));
            Ok(())
        }

        async fn list_machines(&self) -> Result<Vec<Machine>, kube::Error> {
            Ok(self.machines.clone())
        }

        async fn list_nodes(&self) -> Result<Vec<Node>, kube::Error> {
            Ok(self.nodes.clone())
        }

        async fn list_pods_on_node(&self, _node_name: &str) -> Result<Vec<k8s_openapi::api::core::v1::Pod>, kube::Error> {
            Ok(Vec::new())
        }

        async fn list_pdbs(&self) -> Result<Vec<k8s_openapi::api::policy::v1::PodDisruptionBudget>, kube::Error> {
            Ok(Vec::new())
        }

        async fn clear_pod_finalizers(&self, _name: &str) -> Result<(), kube::Error> {
            Ok(())
        }

        async fn delete_pod(&self, _name: &str, _grace_period_seconds: Option<u32>) -> Result<bool, kube::Error> {
            Ok(true)
        }
    }

    #[tokio::test]
    async fn scaler_creates_surge_for_original_machineset() {
        let worker = machineset(
            "test-infra",
            BTreeMap::from([(LABEL_WORKER_POOL.to_string(), LABEL_WORKER_POOL_VALUE.to_string())]),
        );
        let fake = Arc::new(FakeKubeClient {
            machine_sets: std::sync::Mutex::new(vec![worker]),
            ..Default::default()
        });

        let scaler = CapacityScaler::new(fake.clone(), chrono::Duration::minutes(30), Arc::new(crate::clock::SystemClock));
        let ready = scaler.scale_up().await.unwrap();
        assert!(!ready);

        let created = fake.created.lock().unwrap();
        assert_eq!(created.len(), 1);
        let surge = &created[0];
        assert_eq!(surge.metadata.name.as_deref(), Some("test-infra-upgrade"));
        assert_eq!(surge.spec.replicas, 1);
        assert_eq!(
            surge.metadata.labels.as_ref().and_then(|l| l.get(LABEL_SURGE)).map(String::as_str),
            Some("true")
        );
        assert_eq!(
            surge.spec.selector.match_labels.get(LABEL_SURGE).map(String::as_str),
            Some("true")
        );
        assert_eq!(
            surge.spec.template.metadata.labels.get(LABEL_SURGE).map(String::as_str),
            Some("true")
        );
    }

    #[tokio::test]
    async fn scaler_times_out_when_surge_node_never_becomes_ready() {
        use chrono::Utc;
        use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

        let created_at = Utc::now() - chrono::Duration::minutes(60);
        let mut surge = machineset(
            "test-infra-upgrade",
            BTreeMap::from([(LABEL_SURGE.to_string(), "true".to_string())]),
        );
        surge.metadata.creation_timestamp = Some(Time(created_at));
        surge.status = crate::external::machine::MachineSetStatus {
            replicas: 1,
            ready_replicas: 1,
        };

        let worker = machineset(
            "test-infra",
            BTreeMap::from([(LABEL_WORKER_POOL.to_string(), LABEL_WORKER_POOL_VALUE.to_string())]),
        );

        let fake = Arc::new(FakeKubeClient {
            machine_sets: std::sync::Mutex::new(vec![worker, surge]),
            machines: vec![machine("test-infra-upgrade-abc123", "test-infra-upgrade", true)],
            nodes: Vec::new(),
            ..Default::default()
        });

        let scaler = CapacityScaler::new(fake, chrono::Duration::minutes(30), Arc::new(crate::clock::SystemClock));
        let err = scaler.scale_up().await.unwrap_err();
        assert!(matches!(err, ScalerError::ScaleTimeout { .. }));
    }
}
