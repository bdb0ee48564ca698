//! The two OSD-flavored drain tactics and their force-delete fallback.
//!
//! `Default` and `Pdb` both re-list their target pods on every call rather than working from a
//! snapshot, so `Execute`/`IsValid` stay accurate across repeated invocations as pods are deleted
//! out from under them.

use super::engine::DrainStrategy;
use super::error::{self, DrainError};
use super::selector::{self, Filter};
use super::{delete_pods, DeleteResult};
use crate::kubeclient::KubeClient;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use snafu::ResultExt;
use std::sync::Arc;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Target {
    /// Non-DaemonSet, non-PDB pods: the ordinary tail of a drain.
    Default,
    /// Non-DaemonSet pods a PDB claims: held back until their own grace period elapses.
    Pdb,
}

/// A tactic that targets a subset of a node's pods by predicate, optionally skipping the
/// finalizer-clearing politeness of [`delete_pods`] when used as the force-delete fallback.
pub struct NodeTactic {
    kube: Arc<dyn KubeClient>,
    node_name: String,
    target: Target,
    force: bool,
}

impl NodeTactic {
    pub fn default_tactic(kube: Arc<dyn KubeClient>, node_name: impl Into<String>) -> Self {
        Self {
            kube,
            node_name: node_name.into(),
            target: Target::Default,
            force: false,
        }
    }

    pub fn pdb_tactic(kube: Arc<dyn KubeClient>, node_name: impl Into<String>) -> Self {
        Self {
            kube,
            node_name: node_name.into(),
            target: Target::Pdb,
            force: false,
        }
    }

    /// Same predicates as the `Default` tactic, but deletes without clearing finalizers first and
    /// with a zero grace period -- used only after the engine has already declared a node failed.
    pub fn force_delete(kube: Arc<dyn KubeClient>, node_name: impl Into<String>) -> Self {
        Self {
            kube,
            node_name: node_name.into(),
            target: Target::Default,
            force: true,
        }
    }

    async fn target_pods(&self) -> Result<Vec<Pod>, DrainError> {
        let all = self
            .kube
            .list_pods_on_node(&self.node_name)
            .await
            .context(error::FindTargetPodsSnafu {
                node: self.node_name.clone(),
            })?;

        let pdbs = self
            .kube
            .list_pdbs()
            .await
            .context(error::FindPdbsSnafu {
                node: self.node_name.clone(),
            })?;

        let on_node = selector::is_on_node(&self.node_name);
        let not_daemonset = selector::is_not_daemonset();

        let matched = match self.target {
            Target::Default => {
                let not_pdb_pod = selector::is_not_pdb_pod(&pdbs);
                Filter::new(&all)
                    .matching(on_node)
                    .matching(not_daemonset)
                    .matching(not_pdb_pod)
                    .collect()
            }
            Target::Pdb => {
                let is_pdb_pod = selector::is_pdb_pod(&pdbs);
                Filter::new(&all)
                    .matching(on_node)
                    .matching(not_daemonset)
                    .matching(is_pdb_pod)
                    .collect()
            }
        };

        Ok(matched.into_iter().cloned().collect())
    }
}

#[async_trait]
impl DrainStrategy for NodeTactic {
    async fn execute(&self) -> Result<DeleteResult, DrainError> {
        let pods = self.target_pods().await?;
        if self.force {
            force_delete_pods(self.kube.as_ref(), &pods).await
        } else {
            delete_pods(self.kube.as_ref(), &pods).await
        }
    }

    async fn is_valid(&self) -> Result<bool, DrainError> {
        Ok(!self.target_pods().await?.is_empty())
    }
}

/// Deletes pods with a zero grace period and no attempt to clear finalizers first -- the
/// last-resort variant used once a node has already been declared failed by the drain engine.
async fn force_delete_pods(kube: &dyn KubeClient, pods: &[Pod]) -> Result<DeleteResult, DrainError> {
    let mut has_executed = false;
    let mut failures = Vec::new();

    for pod in pods {
        let name = pod.metadata.name.clone().unwrap_or_default();
        match kube.delete_pod(&name, Some(0)).await {
            Ok(true) => has_executed = true,
            Ok(false) => {}
            Err(source) => failures.push(format!("{name}: {source}")),
        }
    }

    if !failures.is_empty() {
        return error::DeletePodsSnafu { failures }.fail();
    }

    Ok(DeleteResult {
        message: format!("force-deleted {} pod(s)", pods.len()),
        has_executed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_enum_distinguishes_default_and_pdb() {
        assert_ne!(Target::Default, Target::Pdb);
    }
}
