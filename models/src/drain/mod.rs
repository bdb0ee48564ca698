//! Node drain: the pod-selection predicates, the pod deleter, and the timed drain engine that
//! composes them against a single cordoned node.

pub mod engine;
pub mod error;
pub mod node;
pub mod selector;
pub mod tactics;

pub use engine::{DrainEngine, DrainReport, DrainStrategy, TimedDrainStrategy};
pub use error::DrainError;
pub use node::{cordoned_at, is_cordoned};
pub use selector::{Filter, PodPredicate};
pub use tactics::NodeTactic;

use crate::kubeclient::KubeClient;
use k8s_openapi::api::core::v1::Pod;
use snafu::ResultExt;

/// The outcome of a deletion pass, whether from the Pod Deleter directly or from a tactic's
/// `Execute`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeleteResult {
    pub message: String,
    pub has_executed: bool,
}

/// Clears finalizers (if any) and deletes pods that are not already terminating.
///
/// A finalizer-clear failure for a given pod is fatal for the whole batch: it means we could not
/// even begin tearing the pod down safely, so continuing to delete siblings would leave an
/// inconsistent partial state. Plain delete failures, by contrast, are accumulated so one stuck
/// pod doesn't block eviction of the rest.
pub async fn delete_pods(kube: &dyn KubeClient, pods: &[Pod]) -> Result<DeleteResult, error::DrainError> {
    let mut delete_errors = Vec::new();
    let mut has_executed = false;

    for pod in pods {
        let name = pod.metadata.name.clone().unwrap_or_default();

        let has_finalizers = pod
            .metadata
            .finalizers
            .as_ref()
            .map(|f| !f.is_empty())
            .unwrap_or(false);

        if has_finalizers {
            kube.clear_pod_finalizers(&name)
                .await
                .context(error::ClearFinalizersSnafu { pod: name.clone() })?;
        }

        let already_terminating = pod.metadata.deletion_timestamp.is_some();
        if already_terminating {
            continue;
        }

        match kube.delete_pod(&name, None).await {
            Ok(true) => has_executed = true,
            Ok(false) => {}
            Err(source) => delete_errors.push((name, source)),
        }
    }

    if !delete_errors.is_empty() {
        return error::DeletePodsSnafu {
            failures: delete_errors
                .into_iter()
                .map(|(pod, source)| format!("{pod}: {source}"))
                .collect::<Vec<_>>(),
        }
        .fail();
    }

    Ok(DeleteResult {
        message: format!("deleted {} pod(s)", pods.len()),
        has_executed,
    })
}
