use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DrainError {
    #[snafu(display("Unable to clear finalizers on pod '{}': '{}'", pod, source))]
    ClearFinalizers { source: kube::Error, pod: String },

    #[snafu(display("Unable to delete pod(s): {}", failures.join("; ")))]
    DeletePods { failures: Vec<String> },

    #[snafu(display("Unable to list pods on node '{}': '{}'", node, source))]
    FindTargetPods { source: kube::Error, node: String },

    #[snafu(display("Unable to list PodDisruptionBudgets for node '{}': '{}'", node, source))]
    FindPdbs { source: kube::Error, node: String },

    #[snafu(display("One or more drain tactics failed: {}", failures.join("; ")))]
    ExecuteTactics { failures: Vec<String> },

    #[snafu(display("Node '{}' is not cordoned; drain engine has no start time", node))]
    NodeNotCordoned { node: String },
}
