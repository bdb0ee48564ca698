//! The value carried through every reconcile, in place of process-wide singletons for the
//! Kubernetes client, operator identity, and logger.

use models::clock::Clock;
use models::config::OperatorConfig;
use models::health::HealthChecker;
use models::kubeclient::KubeClient;
use models::metrics::MetricsSink;
use models::silence::Silencer;
use std::sync::Arc;

#[derive(Clone)]
pub struct ReconcileContext {
    pub client: kube::Client,
    pub kube: Arc<dyn KubeClient>,
    pub config: Arc<OperatorConfig>,
    pub silencer: Arc<dyn Silencer>,
    pub health_checker: Arc<dyn HealthChecker>,
    pub metrics: Arc<dyn MetricsSink>,
    pub clock: Arc<dyn Clock>,
    pub operator_name: String,
}

impl ReconcileContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: kube::Client,
        kube: Arc<dyn KubeClient>,
        config: Arc<OperatorConfig>,
        silencer: Arc<dyn Silencer>,
        health_checker: Arc<dyn HealthChecker>,
        metrics: Arc<dyn MetricsSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            client,
            kube,
            config,
            silencer,
            health_checker,
            metrics,
            clock,
            operator_name: models::constants::OPERATOR_NAME.to_string(),
        }
    }
}
