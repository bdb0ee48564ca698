use controller::context::ReconcileContext;
use controller::error::{self, Error, Result};
use controller::metrics::PrometheusMetricsSink;
use controller::orchestrator::{PhaseOrchestrator, Requeue};
use kube::api::{ListParams, PatchParams};
use kube::{Api, Client};
use models::clock::SystemClock;
use models::config::OperatorConfig;
use models::kubeclient::KubeApiClient;
use models::silence::AlertManagerSilencer;
use models::upgradeconfig::UpgradeConfig;
use prometheus::Registry;
use snafu::ResultExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, event, info, Level};

/// On every iteration of the event loop, every known UpgradeConfig is reconciled fresh: the
/// orchestrator recomputes its decisions from the cluster's current state rather than trusting
/// any in-memory cache, so a restart mid-upgrade picks up exactly where it left off.
const POLL_INTERVAL: Duration = Duration::from_secs(10);
const NOTHING_TO_DO_WAIT_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    controller::telemetry::init().context(error::TelemetryConfigurationSnafu)?;

    let config = Arc::new(OperatorConfig::from_env().context(error::LoadConfigSnafu)?);
    let client = Client::try_default().await.context(error::ClientCreateSnafu)?;

    let registry = Registry::new();
    let metrics = Arc::new(PrometheusMetricsSink::new(&registry).context(error::MetricsRegistrationSnafu)?);

    let silencer = Arc::new(
        AlertManagerSilencer::from_cluster(client.clone())
            .await
            .context(error::SilenceClientCreateSnafu)?,
    );

    let kube_client: Arc<dyn models::kubeclient::KubeClient> = Arc::new(KubeApiClient::new(client.clone()));

    let ctx = ReconcileContext::new(
        client.clone(),
        kube_client,
        config,
        silencer.clone(),
        silencer,
        metrics,
        Arc::new(SystemClock),
    );
    let orchestrator = PhaseOrchestrator::new(ctx);

    run(client, orchestrator).await
}

async fn run(client: Client, orchestrator: PhaseOrchestrator) -> Result<()> {
    let api: Api<UpgradeConfig> = Api::all(client);

    loop {
        let upgrade_configs = match api.list(&ListParams::default()).await {
            Ok(list) => list.items,
            Err(source) => {
                error!(error = %source, "unable to list UpgradeConfig objects; retrying");
                tokio::time::sleep(POLL_INTERVAL).await;
                continue;
            }
        };

        if upgrade_configs.is_empty() {
            event!(
                Level::INFO,
                "Nothing to do: no UpgradeConfig objects found in the cluster."
            );
            tokio::time::sleep(NOTHING_TO_DO_WAIT_INTERVAL).await;
            continue;
        }

        let mut shortest_requeue = None;

        for mut uc in upgrade_configs {
            let name = uc.metadata.name.clone().unwrap_or_default();
            let namespace = uc.metadata.namespace.clone().unwrap_or_default();

            match orchestrator.reconcile(&mut uc).await {
                Ok(requeue) => {
                    if let Err(source) = persist_status(&api, &namespace, &name, &uc).await {
                        error!(%name, error = %source, "failed to persist UpgradeConfig status");
                    }
                    if let Requeue::After(delay) = requeue {
                        shortest_requeue = Some(shortest_requeue.map_or(delay, |d: Duration| d.min(delay)));
                    }
                }
                Err(source) => {
                    error!(%name, error = %source, "reconcile failed");
                }
            }
        }

        info!("reconciled all known UpgradeConfig objects");
        tokio::time::sleep(shortest_requeue.unwrap_or(POLL_INTERVAL)).await;
    }
}

async fn persist_status(
    api: &Api<UpgradeConfig>,
    _namespace: &str,
    name: &str,
    uc: &UpgradeConfig,
) -> std::result::Result<UpgradeConfig, kube::Error> {
    let patch = serde_json::json!({ "status": uc.status });
    api.patch_status(
        name,
        &PatchParams::default(),
        &kube::api::Patch::Merge(patch),
    )
    .await
}
