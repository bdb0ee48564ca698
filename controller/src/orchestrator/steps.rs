//! The ten ordered steps of the upgrade machine, table in the module docs of [`super`].
//!
//! Each step returns `Ok(true)` once its precondition already holds (so a repeated reconcile is a
//! no-op), `Ok(false)` when it made progress but the pass should stop here and retry soon, or an
//! error when a collaborator failed.

use super::error::{self, OrchestratorError};
use crate::context::ReconcileContext;
use chrono::Duration as ChronoDuration;
use models::constants::LABEL_MASTER_ROLE;
use models::external::machineconfigpool::{MachineConfigPool, MachineConfigPoolStatus, POOL_MASTER, POOL_WORKER};
use models::external::{ClusterVersion, DesiredUpdate};
use models::health::unexpected_critical_alerts;
use models::metrics::MetricKey;
use models::scaler::CapacityScaler;
use models::silence::{critical_alert_matcher, default_matchers, ensure_silence};
use models::upgradeconfig::UpgradeConfig;
use snafu::IntoError;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::info;

pub type StepFn = for<'a> fn(
    &'a ReconcileContext,
    &'a mut UpgradeConfig,
    &'a MetricKey,
) -> Pin<Box<dyn Future<Output = Result<bool, OrchestratorError>> + Send + 'a>>;

fn control_plane_comment(version: &str) -> String {
    format!("control-plane-upgrade-{version}")
}

fn worker_comment(version: &str) -> String {
    format!("worker-upgrade-{version}")
}

pub fn pre_health_check<'a>(
    ctx: &'a ReconcileContext,
    uc: &'a mut UpgradeConfig,
    key: &'a MetricKey,
) -> Pin<Box<dyn Future<Output = Result<bool, OrchestratorError>> + Send + 'a>> {
    Box::pin(async move {
        let ignored = &ctx.config.health_check.ignored_criticals;
        let checker = health_checker(ctx);
        let unexpected = unexpected_critical_alerts(checker.as_ref(), ignored)
            .await
            .map_err(|source| {
                error::SilenceSnafu {
                    step: "PreHealthCheck",
                }
                .into_error(source)
            })?;

        if !unexpected.is_empty() {
            ctx.metrics.cluster_check_failed(key);
            return Ok(false);
        }
        ctx.metrics.cluster_check_succeeded(key);
        let _ = uc;
        Ok(true)
    })
}

pub fn ensure_extra_capacity<'a>(
    ctx: &'a ReconcileContext,
    uc: &'a mut UpgradeConfig,
    key: &'a MetricKey,
) -> Pin<Box<dyn Future<Output = Result<bool, OrchestratorError>> + Send + 'a>> {
    Box::pin(async move {
        let _ = uc;
        let scaler = CapacityScaler::new(
            ctx.kube.clone(),
            chrono_from_std(ctx.config.scale.timeout_duration()),
            ctx.clock.clone(),
        );

        match scaler.scale_up().await {
            Ok(ready) => {
                if ready {
                    ctx.metrics.scaling_succeeded(key);
                }
                Ok(ready)
            }
            Err(source) => {
                ctx.metrics.scaling_failed(key);
                Err(error::ScaleSnafu {
                    step: "EnsureExtraCapacity",
                }
                .into_error(source))
            }
        }
    })
}

pub fn control_plane_maintenance<'a>(
    ctx: &'a ReconcileContext,
    uc: &'a mut UpgradeConfig,
    _key: &'a MetricKey,
) -> Pin<Box<dyn Future<Output = Result<bool, OrchestratorError>> + Send + 'a>> {
    Box::pin(async move {
        let version = uc.spec.desired.version.clone();
        let now = ctx.clock.now();
        let ends_at = now + chrono::Duration::from_std(ctx.config.maintenance.control_plane_duration())
            .unwrap_or(ChronoDuration::zero());

        let mut matchers = default_matchers();
        matchers.push(critical_alert_matcher(
            &ctx.config.maintenance.ignored_alerts.control_plane_criticals,
        ));

        ensure_silence(
            ctx.silencer.as_ref(),
            &ctx.operator_name,
            &control_plane_comment(&version),
            matchers,
            ends_at,
            now,
        )
        .await
        .map_err(|source| {
            error::SilenceSnafu {
                step: "ControlPlaneMaintenance",
            }
            .into_error(source)
        })?;

        Ok(true)
    })
}

pub fn commence_upgrade<'a>(
    ctx: &'a ReconcileContext,
    uc: &'a mut UpgradeConfig,
    key: &'a MetricKey,
) -> Pin<Box<dyn Future<Output = Result<bool, OrchestratorError>> + Send + 'a>> {
    Box::pin(async move {
        let api: kube::Api<ClusterVersion> = kube::Api::all(ctx.client.clone());
        let name = "version";
        let mut cv = api.get(name).await.map_err(|source| {
            error::KubeSnafu {
                step: "CommenceUpgrade",
            }
            .into_error(source)
        })?;

        let desired = &uc.spec.desired;
        if cv.spec.channel == desired.channel
            && cv.spec.desired_update.as_ref().map(|d| d.version.as_str()) == Some(desired.version.as_str())
        {
            return Ok(true);
        }

        if !cv.status.offers_version(&desired.version) {
            ctx.metrics.validation_failed(key);
            return Err(error::ValidationSnafu {
                step: "CommenceUpgrade",
                version: desired.version.clone(),
            }
            .build());
        }

        cv.spec.channel = desired.channel.clone();
        cv.spec.desired_update = Some(DesiredUpdate {
            version: desired.version.clone(),
            force: Some(false),
        });

        api.replace(name, &kube::api::PostParams::default(), &cv)
            .await
            .map_err(|source| {
                error::KubeSnafu {
                    step: "CommenceUpgrade",
                }
                .into_error(source)
            })?;
        ctx.metrics.validation_succeeded(key);
        Ok(false)
    })
}

pub fn control_plane_upgraded<'a>(
    ctx: &'a ReconcileContext,
    uc: &'a mut UpgradeConfig,
    key: &'a MetricKey,
) -> Pin<Box<dyn Future<Output = Result<bool, OrchestratorError>> + Send + 'a>> {
    Box::pin(async move {
        let mcp_api: kube::Api<MachineConfigPool> = kube::Api::all(ctx.client.clone());
        let master = mcp_api.get(POOL_MASTER).await.map_err(|source| {
            error::KubeSnafu {
                step: "ControlPlaneUpgraded",
            }
            .into_error(source)
        })?;

        let cv_api: kube::Api<ClusterVersion> = kube::Api::all(ctx.client.clone());
        let cv = cv_api.get("version").await.map_err(|source| {
            error::KubeSnafu {
                step: "ControlPlaneUpgraded",
            }
            .into_error(source)
        })?;

        let converged = master_converged(&master.status);
        let settled = cv.status.condition_false("Progressing");
        let version_matches = cv.status.current_version() == Some(uc.spec.desired.version.as_str());

        if converged && settled && version_matches {
            ctx.metrics
                .control_plane_end_time(key, ctx.clock.now().timestamp());
            return Ok(true);
        }

        let elapsed = uc
            .status
            .as_ref()
            .and_then(|s| s.current())
            .and_then(|e| e.start_time)
            .map(|start| ctx.clock.now() - start)
            .unwrap_or_else(ChronoDuration::zero);

        if elapsed >= chrono_from_std(ctx.config.maintenance.control_plane_duration()) {
            ctx.metrics.upgrade_control_plane_timeout(key);
        }

        Ok(false)
    })
}

fn master_converged(status: &Option<MachineConfigPoolStatus>) -> bool {
    status.as_ref().map(|s| s.converged()).unwrap_or(false)
}

pub fn worker_maintenance<'a>(
    ctx: &'a ReconcileContext,
    uc: &'a mut UpgradeConfig,
    _key: &'a MetricKey,
) -> Pin<Box<dyn Future<Output = Result<bool, OrchestratorError>> + Send + 'a>> {
    Box::pin(async move {
        let version = uc.spec.desired.version.clone();
        let now = ctx.clock.now();

        let node_api: kube::Api<k8s_openapi::api::core::v1::Node> = kube::Api::all(ctx.client.clone());
        let nodes = node_api
            .list(&kube::api::ListParams::default())
            .await
            .map_err(|source| {
                error::KubeSnafu {
                    step: "WorkerMaintenance",
                }
                .into_error(source)
            })?;
        let non_master_count = non_master_node_count(&nodes.items) as i64;

        let duration = chrono::Duration::minutes(
            ctx.config.maintenance.worker_node_time * non_master_count.max(1),
        );
        let ends_at = now + duration;

        ensure_silence(
            ctx.silencer.as_ref(),
            &ctx.operator_name,
            &worker_comment(&version),
            default_matchers(),
            ends_at,
            now,
        )
        .await
        .map_err(|source| {
            error::SilenceSnafu {
                step: "WorkerMaintenance",
            }
            .into_error(source)
        })?;

        Ok(true)
    })
}

fn is_non_master_node(node: &k8s_openapi::api::core::v1::Node) -> bool {
    node.metadata
        .labels
        .as_ref()
        .map(|l| !l.contains_key(LABEL_MASTER_ROLE))
        .unwrap_or(true)
}

fn non_master_node_count(nodes: &[k8s_openapi::api::core::v1::Node]) -> usize {
    nodes.iter().filter(|n| is_non_master_node(n)).count()
}

pub fn nodes_upgraded<'a>(
    ctx: &'a ReconcileContext,
    uc: &'a mut UpgradeConfig,
    key: &'a MetricKey,
) -> Pin<Box<dyn Future<Output = Result<bool, OrchestratorError>> + Send + 'a>> {
    Box::pin(async move {
        let mcp_api: kube::Api<MachineConfigPool> = kube::Api::all(ctx.client.clone());
        let worker = mcp_api.get(POOL_WORKER).await.map_err(|source| {
            error::KubeSnafu {
                step: "NodesUpgraded",
            }
            .into_error(source)
        })?;

        if master_converged(&worker.status) {
            ctx.metrics
                .node_upgrade_end_time(key, ctx.clock.now().timestamp());
            return Ok(true);
        }

        let node_api: kube::Api<k8s_openapi::api::core::v1::Node> = kube::Api::all(ctx.client.clone());
        let nodes = node_api
            .list(&kube::api::ListParams::default())
            .await
            .map_err(|source| {
                error::KubeSnafu {
                    step: "NodesUpgraded",
                }
                .into_error(source)
            })?;

        let cordoned_workers: Vec<_> = nodes
            .items
            .iter()
            .filter(|n| is_non_master_node(n) && models::drain::is_cordoned(n))
            .collect();

        for node in cordoned_workers {
            drain_one_node(ctx, uc, key, node).await?;
        }

        let elapsed = uc
            .status
            .as_ref()
            .and_then(|s| s.current())
            .and_then(|e| e.start_time)
            .map(|start| ctx.clock.now() - start)
            .unwrap_or_else(ChronoDuration::zero);
        let worker_budget =
            ChronoDuration::minutes(ctx.config.maintenance.worker_node_time * non_master_node_count(&nodes.items).max(1) as i64);
        if elapsed >= worker_budget {
            ctx.metrics.upgrade_worker_timeout(key);
        }

        info!("worker pool not yet converged");
        Ok(false)
    })
}

/// Drains a single cordoned node: runs the Default and PDB tactics in due order, then escalates
/// to an unconditional force-delete pass once the engine reports the node has failed. The
/// force-delete pass is never attempted before the engine has failed at least once -- it has no
/// timing rule of its own, it is strictly the engine's fallback.
async fn drain_one_node<'a>(
    ctx: &'a ReconcileContext,
    uc: &'a UpgradeConfig,
    key: &'a MetricKey,
    node: &k8s_openapi::api::core::v1::Node,
) -> Result<(), OrchestratorError> {
    let name = node.metadata.name.clone().unwrap_or_default();
    let cordoned_at = match models::drain::cordoned_at(node) {
        Ok(t) => t,
        Err(_) => return Ok(()),
    };

    let tactics = vec![
        models::drain::TimedDrainStrategy::new(
            "Default",
            "deletes non-DaemonSet, non-PDB pods on the node",
            chrono::Duration::minutes(ctx.config.node_drain.timeout),
            Arc::new(models::drain::NodeTactic::default_tactic(
                ctx.kube.clone(),
                name.clone(),
            )),
        ),
        models::drain::TimedDrainStrategy::new(
            "PDB",
            "force-drains PDB-governed pods once their own grace period elapses",
            chrono::Duration::minutes(uc.spec.pdb_force_drain_timeout_minutes as i64),
            Arc::new(models::drain::NodeTactic::pdb_tactic(
                ctx.kube.clone(),
                name.clone(),
            )),
        ),
    ];

    let engine = models::drain::DrainEngine::new(
        tactics,
        chrono_from_std(ctx.config.node_drain.timeout_duration()),
        chrono_from_std(ctx.config.node_drain.expected_drain_duration()),
        ctx.clock.clone(),
    );

    engine.execute(cordoned_at).await.map_err(|source| {
        error::DrainSnafu {
            step: "NodesUpgraded",
            node: name.clone(),
        }
        .into_error(source)
    })?;

    let failed = engine.has_failed(cordoned_at).await.map_err(|source| {
        error::DrainSnafu {
            step: "NodesUpgraded",
            node: name.clone(),
        }
        .into_error(source)
    })?;

    if failed {
        use models::drain::DrainStrategy as _;
        let force = models::drain::NodeTactic::force_delete(ctx.kube.clone(), name.clone());
        force.execute().await.map_err(|source| {
            error::DrainSnafu {
                step: "NodesUpgraded",
                node: name,
            }
            .into_error(source)
        })?;
        ctx.metrics.node_drain_failed(key);
    }

    Ok(())
}

pub fn end_maintenance<'a>(
    ctx: &'a ReconcileContext,
    uc: &'a mut UpgradeConfig,
    _key: &'a MetricKey,
) -> Pin<Box<dyn Future<Output = Result<bool, OrchestratorError>> + Send + 'a>> {
    Box::pin(async move {
        let _ = uc;
        models::silence::end_all(ctx.silencer.as_ref(), &ctx.operator_name)
            .await
            .map_err(|source| {
                error::SilenceSnafu {
                    step: "EndMaintenance",
                }
                .into_error(source)
            })?;
        Ok(true)
    })
}

pub fn scale_down_extra<'a>(
    ctx: &'a ReconcileContext,
    uc: &'a mut UpgradeConfig,
    key: &'a MetricKey,
) -> Pin<Box<dyn Future<Output = Result<bool, OrchestratorError>> + Send + 'a>> {
    Box::pin(async move {
        let _ = uc;
        let scaler = CapacityScaler::new(
            ctx.kube.clone(),
            chrono_from_std(ctx.config.scale.timeout_duration()),
            ctx.clock.clone(),
        );

        match scaler.scale_down().await {
            Ok(ready) => {
                if ready {
                    ctx.metrics.scaling_succeeded(key);
                }
                Ok(ready)
            }
            Err(source) => {
                ctx.metrics.scaling_failed(key);
                Err(error::ScaleSnafu {
                    step: "ScaleDownExtra",
                }
                .into_error(source))
            }
        }
    })
}

pub fn post_health_check<'a>(
    ctx: &'a ReconcileContext,
    uc: &'a mut UpgradeConfig,
    key: &'a MetricKey,
) -> Pin<Box<dyn Future<Output = Result<bool, OrchestratorError>> + Send + 'a>> {
    Box::pin(async move {
        let ignored = &ctx.config.health_check.ignored_criticals;
        let checker = health_checker(ctx);
        let unexpected = unexpected_critical_alerts(checker.as_ref(), ignored)
            .await
            .map_err(|source| {
                error::SilenceSnafu {
                    step: "PostHealthCheck",
                }
                .into_error(source)
            })?;

        let cv_api: kube::Api<ClusterVersion> = kube::Api::all(ctx.client.clone());
        let cv = cv_api.get("version").await.map_err(|source| {
            error::KubeSnafu {
                step: "PostHealthCheck",
            }
            .into_error(source)
        })?;

        let operators_healthy = cv.status.condition_true("Available")
            && cv.status.condition_false("Progressing")
            && cv.status.condition_false("Degraded");

        if !unexpected.is_empty() || !operators_healthy {
            ctx.metrics.cluster_verification_failed(key);
            return Ok(false);
        }

        ctx.metrics.cluster_verification_succeeded(key);
        ctx.metrics.reset(key);

        if let Some(status) = uc.status.as_mut() {
            if let Some(entry) = status.current_mut() {
                entry.phase = models::upgradeconfig::Phase::Upgraded;
                entry.complete_time = Some(ctx.clock.now());
            }
        }

        Ok(true)
    })
}

/// `ctx.silencer` and the health checker share the same Alertmanager route, so production
/// wiring (see `main.rs`) constructs both from the same `AlertManagerSilencer`.
fn health_checker(ctx: &ReconcileContext) -> Arc<dyn models::health::HealthChecker> {
    ctx.health_checker.clone()
}

fn chrono_from_std(duration: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero())
}
