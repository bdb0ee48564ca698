//! The phase orchestrator: drives a single `UpgradeConfig` through its ordered upgrade steps.

pub mod error;
pub mod steps;

pub use error::{ErrorKind, OrchestratorError};

use crate::context::ReconcileContext;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use models::metrics::MetricKey;
use models::upgradeconfig::{Phase, UpgradeConfig, UpgradeConfigStatus, UpgradeHistory};
use std::time::Duration;
use tracing::{info, instrument, warn};

/// What the driver should do after a reconcile pass.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Requeue {
    /// Nothing left to do for this UpgradeConfig; wait for the next external change event.
    None,
    /// Come back after the given delay.
    After(Duration),
}

const WINDOW_DURATION: ChronoDuration = ChronoDuration::minutes(60);
const WINDOW_POLL_INTERVAL: Duration = Duration::from_secs(60);
const STEP_RETRY_INTERVAL: Duration = Duration::from_secs(15);
const BACKOFF_RETRY_INTERVAL: Duration = Duration::from_secs(30);

/// The window gate's verdict, decoupled from `UpgradeConfig`/metrics so it can be unit tested as
/// a pure function of time.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum WindowDecision {
    /// Too early; stay `Pending` and poll again soon.
    NotYetOpen,
    /// The window closed before the upgrade started; stay `Pending`, flag the breach.
    Breached,
    /// Enter `Upgrading` now.
    Open,
}

fn evaluate_window(now: DateTime<Utc>, upgrade_at: DateTime<Utc>) -> WindowDecision {
    if now < upgrade_at {
        WindowDecision::NotYetOpen
    } else if now > upgrade_at + WINDOW_DURATION {
        WindowDecision::Breached
    } else {
        WindowDecision::Open
    }
}

pub struct PhaseOrchestrator {
    ctx: ReconcileContext,
}

impl PhaseOrchestrator {
    pub fn new(ctx: ReconcileContext) -> Self {
        Self { ctx }
    }

    /// Runs one reconcile pass for `uc`, mutating its status in place. Returns the delay the
    /// driver should wait before the next pass.
    #[instrument(skip(self, uc), fields(name = %uc.metadata.name.clone().unwrap_or_default()), err)]
    pub async fn reconcile(&self, uc: &mut UpgradeConfig) -> Result<Requeue, OrchestratorError> {
        let desired_version = uc.spec.desired.version.clone();
        let status = uc.status.get_or_insert_with(UpgradeConfigStatus::default);

        if let Some(entry) = status.current() {
            if entry.version == desired_version && entry.phase.is_terminal() {
                return Ok(Requeue::None);
            }
        }

        if !status.has_entry_for(&desired_version) {
            status
                .history
                .insert(0, UpgradeHistory::new(desired_version.clone()));
        }

        let key = MetricKey {
            upgrade_config_name: uc.metadata.name.clone().unwrap_or_default(),
            version: desired_version,
        };

        match self.pass_window_gate(uc, &key) {
            Requeue::None => {}
            requeue => return Ok(requeue),
        }

        self.run_steps(uc, &key).await
    }

    /// The window gate: holds a history entry at `Pending` until `upgradeAt` arrives, and flags
    /// (without starting) if the window has already closed.
    fn pass_window_gate(&self, uc: &mut UpgradeConfig, key: &MetricKey) -> Requeue {
        let upgrade_at = uc.spec.upgrade_at;
        let now = self.ctx.clock.now();

        let status = uc.status.get_or_insert_with(UpgradeConfigStatus::default);
        let entry = status
            .current_mut()
            .expect("history entry was just ensured to exist");

        if entry.phase >= Phase::Upgrading {
            return Requeue::None;
        }

        match evaluate_window(now, upgrade_at) {
            WindowDecision::NotYetOpen => {
                entry.phase = Phase::Pending;
                self.ctx.metrics.upgrade_window_not_breached(key);
                Requeue::After(WINDOW_POLL_INTERVAL)
            }
            WindowDecision::Breached => {
                entry.phase = Phase::Pending;
                self.ctx.metrics.upgrade_window_breached(key);
                Requeue::After(WINDOW_POLL_INTERVAL)
            }
            WindowDecision::Open => {
                entry.phase = Phase::Upgrading;
                entry.start_time = Some(now);
                self.ctx.metrics.upgrade_window_not_breached(key);
                self.ctx.metrics.upgrade_start_time(key, now.timestamp());
                info!("upgrade window open, entering Upgrading phase");
                Requeue::None
            }
        }
    }

    /// Runs the ordered steps, stopping at the first that isn't yet satisfied.
    async fn run_steps(
        &self,
        uc: &mut UpgradeConfig,
        key: &MetricKey,
    ) -> Result<Requeue, OrchestratorError> {
        let step_fns: Vec<(&'static str, steps::StepFn)> = vec![
            ("PreHealthCheck", steps::pre_health_check),
            ("EnsureExtraCapacity", steps::ensure_extra_capacity),
            ("ControlPlaneMaintenance", steps::control_plane_maintenance),
            ("CommenceUpgrade", steps::commence_upgrade),
            ("ControlPlaneUpgraded", steps::control_plane_upgraded),
            ("WorkerMaintenance", steps::worker_maintenance),
            ("NodesUpgraded", steps::nodes_upgraded),
            ("EndMaintenance", steps::end_maintenance),
            ("ScaleDownExtra", steps::scale_down_extra),
            ("PostHealthCheck", steps::post_health_check),
        ];

        for (_name, step) in step_fns {
            match step(&self.ctx, uc, key).await {
                Ok(true) => continue,
                Ok(false) => return Ok(Requeue::After(STEP_RETRY_INTERVAL)),
                Err(err) => {
                    self.record_failure(uc, &err);
                    if matches!(err.kind(), ErrorKind::Validation | ErrorKind::ScaleTimeout) {
                        if let Some(status) = uc.status.as_mut() {
                            if let Some(entry) = status.current_mut() {
                                entry.phase = Phase::Failed;
                                entry.complete_time = Some(self.ctx.clock.now());
                            }
                        }
                        self.ctx.metrics.reset(key);
                        return Ok(Requeue::None);
                    }
                    return Ok(Requeue::After(BACKOFF_RETRY_INTERVAL));
                }
            }
        }

        Ok(Requeue::None)
    }

    fn record_failure(&self, uc: &mut UpgradeConfig, err: &OrchestratorError) {
        warn!(step = err.step_name(), error = %err, "orchestrator step failed");
        if let Some(status) = uc.status.as_mut() {
            if let Some(entry) = status.current_mut() {
                entry.set_condition(models::upgradeconfig::Condition {
                    condition_type: err.step_name().to_string(),
                    status: false,
                    reason: format!("{:?}", err.kind()),
                    message: err.to_string(),
                    last_transition_time: self.ctx.clock.now(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_not_yet_open_before_upgrade_at() {
        let now = Utc::now();
        let upgrade_at = now + ChronoDuration::minutes(10);
        assert_eq!(evaluate_window(now, upgrade_at), WindowDecision::NotYetOpen);
    }

    #[test]
    fn window_breached_long_after_upgrade_at() {
        let now = Utc::now();
        let upgrade_at = now - ChronoDuration::hours(2);
        assert_eq!(evaluate_window(now, upgrade_at), WindowDecision::Breached);
    }

    #[test]
    fn window_open_within_the_hour() {
        let now = Utc::now();
        let upgrade_at = now - ChronoDuration::minutes(30);
        assert_eq!(evaluate_window(now, upgrade_at), WindowDecision::Open);
    }
}
