//! A Prometheus-backed `MetricsSink`, registered against an OpenTelemetry exporter the same way
//! the upstream controller wires its gauges: one registry, one set of named instruments, labels
//! carrying the per-UpgradeConfig, per-version identity.

use models::metrics::{MetricKey, MetricsSink};
use prometheus::{IntCounterVec, IntGaugeVec, Opts, Registry};

pub struct PrometheusMetricsSink {
    upgrade_start_time: IntGaugeVec,
    control_plane_end_time: IntGaugeVec,
    node_upgrade_end_time: IntGaugeVec,

    upgrade_control_plane_timeout: IntGaugeVec,
    upgrade_worker_timeout: IntGaugeVec,
    node_drain_failed: IntCounterVec,

    cluster_check_failed: IntCounterVec,
    cluster_check_succeeded: IntCounterVec,
    cluster_verification_failed: IntCounterVec,
    cluster_verification_succeeded: IntCounterVec,
    validation_failed: IntCounterVec,
    validation_succeeded: IntCounterVec,
    scaling_failed: IntCounterVec,
    scaling_succeeded: IntCounterVec,

    upgrade_window_breached: IntGaugeVec,
}

const LABELS: &[&str] = &["upgrade_config_name", "version"];

impl PrometheusMetricsSink {
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let gauge = |name: &str, help: &str| -> Result<IntGaugeVec, prometheus::Error> {
            let v = IntGaugeVec::new(Opts::new(name, help), LABELS)?;
            registry.register(Box::new(v.clone()))?;
            Ok(v)
        };
        let counter = |name: &str, help: &str| -> Result<IntCounterVec, prometheus::Error> {
            let v = IntCounterVec::new(Opts::new(name, help), LABELS)?;
            registry.register(Box::new(v.clone()))?;
            Ok(v)
        };

        Ok(Self {
            upgrade_start_time: gauge("upgrade_start_time", "unix time the upgrade window opened")?,
            control_plane_end_time: gauge(
                "control_plane_end_time",
                "unix time the control plane finished upgrading",
            )?,
            node_upgrade_end_time: gauge(
                "node_upgrade_end_time",
                "unix time the worker pool finished upgrading",
            )?,
            upgrade_control_plane_timeout: gauge(
                "upgrade_control_plane_timeout",
                "set to 1 while the control plane has exceeded its upgrade budget",
            )?,
            upgrade_worker_timeout: gauge(
                "upgrade_worker_timeout",
                "set to 1 while the worker pool has exceeded its upgrade budget",
            )?,
            node_drain_failed: counter(
                "node_drain_failed_total",
                "node drains that fell back to force-delete",
            )?,
            cluster_check_failed: counter("cluster_check_failed_total", "PreHealthCheck failures")?,
            cluster_check_succeeded: counter(
                "cluster_check_succeeded_total",
                "PreHealthCheck successes",
            )?,
            cluster_verification_failed: counter(
                "cluster_verification_failed_total",
                "PostHealthCheck failures",
            )?,
            cluster_verification_succeeded: counter(
                "cluster_verification_succeeded_total",
                "PostHealthCheck successes",
            )?,
            validation_failed: counter("validation_failed_total", "CommenceUpgrade validation failures")?,
            validation_succeeded: counter(
                "validation_succeeded_total",
                "CommenceUpgrade validation successes",
            )?,
            scaling_failed: counter("scaling_failed_total", "capacity scaler failures")?,
            scaling_succeeded: counter("scaling_succeeded_total", "capacity scaler successes")?,
            upgrade_window_breached: gauge(
                "upgrade_window_breached",
                "set to 1 while the upgrade window has closed without starting",
            )?,
        })
    }

    fn labels<'a>(&self, key: &'a MetricKey) -> [&'a str; 2] {
        [key.upgrade_config_name.as_str(), key.version.as_str()]
    }
}

impl MetricsSink for PrometheusMetricsSink {
    fn upgrade_start_time(&self, key: &MetricKey, unix_seconds: i64) {
        self.upgrade_start_time
            .with_label_values(&self.labels(key))
            .set(unix_seconds);
    }

    fn control_plane_end_time(&self, key: &MetricKey, unix_seconds: i64) {
        self.control_plane_end_time
            .with_label_values(&self.labels(key))
            .set(unix_seconds);
    }

    fn node_upgrade_end_time(&self, key: &MetricKey, unix_seconds: i64) {
        self.node_upgrade_end_time
            .with_label_values(&self.labels(key))
            .set(unix_seconds);
    }

    fn upgrade_control_plane_timeout(&self, key: &MetricKey) {
        self.upgrade_control_plane_timeout
            .with_label_values(&self.labels(key))
            .set(1);
    }

    fn upgrade_worker_timeout(&self, key: &MetricKey) {
        self.upgrade_worker_timeout
            .with_label_values(&self.labels(key))
            .set(1);
    }

    fn node_drain_failed(&self, key: &MetricKey) {
        self.node_drain_failed.with_label_values(&self.labels(key)).inc();
    }

    fn cluster_check_failed(&self, key: &MetricKey) {
        self.cluster_check_failed.with_label_values(&self.labels(key)).inc();
    }

    fn cluster_check_succeeded(&self, key: &MetricKey) {
        self.cluster_check_succeeded
            .with_label_values(&self.labels(key))
            .inc();
    }

    fn cluster_verification_failed(&self, key: &MetricKey) {
        self.cluster_verification_failed
            .with_label_values(&self.labels(key))
            .inc();
    }

    fn cluster_verification_succeeded(&self, key: &MetricKey) {
        self.cluster_verification_succeeded
            .with_label_values(&self.labels(key))
            .inc();
    }

    fn validation_failed(&self, key: &MetricKey) {
        self.validation_failed.with_label_values(&self.labels(key)).inc();
    }

    fn validation_succeeded(&self, key: &MetricKey) {
        self.validation_succeeded.with_label_values(&self.labels(key)).inc();
    }

    fn scaling_failed(&self, key: &MetricKey) {
        self.scaling_failed.with_label_values(&self.labels(key)).inc();
    }

    fn scaling_succeeded(&self, key: &MetricKey) {
        self.scaling_succeeded.with_label_values(&self.labels(key)).inc();
    }

    fn upgrade_window_breached(&self, key: &MetricKey) {
        self.upgrade_window_breached
            .with_label_values(&self.labels(key))
            .set(1);
    }

    fn upgrade_window_not_breached(&self, key: &MetricKey) {
        self.upgrade_window_breached
            .with_label_values(&self.labels(key))
            .set(0);
    }

    /// Resets the latched timeout gauges for `key` so a since-resolved timeout doesn't linger
    /// once the history entry that caused it reaches a terminal phase.
    fn reset(&self, key: &MetricKey) {
        let labels = self.labels(key);
        self.upgrade_control_plane_timeout.with_label_values(&labels).set(0);
        self.upgrade_worker_timeout.with_label_values(&labels).set(0);
        self.upgrade_window_breached.with_label_values(&labels).set(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_resets_timeout_gauges() {
        let registry = Registry::new();
        let sink = PrometheusMetricsSink::new(&registry).unwrap();
        let key = MetricKey {
            upgrade_config_name: "test-cluster".into(),
            version: "4.14.1".into(),
        };

        sink.upgrade_control_plane_timeout(&key);
        let families = registry.gather();
        let timeout_family = families
            .iter()
            .find(|f| f.get_name() == "upgrade_control_plane_timeout")
            .unwrap();
        assert_eq!(timeout_family.get_metric()[0].get_gauge().get_value(), 1.0);

        sink.reset(&key);
        let families = registry.gather();
        let timeout_family = families
            .iter()
            .find(|f| f.get_name() == "upgrade_control_plane_timeout")
            .unwrap();
        assert_eq!(timeout_family.get_metric()[0].get_gauge().get_value(), 0.0);
    }
}
