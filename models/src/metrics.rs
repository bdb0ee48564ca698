//! The metrics capability boundary. The orchestrator depends only on this trait; the concrete
//! OpenTelemetry/Prometheus-backed implementation lives in the controller binary, which is the
//! only place that needs to know how metrics are exported.

/// A version-scoped key identifying which upgrade a gauge reading belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MetricKey {
    pub upgrade_config_name: String,
    pub version: String,
}

pub trait MetricsSink: Send + Sync {
    fn upgrade_start_time(&self, key: &MetricKey, unix_seconds: i64);
    fn control_plane_end_time(&self, key: &MetricKey, unix_seconds: i64);
    fn node_upgrade_end_time(&self, key: &MetricKey, unix_seconds: i64);

    fn upgrade_control_plane_timeout(&self, key: &MetricKey);
    fn upgrade_worker_timeout(&self, key: &MetricKey);
    fn node_drain_failed(&self, key: &MetricKey);

    fn cluster_check_failed(&self, key: &MetricKey);
    fn cluster_check_succeeded(&self, key: &MetricKey);

    fn cluster_verification_failed(&self, key: &MetricKey);
    fn cluster_verification_succeeded(&self, key: &MetricKey);

    fn validation_failed(&self, key: &MetricKey);
    fn validation_succeeded(&self, key: &MetricKey);

    fn scaling_failed(&self, key: &MetricKey);
    fn scaling_succeeded(&self, key: &MetricKey);

    fn upgrade_window_breached(&self, key: &MetricKey);
    fn upgrade_window_not_breached(&self, key: &MetricKey);

    /// Clears the latched timeout/failure gauges for `key`, called once an upgrade reaches a
    /// terminal phase so a stale timeout doesn't outlive the history entry that caused it.
    fn reset(&self, key: &MetricKey);
}

impl<T: MetricsSink> MetricsSink for std::sync::Arc<T> {
    fn upgrade_start_time(&self, key: &MetricKey, unix_seconds: i64) {
        (**self).upgrade_start_time(key, unix_seconds)
    }
    fn control_plane_end_time(&self, key: &MetricKey, unix_seconds: i64) {
        (**self).control_plane_end_time(key, unix_seconds)
    }
    fn node_upgrade_end_time(&self, key: &MetricKey, unix_seconds: i64) {
        (**self).node_upgrade_end_time(key, unix_seconds)
    }
    fn upgrade_control_plane_timeout(&self, key: &MetricKey) {
        (**self).upgrade_control_plane_timeout(key)
    }
    fn upgrade_worker_timeout(&self, key: &MetricKey) {
        (**self).upgrade_worker_timeout(key)
    }
    fn node_drain_failed(&self, key: &MetricKey) {
        (**self).node_drain_failed(key)
    }
    fn cluster_check_failed(&self, key: &MetricKey) {
        (**self).cluster_check_failed(key)
    }
    fn cluster_check_succeeded(&self, key: &MetricKey) {
        (**self).cluster_check_succeeded(key)
    }
    fn cluster_verification_failed(&self, key: &MetricKey) {
        (**self).cluster_verification_failed(key)
    }
    fn cluster_verification_succeeded(&self, key: &MetricKey) {
        (**self).cluster_verification_succeeded(key)
    }
    fn validation_failed(&self, key: &MetricKey) {
        (**self).validation_failed(key)
    }
    fn validation_succeeded(&self, key: &MetricKey) {
        (**self).validation_succeeded(key)
    }
    fn scaling_failed(&self, key: &MetricKey) {
        (**self).scaling_failed(key)
    }
    fn scaling_succeeded(&self, key: &MetricKey) {
        (**self).scaling_succeeded(key)
    }
    fn upgrade_window_breached(&self, key: &MetricKey) {
        (**self).upgrade_window_breached(key)
    }
    fn upgrade_window_not_breached(&self, key: &MetricKey) {
        (**self).upgrade_window_not_breached(key)
    }
    fn reset(&self, key: &MetricKey) {
        (**self).reset(key)
    }
}

#[cfg(feature = "mockall")]
mockall::mock! {
    pub MetricsSink {}

    impl MetricsSink for MetricsSink {
        fn upgrade_start_time(&self, key: &MetricKey, unix_seconds: i64);
        fn control_plane_end_time(&self, key: &MetricKey, unix_seconds: i64);
        fn node_upgrade_end_time(&self, key: &MetricKey, unix_seconds: i64);
        fn upgrade_control_plane_timeout(&self, key: &MetricKey);
        fn upgrade_worker_timeout(&self, key: &MetricKey);
        fn node_drain_failed(&self, key: &MetricKey);
        fn cluster_check_failed(&self, key: &MetricKey);
        fn cluster_check_succeeded(&self, key: &MetricKey);
        fn cluster_verification_failed(&self, key: &MetricKey);
        fn cluster_verification_succeeded(&self, key: &MetricKey);
        fn validation_failed(&self, key: &MetricKey);
        fn validation_succeeded(&self, key: &MetricKey);
        fn scaling_failed(&self, key: &MetricKey);
        fn scaling_succeeded(&self, key: &MetricKey);
        fn upgrade_window_breached(&self, key: &MetricKey);
        fn upgrade_window_not_breached(&self, key: &MetricKey);
        fn reset(&self, key: &MetricKey);
    }
}
