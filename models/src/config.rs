//! Operator-wide configuration, loaded once at startup from a YAML file.
//!
//! Mirrors the shape of the upstream `managed-upgrade-operator`'s `OperatorConfig`: maintenance
//! window durations, scaling timeouts, drain timing, and the health-check alert allowlist.

use serde::Deserialize;
use snafu::ResultExt;
use std::path::Path;
use std::time::Duration;
use validator::Validate;

pub const CONFIG_PATH_ENV_VAR: &str = "OPERATOR_CONFIG_PATH";
const DEFAULT_CONFIG_PATH: &str = "/etc/cluster-upgrade-operator/config.yaml";

/// Top-level operator configuration.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OperatorConfig {
    #[validate]
    pub maintenance: MaintenanceConfig,

    #[validate]
    pub scale: ScaleConfig,

    #[validate]
    pub node_drain: NodeDrainConfig,

    #[serde(default)]
    pub health_check: HealthCheckConfig,
}

impl OperatorConfig {
    pub fn from_env() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        Self::from_file(path)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).context(error::ReadConfigSnafu { path })?;
        Self::from_str(&contents)
    }

    pub fn from_str(contents: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(contents).context(error::ParseConfigSnafu)?;
        config.validate().context(error::ValidateConfigSnafu)?;
        Ok(config)
    }
}

/// Maintenance-window silence durations, expressed in minutes in the source YAML.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceConfig {
    #[validate(range(min = 1, message = "controlPlaneTime must be greater than zero"))]
    pub control_plane_time: i64,

    #[validate(range(min = 1, message = "workerNodeTime must be greater than zero"))]
    pub worker_node_time: i64,

    #[serde(default)]
    pub ignored_alerts: IgnoredAlerts,
}

impl MaintenanceConfig {
    pub fn control_plane_duration(&self) -> Duration {
        Duration::from_secs(self.control_plane_time as u64 * 60)
    }

    pub fn worker_node_duration(&self) -> Duration {
        Duration::from_secs(self.worker_node_time as u64 * 60)
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IgnoredAlerts {
    #[serde(default)]
    pub control_plane_criticals: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ScaleConfig {
    #[validate(range(min = 1, message = "timeOut must be greater than zero"))]
    pub time_out: i64,
}

impl ScaleConfig {
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.time_out as u64 * 60)
    }
}

/// Timing knobs for the node drain engine, all given in minutes in the source YAML.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NodeDrainConfig {
    #[validate(range(min = 1, message = "timeout must be greater than zero"))]
    pub timeout: i64,

    #[validate(range(min = 1, message = "expectedDrainTime must be greater than zero"))]
    pub expected_drain_time: i64,
}

impl NodeDrainConfig {
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout as u64 * 60)
    }

    pub fn expected_drain_duration(&self) -> Duration {
        Duration::from_secs(self.expected_drain_time as u64 * 60)
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckConfig {
    #[serde(default)]
    pub ignored_criticals: Vec<String>,
}

pub mod error {
    use snafu::Snafu;
    use std::path::PathBuf;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub))]
    pub enum ConfigError {
        #[snafu(display("Unable to read operator config at '{}': '{}'", path.display(), source))]
        ReadConfig {
            source: std::io::Error,
            path: PathBuf,
        },

        #[snafu(display("Unable to parse operator config: '{}'", source))]
        ParseConfig { source: serde_yaml::Error },

        #[snafu(display("Operator config failed validation: '{}'", source))]
        ValidateConfig {
            source: validator::ValidationErrors,
        },
    }
}

type Result<T> = std::result::Result<T, ConfigError>;
pub use error::ConfigError;

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_yaml() -> &'static str {
        r#"
maintenance:
  controlPlaneTime: 90
  workerNodeTime: 45
  ignoredAlerts:
    controlPlaneCriticals:
      - ClusterOperatorDown
scale:
  timeOut: 30
nodeDrain:
  timeout: 45
  expectedDrainTime: 8
"#
    }

    #[test]
    fn parses_valid_config() {
        let config = OperatorConfig::from_str(valid_yaml()).unwrap();
        assert_eq!(config.maintenance.control_plane_time, 90);
        assert_eq!(
            config.maintenance.ignored_alerts.control_plane_criticals,
            vec!["ClusterOperatorDown".to_string()]
        );
        assert_eq!(config.node_drain.expected_drain_time, 8);
    }

    #[test]
    fn rejects_non_positive_durations() {
        let yaml = r#"
maintenance:
  controlPlaneTime: 0
  workerNodeTime: 45
scale:
  timeOut: 30
nodeDrain:
  timeout: 45
  expectedDrainTime: 8
"#;
        let err = OperatorConfig::from_str(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::ValidateConfig { .. }));
    }
}
