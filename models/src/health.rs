//! The health-check collaborator: reads currently-firing alerts from the same Alertmanager API
//! the silence client talks to, so pre/post-upgrade checks can assert "no unexpected critical
//! alerts are firing" without the orchestrator knowing about HTTP at all.

use async_trait::async_trait;
use serde::Deserialize;

#[cfg(feature = "mockall")]
use mockall::mock;

use crate::silence::{AlertManagerSilencer, SilenceError};

#[derive(Clone, Debug, Deserialize)]
pub struct ActiveAlert {
    pub labels: std::collections::BTreeMap<String, String>,
}

impl ActiveAlert {
    pub fn name(&self) -> Option<&str> {
        self.labels.get("alertname").map(String::as_str)
    }

    pub fn is_critical(&self) -> bool {
        self.labels.get("severity").map(String::as_str) == Some("critical")
    }
}

#[async_trait]
pub trait HealthChecker: Send + Sync {
    async fn active_alerts(&self) -> Result<Vec<ActiveAlert>, SilenceError>;
}

#[cfg(feature = "mockall")]
mock! {
    pub HealthChecker {}

    #[async_trait]
    impl HealthChecker for HealthChecker {
        async fn active_alerts(&self) -> Result<Vec<ActiveAlert>, SilenceError>;
    }
}

#[async_trait]
impl<T: HealthChecker> HealthChecker for std::sync::Arc<T> {
    async fn active_alerts(&self) -> Result<Vec<ActiveAlert>, SilenceError> {
        (**self).active_alerts().await
    }
}

/// Critical alerts outside `ignored` names, the set both PreHealthCheck and PostHealthCheck
/// reject on.
pub async fn unexpected_critical_alerts(
    checker: &dyn HealthChecker,
    ignored: &[String],
) -> Result<Vec<String>, SilenceError> {
    let alerts = checker.active_alerts().await?;
    Ok(alerts
        .iter()
        .filter(|a| a.is_critical())
        .filter_map(|a| a.name())
        .filter(|name| !ignored.iter().any(|i| i == name))
        .map(str::to_string)
        .collect())
}

#[async_trait]
impl HealthChecker for AlertManagerSilencer {
    async fn active_alerts(&self) -> Result<Vec<ActiveAlert>, SilenceError> {
        self.get_active_alerts().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(name: &str, severity: &str) -> ActiveAlert {
        ActiveAlert {
            labels: std::collections::BTreeMap::from([
                ("alertname".to_string(), name.to_string()),
                ("severity".to_string(), severity.to_string()),
            ]),
        }
    }

    #[tokio::test]
    async fn filters_to_unignored_criticals() {
        struct FakeChecker(Vec<ActiveAlert>);

        #[async_trait]
        impl HealthChecker for FakeChecker {
            async fn active_alerts(&self) -> Result<Vec<ActiveAlert>, SilenceError> {
                Ok(self.0.clone())
            }
        }

        let checker = FakeChecker(vec![
            alert("ClusterOperatorDown", "critical"),
            alert("KnownFlaky", "critical"),
            alert("SomeWarning", "warning"),
        ]);

        let unexpected = unexpected_critical_alerts(&checker, &["KnownFlaky".to_string()])
            .await
            .unwrap();
        assert_eq!(unexpected, vec!["ClusterOperatorDown".to_string()]);
    }
}
