//! The alert-silence collaborator: a thin client over Alertmanager's `/api/v2/` HTTP API, used to
//! suppress expected alert noise while the cluster is mid-upgrade.

use crate::constants::{
    ALERTMANAGER_BASE_PATH, ALERTMANAGER_NAMESPACE, ALERTMANAGER_ROUTE_NAME,
    ALERTMANAGER_TOKEN_SECRET_PREFIX,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Secret;
use kube::api::ListParams;
use kube::Api;
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt};

#[cfg(feature = "mockall")]
use mockall::mock;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Matcher {
    pub name: String,
    pub value: String,
    #[serde(rename = "isRegex")]
    pub is_regex: bool,
}

impl Matcher {
    pub fn regex(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            is_regex: true,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SilenceRecord {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "createdBy")]
    pub created_by: String,
    #[serde(default)]
    pub state: String,
    pub comment: String,
    #[serde(rename = "startsAt")]
    pub starts_at: DateTime<Utc>,
    #[serde(rename = "endsAt")]
    pub ends_at: DateTime<Utc>,
    pub matchers: Vec<Matcher>,
}

/// Default matchers applied to every silence this operator creates, scoping suppression to the
/// platform's own noisy namespaces at non-critical severities.
pub fn default_matchers() -> Vec<Matcher> {
    vec![
        Matcher::regex("severity", "(warning|info|none)"),
        Matcher::regex("namespace", "(^openshift.*|^kube.*|^redhat.*|^default$)"),
    ]
}

/// A matcher scoping suppression to a specific allowlist of critical alert names, so that
/// otherwise-ignored critical alerts don't page during a planned upgrade.
pub fn critical_alert_matcher(ignored: &[String]) -> Matcher {
    Matcher::regex("alertname", format!("({})", ignored.join("|")))
}

#[async_trait]
pub trait Silencer: Send + Sync {
    async fn list(&self) -> Result<Vec<SilenceRecord>, SilenceError>;
    async fn create(&self, record: SilenceRecord) -> Result<String, SilenceError>;
    async fn delete(&self, id: &str) -> Result<(), SilenceError>;
}

#[cfg(feature = "mockall")]
mock! {
    pub Silencer {}

    #[async_trait]
    impl Silencer for Silencer {
        async fn list(&self) -> Result<Vec<SilenceRecord>, SilenceError>;
        async fn create(&self, record: SilenceRecord) -> Result<String, SilenceError>;
        async fn delete(&self, id: &str) -> Result<(), SilenceError>;
    }
}

#[async_trait]
impl<T: Silencer> Silencer for std::sync::Arc<T> {
    async fn list(&self) -> Result<Vec<SilenceRecord>, SilenceError> {
        (**self).list().await
    }

    async fn create(&self, record: SilenceRecord) -> Result<String, SilenceError> {
        (**self).create(record).await
    }

    async fn delete(&self, id: &str) -> Result<(), SilenceError> {
        (**self).delete(id).await
    }
}

/// An idempotent, comment-guarded create: lists active silences first and skips creation if one
/// with a matching `comment` already exists, to keep List-then-Create races merely wasteful
/// rather than duplicating intent.
pub async fn ensure_silence(
    silencer: &dyn Silencer,
    created_by: &str,
    comment: &str,
    matchers: Vec<Matcher>,
    ends_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), SilenceError> {
    let existing = silencer.list().await?;
    let already_exists = existing
        .iter()
        .any(|s| s.comment == comment && s.state == "active");
    if already_exists {
        return Ok(());
    }

    silencer
        .create(SilenceRecord {
            id: String::new(),
            created_by: created_by.to_string(),
            state: String::new(),
            comment: comment.to_string(),
            starts_at: now,
            ends_at,
            matchers,
        })
        .await?;
    Ok(())
}

/// Deletes every active silence owned by this operator, regardless of how many duplicates a race
/// produced.
pub async fn end_all(silencer: &dyn Silencer, operator_name: &str) -> Result<(), SilenceError> {
    let existing = silencer.list().await?;
    for record in existing
        .into_iter()
        .filter(|s| s.created_by == operator_name && s.state == "active")
    {
        silencer.delete(&record.id).await?;
    }
    Ok(())
}

/// A `Silencer` backed by a real Alertmanager instance reached through its OpenShift `Route` and
/// a bearer token read from a well-known `Secret`.
pub struct AlertManagerSilencer {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl AlertManagerSilencer {
    pub async fn from_cluster(client: kube::Client) -> Result<Self, SilenceError> {
        let host = route_host(&client).await?;
        let token = bearer_token(&client).await?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: format!("https://{host}{ALERTMANAGER_BASE_PATH}"),
            token,
        })
    }
}

#[async_trait]
impl Silencer for AlertManagerSilencer {
    async fn list(&self) -> Result<Vec<SilenceRecord>, SilenceError> {
        let url = format!("{}silences", self.base_url);
        self.http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .context(error::RequestSnafu)?
            .error_for_status()
            .context(error::RequestSnafu)?
            .json()
            .await
            .context(error::RequestSnafu)
    }

    async fn create(&self, record: SilenceRecord) -> Result<String, SilenceError> {
        #[derive(Deserialize)]
        struct CreateResponse {
            #[serde(rename = "silenceID")]
            silence_id: String,
        }

        let url = format!("{}silences", self.base_url);
        let response: CreateResponse = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&record)
            .send()
            .await
            .context(error::RequestSnafu)?
            .error_for_status()
            .context(error::RequestSnafu)?
            .json()
            .await
            .context(error::RequestSnafu)?;
        Ok(response.silence_id)
    }

    async fn delete(&self, id: &str) -> Result<(), SilenceError> {
        let url = format!("{}silence/{id}", self.base_url);
        self.http
            .delete(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .context(error::RequestSnafu)?
            .error_for_status()
            .context(error::RequestSnafu)?;
        Ok(())
    }
}

/// `Route` is an OpenShift extension type with no `k8s-openapi` binding, so it's fetched as a
/// dynamic object rather than a typed one.
impl AlertManagerSilencer {
    pub(crate) async fn get_active_alerts(
        &self,
    ) -> Result<Vec<crate::health::ActiveAlert>, SilenceError> {
        let url = format!("{}alerts", self.base_url);
        self.http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .context(error::RequestSnafu)?
            .error_for_status()
            .context(error::RequestSnafu)?
            .json()
            .await
            .context(error::RequestSnafu)
    }
}

async fn route_host(client: &kube::Client) -> Result<String, SilenceError> {
    use kube::api::{ApiResource, DynamicObject, GroupVersionKind};

    let gvk = GroupVersionKind::gvk("route.openshift.io", "v1", "Route");
    let resource = ApiResource::from_gvk(&gvk);
    let routes: Api<DynamicObject> =
        Api::namespaced_with(client.clone(), ALERTMANAGER_NAMESPACE, &resource);

    let route = routes
        .get(ALERTMANAGER_ROUTE_NAME)
        .await
        .context(error::RouteLookupSnafu)?;

    route
        .data
        .pointer("/spec/host")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .context(error::RouteHostMissingSnafu)
}

async fn bearer_token(client: &kube::Client) -> Result<String, SilenceError> {
    let secrets: Api<Secret> = Api::namespaced(client.clone(), ALERTMANAGER_NAMESPACE);
    let list = secrets
        .list(&ListParams::default())
        .await
        .context(error::TokenLookupSnafu)?;

    let secret = list
        .items
        .into_iter()
        .find(|s| {
            s.metadata
                .name
                .as_deref()
                .map(|n| n.starts_with(ALERTMANAGER_TOKEN_SECRET_PREFIX))
                .unwrap_or(false)
        })
        .context(error::NoTokenSecretSnafu)?;

    let token_bytes = secret
        .data
        .and_then(|mut d| d.remove("token"))
        .context(error::NoTokenSecretSnafu)?;

    String::from_utf8(token_bytes.0).map_err(|_| SilenceError::InvalidToken)
}

pub mod error {
    use snafu::Snafu;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub))]
    pub enum SilenceError {
        #[snafu(display("Unable to look up the alertmanager route: '{}'", source))]
        RouteLookup { source: kube::Error },

        #[snafu(display("Unable to list candidate token secrets: '{}'", source))]
        TokenLookup { source: kube::Error },

        #[snafu(display("No alertmanager bearer-token secret found in namespace"))]
        NoTokenSecret,

        #[snafu(display("Alertmanager route had no spec.host set"))]
        RouteHostMissing,

        #[snafu(display("Alertmanager bearer token was not valid UTF-8"))]
        InvalidToken,

        #[snafu(display("Request to alertmanager failed: '{}'", source))]
        Request { source: reqwest::Error },
    }
}

pub use error::SilenceError;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ensure_silence_skips_existing_active_comment() {
        struct FakeSilencer {
            existing: Vec<SilenceRecord>,
        }

        #[async_trait]
        impl Silencer for FakeSilencer {
            async fn list(&self) -> Result<Vec<SilenceRecord>, SilenceError> {
                Ok(self.existing.clone())
            }
            async fn create(&self, _record: SilenceRecord) -> Result<String, SilenceError> {
                panic!("should not create when an active silence already exists");
            }
            async fn delete(&self, _id: &str) -> Result<(), SilenceError> {
                Ok(())
            }
        }

        let now = Utc::now();
        let fake = FakeSilencer {
            existing: vec![SilenceRecord {
                id: "abc".into(),
                created_by: "cluster-upgrade-operator".into(),
                state: "active".into(),
                comment: "control-plane-upgrade-4.14.1".into(),
                starts_at: now,
                ends_at: now + chrono::Duration::hours(1),
                matchers: default_matchers(),
            }],
        };

        ensure_silence(
            &fake,
            "cluster-upgrade-operator",
            "control-plane-upgrade-4.14.1",
            default_matchers(),
            now + chrono::Duration::hours(2),
            now,
        )
        .await
        .unwrap();
    }

    #[test]
    fn critical_alert_matcher_joins_names() {
        let matcher = critical_alert_matcher(&["Foo".to_string(), "Bar".to_string()]);
        assert_eq!(matcher.value, "(Foo|Bar)");
        assert_eq!(matcher.name, "alertname");
    }
}
