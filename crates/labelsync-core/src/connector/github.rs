//! GitHub REST connector.
//!
//! GitHub stores label colors without a leading `#`, which matches the
//! canonical [`Label`] form.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::connector::http::{encode_segment, ApiClient, PER_PAGE};
use crate::connector::{ConnectorResult, LabelConnector};
use crate::domain::{Label, RepoSlug};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

#[derive(Debug, Deserialize)]
struct WireLabel {
    name: String,
    #[serde(default)]
    color: String,
    #[serde(default)]
    description: Option<String>,
}

impl From<WireLabel> for Label {
    fn from(wire: WireLabel) -> Self {
        Label::new(wire.name, wire.color, wire.description.unwrap_or_default())
    }
}

#[derive(Debug, Serialize)]
struct CreateBody<'a> {
    name: &'a str,
    color: &'a str,
    description: &'a str,
}

#[derive(Debug, Serialize)]
struct UpdateBody<'a> {
    new_name: &'a str,
    color: &'a str,
    description: &'a str,
}

/// Connector for github.com or a GitHub Enterprise API root.
#[derive(Debug, Clone)]
pub struct GitHubConnector {
    api: ApiClient,
    base_url: String,
}

impl GitHubConnector {
    pub fn new(token: &str, timeout: Duration) -> ConnectorResult<Self> {
        Self::with_base_url(DEFAULT_API_URL, token, timeout)
    }

    /// Point the connector at another API root (GitHub Enterprise, test servers).
    pub fn with_base_url(base_url: &str, token: &str, timeout: Duration) -> ConnectorResult<Self> {
        Ok(Self {
            api: ApiClient::new("authorization", &format!("token {token}"), timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn labels_url(&self, repo: &RepoSlug) -> String {
        format!(
            "{}/repos/{}/{}/labels",
            self.base_url,
            repo.owner(),
            repo.name()
        )
    }

    fn label_url(&self, repo: &RepoSlug, name: &str) -> String {
        format!("{}/{}", self.labels_url(repo), encode_segment(name))
    }
}

#[async_trait]
impl LabelConnector for GitHubConnector {
    async fn list_labels(&self, repo: &RepoSlug) -> ConnectorResult<Vec<Label>> {
        let wire: Vec<WireLabel> = self
            .api
            .get_all(&self.labels_url(repo), &[("per_page", PER_PAGE.to_string())])
            .await?;
        debug!(repo = %repo, count = wire.len(), "listed github labels");
        Ok(wire.into_iter().map(Label::from).collect())
    }

    async fn create_label(&self, repo: &RepoSlug, label: &Label) -> ConnectorResult<()> {
        let body = CreateBody {
            name: &label.name,
            color: &label.color,
            description: &label.description,
        };
        self.api
            .send_json(Method::POST, &self.labels_url(repo), &body)
            .await
    }

    async fn update_label(&self, repo: &RepoSlug, label: &Label) -> ConnectorResult<()> {
        let body = UpdateBody {
            new_name: &label.name,
            color: &label.color,
            description: &label.description,
        };
        self.api
            .send_json(
                Method::PATCH,
                &self.label_url(repo, label.remote_name()),
                &body,
            )
            .await
    }

    async fn delete_label(&self, repo: &RepoSlug, label: &Label) -> ConnectorResult<()> {
        self.api.delete(&self.label_url(repo, label.remote_name())).await
    }
}
