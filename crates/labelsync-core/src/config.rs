//! TOML configuration: the main file (services, timeouts, where the labels
//! live) and the labels file (registered repositories and the rule set).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::connector::github::DEFAULT_API_URL;
use crate::connector::gitlab::DEFAULT_HOST;
use crate::connector::http::USER_AGENT;
use crate::connector::{GitHubConnector, GitLabConnector, LabelConnector};
use crate::domain::{ConfigurationError, RepoRegistry, RepoSlug, Result, RuleSet};
use crate::reconcile::{ReconcileOptions, Service};

/// Services a connector exists for.
pub const SUPPORTED_SERVICES: [&str; 2] = ["github", "gitlab"];

/// File fetched from the source repository when `path` is not given.
pub const DEFAULT_REMOTE_PATH: &str = "labels.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Bound on one repository task in a pass; 0 disables it.
    #[serde(default = "default_repo_timeout")]
    pub repo_timeout_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            repo_timeout_secs: default_repo_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_repo_timeout() -> u64 {
    60
}

fn default_request_timeout() -> u64 {
    30
}

impl ReconcileConfig {
    pub fn options(&self) -> ReconcileOptions {
        ReconcileOptions {
            repo_timeout: (self.repo_timeout_secs > 0)
                .then(|| Duration::from_secs(self.repo_timeout_secs)),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Where the labels file comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LabelsSource {
    /// A file on disk; relative paths resolve against the main config file.
    Local { path: PathBuf },
    /// A file in a GitHub repository, read through the contents API.
    Remote {
        repo: String,
        token: String,
        #[serde(default = "default_remote_path")]
        path: String,
        #[serde(default)]
        base_url: Option<String>,
    },
}

fn default_remote_path() -> String {
    DEFAULT_REMOTE_PATH.to_string()
}

/// Credentials of one hosting service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub token: String,
    /// Webhook secret (GitHub HMAC key, GitLab token).
    pub secret: String,
    /// API root override (GitHub Enterprise, test servers).
    #[serde(default)]
    pub base_url: Option<String>,
    /// GitLab host; ignored by GitHub.
    #[serde(default)]
    pub host: Option<String>,
}

/// The main configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    pub labels_source: LabelsSource,
    #[serde(default)]
    pub services: BTreeMap<String, ServiceConfig>,
}

impl Config {
    /// Read and validate the main file at `path`.
    pub fn load(path: &Path) -> std::result::Result<Self, ConfigurationError> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&content)?;
        if let LabelsSource::Local { path: labels } = &mut config.labels_source {
            if labels.is_relative() {
                if let Some(dir) = path.parent() {
                    *labels = dir.join(&*labels);
                }
            }
        }
        debug!(path = %path.display(), services = config.services.len(), "loaded config");
        Ok(config)
    }

    pub fn parse(content: &str) -> std::result::Result<Self, ConfigurationError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> std::result::Result<(), ConfigurationError> {
        for name in self.services.keys() {
            ensure_supported(name)?;
        }
        if let LabelsSource::Remote { repo, .. } = &self.labels_source {
            RepoSlug::parse(repo)?;
        }
        Ok(())
    }

    pub fn secret(&self, service: &str) -> Option<&str> {
        self.services.get(service).map(|s| s.secret.as_str())
    }

    pub fn is_local(&self) -> bool {
        matches!(self.labels_source, LabelsSource::Local { .. })
    }

    /// Load the labels file from its configured source.
    pub async fn load_labels(&self) -> std::result::Result<LabelsFile, ConfigurationError> {
        let labels = match &self.labels_source {
            LabelsSource::Local { path } => LabelsFile::load(path)?,
            LabelsSource::Remote {
                repo,
                token,
                path,
                base_url,
            } => {
                let base_url = base_url.as_deref().unwrap_or(DEFAULT_API_URL);
                let content =
                    fetch_remote(base_url, repo, token, path, self.reconcile.request_timeout())
                        .await?;
                LabelsFile::parse(&content)?
            }
        };
        for service in labels.repos.keys() {
            if !self.services.contains_key(service) {
                return Err(ConfigurationError::UnknownService(service.clone()));
            }
        }
        Ok(labels)
    }

    /// Persist `labels` to the local source. Remote sources are read-only.
    pub fn save_labels(&self, labels: &LabelsFile) -> std::result::Result<(), ConfigurationError> {
        match &self.labels_source {
            LabelsSource::Local { path } => {
                std::fs::write(path, labels.render()?)?;
                info!(path = %path.display(), "saved labels file");
                Ok(())
            }
            LabelsSource::Remote { repo, .. } => Err(ConfigurationError::RemoteSource {
                source_repo: repo.clone(),
                reason: "remote labels source is read-only".to_string(),
            }),
        }
    }

    /// One [`Service`] per configured service, with its registered repos.
    pub fn build_services(&self, labels: &LabelsFile) -> Result<Vec<Service>> {
        let timeout = self.reconcile.request_timeout();
        let mut services = Vec::with_capacity(self.services.len());
        for (name, service) in &self.services {
            let connector: Arc<dyn LabelConnector> = match name.as_str() {
                "github" => Arc::new(GitHubConnector::with_base_url(
                    service.base_url.as_deref().unwrap_or(DEFAULT_API_URL),
                    &service.token,
                    timeout,
                )?),
                "gitlab" => match &service.base_url {
                    Some(base_url) => Arc::new(GitLabConnector::with_base_url(
                        base_url,
                        &service.token,
                        timeout,
                    )?),
                    None => Arc::new(GitLabConnector::new(
                        service.host.as_deref().unwrap_or(DEFAULT_HOST),
                        &service.token,
                        timeout,
                    )?),
                },
                other => return Err(ConfigurationError::UnknownService(other.to_string()).into()),
            };
            let repos = labels.repos.get(name).cloned().unwrap_or_default();
            services.push(Service::new(name.clone(), connector, repos));
        }
        Ok(services)
    }
}

/// Registered repositories per service plus the label rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelsFile {
    #[serde(default)]
    pub repos: BTreeMap<String, RepoRegistry>,
    #[serde(default)]
    pub labels: RuleSet,
}

impl LabelsFile {
    pub fn load(path: &Path) -> std::result::Result<Self, ConfigurationError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> std::result::Result<Self, ConfigurationError> {
        let file: LabelsFile = toml::from_str(content)?;
        for service in file.repos.keys() {
            ensure_supported(service)?;
        }
        for (name, rule) in file.labels.iter() {
            rule.validate(name)?;
        }
        Ok(file)
    }

    /// Serialize back to TOML; repositories and labels come out sorted.
    pub fn render(&self) -> std::result::Result<String, ConfigurationError> {
        toml::to_string(self).map_err(|e| ConfigurationError::Render(e.to_string()))
    }
}

fn ensure_supported(service: &str) -> std::result::Result<(), ConfigurationError> {
    if SUPPORTED_SERVICES.contains(&service) {
        Ok(())
    } else {
        Err(ConfigurationError::UnknownService(service.to_string()))
    }
}

#[derive(Deserialize)]
struct ContentsResponse {
    content: String,
    #[serde(default)]
    encoding: Option<String>,
}

async fn fetch_remote(
    base_url: &str,
    repo: &str,
    token: &str,
    path: &str,
    timeout: Duration,
) -> std::result::Result<String, ConfigurationError> {
    let fail = |reason: String| ConfigurationError::RemoteSource {
        source_repo: repo.to_string(),
        reason,
    };
    let slug = RepoSlug::parse(repo)?;
    let url = format!(
        "{}/repos/{}/{}/contents/{}",
        base_url.trim_end_matches('/'),
        slug.owner(),
        slug.name(),
        path.trim_start_matches('/')
    );

    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| fail(e.to_string()))?;
    let resp = client
        .get(&url)
        .header("authorization", format!("token {token}"))
        .header("accept", "application/vnd.github+json")
        .send()
        .await
        .map_err(|e| fail(e.to_string()))?;
    let status = resp.status();
    if !status.is_success() {
        return Err(fail(format!("GET {url} returned {status}")));
    }
    let body: ContentsResponse = resp.json().await.map_err(|e| fail(e.to_string()))?;
    if let Some(encoding) = body.encoding.as_deref() {
        if encoding != "base64" {
            return Err(fail(format!("unsupported content encoding '{encoding}'")));
        }
    }

    // The API wraps the base64 payload at 60 columns.
    let packed: String = body.content.split_whitespace().collect();
    let bytes = STANDARD
        .decode(packed)
        .map_err(|e| fail(format!("invalid base64 content: {e}")))?;
    String::from_utf8(bytes).map_err(|e| fail(format!("labels file is not UTF-8: {e}")))
}
