//! Error taxonomy for label reconciliation.

use std::time::Duration;

use crate::domain::violation::ViolationKind;

/// Failures raised by a remote call against a hosting service.
///
/// The engine never retries these; retry policy belongs to the transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectorError {
    /// The service answered with a non-success status.
    #[error("service responded with status {status}: {message}")]
    Status { status: u16, message: String },

    /// The request never produced a response (DNS, TLS, connection reset...).
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body did not match the expected shape.
    #[error("malformed response: {0}")]
    Decode(String),

    /// The request or the whole repository task ran out of time.
    #[error("timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
}

impl ConnectorError {
    /// Timeout error for a limit of `after`.
    pub fn timeout(after: Duration) -> Self {
        ConnectorError::Timeout {
            after_ms: u64::try_from(after.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// True when the service reported the addressed resource as absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ConnectorError::Status { status: 404, .. })
    }
}

impl From<reqwest::Error> for ConnectorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ConnectorError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            ConnectorError::Status {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            ConnectorError::Transport(err.to_string())
        }
    }
}

/// Operator-facing configuration problems. Fatal at load time.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("reposlug '{0}' is not of the form owner/name")]
    InvalidRepoSlug(String),

    #[error("unknown service '{0}' (supported: github, gitlab)")]
    UnknownService(String),

    #[error("label '{label}' has invalid color '{color}'")]
    InvalidColor { label: String, color: String },

    #[error("label '{0}' is already defined")]
    DuplicateRule(String),

    #[error("label '{0}' is not defined")]
    UnknownRule(String),

    #[error("repository '{repo}' is not registered for service '{service}'")]
    UnknownRepository { service: String, repo: String },

    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("failed to render configuration: {0}")]
    Render(String),

    #[error("cannot load labels configuration from '{source_repo}': {reason}")]
    RemoteSource { source_repo: String, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for ConfigurationError {
    fn from(err: toml::de::Error) -> Self {
        ConfigurationError::Parse(err.to_string())
    }
}

/// One violation could not be resolved.
///
/// Recorded against that violation only; sibling resolutions keep going.
#[derive(Debug, Clone, thiserror::Error)]
#[error("failed to resolve {kind} violation for label '{label}' in {repo}: {source}")]
pub struct ReconciliationFailure {
    pub repo: String,
    pub label: String,
    pub kind: ViolationKind,
    #[source]
    pub source: ConnectorError,
}

/// Umbrella error for the engine's public entry points.
#[derive(Debug, thiserror::Error)]
pub enum LabelsyncError {
    #[error(transparent)]
    Connector(#[from] ConnectorError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Reconciliation(#[from] ReconciliationFailure),

    #[error("repository '{repo}' is not enabled for service '{service}'")]
    RepositoryNotEnabled { service: String, repo: String },

    #[error("service '{0}' is not configured")]
    UnknownService(String),
}

/// Result type for labelsync operations.
pub type Result<T> = std::result::Result<T, LabelsyncError>;
