//! Hosting-service connectors.
//!
//! The reconciliation engine only talks to [`LabelConnector`]; one
//! implementation exists per hosting service. Connectors translate wire
//! shapes into [`Label`] so the engine never branches on payload origin.

pub mod fakes;
pub mod github;
pub mod gitlab;
pub mod http;

use async_trait::async_trait;

use crate::domain::{ConnectorError, Label, RepoSlug};

pub use github::GitHubConnector;
pub use gitlab::GitLabConnector;

/// Result alias for connector calls.
pub type ConnectorResult<T> = std::result::Result<T, ConnectorError>;

/// Label operations against one hosting service.
///
/// Every method is a remote call. `list_labels` resolves pagination fully
/// before returning.
#[async_trait]
pub trait LabelConnector: Send + Sync {
    /// All labels of `repo`.
    async fn list_labels(&self, repo: &RepoSlug) -> ConnectorResult<Vec<Label>>;

    /// Create `label` in `repo`.
    async fn create_label(&self, repo: &RepoSlug, label: &Label) -> ConnectorResult<()>;

    /// Update the label currently known as `label.remote_name()`, renaming it
    /// to `label.name`.
    async fn update_label(&self, repo: &RepoSlug, label: &Label) -> ConnectorResult<()>;

    /// Delete `label` from `repo`.
    async fn delete_label(&self, repo: &RepoSlug, label: &Label) -> ConnectorResult<()>;
}
