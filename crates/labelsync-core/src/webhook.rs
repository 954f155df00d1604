//! Webhook payload adapter and signature verification.
//!
//! GitHub and GitLab describe labels differently (`name` vs `title`, colors
//! with or without `#`, single label vs label lists). Everything is turned
//! into [`LabelEvent`] here so the engine never sees a wire shape.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::domain::{ConfigurationError, Label, RepoSlug};

type HmacSha256 = Hmac<Sha256>;

/// GitHub signature header (HMAC-SHA256 of the raw body).
pub const GITHUB_SIGNATURE_HEADER: &str = "x-hub-signature-256";
pub const GITHUB_EVENT_HEADER: &str = "x-github-event";
pub const GITLAB_TOKEN_HEADER: &str = "x-gitlab-token";
pub const GITLAB_EVENT_HEADER: &str = "x-gitlab-event";

/// GitLab hook types that carry label lists.
pub const GITLAB_SUPPORTED_EVENTS: [&str; 3] = ["issue hook", "merge request hook", "note hook"];

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("malformed webhook payload: {0}")]
    InvalidPayload(String),

    #[error("unsupported event: {0}")]
    UnsupportedEvent(String),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

impl From<serde_json::Error> for WebhookError {
    fn from(err: serde_json::Error) -> Self {
        WebhookError::InvalidPayload(err.to_string())
    }
}

/// What happened to the label upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelAction {
    Created,
    Edited,
    Deleted,
    /// Label attached to or seen on an issue/merge request.
    Other,
}

impl LabelAction {
    pub fn parse(action: &str) -> Self {
        match action {
            "created" => LabelAction::Created,
            "edited" => LabelAction::Edited,
            "deleted" => LabelAction::Deleted,
            _ => LabelAction::Other,
        }
    }
}

/// One label reported by a webhook, normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelEvent {
    pub repo: RepoSlug,
    pub action: LabelAction,
    pub label: Label,
    /// Whether the payload carried a color; absent fields are not checked.
    pub color_present: bool,
    pub description_present: bool,
}

/// Parsed webhook request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookDispatch {
    /// GitHub ping after hook setup; answer 200 and do nothing.
    Ping,
    Labels {
        repo: RepoSlug,
        events: Vec<LabelEvent>,
    },
    /// A well-formed event that carries no label information.
    Ignored { event: String },
}

/// Find the service named by an `x-<service>-event` header.
pub fn service_from_headers<'a>(names: impl IntoIterator<Item = &'a str>) -> Option<String> {
    names.into_iter().find_map(|name| {
        let lower = name.to_ascii_lowercase();
        lower
            .strip_prefix("x-")
            .and_then(|rest| rest.strip_suffix("-event"))
            .filter(|service| !service.is_empty() && !service.contains('-'))
            .map(str::to_string)
    })
}

/// Check `X-Hub-Signature-256: sha256=<hex>` against `body`.
#[must_use]
pub fn verify_github_signature(body: &[u8], header: &str, secret: &str) -> bool {
    let Some(hex_digest) = header.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let computed = mac.finalize().into_bytes();
    computed.as_slice().ct_eq(&expected).into()
}

/// Compute the header value GitHub would send for `body`.
pub fn sign_github_payload(body: &[u8], secret: &str) -> String {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

#[must_use]
pub fn verify_gitlab_token(header: &str, secret: &str) -> bool {
    header.as_bytes().ct_eq(secret.as_bytes()).into()
}

#[derive(Debug, Deserialize)]
struct GitHubRepository {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct GitHubLabel {
    name: String,
    color: Option<String>,
    #[serde(default, deserialize_with = "present_field")]
    description: Option<Option<String>>,
}

#[derive(Debug, Deserialize)]
struct GitHubLabelPayload {
    #[serde(default)]
    action: String,
    label: Option<GitHubLabel>,
    repository: GitHubRepository,
}

/// Distinguish an explicit `null` (present, empty) from a missing field.
fn present_field<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

/// Parse a GitHub webhook delivery.
///
/// `label` events carry the label itself; `issues` and `pull_request`
/// deliveries are used when they reference a label (`labeled`/`unlabeled`).
pub fn parse_github(event_type: &str, body: &[u8]) -> Result<WebhookDispatch, WebhookError> {
    let event_type = event_type.to_ascii_lowercase();
    match event_type.as_str() {
        "ping" => return Ok(WebhookDispatch::Ping),
        "label" | "issues" | "pull_request" => {}
        _ => return Ok(WebhookDispatch::Ignored { event: event_type }),
    }

    let payload: GitHubLabelPayload = serde_json::from_slice(body)?;
    let repo = RepoSlug::parse(&payload.repository.full_name)?;
    let Some(label) = payload.label else {
        if event_type == "label" {
            return Err(WebhookError::InvalidPayload("label event without label".to_string()));
        }
        return Ok(WebhookDispatch::Ignored { event: event_type });
    };

    let action = if event_type == "label" {
        LabelAction::parse(&payload.action)
    } else {
        LabelAction::Other
    };
    let color_present = label.color.is_some();
    let description_present = label.description.is_some();
    let event = LabelEvent {
        repo: repo.clone(),
        action,
        label: Label::new(
            label.name,
            label.color.unwrap_or_default(),
            label.description.flatten().unwrap_or_default(),
        ),
        color_present,
        description_present,
    };

    Ok(WebhookDispatch::Labels {
        repo,
        events: vec![event],
    })
}

#[derive(Debug, Deserialize)]
struct GitLabProject {
    path_with_namespace: String,
}

#[derive(Debug, Deserialize)]
struct GitLabLabel {
    title: String,
    color: Option<String>,
    #[serde(default, deserialize_with = "present_field")]
    description: Option<Option<String>>,
}

#[derive(Debug, Deserialize)]
struct GitLabNoteAttributes {
    noteable_type: String,
}

#[derive(Debug, Deserialize)]
struct GitLabIssue {
    #[serde(default)]
    labels: Vec<GitLabLabel>,
}

#[derive(Debug, Deserialize)]
struct GitLabPayload {
    project: GitLabProject,
    #[serde(default)]
    labels: Vec<GitLabLabel>,
    object_attributes: Option<GitLabNoteAttributes>,
    issue: Option<GitLabIssue>,
}

/// Parse a GitLab issue, merge request or note hook into one event per label.
pub fn parse_gitlab(event_type: &str, body: &[u8]) -> Result<WebhookDispatch, WebhookError> {
    let event_type = event_type.to_ascii_lowercase();
    if !GITLAB_SUPPORTED_EVENTS.contains(&event_type.as_str()) {
        return Err(WebhookError::UnsupportedEvent(event_type));
    }

    let payload: GitLabPayload = serde_json::from_slice(body)?;
    let repo = RepoSlug::parse(&payload.project.path_with_namespace)?;

    let labels = if event_type == "note hook" {
        let noteable = payload
            .object_attributes
            .map(|attrs| attrs.noteable_type)
            .unwrap_or_default();
        if !noteable.eq_ignore_ascii_case("issue") {
            return Err(WebhookError::UnsupportedEvent(format!(
                "note on noteable type '{noteable}'"
            )));
        }
        payload.issue.map(|issue| issue.labels).unwrap_or_default()
    } else {
        payload.labels
    };

    let events = labels
        .into_iter()
        .map(|label| LabelEvent {
            repo: repo.clone(),
            action: LabelAction::Other,
            color_present: label.color.is_some(),
            description_present: label.description.is_some(),
            label: Label::new(
                label.title,
                label.color.unwrap_or_default(),
                label.description.flatten().unwrap_or_default(),
            ),
        })
        .collect();

    Ok(WebhookDispatch::Labels { repo, events })
}
