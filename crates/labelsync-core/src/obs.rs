//! Structured events for reconciliation passes and webhook handling.
//!
//! Every event carries an `event = "..."` field so log pipelines can filter
//! on it regardless of message text.

use std::fmt::Display;

use tracing::{info, warn, Span};
use uuid::Uuid;

use crate::domain::ViolationKind;

/// Span tagged with a pass id. Repository tasks are instrumented with it so
/// every event they emit carries `pass_id`.
pub struct PassSpan {
    span: Span,
}

impl PassSpan {
    pub fn new(pass_id: &Uuid) -> Self {
        Self {
            span: tracing::info_span!("labelsync.pass", pass_id = %pass_id),
        }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}

pub fn emit_pass_started(pass_id: &Uuid, fix: bool, repos: usize) {
    info!(
        event = "pass.started",
        pass_id = %pass_id,
        mode = if fix { "fix" } else { "check" },
        repos = repos,
    );
}

pub fn emit_repo_checked(repo: &str, labels: usize, violations: usize) {
    info!(event = "repo.checked", repo = %repo, labels = labels, violations = violations);
}

/// Failed fixes are warnings; successful ones are info.
pub fn emit_violation_resolved(repo: &str, label: &str, kind: ViolationKind, success: bool) {
    if success {
        info!(event = "violation.resolved", repo = %repo, label = %label, kind = %kind, success = true);
    } else {
        warn!(event = "violation.resolved", repo = %repo, label = %label, kind = %kind, success = false);
    }
}

pub fn emit_repo_failed(service: &str, repo: &str, error: &dyn Display) {
    warn!(event = "repo.failed", service = %service, repo = %repo, error = %error);
}

pub fn emit_pass_finished(pass_id: &Uuid, repos: usize, failed: usize) {
    info!(event = "pass.finished", pass_id = %pass_id, repos = repos, failed = failed);
}

pub fn emit_webhook_received(service: &str, event_type: &str) {
    info!(event = "webhook.received", service = %service, event_type = %event_type);
}

pub fn emit_webhook_handled(service: &str, repo: &str, success: bool) {
    info!(event = "webhook.handled", service = %service, repo = %repo, success = success);
}
