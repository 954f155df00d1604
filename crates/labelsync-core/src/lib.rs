//! labelsync core library
//!
//! Keeps issue labels on GitHub and GitLab repositories in line with a
//! declarative rule set: classify what differs, then apply one corrective
//! call per violation.

pub mod config;
pub mod connector;
pub mod domain;
pub mod obs;
pub mod reconcile;
pub mod telemetry;
pub mod webhook;

pub use config::{Config, LabelsFile, LabelsSource};

pub use connector::fakes::MemoryConnector;
pub use connector::{GitHubConnector, GitLabConnector, LabelConnector};

pub use domain::{
    normalize_color, ConfigurationError, ConnectorError, Label, LabelRule, LabelsyncError,
    ReconciliationFailure, RepoRegistry, RepoSlug, Result, RuleSet, Violation, ViolationKind,
};

pub use reconcile::{
    classify, classify_event, CheckReport, EventOutcome, FixReport, ReconcileOptions, Reconciler,
    RepoCheck, RepoFix, ResolutionOutcome, Resolver, Service,
};

pub use telemetry::init_tracing;

pub use webhook::{LabelAction, LabelEvent, WebhookDispatch, WebhookError};

/// Crate version, reported by `labelsync --version` and `GET /health`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
