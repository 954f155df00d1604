//! Domain models for labelsync.
//!
//! Canonical definitions for the core entities:
//! - `Label`: A label as it exists on a hosting service
//! - `RuleSet`: The desired label state, keyed by name
//! - `Violation`: One discrepancy between the two
//! - `RepoSlug` / `RepoRegistry`: Repository identity and enablement

pub mod error;
pub mod label;
pub mod registration;
pub mod rules;
pub mod violation;

// Re-export main types and errors
pub use error::{ConfigurationError, ConnectorError, LabelsyncError, ReconciliationFailure, Result};
pub use label::{normalize_color, Label};
pub use registration::{RepoRegistry, RepoSlug};
pub use rules::{LabelRule, RuleSet};
pub use violation::{Violation, ViolationKind};
