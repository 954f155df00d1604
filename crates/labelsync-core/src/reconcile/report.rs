//! Aggregated results of check and fix passes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{RepoSlug, Violation};
use crate::reconcile::resolver::ResolutionOutcome;

/// Outcome of checking one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RepoCheck {
    /// Labels were listed and classified; an empty list means compliant.
    Checked { violations: Vec<Violation> },
    /// The repository task failed; no verdict.
    Failed { error: String },
}

impl RepoCheck {
    pub fn is_compliant(&self) -> bool {
        matches!(self, RepoCheck::Checked { violations } if violations.is_empty())
    }

    pub fn violations(&self) -> &[Violation] {
        match self {
            RepoCheck::Checked { violations } => violations,
            RepoCheck::Failed { .. } => &[],
        }
    }
}

/// Outcome of fixing one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RepoFix {
    /// One outcome per violation found, in classification order.
    Attempted { outcomes: Vec<ResolutionOutcome> },
    /// Listing failed or the task died before any fix could be tracked.
    Failed { error: String },
}

impl RepoFix {
    /// Per-violation success flags.
    pub fn flags(&self) -> Vec<bool> {
        match self {
            RepoFix::Attempted { outcomes } => outcomes.iter().map(|o| o.success).collect(),
            RepoFix::Failed { .. } => Vec::new(),
        }
    }

    /// True only when every flag is true.
    pub fn succeeded(&self) -> bool {
        match self {
            RepoFix::Attempted { outcomes } => outcomes.iter().all(|o| o.success),
            RepoFix::Failed { .. } => false,
        }
    }
}

/// Per-service, per-repository results of one pass.
pub type ServiceResults<T> = BTreeMap<String, BTreeMap<RepoSlug, T>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckReport {
    pub pass_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub services: ServiceResults<RepoCheck>,
}

impl CheckReport {
    /// Repositories, per service, that have violations or could not be checked.
    pub fn non_compliant(&self) -> BTreeMap<String, Vec<RepoSlug>> {
        self.services
            .iter()
            .filter_map(|(service, repos)| {
                let bad: Vec<RepoSlug> = repos
                    .iter()
                    .filter(|(_, check)| !check.is_compliant())
                    .map(|(repo, _)| repo.clone())
                    .collect();
                (!bad.is_empty()).then(|| (service.clone(), bad))
            })
            .collect()
    }

    pub fn is_compliant(&self) -> bool {
        self.services
            .values()
            .flat_map(BTreeMap::values)
            .all(RepoCheck::is_compliant)
    }

    pub fn violation_count(&self) -> usize {
        self.services
            .values()
            .flat_map(BTreeMap::values)
            .map(|check| check.violations().len())
            .sum()
    }

    pub fn get(&self, service: &str, repo: &RepoSlug) -> Option<&RepoCheck> {
        self.services.get(service).and_then(|repos| repos.get(repo))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixReport {
    pub pass_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub services: ServiceResults<RepoFix>,
}

impl FixReport {
    pub fn get(&self, service: &str, repo: &RepoSlug) -> Option<&RepoFix> {
        self.services.get(service).and_then(|repos| repos.get(repo))
    }

    /// Success flags of one repository, empty if it was not part of the pass.
    pub fn flags(&self, service: &str, repo: &RepoSlug) -> Vec<bool> {
        self.get(service, repo).map(RepoFix::flags).unwrap_or_default()
    }

    pub fn repo_succeeded(&self, service: &str, repo: &RepoSlug) -> bool {
        self.get(service, repo).is_some_and(RepoFix::succeeded)
    }

    /// Repositories, per service, whose every fix succeeded.
    pub fn fixed(&self) -> BTreeMap<String, Vec<RepoSlug>> {
        self.services
            .iter()
            .map(|(service, repos)| {
                let fixed = repos
                    .iter()
                    .filter(|(_, fix)| fix.succeeded())
                    .map(|(repo, _)| repo.clone())
                    .collect();
                (service.clone(), fixed)
            })
            .collect()
    }

    pub fn all_succeeded(&self) -> bool {
        self.services
            .values()
            .flat_map(BTreeMap::values)
            .all(RepoFix::succeeded)
    }
}

/// Result of reconciling one webhook label event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventOutcome {
    pub repo: RepoSlug,
    pub outcomes: Vec<ResolutionOutcome>,
}

impl EventOutcome {
    pub fn succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.success)
    }
}
