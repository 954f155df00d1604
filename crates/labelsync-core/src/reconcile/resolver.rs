//! Violation resolution: one corrective remote call per violation.

use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::connector::LabelConnector;
use crate::domain::{
    ConnectorError, Label, LabelRule, ReconciliationFailure, RepoSlug, RuleSet, Violation, ViolationKind,
};
use crate::obs::emit_violation_resolved;

/// Result of resolving one violation, as it appears in reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionOutcome {
    pub kind: ViolationKind,
    pub label: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResolutionOutcome {
    fn from_result(violation: &Violation, result: &Result<bool, ReconciliationFailure>) -> Self {
        Self {
            kind: violation.kind,
            label: violation.label.name.clone(),
            success: matches!(result, Ok(true)),
            error: match result {
                Ok(true) => None,
                Ok(false) => Some(format!("no rule for label '{}'", violation.label.name)),
                Err(failure) => Some(failure.source.to_string()),
            },
        }
    }
}

/// Applies fixes for one repository through its service's connector.
#[derive(Clone)]
pub struct Resolver {
    connector: Arc<dyn LabelConnector>,
    repo: RepoSlug,
}

impl Resolver {
    pub fn new(connector: Arc<dyn LabelConnector>, repo: RepoSlug) -> Self {
        Self { connector, repo }
    }

    /// Apply exactly one corrective call for `violation`.
    ///
    /// Returns `Ok(false)` when the rule behind a color or description fix has
    /// disappeared since classification. Connector failures are returned as
    /// [`ReconciliationFailure`] and never retried here.
    pub async fn resolve(
        &self,
        rules: &RuleSet,
        violation: &mut Violation,
    ) -> Result<bool, ReconciliationFailure> {
        let repo = &self.repo;
        let call = match violation.kind {
            ViolationKind::Color => {
                let Some(rule) = rules.get(&violation.label.name) else {
                    return Ok(false);
                };
                violation.label.set_color(&rule.color);
                self.connector.update_label(repo, &violation.label).await
            }
            ViolationKind::Description => {
                let Some(rule) = rules.get(&violation.label.name) else {
                    return Ok(false);
                };
                violation.label.description = rule.description.clone();
                self.connector.update_label(repo, &violation.label).await
            }
            ViolationKind::Extra => self.connector.delete_label(repo, &violation.label).await,
            ViolationKind::Missing => self.connector.create_label(repo, &violation.label).await,
        };

        match call {
            Ok(()) => {
                if matches!(violation.kind, ViolationKind::Color | ViolationKind::Description) {
                    violation.label.mark_synced();
                }
                emit_violation_resolved(repo.as_str(), &violation.label.name, violation.kind, true);
                Ok(true)
            }
            Err(source) => {
                emit_violation_resolved(repo.as_str(), &violation.label.name, violation.kind, false);
                Err(ReconciliationFailure {
                    repo: repo.to_string(),
                    label: violation.label.name.clone(),
                    kind: violation.kind,
                    source,
                })
            }
        }
    }

    /// Rename `from` to `to` with a single update that also applies `rule`.
    ///
    /// Issues carrying the label keep it. Returns `Ok(false)` when the
    /// repository has no label named `from`.
    pub async fn rename(&self, from: &str, to: &str, rule: &LabelRule) -> Result<bool, ConnectorError> {
        let mut label = Label::from_rule(from, rule);
        label.rename(to);
        match self.connector.update_label(&self.repo, &label).await {
            Ok(()) => {
                debug!(repo = %self.repo, from = %from, to = %to, "label renamed");
                Ok(true)
            }
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Resolve `violations` in the order given for one label.
    ///
    /// Each violation after a successful one starts from the label state that
    /// fix produced, so a later update neither reverts an earlier attribute
    /// nor addresses a stale remote name.
    pub async fn resolve_sequence(
        &self,
        rules: &RuleSet,
        violations: Vec<Violation>,
    ) -> Vec<ResolutionOutcome> {
        let mut outcomes = Vec::with_capacity(violations.len());
        let mut carried: Option<Label> = None;

        for mut violation in violations {
            if let Some(label) = carried.take() {
                if violation.kind != ViolationKind::Missing {
                    violation.label = label;
                }
            }
            let result = self.resolve(rules, &mut violation).await;
            outcomes.push(ResolutionOutcome::from_result(&violation, &result));
            if matches!(result, Ok(true)) && violation.kind != ViolationKind::Extra {
                carried = Some(violation.label);
            }
        }

        outcomes
    }

    /// Resolve every violation of one repository pass.
    ///
    /// Violations for different labels run concurrently; those for the same
    /// label run sequentially. Outcomes come back in input order.
    pub async fn resolve_all(
        &self,
        rules: &RuleSet,
        violations: Vec<Violation>,
    ) -> Vec<ResolutionOutcome> {
        let total = violations.len();
        let mut groups: Vec<(String, Vec<usize>, Vec<Violation>)> = Vec::new();
        for (idx, violation) in violations.into_iter().enumerate() {
            let name = violation.label.name.clone();
            match groups.iter_mut().find(|(group, _, _)| *group == name) {
                Some((_, indices, members)) => {
                    indices.push(idx);
                    members.push(violation);
                }
                None => groups.push((name, vec![idx], vec![violation])),
            }
        }
        debug!(repo = %self.repo, violations = total, labels = groups.len(), "resolving");

        let results = join_all(groups.into_iter().map(|(_, indices, members)| async move {
            let outcomes = self.resolve_sequence(rules, members).await;
            indices.into_iter().zip(outcomes).collect::<Vec<_>>()
        }))
        .await;

        let mut ordered: Vec<Option<ResolutionOutcome>> = vec![None; total];
        for (idx, outcome) in results.into_iter().flatten() {
            ordered[idx] = Some(outcome);
        }
        ordered.into_iter().flatten().collect()
    }
}
