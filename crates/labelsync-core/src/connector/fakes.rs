//! In-memory connector (testing and dry runs).
//!
//! Provides `MemoryConnector`, which satisfies the [`LabelConnector`]
//! contract without any network access and records every call it receives.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::connector::{ConnectorResult, LabelConnector};
use crate::domain::{ConnectorError, Label, RepoSlug};

/// Operation kinds, for call logs and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    List,
    Create,
    Update,
    Delete,
}

/// One recorded connector call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: Operation,
    pub repo: String,
    /// Remote name addressed (empty for `List`).
    pub label: String,
}

#[derive(Debug, Default)]
struct State {
    repos: HashMap<RepoSlug, BTreeMap<String, Label>>,
    failures: HashSet<(Operation, String)>,
    calls: Vec<Call>,
}

/// Label store keyed by repository.
///
/// `create_label` on an existing name overwrites it and succeeds, making
/// creation idempotent. `update_label` and `delete_label` on an unknown name
/// answer 404 like the real services.
#[derive(Debug, Default)]
pub struct MemoryConnector {
    state: Mutex<State>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed `repo` with `labels`, replacing whatever it held.
    pub fn with_labels(self, repo: &RepoSlug, labels: impl IntoIterator<Item = Label>) -> Self {
        self.set_labels(repo, labels);
        self
    }

    pub fn set_labels(&self, repo: &RepoSlug, labels: impl IntoIterator<Item = Label>) {
        let labels = labels
            .into_iter()
            .map(|label| (label.name.clone(), label))
            .collect();
        self.lock().repos.insert(repo.clone(), labels);
    }

    /// Make every `op` against `repo` fail with a 500.
    pub fn fail_on(&self, op: Operation, repo: &RepoSlug) {
        self.lock().failures.insert((op, repo.to_string()));
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Current labels of `repo`, sorted by name.
    pub fn labels(&self, repo: &RepoSlug) -> Vec<Label> {
        self.lock()
            .repos
            .get(repo)
            .map(|labels| labels.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    fn record(&self, op: Operation, repo: &RepoSlug, label: &str) -> ConnectorResult<MutexGuard<'_, State>> {
        let mut state = self.lock();
        state.calls.push(Call {
            op,
            repo: repo.to_string(),
            label: label.to_string(),
        });
        if state.failures.contains(&(op, repo.to_string())) {
            return Err(ConnectorError::Status {
                status: 500,
                message: format!("injected {op:?} failure"),
            });
        }
        Ok(state)
    }
}

fn not_found(repo: &RepoSlug, name: &str) -> ConnectorError {
    ConnectorError::Status {
        status: 404,
        message: format!("label '{name}' not found in {repo}"),
    }
}

#[async_trait]
impl LabelConnector for MemoryConnector {
    async fn list_labels(&self, repo: &RepoSlug) -> ConnectorResult<Vec<Label>> {
        let state = self.record(Operation::List, repo, "")?;
        match state.repos.get(repo) {
            Some(labels) => Ok(labels.values().cloned().collect()),
            None => Err(ConnectorError::Status {
                status: 404,
                message: format!("repository {repo} not found"),
            }),
        }
    }

    async fn create_label(&self, repo: &RepoSlug, label: &Label) -> ConnectorResult<()> {
        let mut state = self.record(Operation::Create, repo, &label.name)?;
        let mut stored = label.clone();
        stored.mark_synced();
        state
            .repos
            .entry(repo.clone())
            .or_default()
            .insert(stored.name.clone(), stored);
        Ok(())
    }

    async fn update_label(&self, repo: &RepoSlug, label: &Label) -> ConnectorResult<()> {
        let remote = label.remote_name().to_string();
        let mut state = self.record(Operation::Update, repo, &remote)?;
        let labels = state
            .repos
            .get_mut(repo)
            .ok_or_else(|| not_found(repo, &remote))?;
        if labels.remove(&remote).is_none() {
            return Err(not_found(repo, &remote));
        }
        let mut stored = label.clone();
        stored.mark_synced();
        labels.insert(stored.name.clone(), stored);
        Ok(())
    }

    async fn delete_label(&self, repo: &RepoSlug, label: &Label) -> ConnectorResult<()> {
        let remote = label.remote_name().to_string();
        let mut state = self.record(Operation::Delete, repo, &remote)?;
        state
            .repos
            .get_mut(repo)
            .and_then(|labels| labels.remove(&remote))
            .map(|_| ())
            .ok_or_else(|| not_found(repo, &remote))
    }
}
