//! Reconciliation orchestrator: fans passes out over every enabled
//! repository of every service and aggregates the results.
//!
//! Each (service, repository) pair runs as its own tokio task. A failure,
//! timeout or panic in one task fills only that repository's slot.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::task::JoinSet;
use tracing::{debug, Instrument};
use uuid::Uuid;

use crate::connector::LabelConnector;
use crate::domain::{
    ConnectorError, LabelRule, LabelsyncError, RepoRegistry, RepoSlug, Result, RuleSet, Violation,
};
use crate::obs::{
    emit_pass_finished, emit_pass_started, emit_repo_checked, emit_repo_failed, emit_webhook_handled,
    PassSpan,
};
use crate::reconcile::classifier::{classify, classify_event};
use crate::reconcile::report::{CheckReport, EventOutcome, FixReport, RepoCheck, RepoFix, ServiceResults};
use crate::reconcile::resolver::Resolver;
use crate::webhook::LabelEvent;

/// One hosting service: its connector and its registered repositories.
#[derive(Clone)]
pub struct Service {
    pub name: String,
    pub connector: Arc<dyn LabelConnector>,
    pub repos: RepoRegistry,
}

impl Service {
    pub fn new(name: impl Into<String>, connector: Arc<dyn LabelConnector>, repos: RepoRegistry) -> Self {
        Self {
            name: name.into(),
            connector,
            repos,
        }
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.name)
            .field("repos", &self.repos)
            .finish_non_exhaustive()
    }
}

/// Stage of one repository within a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassStage {
    Idle,
    Fetching,
    Classifying,
    Resolving,
    Done,
}

#[derive(Debug, Clone, Default)]
pub struct ReconcileOptions {
    /// Upper bound for one repository's whole task (listing plus fixes).
    pub repo_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Check,
    Fix,
}

enum TaskResult {
    Checked(Vec<Violation>),
    Fixed(RepoFix),
}

/// Drives check and fix passes and the webhook fast path.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    options: ReconcileOptions,
}

impl Reconciler {
    pub fn new(options: ReconcileOptions) -> Self {
        Self { options }
    }

    /// List and classify every enabled repository. Read-only.
    pub async fn check(&self, services: &[Service], rules: Arc<RuleSet>) -> CheckReport {
        let pass_id = Uuid::new_v4();
        let results = self.run_pass(pass_id, Mode::Check, services, rules).await;
        let services = results
            .into_iter()
            .map(|(service, repos)| {
                let repos = repos
                    .into_iter()
                    .map(|(repo, result)| {
                        let check = match result {
                            Ok(TaskResult::Checked(violations)) => RepoCheck::Checked { violations },
                            Ok(TaskResult::Fixed(_)) => RepoCheck::Failed {
                                error: "unexpected fix result in check pass".to_string(),
                            },
                            Err(error) => RepoCheck::Failed { error },
                        };
                        (repo, check)
                    })
                    .collect();
                (service, repos)
            })
            .collect();

        CheckReport {
            pass_id,
            generated_at: Utc::now(),
            services,
        }
    }

    /// List, classify and resolve every enabled repository.
    pub async fn fix(&self, services: &[Service], rules: Arc<RuleSet>) -> FixReport {
        let pass_id = Uuid::new_v4();
        let results = self.run_pass(pass_id, Mode::Fix, services, rules).await;
        let services = results
            .into_iter()
            .map(|(service, repos)| {
                let repos = repos
                    .into_iter()
                    .map(|(repo, result)| {
                        let fix = match result {
                            Ok(TaskResult::Fixed(fix)) => fix,
                            Ok(TaskResult::Checked(_)) => RepoFix::Failed {
                                error: "unexpected check result in fix pass".to_string(),
                            },
                            Err(error) => RepoFix::Failed { error },
                        };
                        (repo, fix)
                    })
                    .collect();
                (service, repos)
            })
            .collect();

        FixReport {
            pass_id,
            generated_at: Utc::now(),
            services,
        }
    }

    /// Reconcile the single label a webhook reported, without listing the
    /// repository. Fixes for the event run sequentially.
    pub async fn reconcile_event(
        &self,
        service: &Service,
        rules: Arc<RuleSet>,
        event: LabelEvent,
    ) -> Result<EventOutcome> {
        if !service.repos.is_enabled(&event.repo) {
            return Err(LabelsyncError::RepositoryNotEnabled {
                service: service.name.clone(),
                repo: event.repo.to_string(),
            });
        }

        let violations = classify_event(&event, &rules);
        debug!(
            service = %service.name,
            repo = %event.repo,
            label = %event.label.name,
            violations = violations.len(),
            "classified webhook label"
        );
        let resolver = Resolver::new(Arc::clone(&service.connector), event.repo.clone());
        let outcomes = resolver.resolve_sequence(&rules, violations).await;
        let outcome = EventOutcome {
            repo: event.repo,
            outcomes,
        };
        emit_webhook_handled(&service.name, outcome.repo.as_str(), outcome.succeeded());
        Ok(outcome)
    }

    /// Push a rule rename to every enabled repository.
    ///
    /// Repositories holding `from` get one update renaming it to `to` with
    /// `rule` applied; those without it report `Ok(false)` and are left to
    /// the next fix pass.
    pub async fn rename_label(
        &self,
        services: &[Service],
        from: &str,
        to: &str,
        rule: &LabelRule,
    ) -> ServiceResults<std::result::Result<bool, String>> {
        let timeout = self.options.repo_timeout;
        let mut tasks = Vec::new();
        for service in services {
            for repo in service.repos.enabled() {
                let resolver = Resolver::new(Arc::clone(&service.connector), repo.clone());
                let service_name = service.name.clone();
                let repo = repo.clone();
                tasks.push(async move {
                    let result = with_timeout(timeout, resolver.rename(from, to, rule)).await;
                    (service_name, repo, result)
                });
            }
        }

        let mut results: ServiceResults<std::result::Result<bool, String>> = BTreeMap::new();
        for (service, repo, result) in join_all(tasks).await {
            if let Err(error) = &result {
                emit_repo_failed(&service, repo.as_str(), error);
            }
            results.entry(service).or_default().insert(repo, result);
        }
        results
    }

    async fn run_pass(
        &self,
        pass_id: Uuid,
        mode: Mode,
        services: &[Service],
        rules: Arc<RuleSet>,
    ) -> ServiceResults<std::result::Result<TaskResult, String>> {
        let span = PassSpan::new(&pass_id);
        let mut join_set = JoinSet::new();
        let mut slots: Vec<(String, RepoSlug)> = Vec::new();
        let mut results: ServiceResults<std::result::Result<TaskResult, String>> = BTreeMap::new();

        for service in services {
            results.entry(service.name.clone()).or_default();
            for repo in service.repos.enabled() {
                let idx = slots.len();
                slots.push((service.name.clone(), repo.clone()));
                debug!(service = %service.name, repo = %repo, stage = ?PassStage::Idle, "queued");

                let connector = Arc::clone(&service.connector);
                let rules = Arc::clone(&rules);
                let repo = repo.clone();
                let service_name = service.name.clone();
                let timeout = self.options.repo_timeout;
                join_set.spawn(
                    async move {
                        let task = run_repo(mode, connector, rules, repo.clone());
                        let result = with_timeout(timeout, task).await;
                        match &result {
                            Ok(_) => {}
                            Err(error) => emit_repo_failed(&service_name, repo.as_str(), error),
                        }
                        (idx, result)
                    }
                    .instrument(span.span().clone()),
                );
            }
        }
        emit_pass_started(&pass_id, matches!(mode, Mode::Fix), slots.len());

        let mut ordered: Vec<Option<std::result::Result<TaskResult, String>>> =
            (0..slots.len()).map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((idx, result)) => ordered[idx] = Some(result),
                Err(e) => debug!(error = %e, "repository task aborted"),
            }
        }

        let mut failed = 0usize;
        for ((service, repo), slot) in slots.into_iter().zip(ordered) {
            let result = slot.unwrap_or_else(|| Err("repository task panicked or was cancelled".to_string()));
            if result.is_err() {
                failed += 1;
            }
            results.entry(service).or_default().insert(repo, result);
        }
        emit_pass_finished(&pass_id, results.values().map(BTreeMap::len).sum(), failed);
        results
    }
}

async fn with_timeout<F, T>(timeout: Option<Duration>, task: F) -> std::result::Result<T, String>
where
    F: Future<Output = std::result::Result<T, ConnectorError>>,
{
    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, task).await {
            Ok(result) => result,
            Err(_) => Err(ConnectorError::timeout(limit)),
        },
        None => task.await,
    };
    result.map_err(|e| e.to_string())
}

async fn run_repo(
    mode: Mode,
    connector: Arc<dyn LabelConnector>,
    rules: Arc<RuleSet>,
    repo: RepoSlug,
) -> std::result::Result<TaskResult, ConnectorError> {
    debug!(repo = %repo, stage = ?PassStage::Fetching);
    let labels = connector.list_labels(&repo).await?;

    debug!(repo = %repo, stage = ?PassStage::Classifying, labels = labels.len());
    let violations = classify(&labels, &rules);
    emit_repo_checked(repo.as_str(), labels.len(), violations.len());

    let result = match mode {
        Mode::Check => TaskResult::Checked(violations),
        Mode::Fix => {
            debug!(repo = %repo, stage = ?PassStage::Resolving, violations = violations.len());
            let resolver = Resolver::new(connector, repo.clone());
            let outcomes = resolver.resolve_all(&rules, violations).await;
            TaskResult::Fixed(RepoFix::Attempted { outcomes })
        }
    };
    debug!(repo = %repo, stage = ?PassStage::Done);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::connector::fakes::{MemoryConnector, Operation};
    use crate::connector::ConnectorResult;
    use crate::domain::{Label, LabelRule, ViolationKind};
    use crate::webhook::LabelAction;

    /// Delegates to a [`MemoryConnector`], stalling listings of one repository.
    struct StallingConnector {
        inner: MemoryConnector,
        stalled: RepoSlug,
        stall: Duration,
    }

    #[async_trait]
    impl LabelConnector for StallingConnector {
        async fn list_labels(&self, repo: &RepoSlug) -> ConnectorResult<Vec<Label>> {
            if *repo == self.stalled {
                tokio::time::sleep(self.stall).await;
            }
            self.inner.list_labels(repo).await
        }

        async fn create_label(&self, repo: &RepoSlug, label: &Label) -> ConnectorResult<()> {
            self.inner.create_label(repo, label).await
        }

        async fn update_label(&self, repo: &RepoSlug, label: &Label) -> ConnectorResult<()> {
            self.inner.update_label(repo, label).await
        }

        async fn delete_label(&self, repo: &RepoSlug, label: &Label) -> ConnectorResult<()> {
            self.inner.delete_label(repo, label).await
        }
    }

    fn slug(s: &str) -> RepoSlug {
        RepoSlug::parse(s).unwrap()
    }

    fn rules() -> Arc<RuleSet> {
        Arc::new(
            RuleSet::from_rules(vec![(
                "bug".to_string(),
                LabelRule {
                    color: "#d73a4a".to_string(),
                    description: "desc".to_string(),
                },
            )])
            .unwrap(),
        )
    }

    fn service(connector: &Arc<MemoryConnector>, repos: &[(&str, bool)]) -> Service {
        Service::new(
            "github",
            connector.clone(),
            repos.iter().map(|(r, e)| (slug(r), *e)).collect(),
        )
    }

    #[tokio::test]
    async fn test_check_skips_disabled_repos() {
        let connector = Arc::new(
            MemoryConnector::new()
                .with_labels(&slug("octo/on"), [Label::new("bug", "ffffff", "desc")])
                .with_labels(&slug("octo/off"), Vec::new()),
        );
        let svc = service(&connector, &[("octo/on", true), ("octo/off", false)]);

        let report = Reconciler::default().check(&[svc], rules()).await;
        let repos = &report.services["github"];
        assert_eq!(repos.len(), 1);
        let violations = repos[&slug("octo/on")].violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::Color);
    }

    #[tokio::test]
    async fn test_failed_listing_only_fails_that_repo() {
        let connector = Arc::new(
            MemoryConnector::new()
                .with_labels(&slug("octo/a"), [Label::new("bug", "d73a4a", "desc")])
                .with_labels(&slug("octo/b"), Vec::new()),
        );
        connector.fail_on(Operation::List, &slug("octo/b"));
        let svc = service(&connector, &[("octo/a", true), ("octo/b", true)]);

        let report = Reconciler::default().check(&[svc], rules()).await;
        assert!(report.get("github", &slug("octo/a")).unwrap().is_compliant());
        assert!(matches!(
            report.get("github", &slug("octo/b")),
            Some(RepoCheck::Failed { .. })
        ));
    }

    #[tokio::test]
    async fn test_fix_converges() {
        let connector = Arc::new(MemoryConnector::new().with_labels(
            &slug("octo/a"),
            [Label::new("bug", "ffffff", "wrong"), Label::new("stale", "000000", "")],
        ));
        let svc = service(&connector, &[("octo/a", true)]);
        let reconciler = Reconciler::default();

        let report = reconciler.fix(&[svc.clone()], rules()).await;
        assert!(report.repo_succeeded("github", &slug("octo/a")));
        assert_eq!(report.flags("github", &slug("octo/a")).len(), 3);

        let after = reconciler.check(&[svc], rules()).await;
        assert!(after.is_compliant());
    }

    #[tokio::test]
    async fn test_event_for_disabled_repo_rejected() {
        let connector = Arc::new(MemoryConnector::new());
        let svc = service(&connector, &[("octo/off", false)]);
        let event = LabelEvent {
            repo: slug("octo/off"),
            action: LabelAction::Created,
            label: Label::new("bug", "d73a4a", "desc"),
            color_present: true,
            description_present: true,
        };
        let err = Reconciler::default()
            .reconcile_event(&svc, rules(), event)
            .await
            .unwrap_err();
        assert!(matches!(err, LabelsyncError::RepositoryNotEnabled { .. }));
    }

    #[tokio::test]
    async fn test_event_deleted_recreates_without_listing() {
        let connector = Arc::new(MemoryConnector::new().with_labels(&slug("octo/a"), Vec::new()));
        let svc = service(&connector, &[("octo/a", true)]);
        let event = LabelEvent {
            repo: slug("octo/a"),
            action: LabelAction::Deleted,
            label: Label::new("bug", "d73a4a", "desc"),
            color_present: true,
            description_present: true,
        };

        let outcome = Reconciler::default()
            .reconcile_event(&svc, rules(), event)
            .await
            .unwrap();
        assert!(outcome.succeeded());
        assert_eq!(connector.labels(&slug("octo/a")), vec![Label::new("bug", "d73a4a", "desc")]);
        assert!(connector.calls().iter().all(|c| c.op != Operation::List));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repo_timeout_fails_only_the_slow_repo() {
        let connector = Arc::new(StallingConnector {
            inner: MemoryConnector::new()
                .with_labels(&slug("octo/fast"), [Label::new("bug", "d73a4a", "desc")])
                .with_labels(&slug("octo/slow"), [Label::new("bug", "d73a4a", "desc")]),
            stalled: slug("octo/slow"),
            stall: Duration::from_secs(30),
        });
        let svc = Service::new(
            "github",
            connector,
            [(slug("octo/fast"), true), (slug("octo/slow"), true)]
                .into_iter()
                .collect(),
        );
        let reconciler = Reconciler::new(ReconcileOptions {
            repo_timeout: Some(Duration::from_millis(200)),
        });

        let report = reconciler.check(&[svc.clone()], rules()).await;
        assert!(matches!(
            report.get("github", &slug("octo/fast")),
            Some(RepoCheck::Checked { violations }) if violations.is_empty()
        ));
        match report.get("github", &slug("octo/slow")) {
            Some(RepoCheck::Failed { error }) => assert_eq!(error, "timed out after 200ms"),
            other => panic!("expected a timed out repository, got {other:?}"),
        }
        assert!(!report.is_compliant());

        let fixed = reconciler.fix(&[svc], rules()).await;
        assert!(fixed.repo_succeeded("github", &slug("octo/fast")));
        assert!(matches!(
            fixed.services["github"][&slug("octo/slow")],
            RepoFix::Failed { .. }
        ));
    }

    #[tokio::test]
    async fn test_rename_label_reaches_enabled_repos_only() {
        let connector = Arc::new(
            MemoryConnector::new()
                .with_labels(&slug("octo/a"), [Label::new("bug", "d73a4a", "desc")])
                .with_labels(&slug("octo/b"), Vec::new())
                .with_labels(&slug("octo/off"), [Label::new("bug", "d73a4a", "desc")]),
        );
        connector.fail_on(Operation::Update, &slug("octo/b"));
        let svc = service(&connector, &[("octo/a", true), ("octo/b", true), ("octo/off", false)]);
        let rule = LabelRule::new("defect", "#d73a4a", "desc").unwrap();

        let results = Reconciler::default()
            .rename_label(&[svc], "bug", "defect", &rule)
            .await;
        let repos = &results["github"];
        assert_eq!(repos.len(), 2);
        assert_eq!(repos[&slug("octo/a")], Ok(true));
        assert!(repos[&slug("octo/b")].is_err());
        assert_eq!(connector.labels(&slug("octo/a")), vec![Label::new("defect", "d73a4a", "desc")]);
        assert_eq!(connector.labels(&slug("octo/off"))[0].name, "bug");
    }
}
