//! HTTP management API and router for the daemon.
//!
//! - `/health` - liveness
//! - `/labels` - webhook receiver (see [`crate::webhooks`])
//! - `/check/labels` - on-demand check (GET) or fix (POST) pass
//! - `/rules` - list, add, edit and delete label rules
//! - `/repos` - list, register and toggle repositories
//! - `/config` - persist rules and repositories to the local labels file

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{info, warn};

use labelsync_core::{
    Config, ConfigurationError, LabelRule, LabelsFile, Reconciler, RepoRegistry, RepoSlug, RuleSet,
    Service,
};

use crate::webhooks::labels_webhook;

/// Shared daemon state.
///
/// Rules and registrations are swapped, never edited in place: a pass or
/// webhook takes a snapshot and keeps it even if an edit lands meanwhile.
pub struct AppState {
    pub config: Config,
    pub reconciler: Reconciler,
    services: RwLock<Vec<Service>>,
    rules: RwLock<Arc<RuleSet>>,
}

impl AppState {
    pub fn new(config: Config, services: Vec<Service>, rules: RuleSet) -> Self {
        let reconciler = Reconciler::new(config.reconcile.options());
        Self {
            config,
            reconciler,
            services: RwLock::new(services),
            rules: RwLock::new(Arc::new(rules)),
        }
    }

    pub async fn snapshot(&self) -> (Vec<Service>, Arc<RuleSet>) {
        let services = self.services.read().await.clone();
        let rules = Arc::clone(&*self.rules.read().await);
        (services, rules)
    }

    async fn labels_file(&self) -> LabelsFile {
        let (services, rules) = self.snapshot().await;
        LabelsFile {
            repos: services
                .into_iter()
                .map(|service| (service.name, service.repos))
                .collect(),
            labels: (*rules).clone(),
        }
    }

    /// Apply `edit` to the current rule set and swap the result in.
    async fn edit_rules<F>(&self, edit: F) -> Result<Arc<RuleSet>, ConfigurationError>
    where
        F: FnOnce(&RuleSet) -> Result<RuleSet, ConfigurationError>,
    {
        let mut guard = self.rules.write().await;
        let next = Arc::new(edit(&**guard)?);
        *guard = Arc::clone(&next);
        Ok(next)
    }
}

/// JSON error body with a status code.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<ConfigurationError> for ApiError {
    fn from(err: ConfigurationError) -> Self {
        match err {
            ConfigurationError::UnknownRule(_) | ConfigurationError::UnknownRepository { .. } => {
                ApiError::NotFound(err.to_string())
            }
            ConfigurationError::Io(_) | ConfigurationError::Render(_) => {
                ApiError::Internal(err.to_string())
            }
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/labels", post(labels_webhook))
        .route("/check/labels", get(check_handler).post(fix_handler))
        .route(
            "/rules",
            get(list_rules)
                .post(add_rule)
                .put(edit_rule)
                .delete(delete_rule),
        )
        .route("/repos", get(list_repos).post(register_repo).put(toggle_repo))
        .route("/config", post(save_config))
        .with_state(state)
}

async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": labelsync_core::VERSION,
    }))
}

/// `{service: [non-compliant repos]}`.
async fn check_handler(State(state): State<Arc<AppState>>) -> Json<BTreeMap<String, Vec<RepoSlug>>> {
    let (services, rules) = state.snapshot().await;
    let report = state.reconciler.check(&services, rules).await;
    info!(
        pass_id = %report.pass_id,
        violations = report.violation_count(),
        "check pass requested over HTTP"
    );
    Json(report.non_compliant())
}

/// `{service: [repos whose every fix succeeded]}`.
async fn fix_handler(State(state): State<Arc<AppState>>) -> Json<BTreeMap<String, Vec<RepoSlug>>> {
    let (services, rules) = state.snapshot().await;
    let report = state.reconciler.fix(&services, rules).await;
    if !report.all_succeeded() {
        warn!(pass_id = %report.pass_id, "fix pass finished with failures");
    }
    Json(report.fixed())
}

#[derive(Debug, Deserialize)]
struct RuleRequest {
    name: String,
    color: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct EditRuleRequest {
    #[serde(alias = "oldName")]
    old_name: String,
    name: String,
    color: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct DeleteRuleRequest {
    name: String,
}

async fn list_rules(State(state): State<Arc<AppState>>) -> Json<RuleSet> {
    let (_, rules) = state.snapshot().await;
    Json((*rules).clone())
}

async fn add_rule(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RuleRequest>,
) -> Result<(StatusCode, Json<RuleSet>), ApiError> {
    let rule = LabelRule::new(&req.name, req.color, req.description)?;
    let rules = state.edit_rules(|rules| rules.with_rule(&req.name, rule)).await?;
    info!(label = %req.name, "rule added");
    Ok((StatusCode::CREATED, Json((*rules).clone())))
}

async fn edit_rule(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EditRuleRequest>,
) -> Result<Json<RuleSet>, ApiError> {
    let rule = LabelRule::new(&req.name, req.color, req.description)?;
    let rules = state
        .edit_rules(|rules| rules.with_replaced(&req.old_name, &req.name, rule.clone()))
        .await?;
    info!(from = %req.old_name, to = %req.name, "rule edited");

    if req.old_name != req.name {
        let (services, _) = state.snapshot().await;
        let results = state
            .reconciler
            .rename_label(&services, &req.old_name, &req.name, &rule)
            .await;
        let failed = results
            .values()
            .flat_map(BTreeMap::values)
            .filter(|result| result.is_err())
            .count();
        if failed > 0 {
            warn!(from = %req.old_name, to = %req.name, failed, "label rename not applied everywhere");
        }
    }
    Ok(Json((*rules).clone()))
}

async fn delete_rule(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DeleteRuleRequest>,
) -> Result<Json<RuleSet>, ApiError> {
    let rules = state.edit_rules(|rules| rules.without(&req.name)).await?;
    info!(label = %req.name, "rule deleted");
    Ok(Json((*rules).clone()))
}

#[derive(Debug, Deserialize)]
struct RepoRequest {
    service: String,
    reposlug: RepoSlug,
    enabled: bool,
}

async fn list_repos(State(state): State<Arc<AppState>>) -> Json<BTreeMap<String, RepoRegistry>> {
    let (services, _) = state.snapshot().await;
    Json(
        services
            .into_iter()
            .map(|service| (service.name, service.repos))
            .collect(),
    )
}

/// Register a repository or flip its enabled flag.
async fn register_repo(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RepoRequest>,
) -> Result<Json<RepoRegistry>, ApiError> {
    let mut services = state.services.write().await;
    let service = services
        .iter_mut()
        .find(|s| s.name == req.service)
        .ok_or_else(|| ApiError::BadRequest(format!("Service '{}' is not supported", req.service)))?;
    service.repos.register(req.reposlug.clone(), req.enabled);
    info!(service = %req.service, repo = %req.reposlug, enabled = req.enabled, "repository registered");
    Ok(Json(service.repos.clone()))
}

/// Enable or disable an already-registered repository.
async fn toggle_repo(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RepoRequest>,
) -> Result<Json<RepoRegistry>, ApiError> {
    let mut services = state.services.write().await;
    let service = services
        .iter_mut()
        .find(|s| s.name == req.service)
        .ok_or_else(|| ApiError::BadRequest(format!("Service '{}' is not supported", req.service)))?;
    service
        .repos
        .set_enabled(&req.service, &req.reposlug, req.enabled)?;
    info!(service = %req.service, repo = %req.reposlug, enabled = req.enabled, "repository toggled");
    Ok(Json(service.repos.clone()))
}

async fn save_config(State(state): State<Arc<AppState>>) -> Result<&'static str, ApiError> {
    let labels = state.labels_file().await;
    state.config.save_labels(&labels)?;
    Ok("OK")
}
