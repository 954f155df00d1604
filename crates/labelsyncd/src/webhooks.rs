//! `POST /labels`: verify, parse and reconcile a webhook delivery.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use labelsync_core::obs::emit_webhook_received;
use labelsync_core::webhook::{
    parse_github, parse_gitlab, service_from_headers, verify_github_signature, verify_gitlab_token,
    GITHUB_SIGNATURE_HEADER, GITLAB_TOKEN_HEADER,
};
use labelsync_core::{WebhookDispatch, WebhookError};

use crate::server::AppState;

fn reply(status: StatusCode, body: &'static str) -> Response {
    (status, body).into_response()
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

pub async fn labels_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(service_name) = service_from_headers(headers.keys().map(|name| name.as_str())) else {
        return reply(StatusCode::BAD_REQUEST, "Service is not supported");
    };
    let event_header = format!("x-{service_name}-event");
    let event_type = header(&headers, &event_header).unwrap_or_default();
    emit_webhook_received(&service_name, event_type);

    let (services, rules) = state.snapshot().await;
    let (Some(service), Some(secret)) = (
        services.iter().find(|s| s.name == service_name),
        state.config.secret(&service_name),
    ) else {
        return reply(StatusCode::BAD_REQUEST, "Service is not supported");
    };

    let parsed = match service_name.as_str() {
        "github" => {
            let Some(signature) = header(&headers, GITHUB_SIGNATURE_HEADER) else {
                return reply(StatusCode::BAD_REQUEST, "X-Hub-Signature-256 required");
            };
            if !verify_github_signature(&body, signature, secret) {
                return reply(StatusCode::BAD_REQUEST, "Invalid secret");
            }
            parse_github(event_type, &body)
        }
        "gitlab" => {
            let token = header(&headers, GITLAB_TOKEN_HEADER).unwrap_or_default();
            if !verify_gitlab_token(token, secret) {
                return reply(StatusCode::BAD_REQUEST, "Invalid secret");
            }
            parse_gitlab(event_type, &body)
        }
        _ => return reply(StatusCode::BAD_REQUEST, "Service is not supported"),
    };

    let (repo, events) = match parsed {
        Ok(WebhookDispatch::Ping) => return reply(StatusCode::OK, "OK"),
        Ok(WebhookDispatch::Ignored { event }) => {
            debug!(service = %service_name, event = %event, "ignoring webhook event");
            return reply(StatusCode::OK, "Ignored");
        }
        Ok(WebhookDispatch::Labels { repo, events }) => (repo, events),
        Err(WebhookError::UnsupportedEvent(event)) => {
            debug!(service = %service_name, event = %event, "unsupported webhook event");
            return reply(StatusCode::BAD_REQUEST, "Invalid event");
        }
        Err(e) => {
            warn!(service = %service_name, error = %e, "rejected webhook payload");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    if !service.repos.is_enabled(&repo) {
        return reply(StatusCode::BAD_REQUEST, "Repository is not supported");
    }

    let mut all_succeeded = true;
    for event in events {
        match state
            .reconciler
            .reconcile_event(service, Arc::clone(&rules), event)
            .await
        {
            Ok(outcome) => all_succeeded &= outcome.succeeded(),
            Err(e) => {
                warn!(service = %service_name, repo = %repo, error = %e, "webhook reconciliation failed");
                all_succeeded = false;
            }
        }
    }

    if all_succeeded {
        reply(StatusCode::OK, "OK")
    } else {
        reply(StatusCode::INTERNAL_SERVER_ERROR, "Something wrong")
    }
}
