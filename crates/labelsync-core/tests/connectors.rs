//! HTTP contracts of the GitHub and GitLab connectors, checked against a
//! wiremock server.

use std::time::Duration;

use labelsync_core::{ConnectorError, GitHubConnector, GitLabConnector, Label, LabelConnector, RepoSlug};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(5);

fn slug(s: &str) -> RepoSlug {
    RepoSlug::parse(s).unwrap()
}

#[tokio::test]
async fn test_github_lists_every_page() {
    let server = MockServer::start().await;
    let next = format!("<{}/repos/octo/widgets/labels?page=2&per_page=100>; rel=\"next\"", server.uri());

    Mock::given(method("GET"))
        .and(path("/repos/octo/widgets/labels"))
        .and(query_param_is_missing("page"))
        .and(query_param("per_page", "100"))
        .and(header("authorization", "token gh-token"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("link", next.as_str())
                .set_body_json(json!([
                    {"name": "bug", "color": "D73A4A", "description": "Something isn't working"}
                ])),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/octo/widgets/labels"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"name": "wontfix", "color": "ffffff", "description": null}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let connector = GitHubConnector::with_base_url(&server.uri(), "gh-token", TIMEOUT).unwrap();
    let labels = connector.list_labels(&slug("octo/widgets")).await.unwrap();
    assert_eq!(
        labels,
        vec![
            Label::new("bug", "d73a4a", "Something isn't working"),
            Label::new("wontfix", "ffffff", ""),
        ]
    );
}

#[tokio::test]
async fn test_github_update_addresses_remote_name() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/repos/octo/widgets/labels/good%20first%20issue"))
        .and(body_json(json!({
            "new_name": "good first issue",
            "color": "7057ff",
            "description": "Good for newcomers"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let connector = GitHubConnector::with_base_url(&server.uri(), "gh-token", TIMEOUT).unwrap();
    let label = Label::new("good first issue", "#7057FF", "Good for newcomers");
    connector
        .update_label(&slug("octo/widgets"), &label)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_github_create_and_delete() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/repos/octo/widgets/labels"))
        .and(body_json(json!({"name": "bug", "color": "d73a4a", "description": ""})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/repos/octo/widgets/labels/wontfix"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let connector = GitHubConnector::with_base_url(&server.uri(), "gh-token", TIMEOUT).unwrap();
    let repo = slug("octo/widgets");
    connector
        .create_label(&repo, &Label::new("bug", "d73a4a", ""))
        .await
        .unwrap();
    connector
        .delete_label(&repo, &Label::new("wontfix", "ffffff", ""))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_github_status_errors_surface() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let connector = GitHubConnector::with_base_url(&server.uri(), "gh-token", TIMEOUT).unwrap();
    let repo = slug("octo/widgets");

    let err = connector
        .delete_label(&repo, &Label::new("gone", "ffffff", ""))
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let err = connector.list_labels(&repo).await.unwrap_err();
    assert!(matches!(err, ConnectorError::Status { status: 500, .. }));
}

#[tokio::test]
async fn test_github_malformed_listing_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&server)
        .await;

    let connector = GitHubConnector::with_base_url(&server.uri(), "gh-token", TIMEOUT).unwrap();
    let err = connector.list_labels(&slug("octo/widgets")).await.unwrap_err();
    assert!(matches!(err, ConnectorError::Decode(_)));
}

#[tokio::test]
async fn test_slow_service_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([]))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let connector =
        GitHubConnector::with_base_url(&server.uri(), "gh-token", Duration::from_millis(200)).unwrap();
    let err = connector.list_labels(&slug("octo/widgets")).await.unwrap_err();
    assert_eq!(err, ConnectorError::Timeout { after_ms: 200 });
}

#[tokio::test]
async fn test_gitlab_strips_and_adds_hash() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/group%2Fproject/labels"))
        .and(header("private-token", "gl-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 1, "name": "bug", "color": "#D73A4A", "description": null}
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/v4/projects/group%2Fproject/labels/bug"))
        .and(body_json(json!({
            "new_name": "bug",
            "color": "#d73a4a",
            "description": "Something isn't working"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v4/projects/group%2Fproject/labels"))
        .and(body_json(json!({"name": "todo", "color": "#00ff00", "description": ""})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let base = format!("{}/api/v4", server.uri());
    let connector = GitLabConnector::with_base_url(&base, "gl-token", TIMEOUT).unwrap();
    let repo = slug("group/project");

    let labels = connector.list_labels(&repo).await.unwrap();
    assert_eq!(labels, vec![Label::new("bug", "d73a4a", "")]);

    let mut bug = labels.into_iter().next().unwrap();
    bug.description = "Something isn't working".to_string();
    connector.update_label(&repo, &bug).await.unwrap();
    connector
        .create_label(&repo, &Label::new("todo", "00ff00", ""))
        .await
        .unwrap();
}
