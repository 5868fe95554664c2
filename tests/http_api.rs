mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use staged_config::config::ServiceConfig;
use staged_config::http::{build_router, AppState};

fn app_with(settings: ServiceConfig) -> Router {
    build_router(AppState::new(common::engine(), settings))
}

fn app() -> Router {
    app_with(ServiceConfig::default())
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    session: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(session) = session {
        builder = builder.header("x-session-id", session);
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_stage_commit_and_read_back() {
    let app = app();

    let (status, body) = send(
        &app,
        Method::POST,
        "/config",
        None,
        Some(json!({"path": "interfaces eth0 address", "value": "192.168.1.1/24"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["pendingChanges"], 1);

    let (status, body) = send(&app, Method::POST, "/config/commit", None, None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["version"], 1);

    let (status, body) = send(&app, Method::GET, "/config?node=interfaces/eth0", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["config"]["address"], "192.168.1.1/24");
    assert_eq!(body["version"], 1);
    assert_eq!(body["pendingChanges"], 0);

    let (_, body) = send(&app, Method::GET, "/config/history", None, None).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["entries"][0]["changeType"], "configure");
}

#[tokio::test]
async fn test_invalid_candidate_is_unprocessable() {
    let app = app();
    send(
        &app,
        Method::POST,
        "/config",
        None,
        Some(json!({"path": ["firewall", "rule", "100", "destination-port"], "value": 99999})),
    )
    .await;

    let (status, body) = send(&app, Method::POST, "/config/validate", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], false);
    assert_eq!(body["errors"].as_array().unwrap().len(), 1);

    let (status, body) = send(&app, Method::POST, "/config/commit", None, None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["success"], false);
    assert_eq!(body["failure"], "validation");
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    let app = app();
    send(
        &app,
        Method::POST,
        "/config",
        Some("alice"),
        Some(json!({"path": "system host-name", "value": "edge"})),
    )
    .await;

    let (_, alice) = send(&app, Method::GET, "/config", Some("alice"), None).await;
    let (_, bob) = send(&app, Method::GET, "/config", Some("bob"), None).await;
    assert_eq!(alice["config"]["system"]["host-name"], "edge");
    assert_eq!(bob["config"], json!({}));

    let (status, body) = send(&app, Method::POST, "/config/discard", Some("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Discarded 1 pending change(s)");
}

#[tokio::test]
async fn test_errors_use_the_error_body() {
    let app = app();

    let (status, body) = send(&app, Method::GET, "/config/history/9", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status_code"], 404);
    assert!(body["error"].as_str().unwrap().contains("version 9"));

    let (status, body) = send(
        &app,
        Method::DELETE,
        "/config",
        None,
        Some(json!({"path": "system host-name"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND, "{}", body);

    let (status, _) = send(&app, Method::POST, "/config", None, Some(json!({"value": "x"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_apply_diff_and_rollback() {
    let app = app();
    for name in ["first", "second"] {
        let (status, body) = send(
            &app,
            Method::POST,
            "/config/apply",
            None,
            Some(json!({"config": {"system": {"host-name": name}}, "comment": name})),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
    }

    let (status, body) = send(
        &app,
        Method::POST,
        "/config/diff",
        None,
        Some(json!({"versionFrom": 1, "versionTo": 2, "format": "text"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["formattedDiff"], "~ system host-name first -> second");

    let (status, body) = send(
        &app,
        Method::POST,
        "/config/rollback",
        None,
        Some(json!({"version": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["version"], 3);

    let (_, body) = send(&app, Method::GET, "/config/history/3", None, None).await;
    assert_eq!(body["changeType"], "rollback");
    assert_eq!(body["config"]["system"]["host-name"], "first");
}

#[tokio::test]
async fn test_export_and_import() {
    let app = app();
    send(
        &app,
        Method::POST,
        "/config/apply",
        None,
        Some(json!({"config": {"system": {"host-name": "edge"}}})),
    )
    .await;

    let request = Request::builder()
        .uri("/config/export?format=cli")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(String::from_utf8(bytes.to_vec()).unwrap().trim(), "set system host-name 'edge'");

    let request = Request::builder()
        .method(Method::POST)
        .uri("/config/import?format=cli&merge=true&dryRun=true")
        .body(Body::from("set system time-zone 'UTC'\n"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // A dry run leaves the active version alone.
    let (_, body) = send(&app, Method::GET, "/config", None, None).await;
    assert_eq!(body["version"], 1);
    assert!(body["config"]["system"].get("time-zone").is_none());
}

#[tokio::test]
async fn test_search_and_stats() {
    let app = app();
    send(
        &app,
        Method::POST,
        "/config/bulk",
        None,
        Some(json!({"changes": [
            {"kind": "set", "path": "interfaces eth0 address", "value": "10.0.0.1/24"},
            {"kind": "set", "path": "interfaces eth1 address", "value": "10.0.1.1/24"},
            {"kind": "delete", "path": "system missing"}
        ]})),
    )
    .await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/config/search",
        None,
        Some(json!({"query": "eth"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);

    let (_, body) = send(&app, Method::GET, "/config/stats", None, None).await;
    assert_eq!(body["pendingChanges"], 2);
    assert_eq!(body["stats"]["leafNodes"], 2);
}

#[tokio::test]
async fn test_request_id_is_returned() {
    let app = app();
    let request = Request::builder().uri("/config").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
}

#[tokio::test]
async fn test_admin_requires_key() {
    let closed = app();
    let (status, _) = send(&closed, Method::GET, "/admin/status", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let mut settings = ServiceConfig::default();
    settings.admin.enabled = true;
    settings.admin.api_key = "secret".into();
    let app = app_with(settings);

    let (status, _) = send(&app, Method::GET, "/admin/status", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/admin/status")
        .header(header::AUTHORIZATION, "Bearer secret")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["active_version"], 0);
    assert_eq!(body["state"], "idle");
}
