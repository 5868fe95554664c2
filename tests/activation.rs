mod common;

use std::sync::Arc;
use std::time::Duration;
use url::Url;

use common::{engine_with, start_programmable_backend, tree};
use staged_config::commit::{ActivationError, Activator, ApplyFailure, HttpActivator};

fn activator(url: &str) -> HttpActivator {
    HttpActivator::new(Url::parse(url).unwrap(), None, Duration::from_secs(2)).unwrap()
}

#[tokio::test]
async fn test_accepted_candidate_is_posted_once() {
    let backend =
        start_programmable_backend(|_| async { (200, r#"{"success":true}"#.to_string()) }).await;
    let activator = activator(&backend.url("/activate"));

    let candidate = tree(&[("system host-name", Some("edge"))]);
    activator.activate(&candidate).await.unwrap();

    assert_eq!(backend.calls(), 1);
    let bodies = backend.bodies();
    assert!(bodies[0].contains("config"));
    assert!(bodies[0].contains("edge"));
}

#[tokio::test]
async fn test_error_status_is_rejected() {
    let backend = start_programmable_backend(|_| async { (500, "boom".to_string()) }).await;
    let activator = activator(&backend.url("/activate"));

    let err = activator.activate(&tree(&[])).await.unwrap_err();
    assert!(matches!(err, ActivationError::Rejected(_)), "{:?}", err);
}

#[tokio::test]
async fn test_success_false_reply_is_rejected() {
    let backend = start_programmable_backend(|_| async {
        (200, r#"{"success":false,"error":"x"}"#.to_string())
    })
    .await;
    let activator = activator(&backend.url("/activate"));

    match activator.activate(&tree(&[])).await {
        Err(ActivationError::Rejected(detail)) => assert_eq!(detail, "x"),
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_endpoint_is_transport_error() {
    // Bind then drop so the port is closed.
    let addr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let activator = activator(&format!("http://{}/activate", addr));

    let err = activator.activate(&tree(&[])).await.unwrap_err();
    assert!(matches!(err, ActivationError::Transport(_)), "{:?}", err);
}

#[tokio::test]
async fn test_failed_activation_leaves_active_unchanged() {
    let backend = start_programmable_backend(|_| async { (503, String::new()) }).await;
    let engine = engine_with(Arc::new(activator(&backend.url("/activate"))));

    let result = engine
        .apply_tree(tree(&[("system host-name", Some("edge"))]), None, None)
        .await;

    assert!(!result.success);
    assert_eq!(result.failure, Some(ApplyFailure::Activation));
    assert_eq!(engine.active_version(), 0);
    assert!(engine.history().is_empty());
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_successful_activation_records_version() {
    let backend = start_programmable_backend(|_| async { (200, String::new()) }).await;
    let engine = engine_with(Arc::new(activator(&backend.url("/activate"))));

    let result = engine
        .apply_tree(tree(&[("system host-name", Some("edge"))]), None, None)
        .await;

    assert!(result.success, "{:?}", result.message);
    assert_eq!(engine.active_version(), 1);
    assert_eq!(backend.calls(), 1);
}
