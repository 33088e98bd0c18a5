use std::sync::Arc;
use std::time::Duration;

use backend_bridge::{BackendError, NewSessionOutcome};
use backend_mock::{CallRecord, MockBackend};
use serde_json::json;
use session_router::{EnsureOutcome, SessionDefaults, SessionPrefs, SessionRouter};

fn defaults() -> SessionDefaults {
    SessionDefaults {
        mode_id: "agent".to_string(),
        model_id: "gpt-5.1-codex".to_string(),
    }
}

fn router(backend: &Arc<MockBackend>) -> SessionRouter {
    SessionRouter::new(Arc::clone(backend) as Arc<dyn backend_bridge::BackendClient>, defaults())
}

fn prefs(cwd: &str) -> SessionPrefs {
    SessionPrefs {
        cwd: cwd.to_string(),
        mode_id: None,
        model_id: None,
    }
}

fn outcome_with_modes(session_id: &str, current: &str, available: &[&str]) -> NewSessionOutcome {
    let mut outcome = NewSessionOutcome::new(session_id);
    outcome.modes = Some(json!({
        "current_mode_id": current,
        "available_modes": available
            .iter()
            .map(|id| json!({ "id": id, "name": id }))
            .collect::<Vec<_>>(),
    }));
    outcome
}

#[tokio::test]
async fn creates_once_and_routes_both_directions() {
    let backend = Arc::new(MockBackend::new());
    let router = router(&backend);

    let first = router
        .ensure_session("chat-1", &prefs("/work"))
        .await
        .expect("created");
    assert!(matches!(first, EnsureOutcome::Created(_)));
    let backend_id = first.backend_session_id().to_string();

    let second = router
        .ensure_session("chat-1", &prefs("/work"))
        .await
        .expect("reused");
    assert_eq!(second, EnsureOutcome::Existing(backend_id.clone()));

    assert_eq!(backend.create_session_calls(), 1);
    assert_eq!(
        router.resolve_chat_session_id(&backend_id).as_deref(),
        Some("chat-1")
    );
    assert_eq!(
        router.backend_session_id("chat-1").as_deref(),
        Some(backend_id.as_str())
    );
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_join_one_inflight_creation() {
    let backend = Arc::new(MockBackend::new());
    backend.set_create_delay(Duration::from_millis(50));
    let router = Arc::new(router(&backend));

    let first = {
        let router = Arc::clone(&router);
        tokio::spawn(async move { router.ensure_session("chat-1", &prefs("/work")).await })
    };
    let second = {
        let router = Arc::clone(&router);
        tokio::spawn(async move { router.ensure_session("chat-1", &prefs("/work")).await })
    };

    let first = first.await.expect("task").expect("created");
    let second = second.await.expect("task").expect("joined");

    assert_eq!(backend.create_session_calls(), 1);
    assert_eq!(first.backend_session_id(), second.backend_session_id());
}

#[tokio::test]
async fn distinct_chat_sessions_get_distinct_backend_sessions() {
    let backend = Arc::new(MockBackend::new());
    let router = router(&backend);

    let first = router
        .ensure_session("chat-1", &prefs("/a"))
        .await
        .expect("created");
    let second = router
        .ensure_session("chat-2", &prefs("/b"))
        .await
        .expect("created");

    assert_ne!(first.backend_session_id(), second.backend_session_id());
    assert_eq!(backend.create_session_calls(), 2);
}

#[tokio::test]
async fn blank_cwd_falls_back_to_current_directory() {
    let backend = Arc::new(MockBackend::new());
    let router = router(&backend);

    router
        .ensure_session("chat-1", &prefs("   "))
        .await
        .expect("created");

    assert_eq!(
        backend.calls()[0],
        CallRecord::CreateSession {
            cwd: ".".to_string()
        }
    );
}

#[tokio::test]
async fn syncs_desired_mode_when_it_differs_and_is_offered() {
    let backend = Arc::new(MockBackend::new());
    backend.push_create_session(Ok(outcome_with_modes("backend-1", "chat", &["chat", "agent"])));
    let router = router(&backend);

    let mut prefs = prefs("/work");
    prefs.mode_id = Some("agent".to_string());

    let outcome = router
        .ensure_session("chat-1", &prefs)
        .await
        .expect("created");
    let EnsureOutcome::Created(bootstrap) = outcome else {
        panic!("expected creation");
    };

    assert_eq!(bootstrap.mode.selected.as_deref(), Some("agent"));
    assert!(bootstrap.mode.error.is_none());
    assert!(backend.calls().contains(&CallRecord::SetMode {
        session_id: "backend-1".to_string(),
        mode_id: "agent".to_string(),
    }));
}

#[tokio::test]
async fn skips_sync_when_backend_already_runs_the_desired_mode() {
    let backend = Arc::new(MockBackend::new());
    backend.push_create_session(Ok(outcome_with_modes("backend-1", "agent", &["chat", "agent"])));
    let router = router(&backend);

    let mut prefs = prefs("/work");
    prefs.mode_id = Some("agent".to_string());

    router
        .ensure_session("chat-1", &prefs)
        .await
        .expect("created");

    assert!(!backend
        .calls()
        .iter()
        .any(|call| matches!(call, CallRecord::SetMode { .. })));
}

#[tokio::test]
async fn failed_sync_falls_back_to_backend_current_value() {
    let backend = Arc::new(MockBackend::new());
    backend.push_create_session(Ok(outcome_with_modes("backend-1", "chat", &["chat", "agent"])));
    backend.push_set_mode(Err(BackendError::transport("mode rejected")));
    let router = router(&backend);

    let mut prefs = prefs("/work");
    prefs.mode_id = Some("agent".to_string());

    let EnsureOutcome::Created(bootstrap) = router
        .ensure_session("chat-1", &prefs)
        .await
        .expect("created")
    else {
        panic!("expected creation");
    };

    assert_eq!(bootstrap.mode.selected.as_deref(), Some("chat"));
    assert_eq!(
        bootstrap.mode.error,
        Some(BackendError::transport("mode rejected"))
    );
}

#[tokio::test]
async fn desired_mode_not_offered_is_not_synced() {
    let backend = Arc::new(MockBackend::new());
    backend.push_create_session(Ok(outcome_with_modes("backend-1", "chat", &["chat", "agent"])));
    let router = router(&backend);

    let mut prefs = prefs("/work");
    prefs.mode_id = Some("yolo".to_string());

    let EnsureOutcome::Created(bootstrap) = router
        .ensure_session("chat-1", &prefs)
        .await
        .expect("created")
    else {
        panic!("expected creation");
    };

    // The unavailable preference resolves to the backend's current value.
    assert_eq!(bootstrap.mode.selected.as_deref(), Some("chat"));
    assert!(!backend
        .calls()
        .iter()
        .any(|call| matches!(call, CallRecord::SetMode { .. })));
}

#[tokio::test]
async fn clear_removes_both_directions_and_unknown_ids_resolve_to_none() {
    let backend = Arc::new(MockBackend::new());
    let router = router(&backend);

    let outcome = router
        .ensure_session("chat-1", &prefs("/work"))
        .await
        .expect("created");
    let backend_id = outcome.backend_session_id().to_string();

    router.clear("chat-1");

    assert_eq!(router.backend_session_id("chat-1"), None);
    assert_eq!(router.resolve_chat_session_id(&backend_id), None);
    assert_eq!(router.resolve_chat_session_id("never-seen"), None);
}

#[tokio::test]
async fn creation_failure_surfaces_and_allows_retry() {
    let backend = Arc::new(MockBackend::new());
    backend.push_create_session(Err(BackendError::transport("spawn failed")));
    let router = router(&backend);

    let failed = router.ensure_session("chat-1", &prefs("/work")).await;
    assert!(failed.is_err());
    assert_eq!(router.backend_session_id("chat-1"), None);

    let retried = router
        .ensure_session("chat-1", &prefs("/work"))
        .await
        .expect("second attempt succeeds");
    assert!(matches!(retried, EnsureOutcome::Created(_)));
}
