use session_store::{ChatSession, SessionStore, StoreError, StoreSnapshot, STORE_VERSION};
use transcript::{Entry, Role};

fn store_in(dir: &tempfile::TempDir) -> SessionStore {
    SessionStore::new(dir.path().join("sessions.json"))
}

fn snapshot_with_session(id: &str) -> StoreSnapshot {
    let mut snapshot = StoreSnapshot::new();
    snapshot
        .sessions
        .push(ChatSession::new(id, "Fix the flaky test", "2026-08-06T10:00:00Z"));
    snapshot.selected_session_id = Some(id.to_string());
    snapshot
}

#[test]
fn load_returns_none_before_first_save() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = store_in(&dir);

    assert!(store.load().expect("load").is_none());
}

#[test]
fn snapshot_round_trips_with_transcripts() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = store_in(&dir);

    let mut snapshot = snapshot_with_session("chat-1");
    let mut entry = Entry::new("entry-1", Role::User);
    entry.content = "hello".to_string();
    entry.timestamp = Some(1_000);
    snapshot
        .entries_by_session
        .insert("chat-1".to_string(), vec![entry]);

    store.save(&snapshot).expect("save");
    let loaded = store.load().expect("load").expect("snapshot present");

    assert_eq!(loaded.version, STORE_VERSION);
    assert_eq!(loaded.sessions, snapshot.sessions);
    assert_eq!(loaded.selected_session_id.as_deref(), Some("chat-1"));
    assert_eq!(loaded.entries_by_session["chat-1"][0].content, "hello");
}

#[test]
fn streaming_entries_are_sealed_on_save() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = store_in(&dir);

    let mut snapshot = snapshot_with_session("chat-1");
    let mut entry = Entry::new("entry-1", Role::Assistant);
    entry.content = "partial".to_string();
    entry.is_streaming = true;
    snapshot
        .entries_by_session
        .insert("chat-1".to_string(), vec![entry]);

    store.save(&snapshot).expect("save");
    let loaded = store.load().expect("load").expect("snapshot present");

    assert!(!loaded.entries_by_session["chat-1"][0].is_streaming);
}

#[test]
fn orphaned_transcripts_are_dropped_on_load() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = store_in(&dir);

    let mut snapshot = snapshot_with_session("chat-1");
    snapshot
        .entries_by_session
        .insert("deleted-session".to_string(), vec![Entry::new("entry-1", Role::User)]);

    store.save(&snapshot).expect("save");
    let loaded = store.load().expect("load").expect("snapshot present");

    assert!(!loaded.entries_by_session.contains_key("deleted-session"));
}

#[test]
fn unsupported_version_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = store_in(&dir);

    let mut snapshot = snapshot_with_session("chat-1");
    snapshot.version = 99;
    std::fs::write(
        store.path(),
        serde_json::to_string(&snapshot).expect("serialize"),
    )
    .expect("write");

    match store.load() {
        Err(StoreError::UnsupportedVersion { found, expected, .. }) => {
            assert_eq!(found, 99);
            assert_eq!(expected, STORE_VERSION);
        }
        other => panic!("expected version error, got {other:?}"),
    }
}

#[test]
fn invalid_created_at_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = store_in(&dir);

    let mut snapshot = StoreSnapshot::new();
    snapshot
        .sessions
        .push(ChatSession::new("chat-1", "Broken", "yesterday-ish"));
    std::fs::write(
        store.path(),
        serde_json::to_string(&snapshot).expect("serialize"),
    )
    .expect("write");

    assert!(matches!(
        store.load(),
        Err(StoreError::InvalidTimestamp { .. })
    ));
}

#[test]
fn duplicate_session_ids_are_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = store_in(&dir);

    let mut snapshot = snapshot_with_session("chat-1");
    snapshot
        .sessions
        .push(ChatSession::new("chat-1", "Twin", "2026-08-06T11:00:00Z"));
    std::fs::write(
        store.path(),
        serde_json::to_string(&snapshot).expect("serialize"),
    )
    .expect("write");

    assert!(matches!(
        store.load(),
        Err(StoreError::DuplicateSessionId { .. })
    ));
}

#[test]
fn created_sessions_carry_parseable_timestamps() {
    let session = ChatSession::create("New chat").expect("created");

    assert!(!session.id.is_empty());
    assert_eq!(session.title, "New chat");
    assert!(time::OffsetDateTime::parse(
        &session.created_at,
        &time::format_description::well_known::Rfc3339
    )
    .is_ok());
}

#[test]
fn save_replaces_previous_snapshot_atomically() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = store_in(&dir);

    store.save(&snapshot_with_session("chat-1")).expect("save");
    store.save(&snapshot_with_session("chat-2")).expect("save");

    let loaded = store.load().expect("load").expect("snapshot present");
    assert_eq!(loaded.sessions.len(), 1);
    assert_eq!(loaded.sessions[0].id, "chat-2");
    assert!(!store.path().with_extension("tmp").exists());
}
