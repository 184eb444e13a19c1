use crate::SeenStore;
use futures::future::join_all;
use postwatch_core::StoreError;
use std::env;
use std::path::PathBuf;

fn temp_db_path() -> PathBuf {
    env::temp_dir().join(format!("test_postwatch_{}.db", uuid::Uuid::new_v4()))
}

async fn setup_test_store() -> SeenStore {
    SeenStore::open(temp_db_path())
        .await
        .expect("Failed to open test store")
}

const HANDLE: &str = "alice";
const LINK: &str = "https://x.com/alice/status/1790000000000000000";

#[tokio::test]
async fn test_open_is_idempotent() {
    let path = temp_db_path();
    let store = SeenStore::open(&path).await.expect("first open");
    store.mark_notified(HANDLE, LINK).await.expect("mark");

    // Re-opening runs the schema again and keeps existing rows
    let reopened = SeenStore::open(&path).await.expect("second open");
    assert!(reopened.already_notified(HANDLE, LINK).await.unwrap());
    assert_eq!(reopened.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_mark_then_check() {
    let store = setup_test_store().await;

    assert!(!store.already_notified(HANDLE, LINK).await.unwrap());
    store.mark_notified(HANDLE, LINK).await.unwrap();
    assert!(store.already_notified(HANDLE, LINK).await.unwrap());
}

#[tokio::test]
async fn test_second_mark_reports_already_exists() {
    let store = setup_test_store().await;

    store.mark_notified(HANDLE, LINK).await.unwrap();
    let second = store.mark_notified(HANDLE, LINK).await;
    assert!(matches!(second, Err(StoreError::AlreadyExists { .. })));
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_key_is_the_pair() {
    let store = setup_test_store().await;

    store.mark_notified(HANDLE, LINK).await.unwrap();
    // Same link under another handle is a different key
    store.mark_notified("bob", LINK).await.unwrap();
    assert!(!store
        .already_notified(HANDLE, "https://x.com/alice/status/2")
        .await
        .unwrap());
    assert_eq!(store.count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_record_has_alert_time() {
    let store = setup_test_store().await;
    assert!(store.record(HANDLE, LINK).await.unwrap().is_none());

    let before = chrono::Utc::now();
    store.mark_notified(HANDLE, LINK).await.unwrap();
    let record = store.record(HANDLE, LINK).await.unwrap().expect("record");

    assert_eq!(record.handle, HANDLE);
    assert_eq!(record.permalink, LINK);
    assert!(record.alerted_at >= before - chrono::Duration::seconds(1));
}

#[tokio::test]
async fn test_state_survives_new_instance() {
    let path = temp_db_path();
    {
        let store = SeenStore::open(&path).await.unwrap();
        store.mark_notified(HANDLE, LINK).await.unwrap();
    }
    let restarted = SeenStore::open(&path).await.unwrap();
    assert!(restarted.already_notified(HANDLE, LINK).await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_marks_have_exactly_one_winner() {
    let store = setup_test_store().await;

    let attempts = (0..16).map(|_| {
        let store = store.clone();
        tokio::spawn(async move { store.mark_notified(HANDLE, LINK).await })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked"))
        .collect();

    let winners = results.iter().filter(|r| r.is_ok()).count();
    let losers = results
        .iter()
        .filter(|r| matches!(r, Err(StoreError::AlreadyExists { .. })))
        .count();
    assert_eq!(winners, 1);
    assert_eq!(losers, 15);
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_unopenable_path_fails_at_open() {
    let path = env::temp_dir()
        .join(format!("missing_dir_{}", uuid::Uuid::new_v4()))
        .join("alerts.db");
    let result = SeenStore::open(path).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_closed_connection_leaves_store_usable() {
    let store = setup_test_store().await;
    let conn = store.connect().await.expect("connect");
    crate::close(conn).await;

    store.mark_notified(HANDLE, LINK).await.unwrap();
    assert_eq!(store.count().await.unwrap(), 1);
}
