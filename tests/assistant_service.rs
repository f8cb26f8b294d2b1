mod common;

use std::sync::Arc;
use std::time::Duration;

use tempfile::tempdir;

use learning_os::error::LearningOsError;
use learning_os::ratelimit::RequestGate;
use learning_os::services::assistant::AssistantService;
use learning_os::usage::UsageStore;

use common::{scratch_db, test_assistant, QueueTextProvider};

#[tokio::test]
async fn empty_response_is_retried_once() {
    let dir = tempdir().unwrap();
    let db = scratch_db(&dir, "assistant.db");
    let provider = Arc::new(QueueTextProvider::new(vec![
        Err(LearningOsError::EmptyResponse("no parts".to_string())),
        Ok("Day 1: SELECT".to_string()),
    ]));
    let service = test_assistant(provider.clone(), &db).await;

    let text = service.request("prompt", "learning_content").await.unwrap();

    assert_eq!(text, "Day 1: SELECT");
    assert_eq!(provider.remaining(), 0);

    // Both attempts are accounted: one failure, one success.
    let recent = service.usage().recent(10).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent.iter().filter(|r| r.success).count(), 1);
    assert!(recent
        .iter()
        .all(|r| r.endpoint_type == "learning_content"));
}

#[tokio::test]
async fn second_empty_response_surfaces_the_error() {
    let dir = tempdir().unwrap();
    let db = scratch_db(&dir, "assistant.db");
    let provider = Arc::new(QueueTextProvider::new(vec![
        Err(LearningOsError::EmptyResponse("no parts".to_string())),
        Err(LearningOsError::EmptyResponse("still no parts".to_string())),
    ]));
    let service = test_assistant(provider, &db).await;

    let err = service.request("prompt", "free_learning").await.unwrap_err();
    assert!(matches!(err, LearningOsError::EmptyResponse(_)));

    let recent = service.usage().recent(10).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert!(recent.iter().all(|r| !r.success));
}

#[tokio::test]
async fn non_retryable_errors_fail_immediately() {
    let dir = tempdir().unwrap();
    let db = scratch_db(&dir, "assistant.db");
    let provider = Arc::new(QueueTextProvider::new(vec![
        Err(LearningOsError::InvalidApiKey("bad key".to_string())),
        Ok("never reached".to_string()),
    ]));
    let service = test_assistant(provider.clone(), &db).await;

    let err = service.request("prompt", "free_learning").await.unwrap_err();
    assert!(matches!(err, LearningOsError::InvalidApiKey(_)));
    assert_eq!(provider.remaining(), 1, "no retry for key errors");
}

#[tokio::test]
async fn minute_ceiling_rejects_before_touching_the_provider() {
    let dir = tempdir().unwrap();
    let db = scratch_db(&dir, "assistant.db");
    let usage = Arc::new(UsageStore::new(&db).await.unwrap());

    // Fill the rolling window up to the limit.
    for _ in 0..2 {
        usage.record("free_learning", true, 10).await.unwrap();
    }

    let provider = Arc::new(QueueTextProvider::new(vec![Ok("unused".to_string())]));
    let gate = RequestGate::new(Duration::ZERO, 2);
    let service = AssistantService::new(provider.clone(), gate, usage);

    let err = service.request("prompt", "free_learning").await.unwrap_err();
    assert!(matches!(err, LearningOsError::Quota(_)));
    assert_eq!(provider.remaining(), 1, "provider is never called at the ceiling");
}

#[tokio::test]
async fn usage_counts_respect_the_window_boundary() {
    let dir = tempdir().unwrap();
    let db = scratch_db(&dir, "usage.db");
    let usage = UsageStore::new(&db).await.unwrap();

    usage.record("plan_chunk_1_3", true, 512).await.unwrap();
    usage.record("plan_chunk_1_3", false, 0).await.unwrap();

    let now = unix_now();
    assert_eq!(usage.count_since(now - 60).await.unwrap(), 2);
    assert_eq!(usage.count_since(now + 120).await.unwrap(), 0);

    let recent = usage.recent(1).await.unwrap();
    assert_eq!(recent.len(), 1);
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}
