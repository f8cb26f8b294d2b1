mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::tempdir;

use learning_os::error::LearningOsError;
use learning_os::planner::{PlanGenerator, PlanRequest};
use learning_os::plans::{MissionStatus, PlanStore};

use common::{day_json, scratch_db, test_assistant, QueueTextProvider};

fn generator(service: Arc<learning_os::services::assistant::AssistantService>) -> PlanGenerator {
    PlanGenerator::new(service).with_chunk_delay(Duration::ZERO)
}

#[tokio::test]
async fn three_day_plan_is_generated_in_a_single_request() {
    let dir = tempdir().unwrap();
    let db = scratch_db(&dir, "gen.db");
    let provider = Arc::new(QueueTextProvider::new(vec![Ok(json!([
        day_json(1, "SELECT and WHERE"),
        day_json(2, "Joins"),
        day_json(3, "Aggregation"),
    ])
    .to_string())]));
    let service = test_assistant(provider.clone(), &db).await;
    let store = PlanStore::new(&db).await.unwrap();

    let request = PlanRequest::new("Basics of SQL", 3);
    let outcome = generator(service).create_plan(&store, "u1", &request).await.unwrap();

    assert_eq!(provider.remaining(), 0, "3 days fit in one chunk");
    assert_eq!(outcome.plan.total_days, 3);
    assert_eq!(outcome.missions.len(), 3);
    assert!(outcome.missing_days.is_empty());
    assert_eq!(outcome.missions[0].day_number, 1);
    assert_eq!(outcome.missions[0].status, MissionStatus::Current);
    assert_eq!(outcome.missions[0].title, "SELECT and WHERE");
}

#[tokio::test]
async fn six_day_plan_is_requested_in_two_day_chunks() {
    let dir = tempdir().unwrap();
    let db = scratch_db(&dir, "gen.db");
    let chunks: Vec<_> = [(1u32, 2u32), (3, 4), (5, 6)]
        .iter()
        .map(|(a, b)| {
            Ok(json!([day_json(*a, &format!("Topic {a}")), day_json(*b, &format!("Topic {b}"))])
                .to_string())
        })
        .collect();
    let provider = Arc::new(QueueTextProvider::new(chunks));
    let service = test_assistant(provider.clone(), &db).await;
    let store = PlanStore::new(&db).await.unwrap();

    let request = PlanRequest::new("Linear algebra", 6);
    let outcome = generator(service).create_plan(&store, "u1", &request).await.unwrap();

    assert_eq!(provider.remaining(), 0, "6 days take three chunk requests");
    let days: Vec<i32> = outcome.missions.iter().map(|m| m.day_number).collect();
    assert_eq!(days, vec![1, 2, 3, 4, 5, 6]);
    assert!(outcome.missing_days.is_empty());
}

#[tokio::test]
async fn failed_chunk_aborts_without_persisting_anything() {
    let dir = tempdir().unwrap();
    let db = scratch_db(&dir, "gen.db");
    let provider = Arc::new(QueueTextProvider::new(vec![
        Ok(json!([day_json(1, "Topic 1"), day_json(2, "Topic 2")]).to_string()),
        Err(LearningOsError::Quota("rate limited".to_string())),
    ]));
    let service = test_assistant(provider, &db).await;
    let store = PlanStore::new(&db).await.unwrap();

    let request = PlanRequest::new("Linear algebra", 6);
    let err = generator(service)
        .create_plan(&store, "u1", &request)
        .await
        .unwrap_err();

    assert!(matches!(err, LearningOsError::Quota(_)));
    assert!(store.list_plans("u1").await.unwrap().is_empty());
}

#[tokio::test]
async fn prose_response_is_parsed_by_the_heuristic() {
    let dir = tempdir().unwrap();
    let db = scratch_db(&dir, "gen.db");
    let text = "Day 1: SELECT basics\n\
                Reading rows from a single table.\n\
                Objectives:\n\
                - write a first query\n\
                Day 2: Joins\n\
                Combining rows across related tables.";
    let provider = Arc::new(QueueTextProvider::new(vec![Ok(text.to_string())]));
    let service = test_assistant(provider, &db).await;
    let store = PlanStore::new(&db).await.unwrap();

    let request = PlanRequest::new("Basics of SQL", 2);
    let outcome = generator(service).create_plan(&store, "u1", &request).await.unwrap();

    assert_eq!(outcome.missions.len(), 2);
    assert_eq!(outcome.missions[0].description, "Reading rows from a single table.");
    assert!(outcome.missions[0].detailed_content.contains("**Objectives:**"));
}

#[tokio::test]
async fn gaps_in_the_generated_plan_are_reported() {
    let dir = tempdir().unwrap();
    let db = scratch_db(&dir, "gen.db");
    let provider = Arc::new(QueueTextProvider::new(vec![Ok(json!([
        day_json(1, "Topic 1"),
        day_json(3, "Topic 3"),
    ])
    .to_string())]));
    let service = test_assistant(provider, &db).await;
    let store = PlanStore::new(&db).await.unwrap();

    let request = PlanRequest::new("Basics of SQL", 3);
    let outcome = generator(service).create_plan(&store, "u1", &request).await.unwrap();

    assert_eq!(outcome.missing_days, vec![2]);
    assert_eq!(outcome.missions.len(), 2);
}

#[tokio::test]
async fn oversized_day_count_is_rejected_up_front() {
    let dir = tempdir().unwrap();
    let db = scratch_db(&dir, "gen.db");
    let provider = Arc::new(QueueTextProvider::new(vec![Ok("unused".to_string())]));
    let service = test_assistant(provider.clone(), &db).await;
    let store = PlanStore::new(&db).await.unwrap();

    let request = PlanRequest::new("Basics of SQL", u32::MAX);
    let err = generator(service)
        .create_plan(&store, "u1", &request)
        .await
        .unwrap_err();

    assert!(matches!(err, LearningOsError::Config(_)));
    assert_eq!(provider.remaining(), 1, "no request is ever issued");
    assert!(store.list_plans("u1").await.unwrap().is_empty());
}

#[tokio::test]
async fn unparseable_plan_text_is_an_error() {
    let dir = tempdir().unwrap();
    let db = scratch_db(&dir, "gen.db");
    let provider = Arc::new(QueueTextProvider::new(vec![Ok(
        "I cannot help with that.".to_string()
    )]));
    let service = test_assistant(provider, &db).await;
    let store = PlanStore::new(&db).await.unwrap();

    let request = PlanRequest::new("Basics of SQL", 2);
    let err = generator(service)
        .create_plan(&store, "u1", &request)
        .await
        .unwrap_err();

    assert!(matches!(err, LearningOsError::Serialization(_)));
    assert!(store.list_plans("u1").await.unwrap().is_empty());
}
