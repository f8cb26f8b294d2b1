mod common;

use std::sync::Arc;

use serde_json::json;
use tempfile::tempdir;

use learning_os::error::LearningOsError;
use learning_os::plans::{MissionDraft, MissionStatus, PlanStore};
use learning_os::tutor::Tutor;

use common::{scratch_db, test_assistant, QueueTextProvider};

fn draft(day: i32, title: &str) -> MissionDraft {
    MissionDraft {
        day_number: day,
        title: title.to_string(),
        description: String::new(),
        detailed_content: format!("notes for day {day}"),
        status: None,
    }
}

#[tokio::test]
async fn adjustment_replaces_missions_and_keeps_statuses() {
    let dir = tempdir().unwrap();
    let db = scratch_db(&dir, "adjust.db");
    let store = PlanStore::new(&db).await.unwrap();
    let plan = store
        .create_plan(
            "u1",
            "Basics of SQL",
            2,
            "beginner",
            2,
            &[draft(1, "SELECT"), draft(2, "Joins")],
        )
        .await
        .unwrap();
    store.advance(plan.id).await.unwrap();

    // The model answers with the adjustment key set, fenced as models do.
    let adjusted = json!([
        {"day": 1, "topic": "SELECT", "details": "done already", "status": "completed"},
        {"day": 2, "topic": "Joins, part one", "details": "inner joins only", "status": "current"},
        {"day": 3, "topic": "Joins, part two", "details": "outer joins", "status": "pending"}
    ]);
    let reply = format!("```json\n{adjusted}\n```");
    let provider = Arc::new(QueueTextProvider::new(vec![Ok(reply)]));
    let tutor = Tutor::new(test_assistant(provider, &db).await);

    let missions = tutor
        .adjust_plan(&store, plan.id, "split joins over two days")
        .await
        .unwrap();

    assert_eq!(missions.len(), 3);
    assert_eq!(missions[0].status, MissionStatus::Completed);
    assert_eq!(missions[1].title, "Joins, part one");
    assert_eq!(missions[1].status, MissionStatus::Current);
    assert_eq!(missions[2].day_number, 3);
    assert_eq!(missions[2].status, MissionStatus::Pending);
}

#[tokio::test]
async fn malformed_adjustment_leaves_the_plan_untouched() {
    let dir = tempdir().unwrap();
    let db = scratch_db(&dir, "adjust.db");
    let store = PlanStore::new(&db).await.unwrap();
    let plan = store
        .create_plan(
            "u1",
            "Basics of SQL",
            2,
            "beginner",
            2,
            &[draft(1, "SELECT"), draft(2, "Joins")],
        )
        .await
        .unwrap();

    let provider = Arc::new(QueueTextProvider::new(vec![Ok(
        "Sure! Here is your updated plan: Day 1 ...".to_string(),
    )]));
    let tutor = Tutor::new(test_assistant(provider, &db).await);

    let err = tutor
        .adjust_plan(&store, plan.id, "make it harder")
        .await
        .unwrap_err();
    assert!(matches!(err, LearningOsError::Serialization(_)));

    let missions = store.list_missions(plan.id).await.unwrap();
    assert_eq!(missions.len(), 2);
    assert_eq!(missions[0].title, "SELECT");
}

#[tokio::test]
async fn lesson_and_practice_requests_flow_through_the_service() {
    let dir = tempdir().unwrap();
    let db = scratch_db(&dir, "tutor.db");
    let provider = Arc::new(QueueTextProvider::new(vec![
        Ok("# Lesson on joins".to_string()),
        Ok("Q1: Which join keeps unmatched rows?".to_string()),
    ]));
    let service = test_assistant(provider.clone(), &db).await;
    let tutor = Tutor::new(service.clone());

    let lesson = tutor
        .lesson_content("Joins", &["SELECT basics".to_string()])
        .await
        .unwrap();
    assert!(lesson.starts_with("# Lesson"));

    let quiz = tutor
        .practice("SQL joins", learning_os::tutor::PracticeKind::Quiz)
        .await
        .unwrap();
    assert!(quiz.starts_with("Q1"));
    assert_eq!(provider.remaining(), 0);

    let recent = service.usage().recent(10).await.unwrap();
    let endpoints: Vec<&str> = recent.iter().map(|r| r.endpoint_type.as_str()).collect();
    assert!(endpoints.contains(&"learning_content"));
    assert!(endpoints.contains(&"practice_quiz"));
}
