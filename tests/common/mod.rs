#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use learning_os::error::{LearningOsError, Result};
use learning_os::interfaces::providers::TextProvider;
use learning_os::ratelimit::RequestGate;
use learning_os::services::assistant::AssistantService;
use learning_os::usage::UsageStore;

/// Scripted provider: every generate call pops the next queued response.
pub struct QueueTextProvider {
    responses: Mutex<VecDeque<Result<String>>>,
}

impl QueueTextProvider {
    pub fn new(responses: Vec<Result<String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
        }
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap().len()
    }
}

#[async_trait]
impl TextProvider for QueueTextProvider {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LearningOsError::Runtime("response queue exhausted".to_string())))
    }

    async fn validate_key(&self) -> Result<()> {
        Ok(())
    }
}

pub fn scratch_db(dir: &TempDir, name: &str) -> String {
    dir.path().join(name).to_string_lossy().to_string()
}

/// Assistant wired for tests: no pacing delays, usage store on a scratch db.
pub async fn test_assistant(
    provider: Arc<QueueTextProvider>,
    db_path: &str,
) -> Arc<AssistantService> {
    let usage = Arc::new(UsageStore::new(db_path).await.unwrap());
    let gate = RequestGate::new(Duration::ZERO, 1000);
    Arc::new(
        AssistantService::new(provider, gate, usage).with_empty_retry_delay(Duration::ZERO),
    )
}

pub fn day_json(day: u32, title: &str) -> serde_json::Value {
    serde_json::json!({
        "day": day,
        "title": title,
        "summary": format!("What day {day} covers in one sentence."),
        "details": format!("- practice item for day {day}"),
    })
}
