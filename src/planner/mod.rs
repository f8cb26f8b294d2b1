use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::{LearningOsError, Result};
use crate::plans::{MissionDraft, MissionItem, PlanItem, PlanStore};
use crate::services::assistant::AssistantService;

pub mod parse;

const DEFAULT_CHUNK_DELAY: Duration = Duration::from_secs(2);

/// A plan covers at most a year; anything longer is a typo, and chunked
/// generation at that scale would burn through the request quota anyway.
pub const MAX_PLAN_DAYS: u32 = 365;

#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub topic: String,
    pub days: u32,
    pub difficulty: String,
    pub hours_per_day: i32,
    pub extra_instructions: Option<String>,
}

impl PlanRequest {
    pub fn new(topic: impl Into<String>, days: u32) -> Self {
        Self {
            topic: topic.into(),
            days,
            difficulty: "intermediate".to_string(),
            hours_per_day: 2,
            extra_instructions: None,
        }
    }
}

#[derive(Debug)]
pub struct PlanOutcome {
    pub plan: PlanItem,
    pub missions: Vec<MissionItem>,
    /// Days the model was asked for but never produced. Surfaced as a
    /// warning; the partial plan is kept rather than retried.
    pub missing_days: Vec<u32>,
}

/// Upstream generation has an output-length ceiling that makes one-shot
/// requests unreliable for long plans, so day ranges are requested in fixed
/// chunks: whole plan up to 4 days, pairs up to 8, triples beyond that.
pub fn chunk_ranges(days: u32) -> Vec<(u32, u32)> {
    if days == 0 {
        return Vec::new();
    }
    let chunk_size = if days <= 4 {
        days
    } else if days <= 8 {
        2
    } else {
        3
    };

    let mut ranges = Vec::new();
    let mut start = 1;
    while start <= days {
        let end = (start + chunk_size - 1).min(days);
        ranges.push((start, end));
        start = end + 1;
    }
    ranges
}

fn chunk_prompt(request: &PlanRequest, start_day: u32, end_day: u32) -> String {
    let chunk_days = end_day - start_day + 1;
    let extra = request
        .extra_instructions
        .as_deref()
        .map(|text| format!("\nAdditional instructions: {text}\n"))
        .unwrap_or_default();

    format!(
        "Create a detailed {chunk_days}-day learning plan for: {topic}\n\
         \n\
         Difficulty level: {difficulty}\n\
         Target audience: Self-directed learner\n\
         Time commitment: {hours} hours per day\n\
         {extra}\n\
         IMPORTANT: Include ONLY days {start_day} through {end_day}.\n\
         \n\
         Respond with ONLY a JSON array, no other text or markdown. One object\n\
         per day with exactly these keys:\n\
         - \"day\": the day number\n\
         - \"title\": a clear topic title\n\
         - \"summary\": one or two sentences on what the day covers\n\
         - \"details\": learning objectives, key concepts, practical\n\
           exercises, and a time breakdown\n\
         \n\
         Keep each day focused and concise.",
        topic = request.topic,
        difficulty = request.difficulty,
        hours = request.hours_per_day,
    )
}

pub struct PlanGenerator {
    service: Arc<AssistantService>,
    chunk_delay: Duration,
}

impl PlanGenerator {
    pub fn new(service: Arc<AssistantService>) -> Self {
        Self {
            service,
            chunk_delay: DEFAULT_CHUNK_DELAY,
        }
    }

    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// Requests every chunk strictly in order and parses the results. Any
    /// failed chunk aborts the whole generation; there is no per-chunk
    /// retry beyond the service's empty-response retry.
    pub async fn generate_missions(
        &self,
        request: &PlanRequest,
    ) -> Result<(Vec<MissionDraft>, Vec<u32>)> {
        if request.days == 0 {
            return Err(LearningOsError::Config(
                "a plan needs at least one day".to_string(),
            ));
        }
        if request.days > MAX_PLAN_DAYS {
            return Err(LearningOsError::Config(format!(
                "a plan can cover at most {MAX_PLAN_DAYS} days, got {}",
                request.days
            )));
        }

        let ranges = chunk_ranges(request.days);
        let mut drafts: Vec<MissionDraft> = Vec::with_capacity(request.days as usize);

        for (index, (start_day, end_day)) in ranges.iter().copied().enumerate() {
            info!(
                start_day,
                end_day,
                chunk = index + 1,
                chunks = ranges.len(),
                "requesting plan chunk"
            );
            let prompt = chunk_prompt(request, start_day, end_day);
            let endpoint = format!("plan_chunk_{start_day}_{end_day}");
            let text = self.service.request(&prompt, &endpoint).await?;
            drafts.extend(parse::parse_chunk(&text));

            if index + 1 < ranges.len() {
                tokio::time::sleep(self.chunk_delay).await;
            }
        }

        if drafts.is_empty() {
            return Err(LearningOsError::Serialization(
                "no day records could be parsed from the generated plan".to_string(),
            ));
        }

        drafts.sort_by_key(|d| d.day_number);
        let missing = missing_days(request.days, &drafts);
        if !missing.is_empty() {
            warn!(?missing, total_days = request.days, "generated plan has gaps");
        }
        Ok((drafts, missing))
    }

    /// Full plan creation: generate, parse, then persist. The plan row is
    /// only written after generation succeeded, so an aborted generation
    /// leaves storage untouched.
    pub async fn create_plan(
        &self,
        store: &PlanStore,
        user_id: &str,
        request: &PlanRequest,
    ) -> Result<PlanOutcome> {
        let (drafts, missing_days) = self.generate_missions(request).await?;

        let plan = store
            .create_plan(
                user_id,
                &request.topic,
                request.days as i32,
                &request.difficulty,
                request.hours_per_day,
                &drafts,
            )
            .await?;
        let missions = store.list_missions(plan.id).await?;
        info!(plan_id = plan.id, missions = missions.len(), "plan created");

        Ok(PlanOutcome {
            plan,
            missions,
            missing_days,
        })
    }
}

fn missing_days(total_days: u32, drafts: &[MissionDraft]) -> Vec<u32> {
    let produced: BTreeSet<u32> = drafts
        .iter()
        .filter(|d| d.day_number >= 1)
        .map(|d| d.day_number as u32)
        .collect();
    (1..=total_days).filter(|day| !produced.contains(day)).collect()
}
