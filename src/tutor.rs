use std::sync::Arc;

use serde_json::json;

use crate::error::Result;
use crate::planner::parse;
use crate::plans::{MissionItem, PlanStore};
use crate::services::assistant::AssistantService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PracticeKind {
    Quiz,
    Problems,
    Examples,
}

impl PracticeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quiz => "quiz",
            Self::Problems => "problems",
            Self::Examples => "examples",
        }
    }

    pub fn from_option(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("problems") => Self::Problems,
            Some("examples") => Self::Examples,
            _ => Self::Quiz,
        }
    }
}

/// Prompt-templated features on top of the assistant service: lessons,
/// practice exercises, freeform Q&A, and chat-driven plan adjustment.
pub struct Tutor {
    service: Arc<AssistantService>,
}

impl Tutor {
    pub fn new(service: Arc<AssistantService>) -> Self {
        Self { service }
    }

    pub async fn lesson_content(
        &self,
        mission_title: &str,
        previous_titles: &[String],
    ) -> Result<String> {
        let prompt = lesson_prompt(mission_title, previous_titles);
        self.service.request(&prompt, "learning_content").await
    }

    pub async fn practice(&self, topic: &str, kind: PracticeKind) -> Result<String> {
        let prompt = practice_prompt(topic, kind);
        let endpoint = format!("practice_{}", kind.as_str());
        self.service.request(&prompt, &endpoint).await
    }

    pub async fn answer(&self, question: &str) -> Result<String> {
        let prompt = answer_prompt(question);
        self.service.request(&prompt, "free_learning").await
    }

    /// Sends the current mission set plus the user's request, expects back
    /// only an updated JSON array, and replaces the plan's missions with the
    /// validated result. An invalid shape is surfaced as-is; there is no
    /// automatic repair.
    pub async fn adjust_plan(
        &self,
        plans: &PlanStore,
        plan_id: i32,
        request: &str,
    ) -> Result<Vec<MissionItem>> {
        let missions = plans.list_missions(plan_id).await?;
        let prompt = adjust_prompt(&missions, request);
        let text = self.service.request(&prompt, "plan_adjust").await?;

        let cleaned = parse::strip_code_fences(&text);
        let drafts = parse::parse_entries_strict(&cleaned)?;
        plans.replace_missions(plan_id, &drafts).await
    }
}

fn lesson_prompt(mission_title: &str, previous_titles: &[String]) -> String {
    let context = if previous_titles.is_empty() {
        String::new()
    } else {
        let recent: Vec<&str> = previous_titles
            .iter()
            .rev()
            .take(2)
            .rev()
            .map(String::as_str)
            .collect();
        format!("Previous learning context: {}\n\n", recent.join("; "))
    };

    format!(
        "Create comprehensive learning content for: {mission_title}\n\
         \n\
         {context}\
         Provide a focused tutorial that includes:\n\
         1. Clear explanation of key concepts with examples\n\
         2. Step-by-step walkthrough or tutorial\n\
         3. Practical examples with code (if applicable)\n\
         4. Common mistakes to avoid\n\
         5. 2-3 hands-on exercises\n\
         6. Summary of key points\n\
         \n\
         Keep it concise but thorough. Use markdown formatting.\n\
         Focus on practical, actionable content that helps learners build skills."
    )
}

fn practice_prompt(topic: &str, kind: PracticeKind) -> String {
    match kind {
        PracticeKind::Quiz => format!(
            "Create 3 multiple-choice quiz questions about: {topic}\n\
             \n\
             For each question provide:\n\
             1. Clear, specific question\n\
             2. 4 answer options (A, B, C, D)\n\
             3. Correct answer letter\n\
             4. Brief explanation\n\
             \n\
             Keep questions practical and test real understanding.\n\
             Format as clear text, not JSON."
        ),
        PracticeKind::Problems => format!(
            "Create 2 practical problem-solving exercises about: {topic}\n\
             \n\
             For each problem provide:\n\
             1. Clear problem description\n\
             2. Example input/output (if applicable)\n\
             3. Step-by-step solution approach\n\
             4. Complete solution with explanation\n\
             \n\
             Focus on hands-on, practical problems."
        ),
        PracticeKind::Examples => format!(
            "Create 2 practical examples demonstrating: {topic}\n\
             \n\
             For each example provide:\n\
             1. Real-world scenario\n\
             2. Step-by-step implementation\n\
             3. Code with comments (if applicable)\n\
             4. Expected outcome\n\
             5. One variation or extension\n\
             \n\
             Make examples practical and relevant."
        ),
    }
}

fn answer_prompt(question: &str) -> String {
    format!(
        "As an expert tutor, provide a comprehensive answer to: {question}\n\
         \n\
         Your response should:\n\
         1. Directly answer the question with clear explanations\n\
         2. Provide concrete examples when helpful\n\
         3. Break down complex concepts into simple parts\n\
         4. Include practical applications or use cases\n\
         5. Be encouraging and educational\n\
         \n\
         Keep the response focused and helpful. Use markdown formatting for\n\
         better readability."
    )
}

fn adjust_prompt(missions: &[MissionItem], request: &str) -> String {
    let current: Vec<serde_json::Value> = missions
        .iter()
        .map(|m| {
            json!({
                "day": m.day_number,
                "topic": m.title,
                "details": m.detailed_content,
                "status": m.status,
            })
        })
        .collect();
    let current_json =
        serde_json::to_string_pretty(&current).unwrap_or_else(|_| "[]".to_string());

    format!(
        "A user wants to adjust their learning plan.\n\
         Their request is: '{request}'\n\
         \n\
         Here is the current plan in JSON format:\n\
         {current_json}\n\
         \n\
         Please generate a new, updated plan based on the user's request.\n\
         Your response MUST be only the updated JSON array, with no other\n\
         text or markdown. All backslashes inside JSON string values must be\n\
         properly escaped.\n\
         The JSON structure for each day must contain 'day', 'topic',\n\
         'details', and 'status' keys."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lesson_prompt_carries_last_two_topics() {
        let previous = vec![
            "Day 1".to_string(),
            "Day 2".to_string(),
            "Day 3".to_string(),
        ];
        let prompt = lesson_prompt("Day 4: Joins", &previous);
        assert!(prompt.contains("Day 2; Day 3"));
        assert!(!prompt.contains("Day 1;"));

        let bare = lesson_prompt("Day 1: Basics", &[]);
        assert!(!bare.contains("Previous learning context"));
    }

    #[test]
    fn practice_kind_parses_with_quiz_default() {
        assert_eq!(PracticeKind::from_option(Some("Problems")), PracticeKind::Problems);
        assert_eq!(PracticeKind::from_option(Some("examples")), PracticeKind::Examples);
        assert_eq!(PracticeKind::from_option(Some("???")), PracticeKind::Quiz);
        assert_eq!(PracticeKind::from_option(None), PracticeKind::Quiz);
    }

    #[test]
    fn adjust_prompt_embeds_plan_and_contract() {
        let prompt = adjust_prompt(&[], "make day 3 easier");
        assert!(prompt.contains("make day 3 easier"));
        assert!(prompt.contains("'day', 'topic',"));
        assert!(prompt.contains("only the updated JSON array"));
    }
}
