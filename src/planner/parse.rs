use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use crate::error::{LearningOsError, Result};
use crate::plans::{MissionDraft, MissionStatus};

const SECTION_MARKERS: [&str; 6] = [
    "Objectives:",
    "Key Concepts:",
    "Practice:",
    "Time:",
    "Learning objectives:",
    "Key concepts:",
];
const LIST_MARKERS: [&str; 7] = ["-", "•", "*", "1.", "2.", "3.", "4."];
const MIN_DESCRIPTION_LINE_LEN: usize = 10;

/// The JSON contract the chunk prompt asks for. Aliases keep the parser
/// compatible with the looser key set used by plan adjustments
/// (day/topic/details/status).
#[derive(Debug, Deserialize)]
struct DayEntry {
    day: i64,
    #[serde(alias = "topic")]
    title: String,
    #[serde(default, alias = "summary")]
    description: String,
    #[serde(default, alias = "detailed_content")]
    details: String,
    #[serde(default)]
    status: Option<String>,
}

/// Parses one chunk of generated plan text. Strict JSON is the primary
/// contract; the line-prefix heuristic is a compatibility shim for models
/// that answer in prose anyway.
pub fn parse_chunk(text: &str) -> Vec<MissionDraft> {
    match parse_entries_strict(text) {
        Ok(drafts) => drafts,
        Err(err) => {
            tracing::debug!("chunk is not valid JSON, falling back to heuristic: {err}");
            parse_plan_text(text)
        }
    }
}

/// Strict JSON parsing, used directly by the plan-adjustment path where an
/// invalid shape must surface as an error rather than be repaired.
pub fn parse_entries_strict(text: &str) -> Result<Vec<MissionDraft>> {
    let cleaned = strip_code_fences(text);
    let entries: Vec<DayEntry> = serde_json::from_str(cleaned.trim())
        .map_err(|e| LearningOsError::Serialization(format!("invalid plan JSON: {e}")))?;

    let mut drafts = Vec::with_capacity(entries.len());
    for entry in entries {
        if entry.day < 1 || entry.day > i32::MAX as i64 {
            return Err(LearningOsError::Serialization(format!(
                "invalid day number {} in plan JSON",
                entry.day
            )));
        }
        drafts.push(MissionDraft {
            day_number: entry.day as i32,
            title: entry.title.trim().to_string(),
            description: entry.description.trim().to_string(),
            detailed_content: entry.details.trim().to_string(),
            status: entry.status.as_deref().map(MissionStatus::parse),
        });
    }
    drafts.sort_by_key(|d| d.day_number);
    Ok(drafts)
}

/// Line-prefix heuristic: a "Day N: title" header opens a record; section
/// and list markers accumulate into detailed content; other substantial
/// lines extend the short description. Records come back sorted by day.
pub fn parse_plan_text(content: &str) -> Vec<MissionDraft> {
    static DAY_HEADER_RE: OnceLock<Regex> = OnceLock::new();
    let day_header = DAY_HEADER_RE.get_or_init(|| {
        Regex::new(r"(?i)^Day\s+(\d+)\s*:?\s*(.+)").expect("valid day header regex")
    });

    let mut missions: Vec<MissionDraft> = Vec::new();
    let mut current: Option<MissionDraft> = None;

    for raw_line in content.lines() {
        let line = raw_line.trim();

        if let Some(caps) = day_header.captures(line) {
            let day_number = caps
                .get(1)
                .and_then(|m| m.as_str().parse::<i32>().ok())
                .unwrap_or(0);
            if day_number < 1 {
                continue;
            }
            if let Some(done) = current.take() {
                missions.push(done);
            }
            current = Some(MissionDraft {
                day_number,
                title: caps.get(2).map(|m| m.as_str().trim()).unwrap_or("").to_string(),
                description: String::new(),
                detailed_content: String::new(),
                status: None,
            });
            continue;
        }

        let Some(mission) = current.as_mut() else {
            continue;
        };
        if line.is_empty() {
            continue;
        }

        if SECTION_MARKERS.iter().any(|marker| line.starts_with(marker)) {
            mission.detailed_content.push_str("\n\n**");
            mission.detailed_content.push_str(line);
            mission.detailed_content.push_str("**");
        } else if LIST_MARKERS.iter().any(|marker| line.starts_with(marker)) {
            mission.detailed_content.push('\n');
            mission.detailed_content.push_str(line);
        } else if line.len() > MIN_DESCRIPTION_LINE_LEN {
            if !mission.description.is_empty() {
                mission.description.push(' ');
            }
            mission.description.push_str(line);
        }
    }

    if let Some(done) = current.take() {
        missions.push(done);
    }

    missions.sort_by_key(|m| m.day_number);
    missions
}

/// Models love wrapping JSON in markdown fences; peel them off.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    trimmed
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
        .to_string()
}
