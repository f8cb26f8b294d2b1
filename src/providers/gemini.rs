use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

use crate::error::{LearningOsError, Result};
use crate::interfaces::providers::TextProvider;

const KEY_PROBE_PROMPT: &str = "Reply with the single word: ok";

#[derive(Clone)]
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorEnvelope {
    error: Option<ApiErrorBody>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

impl GeminiProvider {
    pub fn new(api_key: String, model: Option<String>, base_url: Option<String>) -> Self {
        let model = model.unwrap_or_else(|| crate::config::DEFAULT_MODEL.to_string());
        let base_url = base_url.unwrap_or_else(|| crate::config::DEFAULT_BASE_URL.to_string());
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url,
        }
    }

    async fn generate_once(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );

        // A modest output ceiling keeps individual chunk responses reliable.
        let body = json!({
            "contents": [{"parts": [{"text": prompt}]}],
            "generationConfig": {
                "temperature": 0.7,
                "topP": 0.8,
                "topK": 40,
                "maxOutputTokens": 1024,
            }
        });

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| LearningOsError::Http(format!("generation transport failed: {e}")))?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .map_err(|e| LearningOsError::Http(format!("generation read failed: {e}")))?;

        if status != StatusCode::OK {
            return Err(classify_api_error(status, &raw));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&raw)
            .map_err(|e| LearningOsError::Serialization(format!("generation decode failed: {e}")))?;

        extract_text(&parsed).ok_or_else(|| {
            LearningOsError::EmptyResponse(
                "response had no text parts (aborted generation or content filter)".to_string(),
            )
        })
    }
}

#[async_trait]
impl TextProvider for GeminiProvider {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_once(prompt).await
    }

    async fn validate_key(&self) -> Result<()> {
        self.generate_once(KEY_PROBE_PROMPT).await.map(|_| ())
    }
}

fn extract_text(response: &GenerateContentResponse) -> Option<String> {
    let text = response
        .candidates
        .first()?
        .content
        .as_ref()?
        .parts
        .iter()
        .filter_map(|part| part.text.as_deref())
        .collect::<Vec<_>>()
        .join("");
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn classify_api_error(status: StatusCode, raw: &str) -> LearningOsError {
    let (message, api_status) = match serde_json::from_str::<ApiErrorEnvelope>(raw) {
        Ok(envelope) => match envelope.error {
            Some(body) => (body.message, body.status),
            None => (raw.to_string(), String::new()),
        },
        Err(_) => (raw.to_string(), String::new()),
    };
    let lower = format!("{} {}", message, api_status).to_ascii_lowercase();

    if api_status == "RESOURCE_EXHAUSTED"
        || status == StatusCode::TOO_MANY_REQUESTS
        || lower.contains("quota")
    {
        return LearningOsError::Quota(message);
    }
    if api_status == "PERMISSION_DENIED"
        || lower.contains("api_key_invalid")
        || lower.contains("api key not valid")
    {
        return LearningOsError::InvalidApiKey(message);
    }
    LearningOsError::Http(format!("generation request failed ({status}): {message}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_quota_and_key_errors() {
        let quota = r#"{"error": {"code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED"}}"#;
        assert!(matches!(
            classify_api_error(StatusCode::TOO_MANY_REQUESTS, quota),
            LearningOsError::Quota(_)
        ));

        let bad_key = r#"{"error": {"code": 400, "message": "API key not valid. Please pass a valid API key.", "status": "INVALID_ARGUMENT"}}"#;
        assert!(matches!(
            classify_api_error(StatusCode::BAD_REQUEST, bad_key),
            LearningOsError::InvalidApiKey(_)
        ));

        let other = r#"{"error": {"code": 500, "message": "internal", "status": "INTERNAL"}}"#;
        assert!(matches!(
            classify_api_error(StatusCode::INTERNAL_SERVER_ERROR, other),
            LearningOsError::Http(_)
        ));
    }

    #[test]
    fn extract_text_joins_parts_and_rejects_blank() {
        let parsed: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": [{"text": "Day 1"}, {"text": ": SQL"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(&parsed).unwrap(), "Day 1: SQL");

        let blank: GenerateContentResponse =
            serde_json::from_str(r#"{"candidates": [{"content": {"parts": [{"text": "  "}]}}]}"#)
                .unwrap();
        assert!(extract_text(&blank).is_none());

        let empty: GenerateContentResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert!(extract_text(&empty).is_none());
    }
}
