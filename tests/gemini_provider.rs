use httpmock::Method::POST;
use httpmock::MockServer;
use serde_json::json;

use learning_os::error::LearningOsError;
use learning_os::interfaces::providers::TextProvider;
use learning_os::providers::gemini::GeminiProvider;

fn provider_for(server: &MockServer) -> GeminiProvider {
    GeminiProvider::new(
        "test-key".to_string(),
        Some("gemini-2.5-flash".to_string()),
        Some(server.base_url()),
    )
}

#[tokio::test]
async fn generate_joins_candidate_parts() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/models/gemini-2.5-flash:generateContent")
                .query_param("key", "test-key");
            then.status(200).json_body(json!({
                "candidates": [{
                    "content": {
                        "parts": [
                            {"text": "Day 1: SELECT basics\n"},
                            {"text": "Reading rows from a table."}
                        ]
                    }
                }]
            }));
        })
        .await;

    let text = provider_for(&server).generate("plan please").await.unwrap();
    mock.assert_async().await;
    assert!(text.starts_with("Day 1: SELECT basics"));
    assert!(text.ends_with("Reading rows from a table."));
}

#[tokio::test]
async fn quota_exhaustion_is_classified() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST);
            then.status(429).json_body(json!({
                "error": {
                    "code": 429,
                    "message": "Quota exceeded for requests per minute",
                    "status": "RESOURCE_EXHAUSTED"
                }
            }));
        })
        .await;

    let err = provider_for(&server).generate("plan please").await.unwrap_err();
    assert!(matches!(err, LearningOsError::Quota(_)));
}

#[tokio::test]
async fn bad_api_key_is_classified() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST);
            then.status(400).json_body(json!({
                "error": {
                    "code": 400,
                    "message": "API key not valid. Please pass a valid API key.",
                    "status": "INVALID_ARGUMENT"
                }
            }));
        })
        .await;

    let provider = provider_for(&server);
    let err = provider.generate("plan please").await.unwrap_err();
    assert!(matches!(err, LearningOsError::InvalidApiKey(_)));

    // Key validation reuses the same classification.
    let err = provider.validate_key().await.unwrap_err();
    assert!(matches!(err, LearningOsError::InvalidApiKey(_)));
}

#[tokio::test]
async fn response_without_text_is_an_empty_response() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST);
            then.status(200).json_body(json!({
                "candidates": [{"finishReason": "SAFETY"}]
            }));
        })
        .await;

    let err = provider_for(&server).generate("plan please").await.unwrap_err();
    assert!(matches!(err, LearningOsError::EmptyResponse(_)));
}

#[tokio::test]
async fn validate_key_succeeds_on_any_text() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/models/gemini-2.5-flash:generateContent");
            then.status(200).json_body(json!({
                "candidates": [{"content": {"parts": [{"text": "ok"}]}}]
            }));
        })
        .await;

    provider_for(&server).validate_key().await.unwrap();
}
