//! Screenshot → `{atk, def}` through an external vision model.
//!
//! The model is unreliable by assumption. Transport failures, non-success
//! statuses and unparsable answers all surface as
//! [`ClanError::ExternalService`], and nothing here touches the stores. A
//! caller shows the result for confirmation and then upserts it.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ExtractConfig;
use crate::error::{ClanError, Result};
use crate::stats::magnitude::deserialize_lenient;

pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com";

pub const SUPPORTED_MIME_TYPES: &[&str] = &["image/png", "image/jpeg", "image/jpg", "image/webp"];

pub const EXTRACTION_PROMPT: &str = r#"Analyze this image and extract the following information if present:
- ATK (attack value - may have M for millions, e.g., "2M" = 2000000)
- DEF (defense value - may have M for millions, e.g., "4.1M" = 4100000)

Convert any values with M suffix to actual numbers (multiply by 1,000,000).
Look for icons or symbols that typically represent attack (swords, red) and defense (shields, gray/black).

Please respond in this exact JSON format with converted numeric values:
{
  "atk": numeric_value_or_0,
  "def": numeric_value_or_0
}

Examples:
- "2M" should become 2000000
- "4.1M" should become 4100000
- "2.2M" should become 2200000

If you cannot find specific values, use 0 as default."#;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedStats {
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub atk: u64,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub def: u64,
}

#[async_trait]
pub trait StatExtractor: Send + Sync {
    async fn extract(&self, image: &[u8], mime_type: &str) -> Result<ExtractedStats>;
}

/// Checks the upload before any network call. Returns the normalized MIME type.
pub fn validate_image(image: &[u8], mime_type: &str) -> Result<String> {
    if image.is_empty() {
        return Err(ClanError::validation("image upload is empty"));
    }
    let mime = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if !SUPPORTED_MIME_TYPES.contains(&mime.as_str()) {
        return Err(ClanError::validation(format!(
            "unsupported image type '{mime_type}' (expected png, jpeg or webp)"
        )));
    }
    Ok(mime)
}

/// Returns the contents of the first fenced block, preferring a ```json fence.
/// Text without fences is returned trimmed.
pub fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let start = if let Some(pos) = text.find("```json") {
        pos + "```json".len()
    } else if let Some(pos) = text.find("```") {
        pos + "```".len()
    } else {
        return text;
    };
    let rest = &text[start..];
    let end = rest.find("```").unwrap_or(rest.len());
    rest[..end].trim()
}

/// Parses a model answer into stats. Values may be numbers or magnitude
/// strings; missing values are 0.
pub fn parse_extraction_response(text: &str) -> Result<ExtractedStats> {
    let body = strip_code_fence(text);
    let value: Value = serde_json::from_str(body).map_err(|err| {
        ClanError::ExternalService(format!("model did not return JSON: {err}"))
    })?;
    if !value.is_object() {
        return Err(ClanError::ExternalService(
            "model returned JSON that is not an object".to_string(),
        ));
    }
    serde_json::from_value(value).map_err(|err| {
        ClanError::ExternalService(format!("model returned malformed stats: {err}"))
    })
}

/// Longest slice of an error body carried into the error message.
const ERROR_BODY_EXCERPT_CHARS: usize = 500;

/// First `max_chars` characters of `text`, cut on a character boundary.
fn excerpt(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

#[derive(Debug, Clone, Serialize)]
struct GeminiGenerateContentRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<GeminiContentPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum GeminiContentPart {
    Text { text: String },
    InlineData { inline_data: GeminiInlineData },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiGenerateContentResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

impl GeminiGenerateContentResponse {
    fn first_text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|part| match part {
                GeminiContentPart::Text { text } => Some(text.as_str()),
                GeminiContentPart::InlineData { .. } => None,
            })
            .collect();
        (!text.trim().is_empty()).then_some(text)
    }
}

/// Google Gemini `generateContent` client.
#[derive(Debug, Clone)]
pub struct GeminiExtractor {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    endpoint: String,
}

impl GeminiExtractor {
    pub fn new(config: &ExtractConfig) -> Result<Self> {
        Self::with_endpoint(config, DEFAULT_GEMINI_ENDPOINT)
    }

    pub fn with_endpoint(config: &ExtractConfig, endpoint: &str) -> Result<Self> {
        let client = build_client(config.timeout)?;
        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn request_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.endpoint, self.model
        )
    }
}

fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|err| ClanError::Config(format!("failed to build HTTP client: {err}")))
}

#[async_trait]
impl StatExtractor for GeminiExtractor {
    async fn extract(&self, image: &[u8], mime_type: &str) -> Result<ExtractedStats> {
        let mime_type = validate_image(image, mime_type)?;
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(ClanError::ExternalService(
                "GEMINI_API_KEY is not set".to_string(),
            ));
        };

        let request = GeminiGenerateContentRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: vec![
                    GeminiContentPart::InlineData {
                        inline_data: GeminiInlineData {
                            mime_type,
                            data: base64::engine::general_purpose::STANDARD.encode(image),
                        },
                    },
                    GeminiContentPart::Text {
                        text: EXTRACTION_PROMPT.to_string(),
                    },
                ],
            }],
        };

        debug!(model = %self.model, bytes = image.len(), "requesting stat extraction");
        let response = self
            .client
            .post(self.request_url())
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await
            .map_err(|err| {
                let reason = if err.is_timeout() { "timed out" } else { "failed" };
                warn!(error = %err, "extraction request {reason}");
                ClanError::ExternalService(format!("extraction request {reason}: {err}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let text = excerpt(&body, ERROR_BODY_EXCERPT_CHARS);
            warn!(%status, "extraction service returned an error");
            return Err(ClanError::ExternalService(format!(
                "extraction service answered {status}: {text}"
            )));
        }

        let payload: GeminiGenerateContentResponse = response.json().await.map_err(|err| {
            ClanError::ExternalService(format!("unreadable extraction response: {err}"))
        })?;
        let text = payload.first_text().ok_or_else(|| {
            ClanError::ExternalService("extraction response contained no text".to_string())
        })?;
        let stats = parse_extraction_response(&text)?;
        debug!(atk = stats.atk, def = stats.def, "stats extracted");
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use axum::routing::post;
    use axum::{Json, Router};

    use super::*;

    #[test]
    fn strips_json_and_bare_fences() {
        assert_eq!(strip_code_fence("```json\n{\"atk\": 1}\n```"), "{\"atk\": 1}");
        assert_eq!(strip_code_fence("Here:\n```\n{\"def\": 2}\n```\nbye"), "{\"def\": 2}");
        assert_eq!(strip_code_fence("  {\"atk\": 3}  "), "{\"atk\": 3}");
        assert_eq!(strip_code_fence("```json {\"atk\": 4}"), "{\"atk\": 4}");
    }

    #[test]
    fn parses_numbers_strings_and_defaults() {
        let stats = parse_extraction_response("```json\n{\"atk\": 2000000, \"def\": \"4.1M\"}\n```")
            .unwrap();
        assert_eq!(stats, ExtractedStats { atk: 2_000_000, def: 4_100_000 });

        let stats = parse_extraction_response("{\"atk\": 5}").unwrap();
        assert_eq!(stats, ExtractedStats { atk: 5, def: 0 });
    }

    #[test]
    fn malformed_answers_are_external_errors() {
        for answer in ["I could not read the image", "[1, 2]", "```json\n{\"atk\": \n```"] {
            let err = parse_extraction_response(answer).unwrap_err();
            assert!(matches!(err, ClanError::ExternalService(_)), "{answer}");
        }
    }

    #[test]
    fn image_validation_checks_type_and_size() {
        assert_eq!(validate_image(b"x", "image/PNG").unwrap(), "image/png");
        assert!(matches!(validate_image(b"", "image/png"), Err(ClanError::Validation(_))));
        assert!(matches!(validate_image(b"x", "text/plain"), Err(ClanError::Validation(_))));
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn config_with_key() -> ExtractConfig {
        ExtractConfig {
            api_key: Some("test-key".to_string()),
            ..ExtractConfig::default()
        }
    }

    #[tokio::test]
    async fn gemini_client_parses_candidate_text() {
        let router = Router::new().route(
            "/v1beta/models/:model",
            post(|Json(body): Json<Value>| async move {
                assert!(body["contents"][0]["parts"][0]["inline_data"]["data"].is_string());
                Json(serde_json::json!({
                    "candidates": [{
                        "content": {
                            "role": "model",
                            "parts": [{
                                "text": "```json\n{\"atk\": 2000000, \"def\": 4100000}\n```"
                            }]
                        }
                    }]
                }))
            }),
        );
        let endpoint = serve(router).await;
        let extractor = GeminiExtractor::with_endpoint(&config_with_key(), &endpoint).unwrap();

        let stats = extractor.extract(b"fake-png", "image/png").await.unwrap();
        assert_eq!(stats, ExtractedStats { atk: 2_000_000, def: 4_100_000 });
    }

    #[tokio::test]
    async fn gemini_client_reports_error_status() {
        let router = Router::new().route(
            "/v1beta/models/:model",
            post(|| async { (axum::http::StatusCode::SERVICE_UNAVAILABLE, "overloaded") }),
        );
        let endpoint = serve(router).await;
        let extractor = GeminiExtractor::with_endpoint(&config_with_key(), &endpoint).unwrap();

        let err = extractor.extract(b"fake-png", "image/png").await.unwrap_err();
        assert!(matches!(err, ClanError::ExternalService(_)));
    }

    #[test]
    fn excerpt_never_splits_a_character() {
        let text = format!("{}é tail", "a".repeat(499));
        assert_eq!(excerpt(&text, 500), format!("{}é", "a".repeat(499)));
        assert_eq!(excerpt("short", 500), "short");
    }

    #[tokio::test]
    async fn error_body_with_multibyte_text_is_reported() {
        let router = Router::new().route(
            "/v1beta/models/:model",
            post(|| async {
                (
                    axum::http::StatusCode::SERVICE_UNAVAILABLE,
                    format!("{}é tail", "a".repeat(499)),
                )
            }),
        );
        let endpoint = serve(router).await;
        let extractor = GeminiExtractor::with_endpoint(&config_with_key(), &endpoint).unwrap();

        let handle = tokio::spawn(async move { extractor.extract(b"png", "image/png").await });
        let err = handle.await.expect("extraction must not panic").unwrap_err();
        assert!(matches!(err, ClanError::ExternalService(_)));
        assert!(!err.to_string().contains("tail"));
    }

    #[tokio::test]
    async fn missing_api_key_fails_without_network() {
        let extractor = GeminiExtractor::new(&ExtractConfig::default()).unwrap();
        let err = extractor.extract(b"fake-png", "image/png").await.unwrap_err();
        assert!(matches!(err, ClanError::ExternalService(_)));
    }
}
