//! Completion provider client.
//!
//! Strategies talk to an OpenAI-compatible chat-completions endpoint through
//! the [`CompletionClient`] capability; the HTTP implementation maps provider
//! failures onto the engine's error taxonomy so the retry executor and the
//! fallback resolver can react uniformly.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use regex::Regex;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::OnceLock;
use std::time::Duration;
use url::Url;

use crate::config::CompletionConfig;
use crate::enrichment::EnrichmentError;

/// One completion invocation.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Opaque completion capability consumed by the generation strategies.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Run one completion and return the raw assistant text.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, EnrichmentError>;
}

/// Reqwest-backed client for an OpenAI-compatible API.
pub struct HttpCompletionClient {
    http: reqwest::Client,
    api_base: Url,
    api_key: Option<String>,
}

impl HttpCompletionClient {
    pub fn new(config: &CompletionConfig) -> Result<Self, anyhow::Error> {
        let api_base = Url::parse(&config.api_base)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(Self {
            http,
            api_base,
            api_key: config.api_key.clone(),
        })
    }

    fn endpoint(&self) -> Result<Url, EnrichmentError> {
        let mut url = self.api_base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| {
                    EnrichmentError::invalid_input("completion api base cannot carry path segments")
                })?;
            segments.pop_if_empty().push("chat").push("completions");
        }
        Ok(url)
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, EnrichmentError> {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(serde_json::json!({"role": "system", "content": system}));
        }
        messages.push(serde_json::json!({"role": "user", "content": request.prompt}));

        let body = serde_json::json!({
            "model": request.model,
            "messages": messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });

        let mut http_request = self.http.post(self.endpoint()?).json(&body);
        if let Some(key) = &self.api_key {
            http_request = http_request.bearer_auth(key);
        }

        let response = http_request
            .send()
            .await
            .map_err(|err| EnrichmentError::transient(format!("completion request failed: {err}")))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<i64>().ok())
                .unwrap_or(60);
            return Err(EnrichmentError::RateLimited {
                reset_at: Utc::now() + ChronoDuration::seconds(retry_after),
            });
        }

        if !status.is_success() {
            return Err(EnrichmentError::transient(format!(
                "completion provider returned status {status}"
            )));
        }

        let payload: JsonValue = response
            .json()
            .await
            .map_err(|err| EnrichmentError::transient(format!("completion body unreadable: {err}")))?;

        payload
            .pointer("/choices/0/message/content")
            .and_then(JsonValue::as_str)
            .map(str::to_string)
            .ok_or_else(|| EnrichmentError::schema_invalid("completion response carries no content"))
    }
}

/// Endpoint key the limiter tracks completion calls under.
pub const COMPLETION_ENDPOINT: &str = "completions";

/// Completion client gated by the rate limiter.
///
/// The check runs before the retry executor ever sees the call, so denied
/// calls are never executed against the provider; callers receive
/// [`EnrichmentError::RateLimited`] with the window's reset time.
pub struct RateLimitedCompletionClient {
    inner: std::sync::Arc<dyn CompletionClient>,
    limiter: std::sync::Arc<crate::rate_limit::RateLimiter>,
    actor_id: String,
}

impl RateLimitedCompletionClient {
    pub fn new(
        inner: std::sync::Arc<dyn CompletionClient>,
        limiter: std::sync::Arc<crate::rate_limit::RateLimiter>,
        actor_id: String,
    ) -> Self {
        Self {
            inner,
            limiter,
            actor_id,
        }
    }
}

#[async_trait]
impl CompletionClient for RateLimitedCompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, EnrichmentError> {
        let decision = self
            .limiter
            .check_and_increment(&self.actor_id, COMPLETION_ENDPOINT)
            .await
            .map_err(|err| {
                EnrichmentError::transient(format!("rate limiter unavailable: {}", err.message))
            })?;

        if !decision.allowed {
            return Err(EnrichmentError::RateLimited {
                reset_at: decision.reset_at,
            });
        }

        self.inner.complete(request).await
    }
}

/// Parse the JSON object a strategy asked the model for.
///
/// Models wrap output in markdown fences and leave trailing commas often
/// enough that cleaning both up before parsing is required in practice.
pub fn extract_json(content: &str) -> Result<JsonValue, EnrichmentError> {
    static TRAILING_COMMA: OnceLock<Regex> = OnceLock::new();
    let trailing_comma =
        TRAILING_COMMA.get_or_init(|| Regex::new(r",\s*([\]}])").expect("trailing comma pattern"));

    let cleaned = content
        .replace("```json", "")
        .replace("```", "")
        .trim()
        .to_string();
    let cleaned = trailing_comma.replace_all(&cleaned, "$1");

    serde_json::from_str(&cleaned)
        .map_err(|err| EnrichmentError::schema_invalid(format!("unparseable strategy JSON: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "gpt-4o".to_string(),
            system: Some("Return only JSON.".to_string()),
            prompt: "Enrich Acme Films".to_string(),
            temperature: 0.2,
            max_tokens: 2000,
        }
    }

    async fn client_for(server: &MockServer) -> HttpCompletionClient {
        let config = CompletionConfig {
            api_base: server.uri(),
            api_key: Some("test-key".to_string()),
            request_timeout_seconds: 5,
            ..Default::default()
        };
        HttpCompletionClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn returns_assistant_content_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "{\"ok\":true}"}}]
            })))
            .mount(&server)
            .await;

        let content = client_for(&server).await.complete(&request()).await.unwrap();
        assert_eq!(content, "{\"ok\":true}");
    }

    #[tokio::test]
    async fn maps_429_to_rate_limited_with_reset() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "120"))
            .mount(&server)
            .await;

        let before = Utc::now();
        let err = client_for(&server)
            .await
            .complete(&request())
            .await
            .unwrap_err();

        match err {
            EnrichmentError::RateLimited { reset_at } => {
                assert!(reset_at >= before + ChronoDuration::seconds(119));
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn maps_5xx_to_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .await
            .complete(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, EnrichmentError::TransientProvider { .. }));
    }

    #[tokio::test]
    async fn missing_content_is_schema_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": []
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .await
            .complete(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, EnrichmentError::SchemaInvalid { .. }));
    }

    #[test]
    fn extract_json_strips_fences_and_trailing_commas() {
        let content = "```json\n{\"markets\": [{\"name\": \"Films\"},]}\n```";
        let value = extract_json(content).unwrap();
        assert_eq!(value["markets"][0]["name"], "Films");
    }

    #[test]
    fn extract_json_rejects_prose() {
        assert!(matches!(
            extract_json("I could not produce JSON today."),
            Err(EnrichmentError::SchemaInvalid { .. })
        ));
    }
}
