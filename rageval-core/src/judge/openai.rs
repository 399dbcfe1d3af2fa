//! OpenAI-compatible chat completions judge.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

use super::{Judge, JudgeRequest};
use crate::config::{JudgeConfig, RetryConfig};
use crate::error::{ConfigError, JudgeError};
use crate::retry::with_retry;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Judge that calls `{base_url}/chat/completions`.
pub struct OpenAiJudge {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    temperature: f32,
    max_tokens: usize,
    request_timeout: Duration,
    retry: RetryConfig,
}

impl OpenAiJudge {
    /// Build a judge from configuration, reading the API key from the
    /// configured environment variable.
    pub fn from_config(
        config: &JudgeConfig,
        retry: &RetryConfig,
        request_timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let api_key =
            std::env::var(&config.api_key_env).map_err(|_| ConfigError::EnvVarMissing {
                var: config.api_key_env.clone(),
            })?;
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ConfigError::invalid(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            request_timeout,
            retry: retry.clone(),
        })
    }

    async fn send_once(&self, request: &JudgeRequest) -> Result<String, JudgeError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": request.model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.prompt},
            ],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "stream": false,
        });

        debug!(url = %url, model = %request.model, metric = %request.metric, "Sending judge request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(e, self.request_timeout))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| JudgeError::Connection {
            message: format!("Failed to read response body: {e}"),
        })?;

        if !status.is_success() {
            return Err(map_http_error(status, &text));
        }

        let json: Value = serde_json::from_str(&text).map_err(|e| JudgeError::ResponseParse {
            message: format!("Invalid JSON: {e}"),
        })?;
        extract_content(&json)
    }
}

#[async_trait]
impl Judge for OpenAiJudge {
    async fn complete(&self, request: JudgeRequest) -> Result<String, JudgeError> {
        with_retry(&self.retry, || self.send_once(&request)).await
    }

    fn provider_name(&self) -> &str {
        "openai"
    }
}

fn map_transport_error(err: reqwest::Error, request_timeout: Duration) -> JudgeError {
    if err.is_timeout() {
        JudgeError::Timeout {
            timeout_ms: request_timeout.as_millis() as u64,
        }
    } else {
        JudgeError::Connection {
            message: format!("Request failed: {err}"),
        }
    }
}

/// Map a non-success HTTP status to a judge error.
fn map_http_error(status: reqwest::StatusCode, body: &str) -> JudgeError {
    match status.as_u16() {
        401 | 403 => {
            debug!(body = %body, "Judge authentication failed");
            JudgeError::AuthFailed {
                provider: "openai".to_string(),
            }
        }
        429 => JudgeError::RateLimited {
            retry_after_secs: retry_after_from_body(body).unwrap_or(5),
        },
        code if code >= 500 => JudgeError::ApiRequest {
            message: format!("Server error ({status}): {body}"),
        },
        _ => JudgeError::ApiRequest {
            message: format!("HTTP {status}: {body}"),
        },
    }
}

/// Pull "... try again in 12s" out of a rate limit error message.
fn retry_after_from_body(body: &str) -> Option<u64> {
    let json: Value = serde_json::from_str(body).ok()?;
    let message = json.get("error")?.get("message")?.as_str()?;
    let tail = message.rsplit("in ").next()?;
    let digits: String = tail
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

fn extract_content(json: &Value) -> Result<String, JudgeError> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| JudgeError::ResponseParse {
            message: "response has no choices[0].message.content".to_string(),
        })
}
