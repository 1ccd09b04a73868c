//! Gemini `generateContent` REST client.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::TextGenerator;
use crate::config::SummaryConfig;
use crate::error::{Result, SlidekickError};

/// Text generation over the Gemini REST API.
pub struct GeminiTextGenerator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl std::fmt::Debug for GeminiTextGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiTextGenerator")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl GeminiTextGenerator {
    /// Create a client for `config` authenticated with `api_key`.
    ///
    /// # Errors
    ///
    /// Returns [`SlidekickError::Config`] if the HTTP client cannot be built.
    pub fn new(config: &SummaryConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| SlidekickError::Config(format!("http client: {e}")))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_owned(),
            model: config.model.trim_start_matches("models/").to_owned(),
            api_key: api_key.into(),
        })
    }

    fn url(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.endpoint, self.model)
    }
}

#[async_trait]
impl TextGenerator for GeminiTextGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        });

        tracing::debug!(model = %self.model, "sending generateContent request");
        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "generateContent request failed");
                SlidekickError::Inference(format!("connection error: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read body".into());
            tracing::error!(%status, body = %body, "generateContent returned error");
            return Err(SlidekickError::Inference(format!(
                "HTTP {status}: {}",
                extract_error_message(&body)
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| SlidekickError::Inference(format!("invalid response body: {e}")))?;
        response_text(&payload)
            .ok_or_else(|| SlidekickError::Inference("response contained no text".into()))
    }
}

/// Concatenated text parts of the first candidate.
pub fn response_text(payload: &Value) -> Option<String> {
    let parts = payload
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)?;
    let text: String = parts
        .iter()
        .filter(|p| p.get("thought").and_then(Value::as_bool) != Some(true))
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();
    if text.is_empty() { None } else { Some(text) }
}

fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_owned)
        })
        .unwrap_or_else(|| body.to_owned())
}
