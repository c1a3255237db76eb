use super::{
    ProviderAdapter, ProviderError, ProviderKind, SpeakerPosition, TurnOutcome, TurnRequest,
};
use crate::conversation::{TokenUsage, TurnRecord, TurnStore};
use crate::errors::EngineError;
use crate::history::HistoryStore;
use crate::logging::SessionLogger;
use crate::retry::{self, RetryPolicy};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

/// Output budget per request; Anthropic requires an explicit max_tokens
const MAX_OUTPUT_TOKENS: u32 = 4096;

/// Adapter for the Anthropic-style messages API
pub struct AnthropicAdapter {
    base_url: String,
    api_key: String,
    model: String,
    position: SpeakerPosition,
    retry: RetryPolicy,
    turns: Arc<dyn TurnStore>,
    log: Arc<SessionLogger>,
    client: reqwest::Client,
}

impl AnthropicAdapter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        position: SpeakerPosition,
        retry: RetryPolicy,
        turns: Arc<dyn TurnStore>,
        log: Arc<SessionLogger>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            position,
            retry,
            turns,
            log,
            client: reqwest::Client::new(),
        }
    }

    async fn send_request(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError> {
        let response = self
            .client
            .post(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("Content-Type", "application/json")
            .json(payload)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), text));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        if let Some(err) = data.get("error") {
            let message = err
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown API error");
            return Err(ProviderError::Api(message.to_string()));
        }

        Ok(data)
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn position(&self) -> SpeakerPosition {
        self.position
    }

    async fn process(
        &self,
        request: TurnRequest<'_>,
        history: &mut HistoryStore,
    ) -> Result<TurnOutcome, EngineError> {
        let started_at = chrono::Utc::now();
        let started = Instant::now();

        self.log.input(request.turn, request.message);
        tracing::debug!(turn = request.turn, "Sending message to Anthropic");

        // System content travels as a separate field, never in the array
        let messages = history.render_for_anthropic(request.message, self.position)?;
        let payload = json!({
            "model": self.model,
            "max_tokens": MAX_OUTPUT_TOKENS,
            "system": history.system_prompt(),
            "messages": messages,
        });
        let url = format!("{}/messages", self.base_url);

        let data = retry::execute(
            &self.retry,
            || self.send_request(&url, &payload),
            ProviderError::is_retryable,
        )
        .await
        .map_err(EngineError::Provider)?;

        let content_arr = data
            .get("content")
            .and_then(|c| c.as_array())
            .ok_or_else(|| {
                EngineError::Provider(ProviderError::Parse(
                    "No content array in response".to_string(),
                ))
            })?;

        let mut text = String::new();
        for item in content_arr {
            if let Some(part) = item.get("text").and_then(|t| t.as_str()) {
                text.push_str(part);
            }
        }

        if text.is_empty() {
            return Err(EngineError::Provider(ProviderError::Parse(
                "Empty content in response".to_string(),
            )));
        }

        let usage = data.get("usage").cloned().unwrap_or_default();
        let usage = TokenUsage::from_anthropic(
            usage.get("input_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
            usage.get("output_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
        );

        history.record_reply(self.position, &text)?;

        // Elapsed covers every retry attempt, not just the final one
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let record = TurnRecord {
            turn: request.turn,
            speaker: self.position,
            provider: ProviderKind::Anthropic,
            model: self.model.clone(),
            started_at,
            elapsed_ms,
            input: request.message.to_string(),
            output: text.clone(),
            usage,
            raw_response: data,
        };

        self.turns.save(request.session_id, &record)?;

        self.log.output(request.turn, &text);
        self.log.metadata(
            request.turn,
            &format!(
                "provider=anthropic model={} elapsed_ms={} tokens={}",
                self.model, elapsed_ms, record.usage.total
            ),
        );
        tracing::info!(
            turn = request.turn,
            elapsed_ms,
            tokens = record.usage.total,
            "Anthropic turn completed"
        );

        Ok(TurnOutcome { text, record })
    }
}
