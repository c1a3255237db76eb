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

/// Adapter for the OpenAI-style chat completions API
pub struct OpenAiAdapter {
    base_url: String,
    api_key: String,
    model: String,
    position: SpeakerPosition,
    retry: RetryPolicy,
    turns: Arc<dyn TurnStore>,
    log: Arc<SessionLogger>,
    client: reqwest::Client,
}

impl OpenAiAdapter {
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

    /// One request attempt: send, classify the transport status, parse the
    /// body, and surface a payload-embedded error field even on 2xx.
    async fn send_request(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError> {
        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
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
impl ProviderAdapter for OpenAiAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
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
        tracing::debug!(turn = request.turn, "Sending message to OpenAI");

        let messages = history.render_for_openai(request.message, self.position)?;
        let payload = json!({
            "model": self.model,
            "messages": messages,
        });
        let url = format!("{}/chat/completions", self.base_url);

        let data = retry::execute(
            &self.retry,
            || self.send_request(&url, &payload),
            ProviderError::is_retryable,
        )
        .await
        .map_err(EngineError::Provider)?;

        let text = data
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| {
                EngineError::Provider(ProviderError::Parse(
                    "No message content in response".to_string(),
                ))
            })?
            .to_string();

        let usage = data.get("usage").cloned().unwrap_or_default();
        let usage = TokenUsage::from_openai(
            usage.get("prompt_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
            usage
                .get("completion_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(0),
            usage.get("total_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
        );

        history.record_reply(self.position, &text)?;

        // Elapsed covers every retry attempt, not just the final one
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let record = TurnRecord {
            turn: request.turn,
            speaker: self.position,
            provider: ProviderKind::OpenAi,
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
                "provider=openai model={} elapsed_ms={} tokens={}",
                self.model, elapsed_ms, record.usage.total
            ),
        );
        tracing::info!(
            turn = request.turn,
            elapsed_ms,
            tokens = record.usage.total,
            "OpenAI turn completed"
        );

        Ok(TurnOutcome { text, record })
    }
}
