//! Upload client for the remote transcript viewer
//!
//! Optionally POSTs a finished transcript to a configured viewer service.
//! Upload failures are reported to the caller but never affect the session
//! result; delivery is at-most-once, not guaranteed.

use crate::conversation::ConversationTranscript;
use crate::errors::EngineError;

/// Client for the viewer's conversation-upload endpoint
pub struct ViewerClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

/// What the viewer reported back for an accepted upload
#[derive(Debug, Clone)]
pub struct UploadReceipt {
    /// Shareable URL for the uploaded transcript, if the viewer returned one
    pub viewer_url: Option<String>,
}

impl ViewerClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    /// Upload one transcript and return the viewer's receipt
    pub async fn upload(
        &self,
        transcript: &ConversationTranscript,
    ) -> Result<UploadReceipt, EngineError> {
        let url = format!("{}/conversations", self.base_url.trim_end_matches('/'));

        let mut request = self.client.post(&url).json(transcript);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| EngineError::Upload(format!("Viewer request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(EngineError::Upload(format!(
                "Viewer returned HTTP {}: {}",
                status.as_u16(),
                text
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| EngineError::Upload(format!("Invalid viewer response: {}", e)))?;

        let viewer_url = body
            .get("url")
            .and_then(|u| u.as_str())
            .map(|u| u.to_string());

        Ok(UploadReceipt { viewer_url })
    }
}
