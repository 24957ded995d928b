//! AI companion client.
//!
//! Wraps the Gemini `generateContent` REST endpoint behind the [`Companion`]
//! trait so the conversation flow can be exercised without the network.
//! Callers decide what to do on failure; no retries happen here.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;

use crate::config::Config;

/// Role vocabulary of the external chat API. Assistant messages replay
/// as "model" turns.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Model,
}

#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub content: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CompanionError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait Companion: Send + Sync {
    /// Generate a reply to `new_message` given the persona and the prior
    /// conversation turns (ascending, not including `new_message`).
    async fn generate(
        &self,
        system_prompt: &str,
        history: &[ChatTurn],
        new_message: &str,
    ) -> Result<String, CompanionError>;
}

pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    /// Builds the shared HTTP client. The 30-second timeout caps a hanging
    /// upstream call; timeouts surface as `CompanionError::Transport` and
    /// take the same fallback path as any other failure.
    pub fn new(config: &Config) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http,
            api_key: config.gemini_api_key.clone(),
            model: config.gemini_model.clone(),
        }
    }
}

#[async_trait]
impl Companion for GeminiClient {
    async fn generate(
        &self,
        system_prompt: &str,
        history: &[ChatTurn],
        new_message: &str,
    ) -> Result<String, CompanionError> {
        let mut contents: Vec<serde_json::Value> = history
            .iter()
            .map(|turn| {
                json!({
                    "role": turn.role,
                    "parts": [{ "text": turn.content }],
                })
            })
            .collect();
        contents.push(json!({
            "role": "user",
            "parts": [{ "text": new_message }],
        }));

        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
            self.model
        );

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(&json!({
                "system_instruction": { "parts": [{ "text": system_prompt }] },
                "contents": contents,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(CompanionError::Api { status, body });
        }

        let payload: serde_json::Value = response.json().await?;
        payload["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| CompanionError::Malformed(payload.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_role_wire_format() {
        assert_eq!(serde_json::to_string(&TurnRole::User).unwrap(), "\"user\"");
        assert_eq!(serde_json::to_string(&TurnRole::Model).unwrap(), "\"model\"");
    }
}
