//! OpenAI chat-completions client implementing the [`DecisionOracle`] trait.
//!
//! One request per cycle: the fixed instruction prompt as the system
//! message, the serialized market snapshot as the user message. No timeout
//! is set here beyond reqwest's defaults; completions can legitimately take
//! tens of seconds and the cycle blocks on them by design.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroizing;

use crate::domain::decision::{DecisionOracle, OracleError};

/// OpenAI API base URL
const OPENAI_API_BASE: &str = "https://api.openai.com";

/// OpenAI-backed decision oracle
pub struct OpenAiOracle {
    http: Client,
    base: String,
    api_key: Zeroizing<String>,
    model: String,
}

impl std::fmt::Debug for OpenAiOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiOracle")
            .field("base", &self.base)
            .field("model", &self.model)
            .field("api_key", &"<REDACTED>")
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

impl OpenAiOracle {
    pub fn new(api_key: String, model: String) -> Self {
        Self::with_base(api_key, model, OPENAI_API_BASE.to_string())
    }

    /// Create a client against a specific base URL (testing)
    pub fn with_base(api_key: String, model: String, base: String) -> Self {
        Self {
            http: Client::new(),
            base,
            api_key: Zeroizing::new(api_key),
            model,
        }
    }
}

#[async_trait]
impl DecisionOracle for OpenAiOracle {
    async fn complete(
        &self,
        system_prompt: &str,
        user_payload: &str,
    ) -> Result<String, OracleError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_payload,
                },
            ],
        };

        debug!("Requesting completion from model {}", self.model);
        let response = self
            .http
            .post(format!("{}/v1/chat/completions", self.base))
            .bearer_auth(self.api_key.as_str())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(OracleError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = response.json().await?;
        let choice = parsed.choices.into_iter().next().ok_or(OracleError::EmptyResponse)?;
        Ok(choice.message.content.trim().to_string())
    }
}
