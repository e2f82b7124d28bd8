use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::domain::ChatRequest;
use super::notify::{DeliveryError, DeliveryStage};
use super::service::IntakeError;
use super::validation::validate_prompt;

/// Reply used when the provider answers without usable content.
pub const NO_RESPONSE: &str = "No response";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// Role-tagged message sent to a chat-completion provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Hosted chat-completion provider.
///
/// `Ok(None)` means the provider answered but produced no usable text.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Option<String>, DeliveryError>;

    fn provider(&self) -> &'static str;
}

/// Stand-in used when no inference provider is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledChat;

#[async_trait]
impl ChatCompletion for DisabledChat {
    async fn complete(&self, _messages: &[ChatMessage]) -> Result<Option<String>, DeliveryError> {
        Err(DeliveryError::Unavailable(
            "no chat provider configured".to_string(),
        ))
    }

    fn provider(&self) -> &'static str {
        "disabled"
    }
}

/// Forwards visitor prompts to the provider behind a fixed system instruction.
pub struct ChatRelay {
    client: Arc<dyn ChatCompletion>,
    system_prompt: String,
}

impl ChatRelay {
    pub fn new(client: Arc<dyn ChatCompletion>, system_prompt: impl Into<String>) -> Self {
        Self {
            client,
            system_prompt: system_prompt.into(),
        }
    }

    pub async fn reply(&self, request: ChatRequest) -> Result<String, IntakeError> {
        let prompt = validate_prompt(request.prompt).map_err(|err| {
            warn!(endpoint = "chat", %err, "chat prompt rejected");
            err
        })?;

        let messages = [
            ChatMessage::system(self.system_prompt.clone()),
            ChatMessage::user(prompt),
        ];

        let reply = self.client.complete(&messages).await.map_err(|source| {
            error!(
                endpoint = "chat",
                provider = self.client.provider(),
                error = %source,
                "chat completion failed"
            );
            IntakeError::Delivery {
                stage: DeliveryStage::Inference,
                source,
            }
        })?;

        match reply.filter(|text| !text.trim().is_empty()) {
            Some(text) => Ok(text),
            None => {
                info!(endpoint = "chat", "provider returned no content");
                Ok(NO_RESPONSE.to_string())
            }
        }
    }
}
