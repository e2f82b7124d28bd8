use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use super::{delivery_transport_error, error_detail, http_client};
use crate::gateway::{ChatCompletion, ChatMessage, DeliveryError};

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiChat {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OpenAiChat {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: http_client(timeout)?,
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: model.into(),
            timeout,
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ChatCompletion for OpenAiChat {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Option<String>, DeliveryError> {
        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": self.model, "messages": messages }))
            .send()
            .await
            .map_err(|err| delivery_transport_error(err, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                detail: error_detail(response).await,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|err| delivery_transport_error(err, self.timeout))?;
        Ok(parse_completion(&body))
    }

    fn provider(&self) -> &'static str {
        "openai"
    }
}

/// Reply text from a successful response body. A body that is not JSON is
/// treated like an empty answer.
pub fn parse_completion(body: &str) -> Option<String> {
    match serde_json::from_str::<Value>(body) {
        Ok(parsed) => first_choice_content(&parsed),
        Err(err) => {
            warn!(error = %err, "chat provider returned a non-JSON body");
            None
        }
    }
}

/// Text of the first choice, if the provider produced any.
pub fn first_choice_content(body: &Value) -> Option<String> {
    body.get("choices")?
        .as_array()?
        .first()?
        .get("message")?
        .get("content")?
        .as_str()
        .map(str::trim)
        .filter(|content| !content.is_empty())
        .map(str::to_string)
}
