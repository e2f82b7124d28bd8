use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::{delivery_transport_error, error_detail, http_client};
use crate::gateway::{DeliveryError, MailMessage, Mailer};

pub const SENDGRID_ENDPOINT: &str = "https://api.sendgrid.com/v3/mail/send";

/// Mailer backed by the SendGrid v3 `mail/send` API.
pub struct SendGridMailer {
    client: reqwest::Client,
    api_key: String,
    from: String,
    endpoint: String,
    timeout: Duration,
}

impl SendGridMailer {
    pub fn new(
        api_key: impl Into<String>,
        from: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: http_client(timeout)?,
            api_key: api_key.into(),
            from: from.into(),
            endpoint: SENDGRID_ENDPOINT.to_string(),
            timeout,
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Request body for a message, in SendGrid's personalization format.
    pub fn payload(&self, message: &MailMessage) -> Value {
        match message {
            MailMessage::Direct {
                to,
                subject,
                text,
                html,
            } => json!({
                "personalizations": [{ "to": [{ "email": to }] }],
                "from": { "email": self.from },
                "subject": subject,
                "content": [
                    { "type": "text/plain", "value": text },
                    { "type": "text/html", "value": html },
                ],
            }),
            MailMessage::Templated {
                to,
                template_id,
                variables,
            } => json!({
                "personalizations": [{
                    "to": [{ "email": to }],
                    "dynamic_template_data": variables,
                }],
                "from": { "email": self.from },
                "template_id": template_id,
            }),
        }
    }
}

#[async_trait]
impl Mailer for SendGridMailer {
    async fn send(&self, message: &MailMessage) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.payload(message))
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

        debug!(
            recipient = message.recipient(),
            mode = message.mode(),
            status = status.as_u16(),
            "sendgrid accepted message"
        );
        Ok(())
    }

    fn provider(&self) -> &'static str {
        "sendgrid"
    }
}
