use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use super::domain::Submission;
use super::validation::escape_html;

/// Outbound email, either fully composed or expanded by the provider from a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum MailMessage {
    Direct {
        to: String,
        subject: String,
        text: String,
        html: String,
    },
    Templated {
        to: String,
        template_id: String,
        variables: BTreeMap<String, String>,
    },
}

impl MailMessage {
    pub fn recipient(&self) -> &str {
        match self {
            MailMessage::Direct { to, .. } | MailMessage::Templated { to, .. } => to,
        }
    }

    pub fn mode(&self) -> &'static str {
        match self {
            MailMessage::Direct { .. } => "direct",
            MailMessage::Templated { .. } => "templated",
        }
    }
}

/// Failure talking to an email or inference provider.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("provider did not answer within {0:?}")]
    Timeout(Duration),
    #[error("provider rejected the request ({status}): {detail}")]
    Rejected { status: u16, detail: String },
}

/// Email delivery provider.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &MailMessage) -> Result<(), DeliveryError>;

    fn provider(&self) -> &'static str;
}

/// Mailer used when no provider is configured. Messages are logged and dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &MailMessage) -> Result<(), DeliveryError> {
        info!(
            recipient = message.recipient(),
            mode = message.mode(),
            "no mail provider configured; message logged only"
        );
        Ok(())
    }

    fn provider(&self) -> &'static str {
        "log"
    }
}

/// Which notification, if any, follows a stored submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationMode {
    None,
    /// Compose a summary email and send it to a fixed inbox.
    Direct { to: String },
    /// Ask the provider to expand a template addressed to the submitter.
    Templated { template_id: String },
}

impl NotificationMode {
    /// Build the outbound message for a stored submission.
    ///
    /// Submission text is already escaped; the email is escaped here because it
    /// lands inside the HTML body.
    pub fn compose(&self, label: &str, submission: &Submission) -> Option<MailMessage> {
        match self {
            NotificationMode::None => None,
            NotificationMode::Direct { to } => {
                let email = escape_html(submission.email());
                let text = format!(
                    "Name: {}\nEmail: {}\nMessage: {}",
                    submission.name(),
                    submission.email(),
                    submission.message()
                );
                let html = format!(
                    "<p><strong>Name:</strong> {}</p>\n<p><strong>Email:</strong> {}</p>\n<p><strong>Message:</strong> {}</p>",
                    submission.name(),
                    email,
                    submission.message()
                );
                Some(MailMessage::Direct {
                    to: to.clone(),
                    subject: format!("New {label} submission from {}", submission.name()),
                    text,
                    html,
                })
            }
            NotificationMode::Templated { template_id } => {
                let mut variables = BTreeMap::new();
                variables.insert("name".to_string(), submission.name().to_string());
                variables.insert("message".to_string(), submission.message().to_string());
                Some(MailMessage::Templated {
                    to: submission.email().to_string(),
                    template_id: template_id.clone(),
                    variables,
                })
            }
        }
    }
}

/// Pipeline stage a delivery failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStage {
    Notification,
    Email,
    Inference,
}

impl DeliveryStage {
    pub fn label(&self) -> &'static str {
        match self {
            DeliveryStage::Notification => "notification",
            DeliveryStage::Email => "email",
            DeliveryStage::Inference => "inference",
        }
    }
}

impl fmt::Display for DeliveryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::domain::SubmissionForm;
    use crate::gateway::validation::validate_submission;

    fn submission() -> Submission {
        validate_submission(SubmissionForm {
            name: Some("<b>Ada</b>".to_string()),
            email: Some("ada@example.org".to_string()),
            message: Some("I'd like to help".to_string()),
        })
        .expect("valid submission")
    }

    #[test]
    fn none_mode_composes_nothing() {
        assert!(NotificationMode::None
            .compose("contact form", &submission())
            .is_none());
    }

    #[test]
    fn direct_mode_summarises_escaped_submission() {
        let mode = NotificationMode::Direct {
            to: "inbox@charity.example".to_string(),
        };
        let Some(MailMessage::Direct {
            to,
            subject,
            text,
            html,
        }) = mode.compose("contact form", &submission())
        else {
            panic!("expected direct message");
        };

        assert_eq!(to, "inbox@charity.example");
        assert_eq!(
            subject,
            "New contact form submission from &lt;b&gt;Ada&lt;/b&gt;"
        );
        assert!(text.contains("Message: I&#39;d like to help"));
        assert!(html.contains("&lt;b&gt;Ada&lt;/b&gt;"));
        assert!(!html.contains("<b>Ada"));
    }

    #[test]
    fn templated_mode_addresses_submitter() {
        let mode = NotificationMode::Templated {
            template_id: "d-thanks".to_string(),
        };
        let message = mode
            .compose("donation", &submission())
            .expect("templated message");

        assert_eq!(message.recipient(), "ada@example.org");
        assert_eq!(message.mode(), "templated");
        match message {
            MailMessage::Templated {
                template_id,
                variables,
                ..
            } => {
                assert_eq!(template_id, "d-thanks");
                assert_eq!(
                    variables.get("name").map(String::as_str),
                    Some("&lt;b&gt;Ada&lt;/b&gt;")
                );
            }
            other => panic!("expected templated message, got {other:?}"),
        }
    }
}
