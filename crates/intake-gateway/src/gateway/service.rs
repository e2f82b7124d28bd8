use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use super::domain::{EmailDefaults, EmailRequest, SubmissionForm, SubmissionReceipt};
use super::export::ExportError;
use super::notify::{DeliveryError, DeliveryStage, MailMessage, Mailer, NotificationMode};
use super::store::{DocumentStore, StoreError};
use super::validation::{escape_html, parse_email, present, validate_submission, ValidationError};

/// Per-endpoint settings for the shared intake pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointProfile {
    pub name: &'static str,
    pub label: &'static str,
    pub collection: String,
    pub notification: NotificationMode,
    pub confirmation: &'static str,
}

impl EndpointProfile {
    /// Contact form: stored in `contacts`, summarised to the charity inbox.
    pub fn contact(inbox: Option<String>) -> Self {
        Self {
            name: "contact",
            label: "contact form",
            collection: "contacts".to_string(),
            notification: inbox
                .map(|to| NotificationMode::Direct { to })
                .unwrap_or(NotificationMode::None),
            confirmation: "Form submitted successfully",
        }
    }

    /// Donation form: stored in `donations`, thanked through a provider template.
    pub fn donation(template_id: Option<String>) -> Self {
        Self {
            name: "donation",
            label: "donation",
            collection: "donations".to_string(),
            notification: template_id
                .map(|template_id| NotificationMode::Templated { template_id })
                .unwrap_or(NotificationMode::None),
            confirmation: "Donation submitted successfully",
        }
    }
}

/// Error raised by the intake pipeline. Every variant is scoped to one request.
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("Too many requests, please try again later")]
    RateLimited { retry_after: Duration },
    #[error("failed to store submission: {0}")]
    Storage(#[source] StoreError),
    #[error("{stage} delivery failed: {source}")]
    Delivery {
        stage: DeliveryStage,
        #[source]
        source: DeliveryError,
    },
    #[error(transparent)]
    Export(#[from] ExportError),
}

/// Validation, persistence, then notification, in that order.
pub struct IntakeService {
    store: Arc<dyn DocumentStore>,
    mailer: Arc<dyn Mailer>,
}

impl IntakeService {
    pub fn new(store: Arc<dyn DocumentStore>, mailer: Arc<dyn Mailer>) -> Self {
        Self { store, mailer }
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    /// Validate and store a form submission, then send the profile's notification.
    ///
    /// A storage failure skips the notification. A notification failure leaves
    /// the stored document in place.
    pub async fn submit(
        &self,
        profile: &EndpointProfile,
        form: SubmissionForm,
    ) -> Result<SubmissionReceipt, IntakeError> {
        let submission = validate_submission(form).map_err(|err| {
            warn!(endpoint = profile.name, %err, "submission rejected");
            err
        })?;

        let stored = self
            .store
            .append(&profile.collection, submission.to_fields())
            .await
            .map_err(|source| {
                error!(
                    endpoint = profile.name,
                    collection = %profile.collection,
                    backend = self.store.backend(),
                    name = submission.name(),
                    error = %source,
                    "failed to persist submission"
                );
                IntakeError::Storage(source)
            })?;

        info!(
            endpoint = profile.name,
            collection = %profile.collection,
            document_id = %stored.id,
            "submission stored"
        );

        let notified = match profile.notification.compose(profile.label, &submission) {
            Some(message) => {
                self.deliver(profile.name, DeliveryStage::Notification, &message)
                    .await?;
                true
            }
            None => false,
        };

        Ok(SubmissionReceipt {
            document_id: stored.id,
            created_at: stored.created_at,
            notified,
        })
    }

    /// Send a transactional email, filling gaps from `defaults`.
    pub async fn send_email(
        &self,
        request: EmailRequest,
        defaults: &EmailDefaults,
    ) -> Result<MailMessage, IntakeError> {
        let to = match present(request.to) {
            Some(to) => parse_email(&to)?,
            None => defaults
                .recipient
                .clone()
                .ok_or(ValidationError::MissingFields)?,
        };
        let subject = present(request.subject).unwrap_or_else(|| defaults.subject.clone());
        let text = present(request.text).unwrap_or_else(|| defaults.text.clone());

        let message = MailMessage::Direct {
            to,
            html: format!("<strong>{}</strong>", escape_html(&text)),
            subject,
            text,
        };
        self.deliver("email", DeliveryStage::Email, &message).await?;
        info!(endpoint = "email", recipient = message.recipient(), "email sent");
        Ok(message)
    }

    async fn deliver(
        &self,
        endpoint: &'static str,
        stage: DeliveryStage,
        message: &MailMessage,
    ) -> Result<(), IntakeError> {
        self.mailer.send(message).await.map_err(|source| {
            error!(
                endpoint,
                %stage,
                provider = self.mailer.provider(),
                recipient = message.recipient(),
                error = %source,
                "mail delivery failed"
            );
            IntakeError::Delivery { stage, source }
        })
    }
}
