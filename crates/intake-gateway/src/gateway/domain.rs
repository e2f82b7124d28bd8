use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::store::DocumentFields;

/// Raw contact or donation form payload as posted by the browser.
///
/// Every field is optional so that absent values surface as a validation
/// failure rather than a deserialization error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionForm {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// A validated submission whose free-text fields have been HTML-escaped.
///
/// Only the validation module can construct one, so holding a `Submission`
/// proves the presence and format checks passed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Submission {
    name: String,
    email: String,
    message: String,
}

impl Submission {
    pub(crate) fn new(name: String, email: String, message: String) -> Self {
        Self {
            name,
            email,
            message,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Document fields written to the store. `createdAt` is left to the store.
    pub fn to_fields(&self) -> DocumentFields {
        let mut fields = DocumentFields::new();
        fields.insert("name".to_string(), Value::String(self.name.clone()));
        fields.insert("email".to_string(), Value::String(self.email.clone()));
        fields.insert("message".to_string(), Value::String(self.message.clone()));
        fields
    }
}

/// Identifier assigned by the document store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub String);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of a successful intake request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionReceipt {
    pub document_id: DocumentId,
    pub created_at: DateTime<Utc>,
    pub notified: bool,
}

/// Chatbot request body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub prompt: Option<String>,
}

/// Transactional email request body; every field falls back to a default.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmailRequest {
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

/// Defaults applied to transactional email requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailDefaults {
    pub recipient: Option<String>,
    pub subject: String,
    pub text: String,
}

impl EmailDefaults {
    pub fn with_recipient(recipient: Option<String>) -> Self {
        Self {
            recipient,
            subject: "Test Email".to_string(),
            text: "This is a test email sent from the charity gateway.".to_string(),
        }
    }
}
