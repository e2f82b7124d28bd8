//! HTTP adapters for the hosted collaborators: Firestore, SendGrid, and an
//! OpenAI-compatible chat-completion API.

pub mod firestore;
pub mod openai;
pub mod sendgrid;

use std::time::Duration;

use crate::gateway::DeliveryError;

pub use firestore::FirestoreStore;
pub use openai::OpenAiChat;
pub use sendgrid::SendGridMailer;

/// Response body excerpts kept in error messages are cut to this many characters.
const ERROR_DETAIL_LIMIT: usize = 300;

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::none())
        .build()
}

pub(crate) fn delivery_transport_error(err: reqwest::Error, timeout: Duration) -> DeliveryError {
    if err.is_timeout() {
        DeliveryError::Timeout(timeout)
    } else {
        DeliveryError::Unavailable(err.to_string())
    }
}

/// Read a failed response body for diagnostics without failing on it.
pub(crate) async fn error_detail(response: reqwest::Response) -> String {
    let body = response.text().await.unwrap_or_default();
    truncate(body.trim(), ERROR_DETAIL_LIMIT)
}

fn truncate(raw: &str, limit: usize) -> String {
    match raw.char_indices().nth(limit) {
        Some((index, _)) => format!("{}...", &raw[..index]),
        None => raw.to_string(),
    }
}
