//! Form intake gateway shared by the contact, donation, email, chat, and export endpoints.
//!
//! Each mutating request runs the same pipeline: method check, rate limit,
//! validation and escaping, persistence, then an optional notification.

pub mod domain;
pub mod export;
pub mod inference;
pub mod notify;
pub mod rate_limit;
pub mod router;
pub mod service;
pub mod store;
pub mod validation;

#[cfg(test)]
mod tests;

pub use domain::{
    ChatRequest, DocumentId, EmailDefaults, EmailRequest, Submission, SubmissionForm,
    SubmissionReceipt,
};
pub use export::{
    export_spending, render_spending_csv, ExportError, EXPORT_FILENAME, SPENDING_COLLECTION,
    SPENDING_COLUMNS,
};
pub use inference::{ChatCompletion, ChatMessage, ChatRelay, ChatRole, DisabledChat, NO_RESPONSE};
pub use notify::{DeliveryError, DeliveryStage, LogMailer, MailMessage, Mailer, NotificationMode};
pub use rate_limit::{
    Clock, ManualClock, RateDecision, RateLimitPolicy, RateLimiter, SystemClock,
};
pub use router::{gateway_router, AdmittedClient, CorsPolicy, EndpointSettings, GatewayState};
pub use service::{EndpointProfile, IntakeError, IntakeService};
pub use store::{
    DocumentFields, DocumentStore, InMemoryDocumentStore, StoreError, StoredDocument,
    CREATED_AT_FIELD,
};
pub use validation::{escape_html, ValidationError};
