use intake_gateway::config::AppConfig;
use intake_gateway::error::AppError;
use intake_gateway::gateway::{
    ChatCompletion, ChatRelay, CorsPolicy, DisabledChat, DocumentStore, EmailDefaults,
    EndpointProfile, EndpointSettings, GatewayState, InMemoryDocumentStore, IntakeService,
    LogMailer, Mailer, RateLimitPolicy, RateLimiter,
};
use intake_gateway::providers::{FirestoreStore, OpenAiChat, SendGridMailer};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Firestore when a project is configured, otherwise a process-local store.
pub(crate) fn build_store(config: &AppConfig) -> Result<Arc<dyn DocumentStore>, AppError> {
    match &config.store.firestore {
        Some(firestore) => Ok(Arc::new(FirestoreStore::new(
            firestore.base_url.clone(),
            firestore.project_id.clone(),
            firestore.access_token.clone(),
            config.outbound_timeout,
        )?)),
        None => {
            warn!("FIRESTORE_PROJECT_ID not set; submissions are kept in memory only");
            Ok(Arc::new(InMemoryDocumentStore::new()))
        }
    }
}

fn build_mailer(config: &AppConfig) -> Result<Arc<dyn Mailer>, AppError> {
    match (&config.mail.sendgrid_api_key, &config.mail.from) {
        (Some(api_key), Some(from)) => Ok(Arc::new(SendGridMailer::new(
            api_key.clone(),
            from.clone(),
            config.outbound_timeout,
        )?)),
        _ => {
            warn!("SENDGRID_API_KEY not set; outbound email is logged only");
            Ok(Arc::new(LogMailer))
        }
    }
}

fn build_chat(config: &AppConfig) -> Result<Arc<dyn ChatCompletion>, AppError> {
    match &config.chat.api_key {
        Some(api_key) => Ok(Arc::new(OpenAiChat::new(
            api_key.clone(),
            config.chat.base_url.clone(),
            config.chat.model.clone(),
            config.outbound_timeout,
        )?)),
        None => {
            warn!("CHAT_API_KEY not set; chat requests will fail");
            Ok(Arc::new(DisabledChat))
        }
    }
}

fn endpoint_settings(config: &AppConfig) -> EndpointSettings {
    EndpointSettings {
        contact: EndpointProfile::contact(config.mail.inbox.clone()),
        donation: EndpointProfile::donation(config.mail.donation_template_id.clone()),
        email: EmailDefaults::with_recipient(config.mail.inbox.clone()),
    }
}

pub(crate) fn build_gateway_state(config: &AppConfig) -> Result<GatewayState, AppError> {
    let store = build_store(config)?;
    let mailer = build_mailer(config)?;
    let chat = build_chat(config)?;

    info!(
        store = store.backend(),
        mailer = mailer.provider(),
        chat = chat.provider(),
        "gateway collaborators configured"
    );

    Ok(GatewayState {
        intake: Arc::new(IntakeService::new(store, mailer)),
        chat: Arc::new(ChatRelay::new(chat, config.chat.system_prompt.clone())),
        limiter: Arc::new(RateLimiter::new(RateLimitPolicy::from(&config.rate_limit))),
        endpoints: Arc::new(endpoint_settings(config)),
    })
}

pub(crate) fn cors_policy(config: &AppConfig) -> CorsPolicy {
    CorsPolicy::new(config.server.cors_origins.clone())
}
