use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    async_trait,
    body::{Body, Bytes},
    extract::{ConnectInfo, FromRef, FromRequestParts, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, Method, Request, StatusCode},
    middleware::{from_fn_with_state, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, error, warn};

use super::domain::{ChatRequest, EmailDefaults, EmailRequest, SubmissionForm};
use super::export::{export_spending, EXPORT_FILENAME};
use super::inference::ChatRelay;
use super::notify::DeliveryStage;
use super::rate_limit::{RateDecision, RateLimiter};
use super::service::{EndpointProfile, IntakeError, IntakeService};
use super::validation::ValidationError;

/// Shared state handed to every gateway handler.
#[derive(Clone)]
pub struct GatewayState {
    pub intake: Arc<IntakeService>,
    pub chat: Arc<ChatRelay>,
    pub limiter: Arc<RateLimiter>,
    pub endpoints: Arc<EndpointSettings>,
}

/// Endpoint profiles resolved from configuration.
#[derive(Debug, Clone)]
pub struct EndpointSettings {
    pub contact: EndpointProfile,
    pub donation: EndpointProfile,
    pub email: EmailDefaults,
}

impl FromRef<GatewayState> for Arc<RateLimiter> {
    fn from_ref(state: &GatewayState) -> Self {
        state.limiter.clone()
    }
}

/// Origins allowed to call the gateway from a browser. `*` allows any origin.
#[derive(Debug, Clone, Default)]
pub struct CorsPolicy {
    pub allowed_origins: Vec<String>,
}

impl CorsPolicy {
    pub fn new(allowed_origins: Vec<String>) -> Self {
        Self { allowed_origins }
    }

    fn allows(&self, origin: &str) -> bool {
        self.allowed_origins
            .iter()
            .any(|allowed| allowed == "*" || allowed == origin)
    }
}

/// Router exposing the intake endpoints.
///
/// Requests pass through CORS first, then method matching, then the rate
/// limiter extractor, then body validation.
pub fn gateway_router(state: GatewayState, cors: CorsPolicy) -> Router {
    Router::new()
        .route(
            "/api/contact",
            post(contact_handler).fallback(method_not_allowed),
        )
        .route(
            "/api/donations",
            post(donation_handler).fallback(method_not_allowed),
        )
        .route("/api/email", post(email_handler).fallback(method_not_allowed))
        .route("/api/chat", post(chat_handler).fallback(method_not_allowed))
        .route(
            "/api/spending/export",
            get(export_handler).fallback(method_not_allowed),
        )
        .layer(from_fn_with_state(Arc::new(cors), cors_middleware))
        .with_state(state)
}

pub(crate) async fn cors_middleware(
    State(cors): State<Arc<CorsPolicy>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .filter(|origin| cors.allows(origin));

    if request.method() == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        if let Some(origin) = origin {
            allow_origin(response.headers_mut(), &origin);
            response.headers_mut().insert(
                header::ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static("GET,POST,OPTIONS"),
            );
            response.headers_mut().insert(
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static("content-type"),
            );
        }
        return response;
    }

    let mut response = next.run(request).await;
    if let Some(origin) = origin {
        allow_origin(response.headers_mut(), &origin);
    }
    response
}

fn allow_origin(headers: &mut HeaderMap, origin: &str) {
    if let Ok(value) = HeaderValue::from_str(origin) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        headers.insert(header::VARY, HeaderValue::from_static("Origin"));
    }
}

/// Client address that has been counted against the rate limit and admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmittedClient(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for AdmittedClient
where
    Arc<RateLimiter>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = IntakeError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let limiter = Arc::<RateLimiter>::from_ref(state);
        let client = client_address(parts, limiter.policy().trust_forwarded_for);

        match limiter.check(&client) {
            RateDecision::Allowed { remaining } => {
                debug!(%client, remaining, "request admitted");
                Ok(Self(client))
            }
            RateDecision::Limited { retry_after } => {
                warn!(%client, path = %parts.uri.path(), "rate limit exceeded");
                Err(IntakeError::RateLimited { retry_after })
            }
        }
    }
}

fn client_address(parts: &Parts, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|hop| !hop.is_empty());
        if let Some(hop) = forwarded {
            return hop.to_string();
        }
    }

    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Decode a JSON body, treating an empty body as an empty object.
fn parse_body<T>(body: &Bytes) -> Result<T, ValidationError>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|err| ValidationError::MalformedBody(err.to_string()))
}

pub(crate) async fn contact_handler(
    State(state): State<GatewayState>,
    AdmittedClient(client): AdmittedClient,
    body: Bytes,
) -> Result<Response, IntakeError> {
    submit_with_profile(&state, &state.endpoints.contact, &client, &body).await
}

pub(crate) async fn donation_handler(
    State(state): State<GatewayState>,
    AdmittedClient(client): AdmittedClient,
    body: Bytes,
) -> Result<Response, IntakeError> {
    submit_with_profile(&state, &state.endpoints.donation, &client, &body).await
}

async fn submit_with_profile(
    state: &GatewayState,
    profile: &EndpointProfile,
    client: &str,
    body: &Bytes,
) -> Result<Response, IntakeError> {
    let form: SubmissionForm = parse_body(body)?;
    let receipt = state.intake.submit(profile, form).await?;
    debug!(
        endpoint = profile.name,
        client,
        document_id = %receipt.document_id,
        notified = receipt.notified,
        "submission accepted"
    );
    Ok((StatusCode::OK, profile.confirmation).into_response())
}

pub(crate) async fn email_handler(
    State(state): State<GatewayState>,
    AdmittedClient(_client): AdmittedClient,
    body: Bytes,
) -> Result<Response, IntakeError> {
    let request: EmailRequest = parse_body(&body)?;
    state
        .intake
        .send_email(request, &state.endpoints.email)
        .await?;
    Ok((StatusCode::OK, "Email sent successfully!").into_response())
}

pub(crate) async fn chat_handler(
    State(state): State<GatewayState>,
    AdmittedClient(_client): AdmittedClient,
    body: Bytes,
) -> Result<Json<String>, IntakeError> {
    let request: ChatRequest = parse_body(&body)?;
    let reply = state.chat.reply(request).await?;
    Ok(Json(reply))
}

pub(crate) async fn export_handler(
    State(state): State<GatewayState>,
) -> Result<Response, IntakeError> {
    let csv = export_spending(state.intake.store())
        .await
        .map_err(|err| {
            error!(endpoint = "export", error = %err, "spending export failed");
            err
        })?;

    let disposition = format!("attachment; filename=\"{EXPORT_FILENAME}\"");
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, mime::TEXT_CSV_UTF_8.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    )
        .into_response())
}

pub(crate) async fn method_not_allowed() -> IntakeError {
    IntakeError::MethodNotAllowed
}

impl IntakeError {
    pub fn status(&self) -> StatusCode {
        match self {
            IntakeError::Validation(_) => StatusCode::BAD_REQUEST,
            IntakeError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            IntakeError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            IntakeError::Storage(_) | IntakeError::Delivery { .. } | IntakeError::Export(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn stage(&self) -> Option<&'static str> {
        match self {
            IntakeError::Storage(_) => Some("storage"),
            IntakeError::Delivery { stage, .. } => Some(stage.label()),
            IntakeError::Export(_) => Some("export"),
            IntakeError::Validation(_)
            | IntakeError::MethodNotAllowed
            | IntakeError::RateLimited { .. } => None,
        }
    }

    /// Message shown to the caller. Server-side failures get a fixed text; the
    /// provider detail stays in the logs.
    pub fn public_message(&self) -> String {
        match self {
            IntakeError::Validation(_)
            | IntakeError::MethodNotAllowed
            | IntakeError::RateLimited { .. } => self.to_string(),
            IntakeError::Storage(_) => "Failed to store submission".to_string(),
            IntakeError::Delivery { stage, .. } => match stage {
                DeliveryStage::Notification => "Failed to send notification".to_string(),
                DeliveryStage::Email => "Failed to send email".to_string(),
                DeliveryStage::Inference => "Failed to get a chat response".to_string(),
            },
            IntakeError::Export(_) => "Failed to export spending data".to_string(),
        }
    }
}

impl IntoResponse for IntakeError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.public_message();
        let body = match self.stage() {
            Some(stage) => json!({ "error": message, "stage": stage }),
            None => json!({ "error": message }),
        };

        let mut response = (status, Json(body)).into_response();
        if let IntakeError::RateLimited { retry_after } = &self {
            // Round up so a client waiting the advertised time is admitted.
            let seconds =
                (retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0)).max(1);
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(seconds));
        }
        response
    }
}
