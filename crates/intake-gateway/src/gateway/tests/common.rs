use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::extract::ConnectInfo;
use axum::http::{header, Method, Request};
use axum::response::Response;
use axum::Router;
use serde_json::Value;

use crate::gateway::domain::{EmailDefaults, SubmissionForm};
use crate::gateway::inference::{ChatCompletion, ChatMessage, ChatRelay};
use crate::gateway::notify::{DeliveryError, MailMessage, Mailer};
use crate::gateway::rate_limit::{ManualClock, RateLimitPolicy, RateLimiter};
use crate::gateway::router::{gateway_router, CorsPolicy, EndpointSettings, GatewayState};
use crate::gateway::service::{EndpointProfile, IntakeService};
use crate::gateway::store::{
    DocumentFields, DocumentStore, InMemoryDocumentStore, StoreError, StoredDocument,
};

pub(super) const INBOX: &str = "inbox@charity.example";
pub(super) const SYSTEM_PROMPT: &str = "You answer questions about the charity.";

pub(super) fn form(name: &str, email: &str, message: &str) -> SubmissionForm {
    SubmissionForm {
        name: Some(name.to_string()),
        email: Some(email.to_string()),
        message: Some(message.to_string()),
    }
}

pub(super) fn valid_form() -> SubmissionForm {
    form("Ada Lovelace", "ada@example.org", "I would like to volunteer.")
}

pub(super) fn endpoint_settings() -> EndpointSettings {
    EndpointSettings {
        contact: EndpointProfile::contact(Some(INBOX.to_string())),
        donation: EndpointProfile::donation(Some("d-thank-you".to_string())),
        email: EmailDefaults::with_recipient(Some(INBOX.to_string())),
    }
}

/// Gateway wiring with handles to every fake so tests can inspect side effects.
pub(super) struct Harness {
    pub(super) state: GatewayState,
    pub(super) store: Arc<dyn DocumentStore>,
    pub(super) mailer: Arc<RecordingMailer>,
    pub(super) chat: Arc<ScriptedChat>,
    pub(super) clock: ManualClock,
}

impl Harness {
    pub(super) fn new() -> Self {
        Self::with_store(
            Arc::new(InMemoryDocumentStore::new()),
            RecordingMailer::default(),
        )
    }

    pub(super) fn with_store(store: Arc<dyn DocumentStore>, mailer: RecordingMailer) -> Self {
        Self::build(
            store,
            mailer,
            ScriptedChat::new(ChatScript::Reply(Some("Thanks for asking!".to_string()))),
        )
    }

    pub(super) fn with_chat(chat: ScriptedChat) -> Self {
        Self::build(
            Arc::new(InMemoryDocumentStore::new()),
            RecordingMailer::default(),
            chat,
        )
    }

    fn build(store: Arc<dyn DocumentStore>, mailer: RecordingMailer, chat: ScriptedChat) -> Self {
        let mailer = Arc::new(mailer);
        let chat = Arc::new(chat);
        let clock = ManualClock::new(Instant::now());
        let limiter = Arc::new(RateLimiter::with_clock(
            RateLimitPolicy::default(),
            Arc::new(clock.clone()),
        ));
        let state = GatewayState {
            intake: Arc::new(IntakeService::new(store.clone(), mailer.clone())),
            chat: Arc::new(ChatRelay::new(chat.clone(), SYSTEM_PROMPT)),
            limiter,
            endpoints: Arc::new(endpoint_settings()),
        };
        Self {
            state,
            store,
            mailer,
            chat,
            clock,
        }
    }

    pub(super) fn router(&self) -> Router {
        gateway_router(
            self.state.clone(),
            CorsPolicy::new(vec!["https://charity.example".to_string()]),
        )
    }

    pub(super) fn service(&self) -> &IntakeService {
        &self.state.intake
    }

    pub(super) async fn documents(&self, collection: &str) -> Vec<StoredDocument> {
        self.store.list(collection).await.expect("list succeeds")
    }
}

pub(super) fn request(method: Method, uri: &str, body: Body, client: [u8; 4]) -> Request<Body> {
    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(body)
        .expect("request builds");
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from((client, 40_000))));
    request
}

pub(super) fn json_post(uri: &str, payload: &Value, client: [u8; 4]) -> Request<Body> {
    let body = serde_json::to_vec(payload).expect("payload serializes");
    request(Method::POST, uri, Body::from(body), client)
}

pub(super) async fn read_body(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = read_body(response).await;
    serde_json::from_str(&body).expect("json body")
}

/// Mailer that records messages and can be told to fail.
#[derive(Default)]
pub(super) struct RecordingMailer {
    sent: Mutex<Vec<MailMessage>>,
    fail: bool,
}

impl RecordingMailer {
    pub(super) fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub(super) fn sent(&self) -> Vec<MailMessage> {
        self.sent.lock().expect("mailer mutex poisoned").clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &MailMessage) -> Result<(), DeliveryError> {
        if self.fail {
            return Err(DeliveryError::Rejected {
                status: 401,
                detail: "invalid api key".to_string(),
            });
        }
        self.sent
            .lock()
            .expect("mailer mutex poisoned")
            .push(message.clone());
        Ok(())
    }

    fn provider(&self) -> &'static str {
        "recording"
    }
}

/// Store whose writes always fail, counting the attempts.
#[derive(Default)]
pub(super) struct UnavailableStore {
    pub(super) attempts: AtomicUsize,
}

#[async_trait]
impl DocumentStore for UnavailableStore {
    async fn append(
        &self,
        _collection: &str,
        _fields: DocumentFields,
    ) -> Result<StoredDocument, StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Unavailable("quota exceeded".to_string()))
    }

    async fn list(&self, _collection: &str) -> Result<Vec<StoredDocument>, StoreError> {
        Err(StoreError::Unavailable("quota exceeded".to_string()))
    }

    fn backend(&self) -> &'static str {
        "unavailable"
    }
}

/// Canned provider behaviour for chat tests.
#[derive(Debug, Clone)]
pub(super) enum ChatScript {
    Reply(Option<String>),
    Timeout(Duration),
    Unavailable(String),
}

/// Chat provider following a script and recording the prompts it saw.
pub(super) struct ScriptedChat {
    script: ChatScript,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedChat {
    pub(super) fn new(script: ChatScript) -> Self {
        Self {
            script,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().expect("chat mutex poisoned").clone()
    }
}

#[async_trait]
impl ChatCompletion for ScriptedChat {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Option<String>, DeliveryError> {
        self.calls
            .lock()
            .expect("chat mutex poisoned")
            .push(messages.to_vec());
        match &self.script {
            ChatScript::Reply(reply) => Ok(reply.clone()),
            ChatScript::Timeout(after) => Err(DeliveryError::Timeout(*after)),
            ChatScript::Unavailable(reason) => Err(DeliveryError::Unavailable(reason.clone())),
        }
    }

    fn provider(&self) -> &'static str {
        "scripted"
    }
}
