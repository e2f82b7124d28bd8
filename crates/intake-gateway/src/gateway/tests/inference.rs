use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;
use tower::ServiceExt;

use super::common::*;
use crate::gateway::domain::ChatRequest;
use crate::gateway::inference::{ChatRole, NO_RESPONSE};
use crate::gateway::notify::{DeliveryError, DeliveryStage};
use crate::gateway::service::IntakeError;
use crate::gateway::validation::ValidationError;

fn prompt(text: &str) -> ChatRequest {
    ChatRequest {
        prompt: Some(text.to_string()),
    }
}

#[tokio::test]
async fn system_instruction_precedes_visitor_prompt() {
    let harness = Harness::new();

    let reply = harness
        .state
        .chat
        .reply(prompt("  When is the next food drive?  "))
        .await
        .expect("reply");
    assert_eq!(reply, "Thanks for asking!");

    let calls = harness.chat.calls();
    assert_eq!(calls.len(), 1);
    let messages = &calls[0];
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, ChatRole::System);
    assert_eq!(messages[0].content, SYSTEM_PROMPT);
    assert_eq!(messages[1].role, ChatRole::User);
    assert_eq!(messages[1].content, "When is the next food drive?");
}

#[tokio::test]
async fn blank_prompt_is_rejected_without_calling_provider() {
    let harness = Harness::new();

    for request in [ChatRequest::default(), prompt(""), prompt("   ")] {
        match harness.state.chat.reply(request).await {
            Err(IntakeError::Validation(ValidationError::MissingPrompt)) => {}
            other => panic!("expected missing prompt, got {other:?}"),
        }
    }
    assert!(harness.chat.calls().is_empty());

    let response = harness
        .router()
        .oneshot(json_post("/api/chat", &json!({}), [10, 0, 0, 1]))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json_body(response).await["error"], "Prompt is required");
    assert!(harness.chat.calls().is_empty());
}

#[tokio::test]
async fn empty_provider_reply_falls_back() {
    for script in [
        ChatScript::Reply(None),
        ChatScript::Reply(Some(String::new())),
        ChatScript::Reply(Some("  \n ".to_string())),
    ] {
        let harness = Harness::with_chat(ScriptedChat::new(script));
        let reply = harness
            .state
            .chat
            .reply(prompt("hello"))
            .await
            .expect("fallback reply");
        assert_eq!(reply, NO_RESPONSE);
    }
}

#[tokio::test]
async fn provider_timeout_is_an_inference_failure() {
    let harness = Harness::with_chat(ScriptedChat::new(ChatScript::Timeout(
        Duration::from_secs(10),
    )));

    match harness.state.chat.reply(prompt("hello")).await {
        Err(IntakeError::Delivery {
            stage: DeliveryStage::Inference,
            source: DeliveryError::Timeout(after),
        }) => assert_eq!(after, Duration::from_secs(10)),
        other => panic!("expected inference timeout, got {other:?}"),
    }

    let response = harness
        .router()
        .oneshot(json_post("/api/chat", &json!({ "prompt": "hello" }), [10, 0, 0, 1]))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = read_json_body(response).await;
    assert_eq!(body["stage"], "inference");
    assert_eq!(body["error"], "Failed to get a chat response");
}

#[tokio::test]
async fn unavailable_provider_keeps_process_serving() {
    let harness = Harness::with_chat(ScriptedChat::new(ChatScript::Unavailable(
        "connection refused".to_string(),
    )));
    let router = harness.router();

    for _ in 0..2 {
        let response = router
            .clone()
            .oneshot(json_post("/api/chat", &json!({ "prompt": "hello" }), [10, 0, 0, 1]))
            .await
            .expect("router responds");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    let contact = router
        .oneshot(json_post(
            "/api/contact",
            &json!({ "name": "Ada", "email": "ada@example.org", "message": "hi" }),
            [10, 0, 0, 1],
        ))
        .await
        .expect("router responds");
    assert_eq!(contact.status(), StatusCode::OK);
    assert_eq!(harness.chat.calls().len(), 2);
}
