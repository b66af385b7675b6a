#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use futures::StreamExt;
use serde_json::json;
use wechat_bridge_backend::ChatApiClient;
use wechat_bridge_core::chat::{ChatBackend, ChatRequest, ChatResponse, ResponseMode};
use wechat_bridge_core::error::ChatError;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request(mode: ResponseMode) -> ChatRequest {
    ChatRequest {
        app_id: "app-1".into(),
        query: "hello".into(),
        conversation_id: Some("conv-1".into()),
        user: "o_user".into(),
        response_mode: mode,
    }
}

#[tokio::test]
async fn blocking_call_returns_single_chunk() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat-messages"))
        .and(header("authorization", "Bearer secret-key"))
        .and(body_partial_json(json!({
            "query": "hello",
            "response_mode": "blocking",
            "conversation_id": "conv-1",
            "user": "o_user"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "event": "message",
            "answer": "hi there",
            "conversation_id": "conv-1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ChatApiClient::new(server.uri(), "secret-key");
    let response = client.invoke(request(ResponseMode::Blocking)).await.unwrap();

    match response {
        ChatResponse::Single(chunk) => {
            assert_eq!(chunk.answer.as_deref(), Some("hi there"));
            assert_eq!(chunk.conversation_id.as_deref(), Some("conv-1"));
        }
        ChatResponse::Stream(_) => panic!("blocking mode must not stream"),
    }
}

#[tokio::test]
async fn streaming_call_parses_sse_lines() {
    let server = MockServer::start().await;
    let body = concat!(
        "data: {\"event\": \"message\", \"answer\": \"Hel\", \"conversation_id\": \"c9\"}\n\n",
        "event: ping\n\n",
        "data: {\"event\": \"ping\"}\n\n",
        "data: {\"event\": \"message\", \"answer\": \"lo\", \"conversation_id\": \"c9\"}\n\n",
        "data: {\"event\": \"message_end\", \"conversation_id\": \"c9\"}\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/chat-messages"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let client = ChatApiClient::new(server.uri(), "secret-key");
    let ChatResponse::Stream(stream) = client.invoke(request(ResponseMode::Streaming)).await.unwrap()
    else {
        panic!("streaming mode must stream");
    };

    let chunks: Vec<_> = stream.collect().await;
    assert_eq!(chunks.len(), 3);
    let answers: String = chunks
        .iter()
        .filter_map(|c| c.as_ref().unwrap().answer.clone())
        .collect();
    assert_eq!(answers, "Hello");
    assert!(chunks[2].as_ref().unwrap().is_end());
}

#[tokio::test]
async fn in_stream_error_event_is_an_error_item() {
    let server = MockServer::start().await;
    let body = "data: {\"event\": \"error\", \"status\": 400, \"message\": \"quota exceeded\"}\n\n";
    Mock::given(method("POST"))
        .and(path("/chat-messages"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let client = ChatApiClient::new(server.uri(), "secret-key");
    let stream = client
        .invoke(request(ResponseMode::Streaming))
        .await
        .unwrap()
        .into_stream();
    let items: Vec<_> = stream.collect().await;

    assert_eq!(
        items[0].as_ref().unwrap_err(),
        &ChatError::ApiError {
            status: 400,
            message: "quota exceeded".into()
        }
    );
}

#[tokio::test]
async fn http_errors_map_to_typed_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat-messages"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = ChatApiClient::new(server.uri(), "wrong");
    let err = client
        .invoke(request(ResponseMode::Blocking))
        .await
        .unwrap_err();
    assert_eq!(err, ChatError::Unauthorized);
}
