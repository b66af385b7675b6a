#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;

use serde_json::json;
use wechat_bridge_backend::{AccessTokenCache, CustomMessageSender};
use wechat_bridge_core::environment::SystemClock;
use wechat_bridge_core::error::PushError;
use wechat_bridge_core::push::PushSender;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_token(server: &MockServer, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path("/cgi-bin/token"))
        .and(query_param("grant_type", "client_credential"))
        .and(query_param("appid", "wx_app"))
        .and(query_param("secret", "shh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "TOKEN",
            "expires_in": 7200
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

fn sender(server: &MockServer, tokens: Arc<AccessTokenCache>) -> CustomMessageSender {
    CustomMessageSender::new("wx_app", "shh", tokens).with_api_base(server.uri())
}

#[tokio::test]
async fn token_is_fetched_once_for_consecutive_sends() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/cgi-bin/message/custom/send"))
        .and(query_param("access_token", "TOKEN"))
        .and(body_json(json!({
            "touser": "o_user",
            "msgtype": "text",
            "text": {"content": "done"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"errcode": 0, "errmsg": "ok"})))
        .expect(2)
        .mount(&server)
        .await;

    let tokens = Arc::new(AccessTokenCache::new(Arc::new(SystemClock)));
    let first = sender(&server, tokens.clone());
    let second = sender(&server, tokens.clone());

    first.send_text("o_user", "done").await.unwrap();
    second.send_text("o_user", "done").await.unwrap();
    assert_eq!(tokens.len(), 1);
}

#[tokio::test]
async fn nonzero_errcode_is_a_failure() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/cgi-bin/message/custom/send"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errcode": 45015,
            "errmsg": "response out of time limit"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let tokens = Arc::new(AccessTokenCache::new(Arc::new(SystemClock)));
    let err = sender(&server, tokens)
        .send_text("o_user", "late")
        .await
        .unwrap_err();

    assert_eq!(
        err,
        PushError::Platform {
            code: 45015,
            message: "response out of time limit".into()
        }
    );
}

#[tokio::test]
async fn token_error_stops_the_send() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cgi-bin/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errcode": 40013,
            "errmsg": "invalid appid"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/cgi-bin/message/custom/send"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let tokens = Arc::new(AccessTokenCache::new(Arc::new(SystemClock)));
    let err = sender(&server, tokens.clone())
        .send_text("o_user", "hello")
        .await
        .unwrap_err();

    assert!(matches!(err, PushError::Token(msg) if msg.contains("40013")));
    assert!(tokens.is_empty());
}
