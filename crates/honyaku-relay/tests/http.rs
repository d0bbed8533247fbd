//! HttpTransport against a local mock server.

use std::sync::Arc;

use honyaku_channel::MessageChannel;
use honyaku_relay::{
    HttpTransport, PromptTransport, RelayConfig, RelayRequest, RelaySession, SessionOptions,
    SessionOutcome,
};
use honyaku_types::{BackgroundToClient, PromptPayload, RequestTag};

fn config_for(server: &mockito::Server) -> RelayConfig {
    RelayConfig {
        endpoint: format!("{}/v1/chat/completions", server.url()),
        api_key: Some("sk-test".into()),
        ..RelayConfig::default()
    }
}

#[tokio::test]
async fn quota_429_becomes_single_stream_error() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .match_header("authorization", "Bearer sk-test")
        .with_status(429)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error":"limit","errorCode":3001}"#)
        .create_async()
        .await;

    let transport: Arc<dyn PromptTransport> =
        Arc::new(HttpTransport::from_config(&config_for(&server)).unwrap());
    let (channel, _inbox) = MessageChannel::new();
    let mut port = channel.attach_page();
    let tag = RequestTag::new();

    let handle = RelaySession::open(
        RelayRequest {
            tag,
            payload: PromptPayload::new("hola"),
            model: "test-model".into(),
            destination: port.id(),
        },
        transport,
        channel.clone(),
        SessionOptions::default(),
    );
    assert_eq!(handle.join().await, Some(SessionOutcome::Failed));
    mock.assert_async().await;

    assert_eq!(
        port.recv().await,
        Some(BackgroundToClient::StreamError {
            tag,
            error: "limit".into(),
            error_code: Some(3001),
        })
    );
    channel.detach(port.id());
    assert_eq!(port.recv().await, None);
}

#[tokio::test]
async fn event_stream_body_is_decoded() {
    let mut server = mockito::Server::new_async().await;
    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
        "data: [DONE]\n\n",
    );
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .match_body(mockito::Matcher::PartialJsonString(
            r#"{"model":"test-model","stream":true}"#.into(),
        ))
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(body)
        .create_async()
        .await;

    let transport: Arc<dyn PromptTransport> =
        Arc::new(HttpTransport::from_config(&config_for(&server)).unwrap());
    let (channel, _inbox) = MessageChannel::new();
    let mut port = channel.attach_page();
    let tag = RequestTag::new();

    let handle = RelaySession::open(
        RelayRequest {
            tag,
            payload: PromptPayload::new("hola"),
            model: "test-model".into(),
            destination: port.id(),
        },
        transport,
        channel.clone(),
        SessionOptions::default(),
    );
    assert_eq!(handle.join().await, Some(SessionOutcome::Completed));
    mock.assert_async().await;

    let mut received = Vec::new();
    channel.detach(port.id());
    while let Some(msg) = port.recv().await {
        received.push(msg);
    }
    assert_eq!(
        received,
        vec![
            BackgroundToClient::StreamChunk { tag, text: "Hel".into() },
            BackgroundToClient::StreamChunk { tag, text: "lo".into() },
            BackgroundToClient::StreamEnd { tag, full_text: "Hello".into() },
        ]
    );
}

#[tokio::test]
async fn unreachable_endpoint_is_request_error() {
    let config = RelayConfig {
        endpoint: "http://127.0.0.1:9/v1/chat/completions".into(),
        api_key: Some("sk-test".into()),
        ..RelayConfig::default()
    };
    let transport = HttpTransport::from_config(&config).unwrap();
    let err = transport
        .submit(&PromptPayload::new("hola"), "m")
        .await
        .unwrap_err();
    assert!(matches!(err, honyaku_relay::TransportError::Request(_)));
}
