//! Gemini Live adapter against a local WebSocket server.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use slidekick::audio::AudioChunk;
use slidekick::config::LiveConfig;
use slidekick::inference::{GeminiLiveConnector, InferenceConnector, LiveSetup};
use slidekick::tools::{ToolDeclaration, ToolResult};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

fn config(addr: SocketAddr, setup_timeout_ms: u64) -> LiveConfig {
    LiveConfig {
        endpoint: format!("ws://{addr}/live"),
        api_key: "test-key".into(),
        setup_timeout_ms,
        ..LiveConfig::default()
    }
}

fn live_setup() -> LiveSetup {
    LiveSetup {
        declarations: vec![ToolDeclaration::without_parameters("ping", "Ping the deck")],
        session_id: "session-1".into(),
    }
}

async fn read_json(ws: &mut WebSocketStream<TcpStream>) -> Value {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
            Some(Ok(Message::Binary(data))) => return serde_json::from_slice(&data).unwrap(),
            Some(Ok(_)) => continue,
            other => panic!("expected a JSON frame, got {other:?}"),
        }
    }
}

async fn send_json(ws: &mut WebSocketStream<TcpStream>, value: Value) {
    ws.send(Message::Text(value.to_string())).await.unwrap();
}

#[tokio::test]
async fn handshake_then_audio_tools_and_transcripts() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let query = Arc::new(Mutex::new(None::<String>));
    let seen_query = Arc::clone(&query);

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_hdr_async(stream, move |req: &Request, resp: Response| {
            *seen_query.lock().unwrap() = req.uri().query().map(str::to_owned);
            Ok::<_, ErrorResponse>(resp)
        })
        .await
        .unwrap();

        let setup = read_json(&mut ws).await;
        send_json(&mut ws, json!({"setupComplete": {}})).await;

        let audio = read_json(&mut ws).await;

        let call = json!({"toolCall": {"functionCalls": [
            {"id": "c1", "name": "navigate_slide", "args": {"direction": "next"}}
        ]}});
        ws.send(Message::Binary(call.to_string().into_bytes()))
            .await
            .unwrap();
        let tool_response = read_json(&mut ws).await;

        send_json(
            &mut ws,
            json!({"serverContent": {"outputTranscription": {"text": "Moving "}}}),
        )
        .await;
        send_json(
            &mut ws,
            json!({"serverContent": {"outputTranscription": {"text": "on."}, "turnComplete": true}}),
        )
        .await;
        ws.close(None).await.unwrap();

        (setup, audio, tool_response)
    });

    let connector = GeminiLiveConnector::new(config(addr, 2_000));
    let mut stream = connector.connect(&live_setup()).await.unwrap();

    stream
        .sink
        .send_audio(&AudioChunk::pcm(vec![1u8, 2]))
        .await
        .unwrap();

    let unit = stream.source.next_response().await.unwrap().unwrap();
    assert_eq!(unit.tool_calls.len(), 1);
    assert_eq!(unit.tool_calls[0].id, "c1");
    assert_eq!(unit.tool_calls[0].name, "navigate_slide");
    assert_eq!(unit.tool_calls[0].args["direction"], "next");

    stream
        .sink
        .send_tool_results(&[ToolResult::success(
            "c1",
            "navigate_slide",
            json!({"current_slide": 1}),
        )])
        .await
        .unwrap();

    let unit = stream.source.next_response().await.unwrap().unwrap();
    assert!(unit.turn_complete);
    assert_eq!(unit.transcripts, vec!["Moving on.".to_owned()]);

    let end = stream.source.next_response().await.unwrap().unwrap_err();
    assert!(end.is_transport_closed(), "{end}");

    let (setup, audio, tool_response) = server.await.unwrap();
    assert_eq!(query.lock().unwrap().as_deref(), Some("key=test-key"));

    let body = &setup["setup"];
    assert_eq!(
        body["model"],
        format!("models/{}", LiveConfig::default().model)
    );
    assert_eq!(body["tools"][0]["functionDeclarations"][0]["name"], "ping");
    assert!(body.get("outputAudioTranscription").is_some());

    assert_eq!(audio["realtimeInput"]["audio"]["data"], "AQI=");
    assert_eq!(audio["realtimeInput"]["audio"]["mimeType"], "audio/pcm;rate=16000");

    let response = &tool_response["toolResponse"]["functionResponses"][0];
    assert_eq!(response["id"], "c1");
    assert_eq!(response["name"], "navigate_slide");
    assert_eq!(response["response"]["status"], "success");
    assert_eq!(response["response"]["data"]["current_slide"], 1);

    stream.sink.close().await.ok();
}

#[tokio::test]
async fn setup_times_out_without_setup_complete() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let _setup = read_json(&mut ws).await;
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let connector = GeminiLiveConnector::new(config(addr, 200));
    let err = connector.connect(&live_setup()).await.err().unwrap();
    assert!(err.to_string().contains("setup timed out"), "{err}");

    server.abort();
}

#[tokio::test]
async fn close_during_setup_is_reported_with_reason() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let _setup = read_json(&mut ws).await;
        ws.close(Some(CloseFrame {
            code: CloseCode::Policy,
            reason: "API key not valid".into(),
        }))
        .await
        .unwrap();
        while ws.next().await.is_some() {}
    });

    let connector = GeminiLiveConnector::new(config(addr, 2_000));
    let err = connector.connect(&live_setup()).await.err().unwrap();
    let message = err.to_string();
    assert!(message.contains("1008"), "{message}");
    assert!(message.contains("API key not valid"), "{message}");

    server.await.unwrap();
}

#[tokio::test]
async fn unreachable_endpoint_fails_to_connect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let connector = GeminiLiveConnector::new(config(addr, 2_000));
    assert!(connector.connect(&live_setup()).await.is_err());
}
