//! Session lifecycle against in-memory client and inference transports.

use std::sync::atomic::Ordering;
use std::time::Duration;

use bytes::Bytes;
use serde_json::json;
use slidekick::error::SlidekickError;
use slidekick::inference::ResponseUnit;
use slidekick::session::{SessionOrchestrator, SessionPhase, SessionSettings};
use slidekick::summary::{DocumentContext, SummaryWriter};
use slidekick::tools::ToolStatus;
use tokio_util::sync::CancellationToken;

use crate::helpers::{
    ScriptedGenerator, Sent, Upstream, WAIT, failing_connector, fake_client, fake_model,
    fake_model_with_delay, tool_call, wait_until,
};

fn settings() -> SessionSettings {
    SessionSettings {
        queue_capacity: 100,
        pop_timeout: Duration::from_millis(50),
        response_backoff: Duration::from_millis(10),
        mute_model_audio: false,
        verbose_tool_logs: false,
    }
}

#[tokio::test]
async fn failed_handshake_sends_error_status_and_closes() {
    let connector = failing_connector("handshake refused");
    let orchestrator = SessionOrchestrator::new(connector, settings());
    let (mut client, source, sink) = fake_client();

    let report = orchestrator.run(source, sink).await.unwrap();

    assert!(!report.activated);
    let event = client.next_event().await;
    assert_eq!(event["type"], "status");
    assert_eq!(event["status"], "error");
    let message = event["message"].as_str().unwrap();
    assert!(message.starts_with("Connection failed:"), "{message}");
    assert!(message.contains("handshake refused"), "{message}");
    assert!(client.closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn session_announces_connection_and_advertises_slide_tools() {
    let (_model, connector) = fake_model();
    let orchestrator = SessionOrchestrator::new(connector.clone(), settings());
    let (mut client, source, sink) = fake_client();
    let mut handle = orchestrator.start(source, sink);

    assert_eq!(
        client.next_event().await,
        json!({"type": "status", "status": "connected", "message": "Voice control active"})
    );
    assert_eq!(handle.wait_for_phase(SessionPhase::Active).await, SessionPhase::Active);

    let setups = connector.setups.lock().unwrap().clone();
    assert_eq!(setups.len(), 1);
    let names: Vec<_> = setups[0].declarations.iter().map(|d| d.name.as_str()).collect();
    assert!(names.contains(&"navigate_slide"));
    assert!(names.contains(&"get_presentation_context"));
    assert!(names.contains(&"trigger_summary"));

    handle.shutdown();
    let report = handle.join().await.unwrap();
    assert!(report.activated);
    assert_eq!(report.session_id, setups[0].session_id);
}

#[tokio::test]
async fn client_audio_is_forwarded_in_order() {
    let (model, connector) = fake_model();
    let orchestrator = SessionOrchestrator::new(connector, settings());
    let (mut client, source, sink) = fake_client();
    let handle = orchestrator.start(source, sink);
    client.expect_event("status").await;

    client.send_audio(b"one");
    client.send_audio(b"two");
    client.send_audio(b"three");

    assert!(wait_until(|| model.sink.audio().len() == 3).await);
    assert_eq!(
        model.sink.audio(),
        vec![
            Bytes::from_static(b"one"),
            Bytes::from_static(b"two"),
            Bytes::from_static(b"three")
        ]
    );

    handle.shutdown();
    assert_eq!(handle.join().await.unwrap().audio_chunks, 3);
}

#[tokio::test]
async fn navigation_call_emits_intent_then_slide_command() {
    let (model, connector) = fake_model();
    let orchestrator = SessionOrchestrator::new(connector, settings());
    let (mut client, source, sink) = fake_client();
    let handle = orchestrator.start(source, sink);
    client.expect_event("status").await;

    client.send_json(json!({"type": "slide_info", "total_slides": 10, "current_slide": 2}));
    // let the receive loop apply the deck info before the model acts
    tokio::time::sleep(Duration::from_millis(100)).await;
    model.call_tools(vec![tool_call("navigate_slide", json!({"direction": "next"}))]);

    let intent = client.next_event().await;
    assert_eq!(
        intent,
        json!({"type": "intent_detected", "tool": "navigate_slide", "args": {"direction": "next"}})
    );
    assert_eq!(
        client.next_event().await,
        json!({"type": "slide_command", "action": "next", "slide_index": 3, "status": "success"})
    );

    assert!(wait_until(|| model.sink.tool_batches().len() == 1).await);
    let batches = model.sink.tool_batches();
    let batch = &batches[0];
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].id, "call-navigate_slide");
    assert_eq!(batch[0].status, ToolStatus::Success);
    assert_eq!(batch[0].data["current_slide"], 3);
    assert_eq!(batch[0].data["total_slides"], 10);

    handle.shutdown();
    assert_eq!(handle.join().await.unwrap().context.current_slide, 3);
}

#[tokio::test]
async fn jump_uses_one_based_slide_numbers() {
    let (model, connector) = fake_model();
    let orchestrator = SessionOrchestrator::new(connector, settings());
    let (mut client, source, sink) = fake_client();
    let handle = orchestrator.start(source, sink);
    client.expect_event("status").await;

    client.send_json(json!({"type": "slide_info", "total_slides": 10, "current_slide": 0}));
    tokio::time::sleep(Duration::from_millis(100)).await;
    model.call_tools(vec![tool_call(
        "navigate_slide",
        json!({"direction": "jump", "index": 5}),
    )]);

    let command = client.expect_event("slide_command").await;
    assert_eq!(command["action"], "jump");
    assert_eq!(command["slide_index"], 4);

    handle.shutdown();
    handle.join().await.unwrap();
}

#[tokio::test]
async fn failing_tools_report_errors_without_ending_the_session() {
    let (model, connector) = fake_model();
    let orchestrator = SessionOrchestrator::new(connector, settings());
    let (mut client, source, sink) = fake_client();
    let mut handle = orchestrator.start(source, sink);
    client.expect_event("status").await;

    model.call_tools(vec![
        tool_call("dance", json!({})),
        tool_call("navigate_slide", json!({"direction": "sideways"})),
    ]);

    client.expect_event("intent_detected").await;
    let unknown = client.next_event().await;
    assert_eq!(unknown["type"], "tool_result");
    assert_eq!(unknown["tool"], "dance");
    assert_eq!(unknown["status"], "error");

    client.expect_event("intent_detected").await;
    let nav = client.next_event().await;
    assert_eq!(
        nav,
        json!({"type": "slide_command", "action": "sideways", "slide_index": 0, "status": "error"})
    );

    assert!(wait_until(|| model.sink.tool_batches().len() == 1).await);
    let batches = model.sink.tool_batches();
    let batch = &batches[0];
    assert_eq!(batch.len(), 2);
    assert_eq!(
        batch[0].error.as_deref(),
        Some("Unknown tool function requested: 'dance' is not registered.")
    );
    assert_eq!(batch[1].status, ToolStatus::Error);

    assert_eq!(handle.phase(), SessionPhase::Active);
    handle.shutdown();
    assert_eq!(handle.wait_for_phase(SessionPhase::Closed).await, SessionPhase::Closed);
}

#[tokio::test]
async fn model_audio_and_transcripts_reach_the_client() {
    let (model, connector) = fake_model();
    let orchestrator = SessionOrchestrator::new(connector, settings());
    let (mut client, source, sink) = fake_client();
    let handle = orchestrator.start(source, sink);
    client.expect_event("status").await;

    model.respond(ResponseUnit {
        audio: Some(Bytes::from_static(b"voice")),
        transcripts: vec!["  Hello there  ".into(), "   ".into()],
        turn_complete: true,
        ..ResponseUnit::default()
    });

    match client.next().await {
        Some(Sent::Audio(data)) => assert_eq!(data, Bytes::from_static(b"voice")),
        other => panic!("expected model audio, got {other:?}"),
    }
    assert_eq!(
        client.next_event().await,
        json!({"type": "transcript", "text": "Hello there"})
    );

    handle.shutdown();
    assert_eq!(handle.join().await.unwrap().transcript, "Hello there");
}

#[tokio::test]
async fn muted_sessions_drop_model_audio() {
    let (model, connector) = fake_model();
    let settings = SessionSettings {
        mute_model_audio: true,
        ..settings()
    };
    let orchestrator = SessionOrchestrator::new(connector, settings);
    let (mut client, source, sink) = fake_client();
    let handle = orchestrator.start(source, sink);
    client.expect_event("status").await;

    model.respond(ResponseUnit {
        audio: Some(Bytes::from_static(b"voice")),
        transcripts: vec!["Muted but transcribed".into()],
        ..ResponseUnit::default()
    });

    match client.next().await {
        Some(Sent::Event(event)) => assert_eq!(event["text"], "Muted but transcribed"),
        other => panic!("expected transcript, got {other:?}"),
    }

    handle.shutdown();
    handle.join().await.unwrap();
}

#[tokio::test]
async fn transient_inference_errors_are_survived() {
    let (model, connector) = fake_model();
    let orchestrator = SessionOrchestrator::new(connector, settings());
    let (mut client, source, sink) = fake_client();
    let handle = orchestrator.start(source, sink);
    client.expect_event("status").await;

    model.fail(SlidekickError::TransientIo("hiccup".into()));
    model.respond(ResponseUnit {
        transcripts: vec!["still here".into()],
        ..ResponseUnit::default()
    });

    assert_eq!(client.expect_event("transcript").await["text"], "still here");
    handle.shutdown();
    handle.join().await.unwrap();
}

#[tokio::test]
async fn closed_inference_stream_ends_the_session() {
    let (model, connector) = fake_model();
    let orchestrator = SessionOrchestrator::new(connector, settings());
    let (mut client, source, sink) = fake_client();
    let mut handle = orchestrator.start(source, sink);
    client.expect_event("status").await;

    model.fail(SlidekickError::TransportClosed("1011 internal error".into()));

    assert_eq!(handle.wait_for_phase(SessionPhase::Closed).await, SessionPhase::Closed);
    let report = handle.join().await.unwrap();
    assert!(report.activated);
    assert!(client.closed.load(Ordering::SeqCst));
    assert!(model.sink.closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn upstream_hang_up_ends_the_session() {
    let (mut model, connector) = fake_model();
    let orchestrator = SessionOrchestrator::new(connector, settings());
    let (mut client, source, sink) = fake_client();
    let handle = orchestrator.start(source, sink);
    client.expect_event("status").await;

    model.hang_up();

    handle.join().await.unwrap();
    assert!(client.closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn client_disconnect_tears_down_both_transports() {
    let (model, connector) = fake_model();
    let orchestrator = SessionOrchestrator::new(connector, settings());
    let (mut client, source, sink) = fake_client();
    let handle = orchestrator.start(source, sink);
    client.expect_event("status").await;

    client.send_audio(b"a");
    client.send_audio(b"b");
    assert!(wait_until(|| model.sink.audio().len() == 2).await);
    client.disconnect();

    let report = handle.join().await.unwrap();
    assert!(report.activated);
    assert_eq!(report.audio_chunks, 2);
    assert!(client.closed.load(Ordering::SeqCst));
    assert!(model.sink.closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn server_shutdown_token_closes_sessions() {
    let (_model, connector) = fake_model();
    let shutdown = CancellationToken::new();
    let orchestrator =
        SessionOrchestrator::new(connector, settings()).with_shutdown(shutdown.clone());
    let (mut client, source, sink) = fake_client();
    let mut handle = orchestrator.start(source, sink);
    client.expect_event("status").await;

    shutdown.cancel();

    assert_eq!(handle.wait_for_phase(SessionPhase::Closed).await, SessionPhase::Closed);
    handle.join().await.unwrap();
    assert!(client.closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn shutdown_interrupts_a_stalled_tool_response() {
    let (model, connector) = fake_model_with_delay(Duration::from_secs(3600));
    let orchestrator = SessionOrchestrator::new(connector, settings());
    let (mut client, source, sink) = fake_client();
    let mut handle = orchestrator.start(source, sink);
    client.expect_event("status").await;

    model.call_tools(vec![tool_call("get_presentation_context", json!({}))]);
    assert!(wait_until(|| model.sink.log().contains(&Upstream::ToolResultsBegin)).await);

    handle.shutdown();

    assert_eq!(handle.wait_for_phase(SessionPhase::Closed).await, SessionPhase::Closed);
    let report = tokio::time::timeout(WAIT, handle.join())
        .await
        .expect("teardown finished")
        .unwrap();
    assert!(report.activated);
    assert!(model.sink.tool_batches().is_empty());
    assert!(client.closed.load(Ordering::SeqCst));
    assert!(model.sink.closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn dropping_the_session_future_stops_its_loops() {
    let (model, connector) = fake_model();
    let orchestrator = SessionOrchestrator::new(connector, settings());
    let (mut client, source, sink) = fake_client();
    let task = tokio::spawn(async move { orchestrator.run(source, sink).await });
    client.expect_event("status").await;
    assert!(!client.reader_dropped());
    assert!(!model.stream_dropped());

    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());

    assert!(wait_until(|| client.reader_dropped()).await);
    assert!(wait_until(|| model.stream_dropped()).await);
}

#[tokio::test]
async fn transient_audio_send_failures_skip_one_chunk() {
    let (model, connector) = fake_model();
    let orchestrator = SessionOrchestrator::new(connector, settings());
    let (mut client, source, sink) = fake_client();
    let handle = orchestrator.start(source, sink);
    client.expect_event("status").await;

    model
        .sink
        .fail_next_audio(SlidekickError::TransientIo("socket busy".into()));
    client.send_audio(b"lost");
    client.send_audio(b"two");
    client.send_audio(b"three");

    assert!(wait_until(|| model.sink.audio().len() == 2).await);
    assert_eq!(
        model.sink.audio(),
        vec![Bytes::from_static(b"two"), Bytes::from_static(b"three")]
    );
    assert_eq!(handle.phase(), SessionPhase::Active);

    client.send_audio(b"four");
    assert!(wait_until(|| model.sink.audio().len() == 3).await);

    handle.shutdown();
    handle.join().await.unwrap();
}

#[tokio::test]
async fn closed_upstream_on_audio_send_ends_the_session() {
    let (model, connector) = fake_model();
    let orchestrator = SessionOrchestrator::new(connector, settings());
    let (mut client, source, sink) = fake_client();
    let mut handle = orchestrator.start(source, sink);
    client.expect_event("status").await;

    model
        .sink
        .fail_next_audio(SlidekickError::TransportClosed("1000 normal closure".into()));
    client.send_audio(b"pcm");

    assert_eq!(handle.wait_for_phase(SessionPhase::Closed).await, SessionPhase::Closed);
    let report = handle.join().await.unwrap();
    assert!(report.activated);
    assert_eq!(report.audio_chunks, 1);
    assert!(model.sink.audio().is_empty());
    assert!(client.closed.load(Ordering::SeqCst));
    assert!(model.sink.closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn malformed_control_messages_are_ignored() {
    let (model, connector) = fake_model();
    let orchestrator = SessionOrchestrator::new(connector, settings());
    let (mut client, source, sink) = fake_client();
    let handle = orchestrator.start(source, sink);
    client.expect_event("status").await;

    client.send_text("not json");
    client.send_json(json!({"type": "slide_sync", "current_slide": "three"}));
    client.send_json(json!({"type": "mystery"}));
    client.send_json(json!({"type": "slide_info", "total_slides": 8, "current_slide": 1}));
    client.send_json(json!({"type": "slide_sync", "current_slide": 5}));
    tokio::time::sleep(Duration::from_millis(100)).await;
    model.call_tools(vec![tool_call("get_presentation_context", json!({}))]);

    let result = client.expect_event("tool_result").await;
    assert_eq!(result["status"], "success");
    assert_eq!(result["data"]["current_slide"], 5);
    assert_eq!(result["data"]["total_slides"], 8);
    assert!(result["data"]["session_metadata"]["session_id"].is_string());

    handle.shutdown();
    handle.join().await.unwrap();
}

#[tokio::test]
async fn audio_is_paused_while_a_tool_batch_runs() {
    let (model, connector) = fake_model_with_delay(Duration::from_millis(150));
    let orchestrator = SessionOrchestrator::new(connector, settings());
    let (mut client, source, sink) = fake_client();
    let handle = orchestrator.start(source, sink);
    client.expect_event("status").await;

    for i in 0..60 {
        client.send_audio(b"pcm");
        if i == 10 {
            model.call_tools(vec![tool_call("get_presentation_context", json!({}))]);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert!(wait_until(|| model.sink.tool_batches().len() == 1).await);
    assert!(wait_until(|| model.sink.audio().len() == 60).await);
    assert_eq!(model.sink.overlaps.load(Ordering::SeqCst), 0);

    let log = model.sink.log();
    let begin = log
        .iter()
        .position(|u| *u == Upstream::ToolResultsBegin)
        .unwrap();
    assert!(matches!(log[begin + 1], Upstream::ToolResults(_)));
    assert!(
        log[begin + 2..].iter().any(|u| matches!(u, Upstream::Audio(_))),
        "forwarding resumes after the batch"
    );

    handle.shutdown();
    handle.join().await.unwrap();
}

#[tokio::test]
async fn summary_request_injects_generated_html() {
    let (model, connector) = fake_model();
    let generator = ScriptedGenerator::new("```html\n<ul><li><strong>Point</strong> one</li></ul>\n```");
    let documents = DocumentContext::new();
    documents.set("Deck about latency budgets");
    let orchestrator = SessionOrchestrator::new(connector, settings())
        .with_summaries(SummaryWriter::new(generator.clone()), documents);
    let (mut client, source, sink) = fake_client();
    let handle = orchestrator.start(source, sink);
    client.expect_event("status").await;

    model.respond(ResponseUnit {
        transcripts: vec!["Welcome to the talk".into()],
        ..ResponseUnit::default()
    });
    client.expect_event("transcript").await;
    client.send_json(json!({"type": "request_summary"}));

    let injected = client.expect_event("inject_summary").await;
    assert_eq!(injected["html"], "<ul><li><strong>Point</strong> one</li></ul>");
    assert_eq!(injected["summary"], "Point one");

    let prompts = generator.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Welcome to the talk"));
    assert!(prompts[0].contains("Deck about latency budgets"));

    handle.shutdown();
    handle.join().await.unwrap();
}

#[tokio::test]
async fn trigger_summary_tool_launches_a_summary_with_context() {
    let (model, connector) = fake_model();
    let generator = ScriptedGenerator::new("<ul><li>Recap</li></ul>");
    let orchestrator = SessionOrchestrator::new(connector, settings())
        .with_summaries(SummaryWriter::new(generator.clone()), DocumentContext::new());
    let (mut client, source, sink) = fake_client();
    let handle = orchestrator.start(source, sink);
    client.expect_event("status").await;

    model.call_tools(vec![tool_call(
        "trigger_summary",
        json!({"conversational_context": "audience asked about caching"}),
    )]);

    let result = client.expect_event("tool_result").await;
    assert_eq!(result["tool"], "trigger_summary");
    assert_eq!(result["data"]["action"], "start_background_summary");

    let injected = client.expect_event("inject_summary").await;
    assert_eq!(injected["summary"], "Recap");
    assert!(generator.prompts()[0].contains("audience asked about caching"));
    assert!(generator.prompts()[0].contains("No slide summary available."));

    handle.shutdown();
    handle.join().await.unwrap();
}

#[tokio::test]
async fn summaries_without_a_generator_are_ignored() {
    let (_model, connector) = fake_model();
    let orchestrator = SessionOrchestrator::new(connector, settings());
    let (mut client, source, sink) = fake_client();
    let mut handle = orchestrator.start(source, sink);
    client.expect_event("status").await;

    client.send_json(json!({"type": "request_summary"}));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(client.drain().is_empty());
    assert_eq!(handle.phase(), SessionPhase::Active);
    handle.shutdown();
    assert_eq!(handle.wait_for_phase(SessionPhase::Closed).await, SessionPhase::Closed);
}

#[tokio::test]
async fn concurrent_sessions_are_independent() {
    let (model_a, connector_a) = fake_model();
    let (model_b, connector_b) = fake_model();
    let a = SessionOrchestrator::new(connector_a, settings());
    let b = SessionOrchestrator::new(connector_b, settings());
    let (mut client_a, source_a, sink_a) = fake_client();
    let (mut client_b, source_b, sink_b) = fake_client();
    let handle_a = a.start(source_a, sink_a);
    let handle_b = b.start(source_b, sink_b);
    client_a.expect_event("status").await;
    client_b.expect_event("status").await;

    client_a.send_json(json!({"type": "slide_info", "total_slides": 4, "current_slide": 3}));
    client_b.send_json(json!({"type": "slide_info", "total_slides": 9, "current_slide": 0}));
    tokio::time::sleep(Duration::from_millis(100)).await;
    model_a.call_tools(vec![tool_call("navigate_slide", json!({"direction": "next"}))]);
    model_b.call_tools(vec![tool_call("navigate_slide", json!({"direction": "next"}))]);

    assert_eq!(client_a.expect_event("slide_command").await["slide_index"], 3);
    assert_eq!(client_b.expect_event("slide_command").await["slide_index"], 1);

    handle_a.shutdown();
    handle_b.shutdown();
    let (ra, rb) = (handle_a.join().await.unwrap(), handle_b.join().await.unwrap());
    assert_ne!(ra.session_id, rb.session_id);
}
