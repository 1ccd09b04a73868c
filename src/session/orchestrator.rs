//! Per-connection session orchestrator.
//!
//! One [`Session`] is created per client connection and moves through
//! [`SessionPhase`]: `Connecting` until the upstream inference handshake
//! succeeds, `Active` while three loops run, `Closing` once any loop exits
//! (or shutdown is requested), `Closed` after teardown.
//!
//! While active, three tasks share one [`CancellationToken`]:
//!
//! ```text
//! client ──► receive loop ──► AudioQueue ──► forward loop (gated) ──► inference
//!                 │                                                     │
//!                 └──► StateManager ◄── ToolExecutor ◄── response loop ◄┘
//!                                                          │
//!                                                client ◄──┘
//! ```
//!
//! Each loop holds a drop guard on the token, so the first loop to exit for
//! any reason (including a panic) cancels the others. Every await inside a
//! loop races the token, including tool batches and client sends. Teardown
//! waits for all loops and background summary tasks before releasing the
//! queue and closing both transports. Dropping the session future cancels
//! the token as well.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use super::client::{ClientEvent, ClientFrame, ClientLink, ClientSink, ClientSource, ControlMessage};
use super::gate::InterruptionGate;
use super::state::{PresentationContext, StateManager};
use crate::audio::{AudioChunk, AudioQueue};
use crate::config::SlidekickConfig;
use crate::error::{Result, SlidekickError};
use crate::inference::{InferenceConnector, InferenceSink, InferenceSource, LiveSetup, ResponseUnit};
use crate::summary::{DocumentContext, SummaryLauncher, SummaryWriter};
use crate::tools::{
    NAVIGATE_SLIDE, SlideTools, TRIGGER_SUMMARY, ToolCall, ToolExecutor, ToolResult,
    register_slide_tools,
};

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Client accepted, upstream handshake pending.
    Connecting,
    /// All three loops running.
    Active,
    /// Loops cancelled, resources being released.
    Closing,
    /// Terminal.
    Closed,
}

/// Per-session tunables.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Audio queue capacity.
    pub queue_capacity: usize,
    /// Forward loop poll timeout.
    pub pop_timeout: Duration,
    /// Response loop pause after a transient error.
    pub response_backoff: Duration,
    /// Drop model audio instead of relaying it.
    pub mute_model_audio: bool,
    /// Log tool registration and execution.
    pub verbose_tool_logs: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&SlidekickConfig::default())
    }
}

impl From<&SlidekickConfig> for SessionSettings {
    fn from(config: &SlidekickConfig) -> Self {
        Self {
            queue_capacity: config.audio.client_queue_capacity,
            pop_timeout: config.audio.pop_timeout(),
            response_backoff: config.session.response_backoff(),
            mute_model_audio: config.session.mute_model_audio,
            verbose_tool_logs: config.session.verbose_tool_logs,
        }
    }
}

/// Resources owned by one client connection.
pub struct Session {
    id: String,
    client: Arc<ClientLink>,
    state: Arc<StateManager>,
    queue: Arc<AudioQueue>,
    gate: InterruptionGate,
    executor: Arc<ToolExecutor>,
    cancel: CancellationToken,
    phase: watch::Sender<SessionPhase>,
}

impl Session {
    fn new(
        settings: &SessionSettings,
        sink: Box<dyn ClientSink>,
        cancel: CancellationToken,
        phase: watch::Sender<SessionPhase>,
    ) -> Result<Self> {
        let id = uuid::Uuid::new_v4().to_string();
        let state = Arc::new(StateManager::new(0));
        state.set_session_id(id.clone());

        let mut executor = ToolExecutor::new(settings.verbose_tool_logs);
        register_slide_tools(&mut executor, &SlideTools::new(Arc::clone(&state)))?;

        Ok(Self {
            id,
            client: Arc::new(ClientLink::new(sink, cancel.clone())),
            state,
            queue: Arc::new(AudioQueue::new(settings.queue_capacity)),
            gate: InterruptionGate::new(),
            executor: Arc::new(executor),
            cancel,
            phase,
        })
    }

    /// Session identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the client is still connected.
    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> SessionPhase {
        *self.phase.borrow()
    }

    fn set_phase(&self, phase: SessionPhase) {
        self.phase.send_replace(phase);
        tracing::debug!(?phase, "session phase");
    }

    fn report(&self, activated: bool) -> SessionReport {
        SessionReport {
            session_id: self.id.clone(),
            activated,
            audio_chunks: self.queue.chunk_count(),
            transcript: self.state.get_transcript(),
            context: self.state.get_context(),
        }
    }
}

/// Outcome of a finished session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    /// Session identifier.
    pub session_id: String,
    /// Whether the session reached [`SessionPhase::Active`].
    pub activated: bool,
    /// Audio chunks accepted from the client.
    pub audio_chunks: u64,
    /// Final transcript.
    pub transcript: String,
    /// Final presentation state.
    pub context: PresentationContext,
}

/// Handle to a session running on its own task.
pub struct SessionHandle {
    phase: watch::Receiver<SessionPhase>,
    cancel: CancellationToken,
    task: JoinHandle<Result<SessionReport>>,
}

impl SessionHandle {
    /// Current lifecycle phase.
    pub fn phase(&self) -> SessionPhase {
        *self.phase.borrow()
    }

    /// Wait until the session reaches `phase` (or any later phase).
    pub async fn wait_for_phase(&mut self, phase: SessionPhase) -> SessionPhase {
        let rank = |p: SessionPhase| p as u8;
        match self.phase.wait_for(|p| rank(*p) >= rank(phase)).await {
            Ok(p) => *p,
            Err(_) => SessionPhase::Closed,
        }
    }

    /// Request shutdown. Idempotent.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Wait for the session to finish.
    ///
    /// # Errors
    ///
    /// Returns [`SlidekickError::TaskFailed`] if the session task panicked,
    /// or the error from [`SessionOrchestrator::run`].
    pub async fn join(self) -> Result<SessionReport> {
        self.task
            .await
            .map_err(|e| SlidekickError::TaskFailed(e.to_string()))?
    }
}

/// Runs sessions against an inference connector.
#[derive(Clone)]
pub struct SessionOrchestrator {
    connector: Arc<dyn InferenceConnector>,
    writer: Option<SummaryWriter>,
    documents: DocumentContext,
    settings: SessionSettings,
    shutdown: CancellationToken,
}

impl SessionOrchestrator {
    /// Create an orchestrator without summary support.
    pub fn new(connector: Arc<dyn InferenceConnector>, settings: SessionSettings) -> Self {
        Self {
            connector,
            writer: None,
            documents: DocumentContext::new(),
            settings,
            shutdown: CancellationToken::new(),
        }
    }

    /// Enable background summaries.
    #[must_use]
    pub fn with_summaries(mut self, writer: SummaryWriter, documents: DocumentContext) -> Self {
        self.writer = Some(writer);
        self.documents = documents;
        self
    }

    /// Tie every session to a process-wide shutdown token.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Per-session settings in use.
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Serve one client connection to completion.
    ///
    /// # Errors
    ///
    /// Fails only if the per-session tool registry cannot be built; transport
    /// failures end the session and are reflected in the report.
    pub async fn run(
        &self,
        source: Box<dyn ClientSource>,
        sink: Box<dyn ClientSink>,
    ) -> Result<SessionReport> {
        let (phase, _) = watch::channel(SessionPhase::Connecting);
        let cancel = self.shutdown.child_token();
        self.drive(source, sink, cancel, phase).await
    }

    /// Serve one client connection on a new task.
    pub fn start(&self, source: Box<dyn ClientSource>, sink: Box<dyn ClientSink>) -> SessionHandle {
        let (phase, phase_rx) = watch::channel(SessionPhase::Connecting);
        let cancel = self.shutdown.child_token();
        let this = self.clone();
        let session_cancel = cancel.clone();
        let task = tokio::spawn(async move { this.drive(source, sink, session_cancel, phase).await });
        SessionHandle {
            phase: phase_rx,
            cancel,
            task,
        }
    }

    async fn drive(
        &self,
        source: Box<dyn ClientSource>,
        sink: Box<dyn ClientSink>,
        cancel: CancellationToken,
        phase: watch::Sender<SessionPhase>,
    ) -> Result<SessionReport> {
        let session = Session::new(&self.settings, sink, cancel, phase)?;
        let span = tracing::info_span!("session", session_id = %session.id);
        Ok(self.serve(session, source).instrument(span).await)
    }

    async fn serve(&self, session: Session, source: Box<dyn ClientSource>) -> SessionReport {
        // Dropping this future before teardown still stops the loops.
        let _cancel_on_drop = session.cancel.clone().drop_guard();
        tracing::info!("client connected");

        let setup = LiveSetup {
            declarations: session.executor.declarations().to_vec(),
            session_id: session.id.clone(),
        };
        let connected = tokio::select! {
            () = session.cancel.cancelled() => Err(SlidekickError::TransportClosed("shutdown during connect".into())),
            stream = self.connector.connect(&setup) => stream,
        };
        let stream = match connected {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(error = %e, "inference connection failed");
                session.set_phase(SessionPhase::Closing);
                let _ = session
                    .client
                    .send_event(&ClientEvent::error(format!("Connection failed: {e}")))
                    .await;
                session.queue.close();
                session.client.close().await;
                session.set_phase(SessionPhase::Closed);
                return session.report(false);
            }
        };

        if let Err(e) = session.client.send_event(&ClientEvent::connected()).await {
            tracing::info!(error = %e, "client gone before activation");
        }
        session.set_phase(SessionPhase::Active);

        let tracker = TaskTracker::new();
        let launcher = SummaryLauncher::new(
            self.writer.clone(),
            self.documents.clone(),
            Arc::clone(&session.state),
            Arc::clone(&session.client),
            tracker.clone(),
            session.cancel.clone(),
        );

        let span = tracing::Span::current();
        let receive = tracker.spawn(
            receive_loop(
                source,
                Arc::clone(&session.queue),
                Arc::clone(&session.state),
                Arc::clone(&session.client),
                launcher.clone(),
                session.cancel.clone(),
            )
            .instrument(span.clone()),
        );
        let forward = tracker.spawn(
            forward_loop(
                Arc::clone(&session.queue),
                session.gate.clone(),
                Arc::clone(&stream.sink),
                self.settings.pop_timeout,
                session.cancel.clone(),
            )
            .instrument(span.clone()),
        );
        let respond = tracker.spawn(
            response_loop(
                stream.source,
                ResponseContext {
                    sink: Arc::clone(&stream.sink),
                    client: Arc::clone(&session.client),
                    state: Arc::clone(&session.state),
                    gate: session.gate.clone(),
                    executor: Arc::clone(&session.executor),
                    launcher,
                    mute_model_audio: self.settings.mute_model_audio,
                    backoff: self.settings.response_backoff,
                },
                session.cancel.clone(),
            )
            .instrument(span),
        );

        session.cancel.cancelled().await;
        session.set_phase(SessionPhase::Closing);

        let (receive, forward, respond) = tokio::join!(receive, forward, respond);
        for (name, joined) in [("receive", receive), ("forward", forward), ("response", respond)] {
            if let Err(e) = joined {
                tracing::error!(task = name, error = %e, "session loop failed");
            }
        }

        tracker.close();
        tracker.wait().await;

        session.queue.close();
        session.gate.open();
        session.client.close().await;
        if let Err(e) = stream.sink.close().await {
            tracing::debug!(error = %e, "inference close failed");
        }

        session.set_phase(SessionPhase::Closed);
        let report = session.report(true);
        tracing::info!(
            audio_chunks = report.audio_chunks,
            transcript_entries = session.state.transcript_len(),
            "session closed"
        );
        report
    }
}

async fn receive_loop(
    mut source: Box<dyn ClientSource>,
    queue: Arc<AudioQueue>,
    state: Arc<StateManager>,
    client: Arc<ClientLink>,
    launcher: SummaryLauncher,
    cancel: CancellationToken,
) {
    let _cancel_on_exit = cancel.clone().drop_guard();
    loop {
        let frame = tokio::select! {
            () = cancel.cancelled() => break,
            frame = source.next_frame() => frame,
        };
        match frame {
            None => {
                tracing::info!("client disconnected");
                break;
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, "client read failed");
                break;
            }
            Some(Ok(ClientFrame::Audio(data))) => {
                queue.push(AudioChunk::pcm(data));
            }
            Some(Ok(ClientFrame::Text(text))) => handle_control(&text, &state, &launcher),
        }
    }
    client.mark_disconnected();
}

fn handle_control(text: &str, state: &StateManager, launcher: &SummaryLauncher) {
    let message = match ControlMessage::parse(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(error = %e, "dropping malformed control message");
            return;
        }
    };
    match message {
        ControlMessage::SlideInfo {
            total_slides,
            current_slide,
        } => {
            state.set_total_slides(total_slides);
            state.set_current_slide(current_slide);
            tracing::info!(
                slide = current_slide.saturating_add(1),
                total = total_slides,
                "slide info"
            );
        }
        ControlMessage::SlideSync { current_slide } => {
            state.set_current_slide(current_slide);
            tracing::debug!(slide = current_slide.saturating_add(1), "slide synced");
        }
        ControlMessage::RequestSummary {} => {
            launcher.launch(None);
        }
        ControlMessage::Unknown => tracing::debug!("ignoring unknown control message"),
    }
}

async fn forward_loop(
    queue: Arc<AudioQueue>,
    gate: InterruptionGate,
    sink: Arc<dyn InferenceSink>,
    pop_timeout: Duration,
    cancel: CancellationToken,
) {
    let _cancel_on_exit = cancel.clone().drop_guard();
    loop {
        let popped = tokio::select! {
            () = cancel.cancelled() => break,
            popped = async {
                gate.wait_until_open().await;
                queue.pop_timeout(pop_timeout).await
            } => popped,
        };
        let chunk = match popped {
            Ok(Some(chunk)) => chunk,
            Ok(None) => continue,
            Err(_) => break,
        };

        let sent = tokio::select! {
            () = cancel.cancelled() => break,
            sent = async {
                let _pass = gate.pass().await;
                sink.send_audio(&chunk).await
            } => sent,
        };
        match sent {
            Ok(()) => {}
            Err(e) if e.is_transport_closed() => {
                tracing::info!(error = %e, "inference stream closed");
                break;
            }
            Err(e) => tracing::warn!(error = %e, "audio forward failed"),
        }
    }
}

struct ResponseContext {
    sink: Arc<dyn InferenceSink>,
    client: Arc<ClientLink>,
    state: Arc<StateManager>,
    gate: InterruptionGate,
    executor: Arc<ToolExecutor>,
    launcher: SummaryLauncher,
    mute_model_audio: bool,
    backoff: Duration,
}

async fn response_loop(
    mut source: Box<dyn InferenceSource>,
    ctx: ResponseContext,
    cancel: CancellationToken,
) {
    let _cancel_on_exit = cancel.clone().drop_guard();
    loop {
        let next = tokio::select! {
            () = cancel.cancelled() => break,
            next = source.next_response() => next,
        };
        let outcome = match next {
            None => {
                tracing::info!("inference stream ended");
                break;
            }
            Some(Ok(unit)) => tokio::select! {
                () = cancel.cancelled() => break,
                outcome = handle_response(unit, &ctx) => outcome,
            },
            Some(Err(e)) => Err(e),
        };
        match outcome {
            Ok(()) => {}
            Err(e) if e.is_transport_closed() => {
                tracing::info!(error = %e, "response loop stopping");
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, "response error");
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(ctx.backoff) => {}
                }
            }
        }
    }
}

async fn handle_response(unit: ResponseUnit, ctx: &ResponseContext) -> Result<()> {
    if !unit.tool_calls.is_empty() {
        let _guard = ctx.gate.close_for_batch().await;
        let results = run_tool_batch(&unit.tool_calls, ctx).await;
        ctx.sink.send_tool_results(&results).await?;
        tracing::debug!(count = results.len(), "tool responses sent");
    }

    if let Some(audio) = unit.audio
        && !ctx.mute_model_audio
    {
        ctx.client.send_audio(audio).await?;
    }

    for text in &unit.transcripts {
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        let preview: String = text.chars().take(100).collect();
        tracing::info!(text = %preview, "model transcript");
        ctx.state.add_transcript(text);
        ctx.client
            .send_event(&ClientEvent::Transcript {
                text: text.to_owned(),
            })
            .await?;
    }

    if unit.interrupted {
        tracing::debug!("model turn interrupted");
    }
    Ok(())
}

async fn run_tool_batch(calls: &[ToolCall], ctx: &ResponseContext) -> Vec<ToolResult> {
    tracing::info!(count = calls.len(), "tool call batch");
    let mut results = Vec::with_capacity(calls.len());
    for call in calls {
        let args = serde_json::Value::Object(call.args.clone());
        tracing::info!(tool = %call.name, %args, "executing");
        notify(
            ctx,
            ClientEvent::IntentDetected {
                tool: call.name.clone(),
                args,
            },
        )
        .await;

        let result = ctx
            .executor
            .execute(&call.name, &call.id, call.args.clone())
            .await;

        notify(ctx, project_result(call, &result)).await;

        if call.name == TRIGGER_SUMMARY && result.is_success() {
            let context = call
                .args
                .get("conversational_context")
                .and_then(serde_json::Value::as_str)
                .map(str::to_owned);
            ctx.launcher.launch(context);
        }
        results.push(result);
    }
    results
}

/// Client event describing a finished tool call.
pub fn project_result(call: &ToolCall, result: &ToolResult) -> ClientEvent {
    let status = result.status.as_str().to_owned();
    if call.name == NAVIGATE_SLIDE {
        let action = call
            .args
            .get("direction")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown")
            .to_owned();
        let slide_index = result
            .data
            .get("current_slide")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0);
        tracing::info!(%action, slide = slide_index + 1, %status, "navigation result");
        ClientEvent::SlideCommand {
            action,
            slide_index,
            status,
        }
    } else {
        tracing::info!(tool = %call.name, %status, "tool result");
        ClientEvent::ToolResult {
            tool: call.name.clone(),
            status,
            data: result.data.clone(),
        }
    }
}

async fn notify(ctx: &ResponseContext, event: ClientEvent) {
    if let Err(e) = ctx.client.send_event(&event).await {
        tracing::debug!(kind = event.kind(), error = %e, "client notification dropped");
    }
}
