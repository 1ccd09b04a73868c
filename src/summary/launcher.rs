//! Background live-summary task.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use super::{DocumentContext, NO_SLIDE_CONTEXT, SummaryWriter, strip_tags};
use crate::session::client::{ClientEvent, ClientLink};
use crate::session::state::StateManager;

/// Spawns summary tasks for one session.
///
/// Tasks are tracked by the session's [`TaskTracker`] and stop when the
/// session token is cancelled. Every failure is logged and swallowed.
#[derive(Clone)]
pub struct SummaryLauncher {
    writer: Option<SummaryWriter>,
    documents: DocumentContext,
    state: Arc<StateManager>,
    client: Arc<ClientLink>,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl SummaryLauncher {
    /// Create a launcher. Without a `writer` every launch is a logged no-op.
    pub fn new(
        writer: Option<SummaryWriter>,
        documents: DocumentContext,
        state: Arc<StateManager>,
        client: Arc<ClientLink>,
        tracker: TaskTracker,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            writer,
            documents,
            state,
            client,
            tracker,
            cancel,
        }
    }

    /// Start a summary in the background. Returns whether a task was spawned.
    ///
    /// `conversational_context` is appended to the transcript for this
    /// summary only.
    pub fn launch(&self, conversational_context: Option<String>) -> bool {
        let Some(writer) = self.writer.clone() else {
            tracing::warn!("summary requested but no text generator is configured");
            return false;
        };
        if self.cancel.is_cancelled() || self.tracker.is_closed() {
            tracing::debug!("summary requested during shutdown; ignored");
            return false;
        }

        let documents = self.documents.clone();
        let state = Arc::clone(&self.state);
        let client = Arc::clone(&self.client);
        let cancel = self.cancel.clone();

        self.tracker.spawn(
            async move {
                tokio::select! {
                    () = cancel.cancelled() => {
                        tracing::debug!("summary task cancelled");
                    }
                    () = run_summary(writer, documents, state, client, conversational_context) => {}
                }
            }
            .instrument(tracing::info_span!("summary")),
        );
        true
    }
}

async fn run_summary(
    writer: SummaryWriter,
    documents: DocumentContext,
    state: Arc<StateManager>,
    client: Arc<ClientLink>,
    conversational_context: Option<String>,
) {
    let mut transcript = state.get_transcript();
    if let Some(extra) = conversational_context.filter(|c| !c.trim().is_empty()) {
        if !transcript.is_empty() {
            transcript.push('\n');
        }
        transcript.push_str(&extra);
    }
    let slide_context = documents
        .get()
        .unwrap_or_else(|| NO_SLIDE_CONTEXT.to_owned());

    let Some(html) = writer.presentation_summary(&transcript, &slide_context).await else {
        return;
    };

    let event = ClientEvent::InjectSummary {
        summary: strip_tags(&html),
        html,
    };
    if let Err(e) = client.send_event(&event).await {
        tracing::debug!(error = %e, "could not deliver summary");
    }
}
