//! HTTP and WebSocket surface.
//!
//! ## Endpoints
//!
//! - `GET /health`: liveness probe
//! - `POST /upload`: multipart markdown upload, converted to a static deck
//! - `GET /ws`: voice-control session (one [`SessionOrchestrator`] run per socket)
//! - `GET /slides/{*path}`: generated decks

pub mod slides;
pub mod upload;
pub mod ws;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::response::Json;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::ServerConfig;
use crate::error::{Result, SlidekickError};
use crate::inference::InferenceConnector;
use crate::session::{SessionOrchestrator, SessionSettings};
use crate::summary::{DocumentContext, SummaryWriter, TextGenerator};

pub use slides::cleanup_generated_slides;
pub use upload::{DocumentConverter, RevealMdConverter};

/// Largest accepted upload body.
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// External collaborators the server wires into sessions and uploads.
pub struct Services {
    /// Opens the upstream inference stream for each session.
    pub connector: Arc<dyn InferenceConnector>,
    /// Text generation for deck digests and live summaries (optional).
    pub generator: Option<Arc<dyn TextGenerator>>,
    /// Markdown to static deck conversion.
    pub converter: Arc<dyn DocumentConverter>,
    /// Per-session tunables.
    pub session: SessionSettings,
}

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    orchestrator: SessionOrchestrator,
    converter: Arc<dyn DocumentConverter>,
    writer: Option<SummaryWriter>,
    documents: DocumentContext,
    uploads_dir: PathBuf,
    slides_dir: PathBuf,
    temp_root: Option<PathBuf>,
    background: TaskTracker,
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/upload",
            post(upload::upload_slides).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/ws", get(ws::ws_handler))
        .route("/slides/{*path}", get(slides::serve_slide))
        .with_state(state)
}

/// A running slidekick server.
pub struct SlidekickServer {
    addr: SocketAddr,
    slides_dir: PathBuf,
    shutdown: CancellationToken,
    background: TaskTracker,
    handle: JoinHandle<()>,
}

impl SlidekickServer {
    /// Bind `{config.host}:{config.port}` (port `0` auto-assigns) and serve
    /// in a background task.
    ///
    /// # Errors
    ///
    /// Returns an error if the public directories cannot be created or the
    /// listener cannot bind.
    pub async fn start(config: &ServerConfig, services: Services) -> Result<Self> {
        let uploads_dir = config.uploads_dir();
        let slides_dir = config.slides_dir();
        tokio::fs::create_dir_all(&uploads_dir).await?;
        tokio::fs::create_dir_all(&slides_dir).await?;

        let shutdown = CancellationToken::new();
        let documents = DocumentContext::new();
        let writer = services.generator.map(SummaryWriter::new);

        let mut orchestrator = SessionOrchestrator::new(services.connector, services.session)
            .with_shutdown(shutdown.clone());
        if let Some(writer) = &writer {
            orchestrator = orchestrator.with_summaries(writer.clone(), documents.clone());
        }

        let background = TaskTracker::new();
        let state = AppState {
            orchestrator,
            converter: services.converter,
            writer,
            documents,
            uploads_dir,
            slides_dir: slides_dir.clone(),
            temp_root: config.use_temp_dir.then(std::env::temp_dir),
            background: background.clone(),
        };

        let bind_addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| SlidekickError::Config(format!("bind {bind_addr} failed: {e}")))?;
        let addr = listener.local_addr()?;

        tracing::info!("slidekick listening on http://{addr}");

        let app = router(state);
        let graceful = shutdown.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(graceful.cancelled_owned())
                .await
            {
                tracing::error!("server error: {e}");
            }
        });

        Ok(Self {
            addr,
            slides_dir,
            shutdown,
            background,
            handle,
        })
    }

    /// Address the server is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Port the server is listening on.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Token cancelled when the server shuts down; every session observes it.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop accepting connections, end all sessions, wait for background
    /// work (up to `grace`) and remove generated decks.
    pub async fn stop(&mut self, grace: Duration) {
        self.shutdown.cancel();
        self.background.close();
        let drained = tokio::time::timeout(grace, async {
            let _ = (&mut self.handle).await;
            self.background.wait().await;
        })
        .await;
        if drained.is_err() {
            tracing::warn!("shutdown grace period elapsed");
            self.handle.abort();
        }

        match cleanup_generated_slides(&self.slides_dir).await {
            Ok(0) => {}
            Ok(removed) => tracing::info!(removed, "removed generated slide decks"),
            Err(e) => tracing::warn!(error = %e, "slide cleanup failed"),
        }
    }
}

impl Drop for SlidekickServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.handle.abort();
    }
}
