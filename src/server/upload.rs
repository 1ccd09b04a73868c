//! `/upload`: markdown upload and static deck conversion.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use axum::extract::{Multipart, State};
use axum::response::Json;
use serde_json::{Value, json};
use tokio::process::Command;
use tracing::Instrument;

use super::AppState;
use crate::error::{Result, SlidekickError};

/// Directory-name prefix of every generated deck.
pub const DECK_PREFIX: &str = "reveal-md-";

const FALLBACK_FILE_NAME: &str = "slides.md";

/// Converts an uploaded markdown file into a static site in `out_dir`.
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    async fn convert(&self, source: &Path, out_dir: &Path) -> Result<()>;
}

/// Runs `reveal-md <source> --static <out_dir>` (or any command taking the
/// same arguments).
#[derive(Debug, Clone)]
pub struct RevealMdConverter {
    command: Vec<String>,
}

impl RevealMdConverter {
    /// `command` is the program followed by its leading arguments, e.g.
    /// `["npx", "reveal-md"]`.
    pub fn new(command: Vec<String>) -> Result<Self> {
        if command.first().is_none_or(|p| p.trim().is_empty()) {
            return Err(SlidekickError::Config(
                "converter command must name a program".into(),
            ));
        }
        Ok(Self { command })
    }
}

#[async_trait]
impl DocumentConverter for RevealMdConverter {
    async fn convert(&self, source: &Path, out_dir: &Path) -> Result<()> {
        let Some((program, leading)) = self.command.split_first() else {
            return Err(SlidekickError::Config("empty converter command".into()));
        };

        let output = Command::new(program)
            .args(leading)
            .arg(source)
            .arg("--static")
            .arg(out_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| SlidekickError::Conversion(format!("failed to run {program}: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        tracing::debug!(%stdout, "converter stdout");
        if !stderr.is_empty() {
            tracing::debug!(%stderr, "converter stderr");
        }

        if !output.status.success() {
            tracing::error!(status = %output.status, %stderr, "converter failed");
            return Err(SlidekickError::Conversion(stderr.trim().to_owned()));
        }
        Ok(())
    }
}

/// Keep only the final path component and replace anything outside
/// `[A-Za-z0-9._-]`.
pub fn sanitize_file_name(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        FALLBACK_FILE_NAME.to_owned()
    } else {
        cleaned
    }
}

fn error_body(message: impl Into<String>) -> Json<Value> {
    Json(json!({ "status": "error", "message": message.into() }))
}

pub(super) async fn upload_slides(State(state): State<AppState>, multipart: Multipart) -> Json<Value> {
    match handle_upload(&state, multipart).await {
        Ok(url) => Json(json!({ "status": "success", "url": url })),
        Err(SlidekickError::Conversion(stderr)) => {
            error_body(format!("Conversion failed: {stderr}"))
        }
        Err(e) => {
            tracing::error!(error = %e, "upload failed");
            error_body(e.to_string())
        }
    }
}

async fn handle_upload(state: &AppState, mut multipart: Multipart) -> Result<String> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| SlidekickError::InvalidArgument(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let name = sanitize_file_name(field.file_name().unwrap_or_default());
        let data = field
            .bytes()
            .await
            .map_err(|e| SlidekickError::InvalidArgument(e.body_text()))?;
        upload = Some((name, data));
        break;
    }
    let Some((name, data)) = upload else {
        return Err(SlidekickError::InvalidArgument(
            "missing multipart field 'file'".into(),
        ));
    };

    let file_path = state.uploads_dir.join(&name);
    tokio::fs::write(&file_path, &data).await?;
    tracing::info!(file = %name, bytes = data.len(), "saved upload");

    let dir_name = format!("{DECK_PREFIX}{}", uuid::Uuid::new_v4().simple());
    let out_root = state.temp_root.as_deref().unwrap_or(&state.slides_dir);
    let out_dir = out_root.join(&dir_name);
    tokio::fs::create_dir_all(&out_dir).await?;

    if let Err(e) = state.converter.convert(&file_path, &out_dir).await {
        if let Err(rm) = tokio::fs::remove_dir_all(&out_dir).await {
            tracing::debug!(error = %rm, "could not remove failed deck dir");
        }
        return Err(e);
    }
    tracing::info!(deck = %dir_name, "conversion complete");

    spawn_digest(state, file_path);

    Ok(format!("/slides/{dir_name}/index.html"))
}

/// Summarize the uploaded markdown in the background; the result becomes the
/// document context for live summaries.
fn spawn_digest(state: &AppState, file_path: PathBuf) {
    let Some(writer) = state.writer.clone() else {
        return;
    };
    let documents = state.documents.clone();
    state.background.spawn(
        async move {
            let markdown = match tokio::fs::read_to_string(&file_path).await {
                Ok(markdown) => markdown,
                Err(e) => {
                    tracing::warn!(error = %e, "could not read upload for digest");
                    return;
                }
            };
            if let Some(digest) = writer.slide_digest(&markdown).await {
                documents.set(digest);
                tracing::info!("document context updated");
            }
        }
        .instrument(tracing::info_span!("slide_digest")),
    );
}
