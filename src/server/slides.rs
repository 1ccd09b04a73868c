//! `/slides/{*path}`: static serving of generated decks.

use std::path::{Component, Path, PathBuf};

use axum::extract::{Path as UrlPath, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};

use super::AppState;
use super::upload::DECK_PREFIX;
use crate::error::Result;

/// Turn a URL tail into a relative path, rejecting anything that could leave
/// the serving root.
pub fn safe_relative(tail: &str) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for segment in tail.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return None,
            s if s.contains('\\') || s.contains('\0') => return None,
            s => out.push(s),
        }
    }
    // A segment like "C:" would make the path absolute on Windows.
    if out.components().any(|c| !matches!(c, Component::Normal(_))) {
        return None;
    }
    Some(out)
}

/// Content type for a served file, by extension.
pub fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "text/javascript; charset=utf-8",
        Some("json" | "map") => "application/json",
        Some("md") => "text/markdown; charset=utf-8",
        Some("txt") => "text/plain; charset=utf-8",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("eot") => "application/vnd.ms-fontobject",
        _ => "application/octet-stream",
    }
}

fn roots(state: &AppState, rel: &Path) -> Vec<PathBuf> {
    let mut roots = vec![state.slides_dir.clone()];
    let is_deck = rel
        .components()
        .next()
        .and_then(|c| c.as_os_str().to_str())
        .is_some_and(|first| first.starts_with(DECK_PREFIX));
    if let Some(temp) = &state.temp_root
        && is_deck
    {
        roots.push(temp.clone());
    }
    roots
}

async fn read_file(root: &Path, rel: &Path) -> Option<(PathBuf, Vec<u8>)> {
    let mut path = root.join(rel);
    if tokio::fs::metadata(&path).await.ok()?.is_dir() {
        path.push("index.html");
    }
    let bytes = tokio::fs::read(&path).await.ok()?;
    Some((path, bytes))
}

pub(super) async fn serve_slide(
    State(state): State<AppState>,
    UrlPath(tail): UrlPath<String>,
) -> Response {
    let Some(rel) = safe_relative(&tail) else {
        tracing::debug!(path = %tail, "rejected slide path");
        return StatusCode::NOT_FOUND.into_response();
    };

    for root in roots(&state, &rel) {
        if let Some((path, bytes)) = read_file(&root, &rel).await {
            return ([(header::CONTENT_TYPE, content_type(&path))], bytes).into_response();
        }
    }
    StatusCode::NOT_FOUND.into_response()
}

/// Remove every generated deck directory under `dir`. Returns how many were
/// removed; failures on individual entries are logged and skipped.
pub async fn cleanup_generated_slides(dir: &Path) -> Result<usize> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with(DECK_PREFIX) {
            continue;
        }
        if !entry.file_type().await.is_ok_and(|t| t.is_dir()) {
            continue;
        }
        match tokio::fs::remove_dir_all(entry.path()).await {
            Ok(()) => removed += 1,
            Err(e) => tracing::warn!(dir = ?entry.path(), error = %e, "could not remove deck"),
        }
    }
    Ok(removed)
}
