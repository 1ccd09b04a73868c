//! Summary generation.
//!
//! A [`TextGenerator`] turns a prompt into text. [`SummaryWriter`] owns the
//! prompts and never fails past its boundary: every error is logged and
//! surfaces as `None`. [`SummaryLauncher`] runs the live presentation summary
//! as a background task of a session.
//!
//! # Submodules
//!
//! - [`gemini`]: [`GeminiTextGenerator`], REST `generateContent` client
//! - [`launcher`]: [`SummaryLauncher`], cancellable background summary task

pub mod gemini;
pub mod launcher;

use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::Result;

pub use gemini::GeminiTextGenerator;
pub use launcher::SummaryLauncher;

/// Placeholder slide context used before any deck digest exists.
pub const NO_SLIDE_CONTEXT: &str = "No slide summary available.";

/// Prompt-in, text-out generation service.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate text for `prompt`.
    ///
    /// # Errors
    ///
    /// Any transport, HTTP or decoding failure.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Digest of the most recently uploaded deck, shared by every session.
#[derive(Clone, Default)]
pub struct DocumentContext {
    inner: Arc<RwLock<Option<String>>>,
}

impl DocumentContext {
    /// Empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current digest.
    pub fn set(&self, digest: impl Into<String>) {
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(digest.into());
    }

    /// Current digest, if any.
    pub fn get(&self) -> Option<String> {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Prompts for deck digests and live summaries.
#[derive(Clone)]
pub struct SummaryWriter {
    generator: Arc<dyn TextGenerator>,
}

impl SummaryWriter {
    /// Wrap a generator.
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Concise technical summary of a markdown deck, used as context for
    /// later live summaries.
    pub async fn slide_digest(&self, markdown: &str) -> Option<String> {
        let prompt = format!(
            "Here is the markdown content of a presentation slide deck.\n\
             Please analyze it and provide a concise technical summary of the key points covered in the slides.\n\
             This summary will be used as context for an AI assistant to answer questions and generate summaries during the live presentation.\n\n\
             Focus on:\n\
             1. Key topics and concepts.\n\
             2. Technical details and architecture.\n\
             3. Main takeaways.\n\n\
             Slides Content:\n{markdown}\n"
        );
        tracing::info!("generating static slide summary");
        match self.generator.generate(&prompt).await {
            Ok(text) if !text.trim().is_empty() => {
                tracing::info!("static slide summary generated");
                Some(text)
            }
            Ok(_) => {
                tracing::warn!("empty response for slide summary");
                None
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to process slides");
                None
            }
        }
    }

    /// HTML bullet summary of the talk so far.
    pub async fn presentation_summary(&self, transcript: &str, slide_context: &str) -> Option<String> {
        let prompt = format!(
            "You are a helpful presentation assistant. The user has asked for a summary of the presentation so far.\n\n\
             CONTEXT:\n\
             - Slide Content Summary: {slide_context}\n\
             - Live Transcript (what the speaker said): {transcript}\n\n\
             TASK:\n\
             Generate a concise, bulleted summary of what has been discussed using HTML format.\n\
             - Focus on the main points covered by the speaker.\n\
             - Use the slide context to fill in details or clarify terms.\n\
             - Format for a slide presentation:\n\
             \x20   - Use `<ul>` and `<li>` tags for the list.\n\
             \x20   - Use `<strong>` for key terms.\n\
             \x20   - Do NOT use Markdown (no asterisks).\n\
             \x20   - Do NOT wrap in ```html code blocks. Return raw HTML only.\n"
        );
        tracing::info!("generating live presentation summary");
        match self.generator.generate(&prompt).await {
            Ok(text) => {
                let html = strip_code_fences(&text);
                if html.is_empty() {
                    tracing::warn!("empty live summary");
                    None
                } else {
                    tracing::info!(bytes = html.len(), "live summary generated");
                    Some(html)
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to generate live summary");
                None
            }
        }
    }
}

/// Remove ```` ```html ```` / ```` ``` ```` fences and surrounding whitespace.
pub fn strip_code_fences(text: &str) -> String {
    text.replace("```html", "").replace("```", "").trim().to_owned()
}

/// Plain-text rendering of an HTML fragment: tags dropped, whitespace
/// collapsed.
pub fn strip_tags(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => {
                in_tag = true;
                text.push(' ');
            }
            '>' if in_tag => in_tag = false,
            _ if !in_tag => text.push(ch),
            _ => {}
        }
    }
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
