//! Tool registry, executor and the presentation tools.
//!
//! # Submodules
//!
//! - [`types`]: [`ToolCall`], [`ToolResult`], [`ToolDeclaration`] and the
//!   [`ToolHandler`] trait
//! - [`executor`]: [`ToolExecutor`], name-based dispatch with uniform error
//!   wrapping
//! - [`slide`]: `navigate_slide`, `get_presentation_context` and
//!   `trigger_summary`

pub mod executor;
pub mod slide;
pub mod types;

pub use executor::ToolExecutor;
pub use slide::{
    GET_PRESENTATION_CONTEXT, NAVIGATE_SLIDE, SlideTools, TRIGGER_SUMMARY, register_slide_tools,
};
pub use types::{ToolArgs, ToolCall, ToolDeclaration, ToolHandler, ToolResult, ToolStatus};
