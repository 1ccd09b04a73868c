//! Presentation tools exposed to the model.
//!
//! [`SlideTools`] works in zero-based slide indices against a
//! [`StateManager`]. [`register_slide_tools`] adapts them to the model, which
//! speaks one-based slide numbers.

use std::sync::Arc;

use serde_json::{Value, json};

use super::executor::ToolExecutor;
use super::types::{ToolArgs, ToolDeclaration};
use crate::error::{Result, SlidekickError};
use crate::session::state::{Direction, StateManager};

/// Tool name for slide navigation.
pub const NAVIGATE_SLIDE: &str = "navigate_slide";
/// Tool name for reading the presentation context.
pub const GET_PRESENTATION_CONTEXT: &str = "get_presentation_context";
/// Tool name for starting a background summary.
pub const TRIGGER_SUMMARY: &str = "trigger_summary";

/// Slide deck control tools bound to one session's state.
#[derive(Clone)]
pub struct SlideTools {
    state: Arc<StateManager>,
}

impl SlideTools {
    /// Bind tools to `state`.
    pub fn new(state: Arc<StateManager>) -> Self {
        Self { state }
    }

    /// Navigate with a zero-based `index` for `jump`.
    ///
    /// # Errors
    ///
    /// Returns [`SlidekickError::InvalidArgument`] for a `jump` without index.
    pub fn navigate_slide(&self, direction: Direction, index: Option<i64>) -> Result<Value> {
        let new_index = self.state.navigate(direction, index)?;
        let total = self.state.get_total_slides();
        tracing::info!(%direction, slide = new_index + 1, total, "navigate");
        Ok(json!({
            "action": "navigate",
            "direction": direction.as_str(),
            "current_slide": new_index,
            "total_slides": total,
            "success": true,
        }))
    }

    /// Current position, slide count and session metadata.
    pub fn get_presentation_context(&self) -> Result<Value> {
        let mut out = json!({
            "action": "get_context",
            "success": true,
        });
        if let (Value::Object(out), Value::Object(ctx)) =
            (&mut out, serde_json::to_value(self.state.get_context())?)
        {
            out.extend(ctx);
        }
        Ok(out)
    }

    /// Acknowledge a summary request; the caller launches the work.
    pub fn trigger_summary(&self, conversational_context: Option<&str>) -> Value {
        let mut out = json!({
            "action": "start_background_summary",
            "success": true,
            "message": "Summary generation started in background",
        });
        if let (Value::Object(map), Some(ctx)) = (&mut out, conversational_context) {
            map.insert("conversational_context".to_owned(), Value::String(ctx.to_owned()));
        }
        out
    }
}

fn optional_int(args: &ToolArgs, key: &str) -> Result<Option<i64>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .map(Some)
            .ok_or_else(|| SlidekickError::InvalidArgument(format!("'{key}' must be an integer"))),
        Some(other) => Err(SlidekickError::InvalidArgument(format!(
            "'{key}' must be an integer, got {other}"
        ))),
    }
}

fn optional_str<'a>(args: &'a ToolArgs, key: &str) -> Result<Option<&'a str>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(SlidekickError::InvalidArgument(format!(
            "'{key}' must be a string, got {other}"
        ))),
    }
}

fn navigate_declaration() -> ToolDeclaration {
    ToolDeclaration::new(
        NAVIGATE_SLIDE,
        "Move to next/prev slide or jump to specific slide number.",
        json!({
            "type": "OBJECT",
            "properties": {
                "direction": {
                    "type": "STRING",
                    "enum": ["next", "prev", "jump"],
                    "description": "Navigation direction: 'next', 'prev', or 'jump'",
                },
                "index": {
                    "type": "INTEGER",
                    "description": "Target slide number (1-based). Required for 'jump'.",
                },
            },
            "required": ["direction"],
        }),
    )
}

fn context_declaration() -> ToolDeclaration {
    ToolDeclaration::without_parameters(
        GET_PRESENTATION_CONTEXT,
        "Get the current slide number, total slide count and session information.",
    )
}

fn summary_declaration() -> ToolDeclaration {
    ToolDeclaration::new(
        TRIGGER_SUMMARY,
        "Generate a summary of the presentation so far and show it on a slide.",
        json!({
            "type": "OBJECT",
            "properties": {
                "conversational_context": {
                    "type": "STRING",
                    "description": "Optional notes from the conversation to include in the summary.",
                },
            },
        }),
    )
}

async fn navigate_handler(tools: SlideTools, args: ToolArgs) -> anyhow::Result<Value> {
    let direction = optional_str(&args, "direction")?
        .ok_or_else(|| SlidekickError::InvalidArgument("'direction' is required".into()))?
        .parse::<Direction>()?;
    let index = match (direction, optional_int(&args, "index")?) {
        (Direction::Jump, Some(one_based)) => Some(one_based.saturating_sub(1).max(0)),
        (_, index) => index,
    };
    Ok(tools.navigate_slide(direction, index)?)
}

async fn context_handler(tools: SlideTools, _args: ToolArgs) -> anyhow::Result<Value> {
    Ok(tools.get_presentation_context()?)
}

async fn summary_handler(tools: SlideTools, args: ToolArgs) -> anyhow::Result<Value> {
    let context = optional_str(&args, "conversational_context")?;
    Ok(tools.trigger_summary(context))
}

/// Register `navigate_slide`, `get_presentation_context` and
/// `trigger_summary` on `executor`.
///
/// `navigate_slide` takes a one-based `index` for `jump`, converted with
/// `max(0, index - 1)`.
///
/// # Errors
///
/// Returns [`SlidekickError::DuplicateRegistration`] if any name is taken.
pub fn register_slide_tools(executor: &mut ToolExecutor, tools: &SlideTools) -> Result<()> {
    let nav = tools.clone();
    executor.register(
        NAVIGATE_SLIDE,
        move |args: ToolArgs| navigate_handler(nav.clone(), args),
        navigate_declaration(),
    )?;

    let ctx = tools.clone();
    executor.register(
        GET_PRESENTATION_CONTEXT,
        move |args: ToolArgs| context_handler(ctx.clone(), args),
        context_declaration(),
    )?;

    let summary = tools.clone();
    executor.register(
        TRIGGER_SUMMARY,
        move |args: ToolArgs| summary_handler(summary.clone(), args),
        summary_declaration(),
    )?;

    Ok(())
}
