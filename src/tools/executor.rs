//! Tool registry and executor.
//!
//! The [`ToolExecutor`] maps tool names to handlers and guarantees a
//! well-formed [`ToolResult`] for every call: unknown names, handler errors
//! and handler panics all become `status: error` results instead of faults.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;

use super::types::{ToolArgs, ToolDeclaration, ToolHandler, ToolResult};
use crate::error::{Result, SlidekickError};

/// Name-indexed tool handlers plus their declarations.
pub struct ToolExecutor {
    tools: HashMap<String, Arc<dyn ToolHandler>>,
    declarations: Vec<ToolDeclaration>,
    verbose: bool,
}

impl Default for ToolExecutor {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ToolExecutor {
    /// Create an empty executor. `verbose` enables registration and
    /// execution logging.
    pub fn new(verbose: bool) -> Self {
        Self {
            tools: HashMap::new(),
            declarations: Vec::new(),
            verbose,
        }
    }

    /// Register a handler under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`SlidekickError::DuplicateRegistration`] if `name` is taken.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        handler: impl ToolHandler + 'static,
        declaration: ToolDeclaration,
    ) -> Result<()> {
        let name = name.into();
        if self.tools.contains_key(&name) {
            return Err(SlidekickError::DuplicateRegistration(name));
        }
        self.tools.insert(name.clone(), Arc::new(handler));
        self.declarations.push(declaration);
        if self.verbose {
            tracing::info!(tool = %name, "registered tool");
        }
        Ok(())
    }

    /// Whether `name` is registered.
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Declarations in registration order.
    pub fn declarations(&self) -> &[ToolDeclaration] {
        &self.declarations
    }

    /// Registered tool names, sorted.
    pub fn tool_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Whether execution logging is enabled.
    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// Execute a tool. Never fails: every outcome is a [`ToolResult`].
    pub async fn execute(&self, name: &str, id: &str, args: ToolArgs) -> ToolResult {
        let Some(handler) = self.tools.get(name).cloned() else {
            let message = SlidekickError::UnknownTool(name.to_owned()).to_string();
            if self.verbose {
                tracing::error!(tool = %name, "{message}");
            }
            return ToolResult::failure(id, name, message);
        };

        if self.verbose {
            tracing::info!(tool = %name, args = %serde_json::Value::Object(args.clone()), "executing tool");
        }

        let outcome = AssertUnwindSafe(handler.call(args)).catch_unwind().await;
        match outcome {
            Ok(Ok(data)) => {
                if self.verbose {
                    tracing::info!(tool = %name, "tool completed");
                }
                ToolResult::success(id, name, data)
            }
            Ok(Err(e)) => {
                let fault = SlidekickError::HandlerFault {
                    tool: name.to_owned(),
                    message: format!("{e:#}"),
                };
                if self.verbose {
                    tracing::error!(tool = %name, error = %fault, "tool failed");
                }
                ToolResult::failure(id, name, fault.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                let fault = SlidekickError::HandlerFault {
                    tool: name.to_owned(),
                    message,
                };
                if self.verbose {
                    tracing::error!(tool = %name, error = %fault, "tool panicked");
                }
                ToolResult::failure(id, name, fault.to_string())
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_owned()
    }
}
