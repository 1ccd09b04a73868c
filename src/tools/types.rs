//! Core tool types: calls, results, declarations and the handler trait.

use std::future::Future;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Loosely typed tool arguments.
pub type ToolArgs = Map<String, Value>;

/// A tool invocation issued by the inference stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToolCall {
    /// Caller-supplied correlation id, echoed in the result.
    #[serde(default)]
    pub id: String,
    /// Registered tool name.
    pub name: String,
    /// Arguments keyed by parameter name.
    #[serde(default)]
    pub args: ToolArgs,
}

impl ToolCall {
    /// Construct a call.
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: ToolArgs) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }
}

/// Outcome of a tool execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Success,
    Error,
}

impl ToolStatus {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

/// Result of executing one [`ToolCall`].
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    /// Correlation id copied from the call.
    pub id: String,
    /// Tool name copied from the call.
    pub name: String,
    /// Success or error.
    pub status: ToolStatus,
    /// Handler return value on success, `Null` otherwise.
    pub data: Value,
    /// Error message on failure.
    pub error: Option<String>,
}

impl ToolResult {
    /// Create a successful result.
    pub fn success(id: impl Into<String>, name: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: ToolStatus::Success,
            data,
            error: None,
        }
    }

    /// Create a failed result with an error message.
    pub fn failure(id: impl Into<String>, name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: ToolStatus::Error,
            data: Value::Null,
            error: Some(error.into()),
        }
    }

    /// Whether the call succeeded.
    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }

    /// Response body sent back upstream: `{status, data, error}`.
    pub fn to_response(&self) -> Value {
        serde_json::json!({
            "status": self.status,
            "data": self.data,
            "error": self.error,
        })
    }
}

/// Function declaration advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDeclaration {
    /// Tool name.
    pub name: String,
    /// What the tool does, for the model.
    pub description: String,
    /// Parameter schema (Gemini OpenAPI subset).
    #[serde(skip_serializing_if = "Value::is_null")]
    pub parameters: Value,
}

impl ToolDeclaration {
    /// Declaration with a parameter schema.
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Declaration for a tool without parameters.
    pub fn without_parameters(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, description, Value::Null)
    }
}

/// An asynchronously invocable tool handler.
///
/// Implemented for any `Fn(ToolArgs) -> impl Future<Output = anyhow::Result<Value>>`.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Run the tool.
    async fn call(&self, args: ToolArgs) -> anyhow::Result<Value>;
}

#[async_trait]
impl<F, Fut> ToolHandler for F
where
    F: Fn(ToolArgs) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send,
{
    async fn call(&self, args: ToolArgs) -> anyhow::Result<Value> {
        (self)(args).await
    }
}
