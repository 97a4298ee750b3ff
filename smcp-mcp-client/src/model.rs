use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

/// Spawn/connect instructions for one MCP server, keyed by server name at a
/// higher layer (the Manager owns the name -> config map).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportParams {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
        #[serde(default)]
        cwd: Option<String>,
    },
    Sse {
        url: String,
    },
    StreamableHttp {
        url: String,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
}

impl TransportParams {
    pub fn type_name(&self) -> &'static str {
        match self {
            TransportParams::Stdio { .. } => "stdio",
            TransportParams::Sse { .. } => "sse",
            TransportParams::StreamableHttp { .. } => "streamable_http",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListToolsPage {
    pub tools: Vec<ToolInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Blob { blob: String, mime_type: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CallToolOutcome {
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceInfo {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListResourcesPage {
    pub resources: Vec<ResourceInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadResourceOutcome {
    pub uri: String,
    pub content: Vec<ContentBlock>,
}

impl ReadResourceOutcome {
    /// A minimal result carrying only the URI, used when a window's content
    /// cannot be fetched (per C3's `get_window_detail` error fallback).
    pub fn uri_only(uri: impl Into<String>) -> Self {
        Self { uri: uri.into(), content: Vec::new() }
    }
}

/// Snapshot of a server's declared capabilities, captured at `initialize`
/// time. Only the fields the Manager/Aggregator actually consult are kept.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServerCapabilitySnapshot {
    pub resources_subscribe: bool,
}

pub const DEFAULT_CALL_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

/// A server-initiated push the session's message handler forwards, distinct
/// from anything the client itself requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerNotification {
    ToolListChanged,
    ResourceListChanged,
    ResourceUpdated { uri: String },
    PromptListChanged,
}

/// Receives [`ServerNotification`]s pushed by a connected server. Invoked
/// from the session's background task, so it must be reentrant and must not
/// block.
pub type NotificationHandler = Arc<dyn Fn(ServerNotification) + Send + Sync>;
