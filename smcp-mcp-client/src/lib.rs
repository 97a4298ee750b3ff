//! Per-transport MCP client: connects to one MCP server over stdio, SSE, or
//! streamable-HTTP and exposes tool/resource operations behind a small
//! connect/disconnect state machine.

pub mod client;
pub mod error;
pub mod model;
pub mod session;

pub use client::ClientState;
pub use client::McpClient;
pub use error::ClientError;
pub use model::CallToolOutcome;
pub use model::ContentBlock;
pub use model::ListResourcesPage;
pub use model::ListToolsPage;
pub use model::NotificationHandler;
pub use model::ReadResourceOutcome;
pub use model::ResourceInfo;
pub use model::ServerCapabilitySnapshot;
pub use model::ServerNotification;
pub use model::ToolInfo;
pub use model::TransportParams;
pub use model::DEFAULT_CALL_TOOL_TIMEOUT;
pub use session::McpSession;
pub use session::RmcpSession;
