//! Transport-specific MCP sessions.
//!
//! [`McpSession`] is the capability set the spec's §9 design note calls for:
//! connect is handled by the constructors below, and the rest (`list_tools`,
//! `call_tool`, `list_resources`, `read_resource`, `subscribe`) is a plain
//! trait so [`crate::client::McpClient`]'s state machine never has to know
//! which transport it is driving.

use std::time::Duration;

use async_trait::async_trait;
use rmcp::ClientHandler;
use rmcp::RoleClient;
use rmcp::model::CallToolRequestParam;
use rmcp::model::PaginatedRequestParam;
use rmcp::model::ReadResourceRequestParam;
use rmcp::model::ResourceUpdatedNotificationParam;
use rmcp::model::SubscribeRequestParam;
use rmcp::service::NotificationContext;
use rmcp::service::RunningService;
use rmcp::transport::TokioChildProcess;
use rmcp::transport::sse_client::SseClientTransport;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransport;
use tokio::process::Command;

use crate::model::CallToolOutcome;
use crate::model::ContentBlock;
use crate::model::ListResourcesPage;
use crate::model::ListToolsPage;
use crate::model::NotificationHandler;
use crate::model::ReadResourceOutcome;
use crate::model::ResourceInfo;
use crate::model::ServerCapabilitySnapshot;
use crate::model::ServerNotification;
use crate::model::ToolInfo;
use crate::model::TransportParams;
use crate::ClientError;

/// The capability set a connected MCP session exposes, independent of which
/// wire transport backs it.
#[async_trait]
pub trait McpSession: Send + Sync {
    async fn list_tools(&self, cursor: Option<String>) -> Result<ListToolsPage, ClientError>;
    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<serde_json::Value>,
        timeout: Option<Duration>,
    ) -> Result<CallToolOutcome, ClientError>;
    async fn list_resources(&self, cursor: Option<String>) -> Result<ListResourcesPage, ClientError>;
    async fn read_resource(&self, uri: &str) -> Result<ReadResourceOutcome, ClientError>;
    async fn subscribe(&self, uri: &str) -> Result<(), ClientError>;
    fn capabilities(&self) -> ServerCapabilitySnapshot;
}

/// Forwards every server-pushed notification rmcp delivers to the session's
/// installed [`NotificationHandler`], if any. With no handler installed this
/// behaves like `()`'s default no-op [`ClientHandler`].
#[derive(Clone)]
struct NotifyingHandler {
    on_notify: Option<NotificationHandler>,
}

impl NotifyingHandler {
    fn fire(&self, notification: ServerNotification) {
        if let Some(handler) = &self.on_notify {
            handler(notification);
        }
    }
}

impl ClientHandler for NotifyingHandler {
    fn on_tool_list_changed(
        &self,
        _context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        async move { self.fire(ServerNotification::ToolListChanged) }
    }

    fn on_resource_list_changed(
        &self,
        _context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        async move { self.fire(ServerNotification::ResourceListChanged) }
    }

    fn on_resource_updated(
        &self,
        params: ResourceUpdatedNotificationParam,
        _context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        async move { self.fire(ServerNotification::ResourceUpdated { uri: params.uri.to_string() }) }
    }

    fn on_prompt_list_changed(
        &self,
        _context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        async move { self.fire(ServerNotification::PromptListChanged) }
    }
}

pub struct RmcpSession {
    peer: RunningService<RoleClient, NotifyingHandler>,
    capabilities: ServerCapabilitySnapshot,
}

impl RmcpSession {
    /// Connects over `params`, installing `on_notify` (if given) as the
    /// session's message handler for server-pushed notifications (spec's
    /// "Client also accepts an optional message handler").
    pub async fn connect(params: &TransportParams, on_notify: Option<NotificationHandler>) -> Result<Self, ClientError> {
        let handler = NotifyingHandler { on_notify };
        let peer = match params {
            TransportParams::Stdio { command, args, env, cwd } => {
                let mut cmd = Command::new(command);
                cmd.args(args);
                for (k, v) in env {
                    cmd.env(k, v);
                }
                if let Some(cwd) = cwd {
                    cmd.current_dir(cwd);
                }
                let transport = TokioChildProcess::new(cmd)
                    .map_err(|e| ClientError::Transport(e.to_string()))?;
                rmcp::serve_client(handler, transport).await.map_err(|e| ClientError::Transport(e.to_string()))?
            }
            TransportParams::Sse { url } => {
                let transport = SseClientTransport::start(url.clone())
                    .await
                    .map_err(|e| ClientError::Transport(e.to_string()))?;
                rmcp::serve_client(handler, transport).await.map_err(|e| ClientError::Transport(e.to_string()))?
            }
            TransportParams::StreamableHttp { url, .. } => {
                let transport = StreamableHttpClientTransport::from_uri(url.clone());
                rmcp::serve_client(handler, transport).await.map_err(|e| ClientError::Transport(e.to_string()))?
            }
        };

        let capabilities = peer
            .peer_info()
            .map(|info| ServerCapabilitySnapshot {
                resources_subscribe: info
                    .capabilities
                    .resources
                    .as_ref()
                    .and_then(|r| r.subscribe)
                    .unwrap_or(false),
            })
            .unwrap_or_default();

        Ok(Self { peer, capabilities })
    }
}

#[async_trait]
impl McpSession for RmcpSession {
    async fn list_tools(&self, cursor: Option<String>) -> Result<ListToolsPage, ClientError> {
        let page = self
            .peer
            .list_tools(Some(PaginatedRequestParam { cursor }))
            .await
            .map_err(|e| ClientError::Rpc(e.to_string()))?;
        Ok(ListToolsPage {
            tools: page
                .tools
                .into_iter()
                .map(|t| ToolInfo {
                    name: t.name.to_string(),
                    description: t.description.map(|d| d.to_string()),
                    input_schema: serde_json::to_value(&t.input_schema).unwrap_or(serde_json::Value::Null),
                    output_schema: t
                        .output_schema
                        .map(|s| serde_json::to_value(s).unwrap_or(serde_json::Value::Null)),
                    annotations: t.annotations.map(|a| serde_json::to_value(a).unwrap_or(serde_json::Value::Null)),
                })
                .collect(),
            next_cursor: page.next_cursor,
        })
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<serde_json::Value>,
        timeout: Option<Duration>,
    ) -> Result<CallToolOutcome, ClientError> {
        let args = match arguments {
            Some(serde_json::Value::Object(map)) => Some(map),
            Some(serde_json::Value::Null) | None => None,
            Some(_) => return Err(ClientError::InvalidArguments),
        };
        let request = self.peer.call_tool(CallToolRequestParam {
            name: name.to_string().into(),
            arguments: args,
        });

        let result = match timeout {
            Some(d) => tokio::time::timeout(d, request)
                .await
                .map_err(|_| ClientError::Timeout)?
                .map_err(|e| ClientError::Rpc(e.to_string()))?,
            None => request.await.map_err(|e| ClientError::Rpc(e.to_string()))?,
        };

        Ok(CallToolOutcome {
            content: result.content.into_iter().filter_map(convert_content).collect(),
            is_error: result.is_error.unwrap_or(false),
            meta: result.meta.map(|m| serde_json::to_value(m).unwrap_or(serde_json::Value::Null)),
        })
    }

    async fn list_resources(&self, cursor: Option<String>) -> Result<ListResourcesPage, ClientError> {
        let page = self
            .peer
            .list_resources(Some(PaginatedRequestParam { cursor }))
            .await
            .map_err(|e| ClientError::Rpc(e.to_string()))?;
        Ok(ListResourcesPage {
            resources: page
                .resources
                .into_iter()
                .map(|r| ResourceInfo { uri: r.uri.to_string(), name: Some(r.name.to_string()) })
                .collect(),
            next_cursor: page.next_cursor,
        })
    }

    async fn read_resource(&self, uri: &str) -> Result<ReadResourceOutcome, ClientError> {
        let result = self
            .peer
            .read_resource(ReadResourceRequestParam { uri: uri.to_string().into() })
            .await
            .map_err(|e| ClientError::Rpc(e.to_string()))?;
        Ok(ReadResourceOutcome {
            uri: uri.to_string(),
            content: result.contents.into_iter().filter_map(convert_resource_content).collect(),
        })
    }

    async fn subscribe(&self, uri: &str) -> Result<(), ClientError> {
        self.peer
            .subscribe(SubscribeRequestParam { uri: uri.to_string().into() })
            .await
            .map_err(|e| ClientError::Rpc(e.to_string()))?;
        Ok(())
    }

    fn capabilities(&self) -> ServerCapabilitySnapshot {
        self.capabilities.clone()
    }
}

fn convert_content(content: rmcp::model::Content) -> Option<ContentBlock> {
    match content.raw {
        rmcp::model::RawContent::Text(t) => Some(ContentBlock::Text { text: t.text }),
        rmcp::model::RawContent::Image(i) => {
            Some(ContentBlock::Blob { blob: i.data, mime_type: Some(i.mime_type) })
        }
        _ => None,
    }
}

fn convert_resource_content(content: rmcp::model::ResourceContents) -> Option<ContentBlock> {
    match content {
        rmcp::model::ResourceContents::TextResourceContents { text, .. } => {
            Some(ContentBlock::Text { text })
        }
        rmcp::model::ResourceContents::BlobResourceContents { blob, mime_type, .. } => {
            Some(ContentBlock::Blob { blob, mime_type })
        }
    }
}
