//! The C3 MCP Client state machine.
//!
//! States: `Initialized -> Connected -> Disconnected -> Initialized`, with an
//! `Error` state reachable from any transition that fails. A connected
//! client's session is kept alive by a background task so teardown can only
//! complete once that task has actually exited, mirroring the connection
//! manager's lifecycle ownership in the example this is grounded on.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::info;
use tracing::warn;

use smcp_window_uri::WindowUri;

use crate::error::ClientError;
use crate::model::CallToolOutcome;
use crate::model::NotificationHandler;
use crate::model::ReadResourceOutcome;
use crate::model::ServerCapabilitySnapshot;
use crate::model::ToolInfo;
use crate::model::TransportParams;
use crate::session::McpSession;
use crate::session::RmcpSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Initialized,
    Connected,
    Disconnected,
    Error,
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClientState::Initialized => "initialized",
            ClientState::Connected => "connected",
            ClientState::Disconnected => "disconnected",
            ClientState::Error => "error",
        };
        f.write_str(s)
    }
}

struct Inner {
    session: Arc<dyn McpSession>,
    keep_alive: JoinHandle<()>,
    shutdown: oneshot::Sender<()>,
}

/// A single MCP server connection, addressed by the name the Manager
/// registered it under.
pub struct McpClient {
    name: String,
    transport: TransportParams,
    state: Mutex<ClientState>,
    inner: Mutex<Option<Inner>>,
}

impl McpClient {
    pub fn new(name: impl Into<String>, transport: TransportParams) -> Self {
        Self {
            name: name.into(),
            transport,
            state: Mutex::new(ClientState::Initialized),
            inner: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn state(&self) -> ClientState {
        *self.state.lock().await
    }

    /// `Initialized|Disconnected -> Connected`. Establishes the transport,
    /// spawns the keep-alive task that owns the session for the lifetime of
    /// the connection, and records capabilities. `on_notify`, if given, is
    /// installed as the session's message handler for server-pushed
    /// notifications (tool-list-changed, resource-list-changed,
    /// resource-updated, prompt-list-changed).
    pub async fn connect(&self, on_notify: Option<NotificationHandler>) -> Result<ServerCapabilitySnapshot, ClientError> {
        {
            let state = self.state.lock().await;
            if *state == ClientState::Connected {
                return Err(ClientError::AlreadyConnected);
            }
        }

        let session: Arc<dyn McpSession> = match RmcpSession::connect(&self.transport, on_notify).await {
            Ok(s) => Arc::new(s),
            Err(e) => {
                *self.state.lock().await = ClientState::Error;
                return Err(e);
            }
        };

        let capabilities = session.capabilities();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let keep_alive_session = Arc::clone(&session);
        let name = self.name.clone();
        let keep_alive = tokio::spawn(async move {
            // Holds the session reference alive until told to stop; this is
            // the sole owner responsible for the session's teardown timing.
            let _session = keep_alive_session;
            let _ = shutdown_rx.await;
            info!(server = %name, "keep-alive task exiting");
        });

        *self.inner.lock().await = Some(Inner { session, keep_alive, shutdown: shutdown_tx });
        *self.state.lock().await = ClientState::Connected;
        Ok(capabilities)
    }

    /// `Connected -> Disconnected`. Signals the keep-alive task and waits
    /// for it to exit before the state transition completes.
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        let inner = self.inner.lock().await.take();
        match inner {
            Some(Inner { keep_alive, shutdown, .. }) => {
                let _ = shutdown.send(());
                let _ = keep_alive.await;
                *self.state.lock().await = ClientState::Disconnected;
                Ok(())
            }
            None => Err(ClientError::NotConnected(self.state().await.to_string())),
        }
    }

    async fn session(&self) -> Result<Arc<dyn McpSession>, ClientError> {
        match self.inner.lock().await.as_ref() {
            Some(inner) => Ok(Arc::clone(&inner.session)),
            None => Err(ClientError::NotConnected(self.state().await.to_string())),
        }
    }

    pub async fn list_tools(&self) -> Result<Vec<ToolInfo>, ClientError> {
        let session = self.session().await?;
        let mut tools = Vec::new();
        let mut cursor = None;
        loop {
            let page = session.list_tools(cursor).await?;
            tools.extend(page.tools);
            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }
        Ok(tools)
    }

    pub async fn call_tool(
        &self,
        tool_name: &str,
        arguments: Option<serde_json::Value>,
        timeout: Option<Duration>,
    ) -> Result<CallToolOutcome, ClientError> {
        let session = self.session().await?;
        session.call_tool(tool_name, arguments, timeout).await
    }

    /// Lists every resource exposed under the `window://` scheme, ordered by
    /// descending [`WindowUri::ordering_priority`]. A transport error yields
    /// an empty list rather than propagating, so one unreachable server
    /// cannot blank out a whole desktop view. A server that doesn't advertise
    /// `resources.subscribe` has no way to push updates for what it lists, so
    /// the whole call is gated on that capability rather than just the
    /// subscribe side-effect: without it, listing would return windows the
    /// desktop could never learn to invalidate.
    pub async fn list_windows(&self) -> Vec<WindowUri> {
        let session = match self.session().await {
            Ok(s) => s,
            Err(e) => {
                warn!(server = %self.name, error = %e, "list_windows: not connected");
                return Vec::new();
            }
        };

        if !session.capabilities().resources_subscribe {
            return Vec::new();
        }

        let mut resources = Vec::new();
        let mut cursor = None;
        loop {
            match session.list_resources(cursor.clone()).await {
                Ok(page) => {
                    resources.extend(page.resources);
                    cursor = page.next_cursor;
                    if cursor.is_none() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(server = %self.name, error = %e, "list_windows: list_resources failed");
                    return Vec::new();
                }
            }
        }

        let mut windows: Vec<WindowUri> = resources
            .into_iter()
            .filter_map(|r| match r.uri.parse::<WindowUri>() {
                Ok(uri) => Some(uri),
                Err(e) => {
                    warn!(server = %self.name, uri = %r.uri, error = %e, "skipping unreadable window uri");
                    None
                }
            })
            .collect();
        windows.sort_by(|a, b| b.ordering_priority().cmp(&a.ordering_priority()));

        for window in &windows {
            if let Err(e) = session.subscribe(&window.to_string()).await {
                warn!(server = %self.name, uri = %window, error = %e, "subscribe failed");
            }
        }

        windows
    }

    /// Fetches a single window's resource contents, falling back to a
    /// URI-only result on transport failure so the desktop aggregator can
    /// still render the window as unreadable rather than drop it.
    pub async fn get_window_detail(&self, uri: &WindowUri) -> ReadResourceOutcome {
        let uri_str = uri.to_string();
        match self.session().await {
            Ok(session) => match session.read_resource(&uri_str).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(server = %self.name, uri = %uri_str, error = %e, "read_resource failed");
                    ReadResourceOutcome::uri_only(uri_str)
                }
            },
            Err(e) => {
                warn!(server = %self.name, uri = %uri_str, error = %e, "get_window_detail: not connected");
                ReadResourceOutcome::uri_only(uri_str)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_display_matches_wire_vocabulary() {
        assert_eq!(ClientState::Initialized.to_string(), "initialized");
        assert_eq!(ClientState::Connected.to_string(), "connected");
        assert_eq!(ClientState::Disconnected.to_string(), "disconnected");
        assert_eq!(ClientState::Error.to_string(), "error");
    }

    #[tokio::test]
    async fn fresh_client_starts_initialized_and_rejects_calls() {
        let client = McpClient::new(
            "demo",
            TransportParams::Stdio { command: "true".into(), args: vec![], env: Default::default(), cwd: None },
        );
        assert_eq!(client.state().await, ClientState::Initialized);
        let err = client.list_tools().await.unwrap_err();
        assert!(matches!(err, ClientError::NotConnected(_)));
    }

    #[tokio::test]
    async fn disconnect_without_connect_errors() {
        let client = McpClient::new(
            "demo",
            TransportParams::Stdio { command: "true".into(), args: vec![], env: Default::default(), cwd: None },
        );
        let err = client.disconnect().await.unwrap_err();
        assert!(matches!(err, ClientError::NotConnected(_)));
    }
}
