//! The C8 Agent Client: connects to a Signaling Hub, enforces direction
//! rules locally before anything goes over the wire, and dispatches incoming
//! notifications to a registered [`AgentHandlers`] implementation.

use std::sync::Arc;
use std::time::Duration;

use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use serde::Serialize;
use smcp_protocol::events;
use smcp_protocol::validate_outgoing;
use smcp_protocol::Ack;
use smcp_protocol::CancelToolCallReq;
use smcp_protocol::EnterOfficeNotification;
use smcp_protocol::EnterOfficeReq;
use smcp_protocol::Envelope;
use smcp_protocol::GetDesktopReq;
use smcp_protocol::GetDesktopRet;
use smcp_protocol::GetToolsReq;
use smcp_protocol::GetToolsRet;
use smcp_protocol::LeaveOfficeNotification;
use smcp_protocol::LeaveOfficeReq;
use smcp_protocol::ListRoomReq;
use smcp_protocol::ListRoomRet;
use smcp_protocol::Role;
use smcp_protocol::SessionInfo;
use smcp_protocol::ToolCallReq;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;
use tracing::warn;
use uuid::Uuid;

use crate::error::AgentError;
use crate::handlers::AgentHandlers;
use crate::pending::PendingRequests;

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// A tool call's outcome, deserialized off the wire. Mirrors the shape the
/// Hub forwards back from the target Computer's own tool-execution result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallOutcome {
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub content: serde_json::Value,
}

fn error_outcome(message: String) -> ToolCallOutcome {
    ToolCallOutcome { is_error: true, content: serde_json::json!({ "error": message }) }
}

pub struct AgentClient {
    name: Mutex<Option<String>>,
    office_id: Mutex<Option<String>>,
    outgoing: mpsc::UnboundedSender<Message>,
    pending: PendingRequests,
    handlers: Arc<dyn AgentHandlers>,
}

impl AgentClient {
    /// Connects to a Hub WebSocket endpoint and spawns the reader/writer
    /// tasks that keep the connection alive for the client's lifetime.
    pub async fn connect_to_server(url: &str, handlers: Arc<dyn AgentHandlers>) -> Result<Arc<Self>, AgentError> {
        let (stream, _response) = tokio_tungstenite::connect_async(url).await.map_err(|e| AgentError::Transport(e.to_string()))?;
        let (mut write, mut read) = stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if write.send(message).await.is_err() {
                    break;
                }
            }
        });

        let client = Arc::new(Self {
            name: Mutex::new(None),
            office_id: Mutex::new(None),
            outgoing: tx,
            pending: PendingRequests::new(),
            handlers,
        });

        let reader_client = Arc::clone(&client);
        tokio::spawn(async move {
            while let Some(Ok(message)) = read.next().await {
                let Message::Text(text) = message else { continue };
                match serde_json::from_str::<Envelope>(&text) {
                    Ok(envelope) => reader_client.handle_incoming(envelope).await,
                    Err(e) => warn!(error = %e, "dropped malformed envelope"),
                }
            }
        });

        Ok(client)
    }

    pub async fn name(&self) -> Option<String> {
        self.name.lock().await.clone()
    }

    pub async fn office_id(&self) -> Option<String> {
        self.office_id.lock().await.clone()
    }

    fn send_raw(&self, envelope: Envelope) -> Result<(), AgentError> {
        let text = serde_json::to_string(&envelope)?;
        self.outgoing.send(Message::Text(text.into())).map_err(|_| AgentError::NotConnected)
    }

    /// Sends a direction-checked request and awaits its correlated response.
    async fn call(&self, event: &str, data: serde_json::Value, timeout: Option<Duration>) -> Result<Envelope, AgentError> {
        validate_outgoing(Role::Agent, event)?;
        let req_id = Uuid::new_v4().to_string();
        let rx = self.pending.register(req_id.clone()).await;
        self.send_raw(Envelope::new(event, data).with_req_id(req_id.clone()))?;

        match tokio::time::timeout(timeout.unwrap_or(DEFAULT_CALL_TIMEOUT), rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) | Err(_) => {
                self.pending.cancel(&req_id).await;
                Err(AgentError::Timeout)
            }
        }
    }

    fn ack_result(ack: Ack) -> Result<(), AgentError> {
        if ack.ok {
            Ok(())
        } else {
            Err(AgentError::Rpc(ack.err.unwrap_or_default()))
        }
    }

    pub async fn join_office(self: &Arc<Self>, office_id: &str, name: &str) -> Result<(), AgentError> {
        let req = EnterOfficeReq { role: Role::Agent, name: name.to_string(), office_id: office_id.to_string() };
        let response = self.call(events::JOIN_OFFICE, serde_json::to_value(req)?, None).await?;
        let ack: Ack = serde_json::from_value(response.data)?;
        Self::ack_result(ack)?;
        *self.name.lock().await = Some(name.to_string());
        *self.office_id.lock().await = Some(office_id.to_string());
        Ok(())
    }

    pub async fn leave_office(self: &Arc<Self>, office_id: &str) -> Result<(), AgentError> {
        let req = LeaveOfficeReq { office_id: office_id.to_string() };
        let response = self.call(events::LEAVE_OFFICE, serde_json::to_value(req)?, None).await?;
        let ack: Ack = serde_json::from_value(response.data)?;
        Self::ack_result(ack)?;
        *self.office_id.lock().await = None;
        Ok(())
    }

    /// Dispatches a tool call to `computer` and waits for its result. On
    /// timeout, emits `server:cancel_tool_call` and returns a structured
    /// error result rather than propagating the timeout.
    pub async fn emit_tool_call(
        self: &Arc<Self>,
        computer: &str,
        tool_name: &str,
        params: serde_json::Value,
        timeout: Option<Duration>,
    ) -> ToolCallOutcome {
        let agent = self.name().await.unwrap_or_default();
        let req_id = Uuid::new_v4().to_string();
        let req = ToolCallReq {
            agent,
            computer: computer.to_string(),
            tool_name: tool_name.to_string(),
            params,
            req_id: req_id.clone(),
            timeout: timeout.map(|d| d.as_secs_f64()),
        };
        let data = match serde_json::to_value(&req) {
            Ok(v) => v,
            Err(e) => return error_outcome(format!("failed to serialize tool call: {e}")),
        };

        match self.call(events::TOOL_CALL, data, timeout).await {
            Ok(response) => {
                serde_json::from_value(response.data).unwrap_or_else(|e| error_outcome(format!("malformed tool-call response: {e}")))
            }
            Err(AgentError::Timeout) => {
                let agent = self.name().await.unwrap_or_default();
                let cancel = CancelToolCallReq { agent, req_id };
                if let Ok(data) = serde_json::to_value(cancel) {
                    let _ = self.send_raw(Envelope::new(events::CANCEL_TOOL_CALL, data));
                }
                error_outcome(format!("tool call '{tool_name}' timed out"))
            }
            Err(e) => error_outcome(e.to_string()),
        }
    }

    pub async fn get_tools_from_computer(self: &Arc<Self>, computer: &str) -> Result<GetToolsRet, AgentError> {
        let agent = self.name().await.unwrap_or_default();
        let req_id = Uuid::new_v4().to_string();
        let req = GetToolsReq { computer: computer.to_string(), agent, req_id };
        let response = self.call(events::GET_TOOLS, serde_json::to_value(req)?, None).await?;
        Ok(serde_json::from_value(response.data)?)
    }

    pub async fn get_desktop_from_computer(
        self: &Arc<Self>,
        computer: &str,
        size: Option<usize>,
        window: Option<&str>,
    ) -> Result<GetDesktopRet, AgentError> {
        let agent = self.name().await.unwrap_or_default();
        let req_id = Uuid::new_v4().to_string();
        let req =
            GetDesktopReq { computer: computer.to_string(), agent, req_id, desktop_size: size, window: window.map(str::to_string) };
        let response = self.call(events::GET_DESKTOP, serde_json::to_value(req)?, None).await?;
        Ok(serde_json::from_value(response.data)?)
    }

    pub async fn get_computers_in_office(self: &Arc<Self>, office_id: &str) -> Result<Vec<SessionInfo>, AgentError> {
        let agent = self.name().await.unwrap_or_default();
        let req_id = Uuid::new_v4().to_string();
        let req = ListRoomReq { agent, office_id: office_id.to_string(), req_id };
        let response = self.call(events::LIST_ROOM, serde_json::to_value(req)?, None).await?;
        let ret: ListRoomRet = serde_json::from_value(response.data)?;
        Ok(ret.sessions.into_iter().filter(|s| s.role == Role::Computer).collect())
    }

    async fn handle_incoming(self: &Arc<Self>, envelope: Envelope) {
        if smcp_protocol::is_notify_event(&envelope.event) {
            self.dispatch_notification(envelope).await;
            return;
        }
        if let Some(req_id) = envelope.req_id.clone() {
            self.pending.resolve(&req_id, envelope).await;
        }
    }

    async fn dispatch_notification(self: &Arc<Self>, envelope: Envelope) {
        match envelope.event.as_str() {
            events::NOTIFY_ENTER_OFFICE => match serde_json::from_value::<EnterOfficeNotification>(envelope.data) {
                Ok(data) => {
                    self.handlers.on_computer_enter_office(data.clone(), self).await;
                    if let Some(computer) = data.computer {
                        self.fetch_tools_in_background(computer);
                    }
                }
                Err(e) => warn!(error = %e, "malformed enter_office notification"),
            },
            events::NOTIFY_LEAVE_OFFICE => match serde_json::from_value::<LeaveOfficeNotification>(envelope.data) {
                Ok(data) => self.handlers.on_computer_leave_office(data, self).await,
                Err(e) => warn!(error = %e, "malformed leave_office notification"),
            },
            events::NOTIFY_UPDATE_CONFIG => {
                let computer = envelope.data.get("computer").and_then(|v| v.as_str()).map(str::to_string);
                self.handlers.on_computer_update_config(envelope.data, self).await;
                if let Some(computer) = computer {
                    self.fetch_tools_in_background(computer);
                }
            }
            other => debug!(event = other, "notification has no registered handler"),
        }
    }

    fn fetch_tools_in_background(self: &Arc<Self>, computer: String) {
        let client = Arc::clone(self);
        tokio::spawn(async move {
            match client.get_tools_from_computer(&computer).await {
                Ok(tools) => client.handlers.on_tools_received(tools, &client).await,
                Err(e) => warn!(computer, error = %e, "failed to fetch tool list after office change"),
            }
        });
    }
}
