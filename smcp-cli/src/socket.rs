//! The Computer-role counterpart to `smcp-agent`'s client: connects to a
//! Signaling Hub as a Computer, answers forwarded `client:*` requests by
//! dispatching into the attached [`Computer`] facade, and relays
//! `server:update_tool_list` / `server:update_desktop` whenever the facade's
//! own state changes. Computers may never emit `client:*` events, so this
//! client is deliberately a separate, smaller type rather than a variant of
//! [`smcp_agent::AgentClient`].

use std::sync::Arc;
use std::time::Duration;

use futures::SinkExt;
use futures::StreamExt;
use smcp_computer::Computer;
use smcp_computer::DesktopNotifier;
use smcp_mcp_client::CallToolOutcome;
use smcp_mcp_client::ContentBlock;
use smcp_protocol::events;
use smcp_protocol::validate_outgoing;
use smcp_protocol::Ack;
use smcp_protocol::EnterOfficeReq;
use smcp_protocol::Envelope;
use smcp_protocol::GetConfigRet;
use smcp_protocol::GetDesktopReq;
use smcp_protocol::GetDesktopRet;
use smcp_protocol::GetToolsRet;
use smcp_protocol::LeaveOfficeReq;
use smcp_protocol::Role;
use smcp_protocol::SmcpTool;
use smcp_protocol::ToolCallReq;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderName;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;
use tracing::warn;
use uuid::Uuid;

use crate::error::CliError;
use crate::pending::PendingRequests;

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ComputerSocket {
    name: Mutex<Option<String>>,
    office_id: Mutex<Option<String>>,
    outgoing: mpsc::UnboundedSender<Message>,
    pending: PendingRequests,
    computer: Arc<Computer>,
}

impl ComputerSocket {
    pub async fn connect(
        url: &str,
        auth: Option<&str>,
        headers: Option<&serde_json::Value>,
        computer: Arc<Computer>,
    ) -> Result<Arc<Self>, CliError> {
        let mut request = url.into_client_request().map_err(|e| CliError::Transport(e.to_string()))?;
        if let Some(token) = auth {
            let value = format!("Bearer {token}").parse().map_err(|_| CliError::Transport("invalid auth token".to_string()))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        if let Some(serde_json::Value::Object(map)) = headers {
            for (key, value) in map {
                let Some(value) = value.as_str() else { continue };
                let Ok(name) = HeaderName::from_bytes(key.as_bytes()) else { continue };
                let Ok(value) = value.parse() else { continue };
                request.headers_mut().insert(name, value);
            }
        }

        let (stream, _response) = tokio_tungstenite::connect_async(request).await.map_err(|e| CliError::Transport(e.to_string()))?;
        let (mut write, mut read) = stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if write.send(message).await.is_err() {
                    break;
                }
            }
        });

        let socket = Arc::new(Self {
            name: Mutex::new(None),
            office_id: Mutex::new(None),
            outgoing: tx,
            pending: PendingRequests::new(),
            computer,
        });

        let reader = Arc::clone(&socket);
        tokio::spawn(async move {
            while let Some(Ok(message)) = read.next().await {
                let Message::Text(text) = message else { continue };
                match serde_json::from_str::<Envelope>(&text) {
                    Ok(envelope) => reader.handle_incoming(envelope).await,
                    Err(e) => warn!(error = %e, "dropped malformed envelope"),
                }
            }
        });

        Ok(socket)
    }

    pub async fn name(&self) -> Option<String> {
        self.name.lock().await.clone()
    }

    pub async fn office_id(&self) -> Option<String> {
        self.office_id.lock().await.clone()
    }

    fn send_raw(&self, envelope: Envelope) -> Result<(), CliError> {
        let text = serde_json::to_string(&envelope)?;
        self.outgoing.send(Message::Text(text.into())).map_err(|_| CliError::NotConnected)
    }

    fn reply(&self, event: &str, req_id: Option<String>, data: serde_json::Value) {
        let mut envelope = Envelope::new(event, data);
        envelope.req_id = req_id;
        if let Err(e) = self.send_raw(envelope) {
            warn!(error = %e, "failed to send reply");
        }
    }

    async fn call(&self, event: &str, data: serde_json::Value) -> Result<Envelope, CliError> {
        validate_outgoing(Role::Computer, event)?;
        let req_id = Uuid::new_v4().to_string();
        let rx = self.pending.register(req_id.clone()).await;
        self.send_raw(Envelope::new(event, data).with_req_id(req_id.clone()))?;

        match tokio::time::timeout(DEFAULT_CALL_TIMEOUT, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) | Err(_) => {
                self.pending.cancel(&req_id).await;
                Err(CliError::Timeout)
            }
        }
    }

    fn ack_result(ack: Ack) -> Result<(), CliError> {
        if ack.ok {
            Ok(())
        } else {
            Err(CliError::Rpc(ack.err.unwrap_or_default()))
        }
    }

    pub async fn join_office(self: &Arc<Self>, office_id: &str, name: &str) -> Result<(), CliError> {
        let req = EnterOfficeReq { role: Role::Computer, name: name.to_string(), office_id: office_id.to_string() };
        let response = self.call(events::JOIN_OFFICE, serde_json::to_value(req)?).await?;
        let ack: Ack = serde_json::from_value(response.data)?;
        Self::ack_result(ack)?;
        *self.name.lock().await = Some(name.to_string());
        *self.office_id.lock().await = Some(office_id.to_string());
        Ok(())
    }

    pub async fn leave_office(self: &Arc<Self>, office_id: &str) -> Result<(), CliError> {
        let req = LeaveOfficeReq { office_id: office_id.to_string() };
        let response = self.call(events::LEAVE_OFFICE, serde_json::to_value(req)?).await?;
        let ack: Ack = serde_json::from_value(response.data)?;
        Self::ack_result(ack)?;
        *self.office_id.lock().await = None;
        Ok(())
    }

    /// Broadcasts `server:update_config` to the office so agents refresh
    /// whatever config view they keep (tool list, input definitions, ...).
    pub async fn notify_update_config(&self) -> Result<(), CliError> {
        let Some(name) = self.name().await else { return Err(CliError::NotConnected) };
        self.send_raw(Envelope::new(events::UPDATE_CONFIG, serde_json::json!({ "computer": name })))
    }

    async fn handle_incoming(self: &Arc<Self>, envelope: Envelope) {
        if let Some(req_id) = envelope.req_id.clone() {
            if self.pending.resolve_if_present(&req_id, envelope.clone()).await {
                return;
            }
        }

        match envelope.event.as_str() {
            events::TOOL_CALL => self.handle_tool_call(envelope).await,
            events::GET_TOOLS => self.handle_get_tools(envelope).await,
            events::GET_DESKTOP => self.handle_get_desktop(envelope).await,
            events::GET_CONFIG => self.handle_get_config(envelope).await,
            other if smcp_protocol::is_notify_event(other) => debug!(event = other, "notification received"),
            other => debug!(event = other, "unhandled event"),
        }
    }

    async fn handle_tool_call(&self, envelope: Envelope) {
        let req_id = envelope.req_id.clone();
        let outcome = match serde_json::from_value::<ToolCallReq>(envelope.data) {
            Ok(req) => {
                let timeout = req.timeout.map(Duration::from_secs_f64);
                self.computer.execute_tool(&req.tool_name, req.params, None, timeout).await
            }
            Err(e) => CallToolOutcome {
                content: vec![ContentBlock::Text { text: format!("malformed tool call: {e}") }],
                is_error: true,
                meta: None,
            },
        };
        self.reply(events::TOOL_CALL, req_id, serde_json::to_value(outcome).unwrap_or(serde_json::Value::Null));
    }

    async fn handle_get_tools(&self, envelope: Envelope) {
        let req_id = envelope.req_id.clone().unwrap_or_default();
        let tools: Vec<SmcpTool> = self
            .computer
            .manager()
            .available_tools()
            .await
            .into_iter()
            .map(|tool| SmcpTool {
                name: tool.name,
                description: tool.description,
                params_schema: tool.input_schema,
                return_schema: tool.output_schema,
                meta: tool.annotations,
            })
            .collect();
        let ret = GetToolsRet { tools, req_id: req_id.clone() };
        self.reply(events::GET_TOOLS, envelope.req_id, serde_json::to_value(ret).unwrap_or(serde_json::Value::Null));
    }

    async fn handle_get_desktop(&self, envelope: Envelope) {
        let req_id = envelope.req_id.clone().unwrap_or_default();
        let (size, window) = match serde_json::from_value::<GetDesktopReq>(envelope.data) {
            Ok(req) => (req.desktop_size, req.window),
            Err(_) => (None, None),
        };
        let desktops = self.computer.get_desktop(size, window.as_deref()).await;
        let ret = GetDesktopRet { desktops, req_id: req_id.clone() };
        self.reply(events::GET_DESKTOP, envelope.req_id, serde_json::to_value(ret).unwrap_or(serde_json::Value::Null));
    }

    async fn handle_get_config(&self, envelope: Envelope) {
        let servers = self.computer.manager().server_configs().await;
        let ret = GetConfigRet {
            servers: serde_json::to_value(servers).unwrap_or(serde_json::Value::Null),
            inputs: serde_json::Value::Array(Vec::new()),
        };
        self.reply(events::GET_CONFIG, envelope.req_id, serde_json::to_value(ret).unwrap_or(serde_json::Value::Null));
    }
}

impl DesktopNotifier for ComputerSocket {
    fn tool_list_changed(&self) {
        self.notify(events::UPDATE_TOOL_LIST);
    }

    fn desktop_changed(&self) {
        self.notify(events::UPDATE_DESKTOP);
    }
}

impl ComputerSocket {
    fn notify(&self, event: &'static str) {
        let name = match self.name.try_lock() {
            Ok(guard) => guard.clone(),
            Err(_) => return,
        };
        let Some(name) = name else { return };
        if let Err(e) = self.send_raw(Envelope::new(event, serde_json::json!({ "computer": name }))) {
            warn!(error = %e, "failed to send state-change notification");
        }
    }
}
