//! Event-name constants and wire message shapes shared by the signaling hub
//! and its clients (Agents and Computers).
//!
//! Events are namespaced with a `:` separator (`server:join_office`,
//! `notify:enter_office`, ...). The hub normalizes `a:b` to `a_b` for
//! internal dispatch; [`normalize_event`] performs that translation.

use serde::Deserialize;
use serde::Serialize;

/// Role a connection registers under. Immutable after the first join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Agent,
    Computer,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Agent => "agent",
            Role::Computer => "computer",
        }
    }
}

pub mod events {
    //! Event name constants, grouped by allowed direction.

    /// Client (Agent or Computer) -> Hub, request/ack.
    pub const JOIN_OFFICE: &str = "server:join_office";
    pub const LEAVE_OFFICE: &str = "server:leave_office";
    /// Computer -> Hub, broadcast to room.
    pub const UPDATE_CONFIG: &str = "server:update_config";
    pub const UPDATE_TOOL_LIST: &str = "server:update_tool_list";
    pub const UPDATE_DESKTOP: &str = "server:update_desktop";
    /// Agent -> Hub, broadcast to room.
    pub const CANCEL_TOOL_CALL: &str = "server:cancel_tool_call";
    /// Agent -> Hub, request/response.
    pub const LIST_ROOM: &str = "server:list_room";
    /// Agent -> Hub -> Computer, point-to-point request/response.
    pub const TOOL_CALL: &str = "client:tool_call";
    pub const GET_TOOLS: &str = "client:get_tools";
    pub const GET_CONFIG: &str = "client:get_config";
    pub const GET_DESKTOP: &str = "client:get_desktop";
    /// Hub -> clients, broadcast only.
    pub const NOTIFY_ENTER_OFFICE: &str = "notify:enter_office";
    pub const NOTIFY_LEAVE_OFFICE: &str = "notify:leave_office";
    pub const NOTIFY_UPDATE_CONFIG: &str = "notify:update_config";
    pub const NOTIFY_UPDATE_TOOL_LIST: &str = "notify:update_tool_list";
    pub const NOTIFY_UPDATE_DESKTOP: &str = "notify:update_desktop";
    pub const NOTIFY_CANCEL_TOOL_CALL: &str = "notify:cancel_tool_call";
}

/// Normalize `a:b` to `a_b` for internal dispatch keys, matching the hub's
/// event-table lookup convention.
pub fn normalize_event(event: &str) -> String {
    event.replace(':', "_")
}

/// Returns true if `event` is a `notify:*` event; only the Hub may emit these.
pub fn is_notify_event(event: &str) -> bool {
    event.starts_with("notify:")
}

/// Returns true if `event` is a `client:*` event; only an Agent may emit these
/// (they are forwarded Hub -> Computer, never emitted directly by a Computer).
pub fn is_client_event(event: &str) -> bool {
    event.starts_with("client:")
}

/// Returns true if `event` is a `server:*` event; the Hub never sends these to
/// clients, only receives them.
pub fn is_server_event(event: &str) -> bool {
    event.starts_with("server:")
}

/// Direction-policy error surfaced when a peer attempts to emit an event it
/// is not allowed to originate (invariant I4).
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DirectionError {
    #[error("`{0}` is hub-originated only and cannot be emitted by a client")]
    NotifyIsHubOnly(String),
    #[error("`{0}` cannot be emitted directly by a computer")]
    ClientEventFromComputer(String),
}

/// Validate that `role` is allowed to emit `event` outward to the Hub.
pub fn validate_outgoing(role: Role, event: &str) -> Result<(), DirectionError> {
    if is_notify_event(event) {
        return Err(DirectionError::NotifyIsHubOnly(event.to_string()));
    }
    if role == Role::Computer && is_client_event(event) {
        return Err(DirectionError::ClientEventFromComputer(event.to_string()));
    }
    Ok(())
}

/// Generic acknowledgement returned by request/ack events such as
/// `server:join_office` and `server:leave_office`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

impl Ack {
    pub fn ok() -> Self {
        Self { ok: true, err: None }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self { ok: false, err: Some(message.into()) }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnterOfficeReq {
    pub role: Role,
    pub name: String,
    pub office_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaveOfficeReq {
    pub office_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateConfigReq {
    pub computer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallReq {
    pub agent: String,
    pub computer: String,
    pub tool_name: String,
    #[serde(default)]
    pub params: serde_json::Value,
    pub req_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelToolCallReq {
    pub agent: String,
    pub req_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetToolsReq {
    pub computer: String,
    pub agent: String,
    pub req_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmcpTool {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub params_schema: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_schema: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetToolsRet {
    pub tools: Vec<SmcpTool>,
    pub req_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetDesktopReq {
    pub computer: String,
    pub agent: String,
    pub req_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desktop_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetDesktopRet {
    pub desktops: Vec<String>,
    pub req_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetConfigReq {
    pub computer: String,
    pub agent: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetConfigRet {
    pub servers: serde_json::Value,
    pub inputs: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListRoomReq {
    pub agent: String,
    pub office_id: String,
    pub req_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub sid: String,
    pub name: String,
    pub role: Role,
    pub office_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListRoomRet {
    pub sessions: Vec<SessionInfo>,
    pub req_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnterOfficeNotification {
    pub office_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaveOfficeNotification {
    pub office_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
}

/// One frame on the wire: a named event carrying a JSON payload, optionally
/// correlated to a request via `req_id` for request/response events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub req_id: Option<String>,
}

impl Envelope {
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self { event: event.into(), data, req_id: None }
    }

    pub fn with_req_id(mut self, req_id: impl Into<String>) -> Self {
        self.req_id = Some(req_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_replaces_colon() {
        assert_eq!(normalize_event("server:join_office"), "server_join_office");
    }

    #[test]
    fn direction_rejects_notify_from_clients() {
        assert_eq!(
            validate_outgoing(Role::Agent, "notify:enter_office"),
            Err(DirectionError::NotifyIsHubOnly("notify:enter_office".into()))
        );
        assert_eq!(
            validate_outgoing(Role::Computer, "notify:enter_office"),
            Err(DirectionError::NotifyIsHubOnly("notify:enter_office".into()))
        );
    }

    #[test]
    fn direction_rejects_client_event_from_computer() {
        assert_eq!(
            validate_outgoing(Role::Computer, "client:tool_call"),
            Err(DirectionError::ClientEventFromComputer("client:tool_call".into()))
        );
        assert!(validate_outgoing(Role::Agent, "client:tool_call").is_ok());
    }

    #[test]
    fn direction_allows_server_events_from_clients() {
        assert!(validate_outgoing(Role::Agent, events::JOIN_OFFICE).is_ok());
        assert!(validate_outgoing(Role::Computer, events::UPDATE_CONFIG).is_ok());
    }

    #[test]
    fn ack_roundtrips_through_json() {
        let ack = Ack::err("office-2 already has an agent");
        let json = serde_json::to_string(&ack).expect("serialize");
        let back: Ack = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(ack, back);
    }
}
