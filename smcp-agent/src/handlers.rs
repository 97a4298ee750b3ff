//! User-registered notification handlers. Every method receives both the
//! notification payload and the client instance, so a stateless handler can
//! still read client metadata (name, current office) when it reacts.

use std::sync::Arc;

use async_trait::async_trait;
use smcp_protocol::EnterOfficeNotification;
use smcp_protocol::GetToolsRet;
use smcp_protocol::LeaveOfficeNotification;

use crate::client::AgentClient;

#[async_trait]
pub trait AgentHandlers: Send + Sync {
    async fn on_computer_enter_office(&self, _data: EnterOfficeNotification, _client: &Arc<AgentClient>) {}
    async fn on_computer_leave_office(&self, _data: LeaveOfficeNotification, _client: &Arc<AgentClient>) {}
    async fn on_computer_update_config(&self, _data: serde_json::Value, _client: &Arc<AgentClient>) {}
    async fn on_tools_received(&self, _tools: GetToolsRet, _client: &Arc<AgentClient>) {}
}

/// Default no-op handler set, for agents that only issue calls and never
/// react to notifications.
pub struct NullHandlers;

#[async_trait]
impl AgentHandlers for NullHandlers {}
