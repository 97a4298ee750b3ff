//! Core signaling hub: join/leave rules, broadcast notifications, and
//! point-to-point request forwarding between Agents and Computers.
//!
//! Ground truth for the rules below is the namespace test suite: role is
//! fixed at first join; an Agent may hold only one office and only one Agent
//! may occupy an office at a time; a Computer may switch offices (leaving the
//! old one first) but two Computers in the same office may not share a name;
//! rejoining the office a session already occupies is a no-op, not an error.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use smcp_protocol::events;
use smcp_protocol::Ack;
use smcp_protocol::EnterOfficeNotification;
use smcp_protocol::EnterOfficeReq;
use smcp_protocol::Envelope;
use smcp_protocol::LeaveOfficeNotification;
use smcp_protocol::LeaveOfficeReq;
use smcp_protocol::ListRoomRet;
use smcp_protocol::Role;
use smcp_protocol::SessionInfo;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::info;
use tracing::warn;

use crate::error::HubError;
use crate::outgoing::OutgoingTx;
use crate::outgoing::PendingRequests;
use crate::rooms::RoomRegistry;
use crate::session::SessionRegistry;
use crate::session::SessionState;

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Hub {
    sessions: SessionRegistry,
    rooms: RoomRegistry,
    connections: RwLock<HashMap<String, OutgoingTx>>,
    pending: PendingRequests,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl Hub {
    pub fn new() -> Self {
        Self {
            sessions: SessionRegistry::new(),
            rooms: RoomRegistry::new(),
            connections: RwLock::new(HashMap::new()),
            pending: PendingRequests::new(),
        }
    }

    pub async fn register_connection(&self, sid: &str, tx: OutgoingTx) {
        self.sessions.get_or_create(sid).await;
        self.connections.write().await.insert(sid.to_string(), tx);
    }

    /// Drops the connection and, if it had joined an office, leaves it and
    /// broadcasts departure the same way an explicit `server:leave_office`
    /// would.
    pub async fn disconnect(&self, sid: &str) {
        self.connections.write().await.remove(sid);
        if let Some(session) = self.sessions.get(sid).await {
            if let Some(office_id) = session.office_id.clone() {
                let _ = self.leave_office(sid, LeaveOfficeReq { office_id }).await;
            }
        }
        self.sessions.remove(sid).await;
    }

    pub async fn session_role(&self, sid: &str) -> Option<Role> {
        self.sessions.get(sid).await.and_then(|s| s.role)
    }

    /// Sends an envelope directly to one session's connection, bypassing
    /// room membership (used for request/response acks and forwarded
    /// `client:*` results, which are point-to-point, not broadcast).
    pub async fn send_direct(&self, sid: &str, envelope: Envelope) -> Result<(), HubError> {
        self.send_to(sid, envelope).await
    }

    async fn send_to(&self, sid: &str, envelope: Envelope) -> Result<(), HubError> {
        let connections = self.connections.read().await;
        match connections.get(sid) {
            Some(tx) => {
                let _ = tx.send(envelope);
                Ok(())
            }
            None => Err(HubError::ConnectionGone(sid.to_string())),
        }
    }

    async fn broadcast_to_office(&self, office_id: &str, envelope: Envelope, skip_sid: &str) {
        for member in self.rooms.participants(office_id).await {
            if member == skip_sid {
                continue;
            }
            if self.send_to(&member, envelope.clone()).await.is_err() {
                warn!(sid = %member, "dropped broadcast: connection gone");
            }
        }
    }

    /// Handles `server:join_office`. Returns `Ok(())` on success or an
    /// [`HubError`] describing why the join was refused; either way the
    /// caller wraps this into an [`Ack`] rather than letting it abort the
    /// connection.
    pub async fn join_office(&self, sid: &str, req: EnterOfficeReq) -> Result<(), HubError> {
        let mut session = self.sessions.get_or_create(sid).await;

        if let Some(existing) = session.role {
            if existing != req.role {
                return Err(HubError::RoleMismatch {
                    existing: existing.as_str().to_string(),
                    attempted: req.role.as_str().to_string(),
                });
            }
        }
        session.role = Some(req.role);
        session.name = Some(req.name.clone());
        self.sessions.save(session.clone()).await;

        self.enter_room(sid, &req.office_id, &session).await
    }

    async fn enter_room(&self, sid: &str, office_id: &str, session: &SessionState) -> Result<(), HubError> {
        if session.office_id.as_deref() == Some(office_id) {
            // Idempotent rejoin of the office already occupied: no-op.
            return Ok(());
        }

        match session.role {
            Some(Role::Agent) => {
                if let Some(current) = &session.office_id {
                    return Err(HubError::AgentAlreadyInOtherOffice(current.clone()));
                }
                for participant_sid in self.rooms.participants(office_id).await {
                    if let Some(participant) = self.sessions.get(&participant_sid).await {
                        if participant.role == Some(Role::Agent) {
                            return Err(HubError::AgentAlreadyPresent(office_id.to_string()));
                        }
                    }
                }
            }
            Some(Role::Computer) => {
                if let Some(current) = &session.office_id {
                    self.leave_room_internal(sid, current).await;
                }
                for participant_sid in self.rooms.participants(office_id).await {
                    if participant_sid == sid {
                        continue;
                    }
                    if let Some(participant) = self.sessions.get(&participant_sid).await {
                        if participant.role == Some(Role::Computer) && participant.name == session.name {
                            let name = session.name.clone().unwrap_or_default();
                            return Err(HubError::ComputerNameConflict { name, office_id: office_id.to_string() });
                        }
                    }
                }
            }
            None => {}
        }

        self.rooms.join(office_id, sid).await;
        let mut saved = session.clone();
        saved.office_id = Some(office_id.to_string());
        self.sessions.save(saved).await;

        let notification = EnterOfficeNotification {
            office_id: office_id.to_string(),
            computer: if session.role == Some(Role::Computer) { session.name.clone() } else { None },
            agent: if session.role == Some(Role::Agent) { session.name.clone() } else { None },
        };
        info!(sid, office_id, "joined office");
        self.broadcast_to_office(
            office_id,
            Envelope::new(events::NOTIFY_ENTER_OFFICE, serde_json::to_value(notification).unwrap_or_default()),
            sid,
        )
        .await;
        Ok(())
    }

    async fn leave_room_internal(&self, sid: &str, office_id: &str) {
        self.rooms.leave(office_id, sid).await;
        if let Some(mut session) = self.sessions.get(sid).await {
            session.office_id = None;
            self.sessions.save(session).await;
        }
    }

    /// Handles `server:leave_office`.
    pub async fn leave_office(&self, sid: &str, req: LeaveOfficeReq) -> Result<(), HubError> {
        let session = self.sessions.get(sid).await.ok_or_else(|| HubError::UnknownSession(sid.to_string()))?;
        self.leave_room_internal(sid, &req.office_id).await;

        let notification = LeaveOfficeNotification {
            office_id: req.office_id.clone(),
            computer: if session.role == Some(Role::Computer) { session.name.clone() } else { None },
            agent: if session.role == Some(Role::Agent) { session.name.clone() } else { None },
        };
        info!(sid, office_id = %req.office_id, "left office");
        self.broadcast_to_office(
            &req.office_id,
            Envelope::new(events::NOTIFY_LEAVE_OFFICE, serde_json::to_value(notification).unwrap_or_default()),
            sid,
        )
        .await;
        Ok(())
    }

    /// Handles `server:cancel_tool_call`: Agent-only, broadcast to the room.
    pub async fn cancel_tool_call(&self, sid: &str, data: serde_json::Value) -> Result<(), HubError> {
        let session = self.require_role(sid, Role::Agent).await?;
        let office_id = session.office_id.ok_or_else(|| HubError::NotInOffice(sid.to_string()))?;
        self.pending
            .cancel(data.get("req_id").and_then(|v| v.as_str()).unwrap_or_default())
            .await;
        self.broadcast_to_office(&office_id, Envelope::new(events::NOTIFY_CANCEL_TOOL_CALL, data), sid).await;
        Ok(())
    }

    /// Handles `server:update_config`/`server:update_tool_list`/
    /// `server:update_desktop`: Computer-only, broadcast to the room.
    pub async fn broadcast_computer_update(&self, sid: &str, event: &str, notify_event: &str, data: serde_json::Value) -> Result<(), HubError> {
        let session = self.require_role(sid, Role::Computer).await?;
        let office_id = session.office_id.ok_or_else(|| HubError::NotInOffice(sid.to_string()))?;
        info!(sid, event, "broadcasting computer update");
        self.broadcast_to_office(&office_id, Envelope::new(notify_event, data), sid).await;
        Ok(())
    }

    /// Handles `server:list_room`: Agent-only, and only for its own office.
    pub async fn list_room(&self, sid: &str, office_id: &str, req_id: &str) -> Result<ListRoomRet, HubError> {
        let session = self.require_role(sid, Role::Agent).await?;
        if session.office_id.as_deref() != Some(office_id) {
            return Err(HubError::ListRoomPermissionDenied);
        }

        let mut sessions = Vec::new();
        for member_sid in self.rooms.participants(office_id).await {
            if let Some(member) = self.sessions.get(&member_sid).await {
                if let (Some(role), Some(name), Some(member_office)) = (member.role, member.name.clone(), member.office_id.clone()) {
                    sessions.push(SessionInfo { sid: member_sid, name, role, office_id: member_office });
                }
            }
        }
        Ok(ListRoomRet { sessions, req_id: req_id.to_string() })
    }

    async fn require_role(&self, sid: &str, role: Role) -> Result<SessionState, HubError> {
        let session = self.sessions.get(sid).await.ok_or_else(|| HubError::UnknownSession(sid.to_string()))?;
        match session.role {
            Some(r) if r == role => Ok(session),
            _ if role == Role::Agent => Err(HubError::AgentOnly),
            _ => Err(HubError::ComputerOnly),
        }
    }

    /// Forwards a `client:*` request-response event (`tool_call`, `get_tools`,
    /// `get_config`, `get_desktop`) from the requesting Agent to the named
    /// Computer, and waits for its response (or times out).
    pub async fn forward_to_computer(
        &self,
        sid: &str,
        computer_name: &str,
        event: &str,
        req_id: &str,
        data: serde_json::Value,
        call_timeout: Option<Duration>,
    ) -> Result<Envelope, HubError> {
        let session = self.require_role(sid, Role::Agent).await?;
        let office_id = session.office_id.ok_or_else(|| HubError::NotInOffice(sid.to_string()))?;
        let target_sid = self
            .sessions
            .sid_for_name(&office_id, computer_name)
            .await
            .ok_or_else(|| HubError::ComputerNotFound(computer_name.to_string()))?;

        let rx = self.pending.register(req_id.to_string()).await;
        self.send_to(&target_sid, Envelope::new(event, data).with_req_id(req_id)).await?;

        match timeout(call_timeout.unwrap_or(DEFAULT_CALL_TIMEOUT), rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) | Err(_) => {
                self.pending.cancel(req_id).await;
                Err(HubError::Timeout(req_id.to_string()))
            }
        }
    }

    /// Resolves `req_id` as a reply to an outstanding forward if one is
    /// waiting, reporting whether it was. Lets the WebSocket dispatcher tell
    /// a Computer's reply to `client:*` apart from a fresh forward request
    /// carrying the same event name, before the direction policy check runs.
    pub async fn resolve_if_pending(&self, req_id: &str, response: Envelope) -> bool {
        self.pending.resolve_if_present(req_id, response).await
    }
}

pub fn ack_from(result: Result<(), HubError>) -> Ack {
    match result {
        Ok(()) => Ack::ok(),
        Err(e) => Ack::err(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enter(role: Role, name: &str, office_id: &str) -> EnterOfficeReq {
        EnterOfficeReq { role, name: name.to_string(), office_id: office_id.to_string() }
    }

    #[tokio::test]
    async fn agent_joins_and_rejoining_same_office_is_a_noop() {
        let hub = Hub::new();
        hub.join_office("a1", enter(Role::Agent, "robot-A", "room1")).await.expect("first join");
        hub.join_office("a1", enter(Role::Agent, "robot-A", "room1")).await.expect("idempotent rejoin");
        assert_eq!(hub.session_role("a1").await, Some(Role::Agent));
    }

    #[tokio::test]
    async fn agent_cannot_join_a_second_office() {
        let hub = Hub::new();
        hub.join_office("a1", enter(Role::Agent, "robot-A", "roomA")).await.expect("first join");
        let err = hub.join_office("a1", enter(Role::Agent, "robot-A", "roomB")).await.unwrap_err();
        assert_eq!(err, HubError::AgentAlreadyInOtherOffice("roomA".to_string()));
    }

    #[tokio::test]
    async fn second_agent_is_rejected_from_an_occupied_office() {
        let hub = Hub::new();
        hub.join_office("a1", enter(Role::Agent, "robot-A", "room1")).await.expect("first agent");
        let err = hub.join_office("a2", enter(Role::Agent, "robot-B", "room1")).await.unwrap_err();
        assert_eq!(err, HubError::AgentAlreadyPresent("room1".to_string()));
    }

    #[tokio::test]
    async fn role_mismatch_on_rejoin_is_rejected() {
        let hub = Hub::new();
        hub.join_office("s1", enter(Role::Agent, "robot-A", "room1")).await.expect("first join");
        let err = hub.join_office("s1", enter(Role::Computer, "robot-A", "room1")).await.unwrap_err();
        assert_eq!(err, HubError::RoleMismatch { existing: "agent".to_string(), attempted: "computer".to_string() });
    }

    #[tokio::test]
    async fn computer_switches_offices_leaving_the_old_one() {
        let hub = Hub::new();
        hub.join_office("c1", enter(Role::Computer, "comp-1", "roomA")).await.expect("first join");
        hub.join_office("c1", enter(Role::Computer, "comp-1", "roomB")).await.expect("switch");
        assert!(hub.rooms.participants("roomA").await.is_empty());
        assert_eq!(hub.rooms.participants("roomB").await, vec!["c1".to_string()]);
    }

    #[tokio::test]
    async fn duplicate_computer_name_in_same_office_is_rejected() {
        let hub = Hub::new();
        hub.join_office("c1", enter(Role::Computer, "comp1", "room1")).await.expect("first computer");
        let err = hub.join_office("c2", enter(Role::Computer, "comp1", "room1")).await.unwrap_err();
        assert_eq!(err, HubError::ComputerNameConflict { name: "comp1".to_string(), office_id: "room1".to_string() });
    }

    #[tokio::test]
    async fn distinct_computer_names_in_same_office_both_succeed() {
        let hub = Hub::new();
        hub.join_office("c1", enter(Role::Computer, "comp1", "room1")).await.expect("first computer");
        hub.join_office("c2", enter(Role::Computer, "comp2", "room1")).await.expect("second computer");
        assert_eq!(hub.rooms.participants("room1").await.len(), 2);
    }

    #[tokio::test]
    async fn leave_office_clears_room_membership() {
        let hub = Hub::new();
        hub.join_office("c1", enter(Role::Computer, "comp1", "room1")).await.expect("join");
        hub.leave_office("c1", LeaveOfficeReq { office_id: "room1".to_string() }).await.expect("leave");
        assert!(hub.rooms.participants("room1").await.is_empty());
    }

    #[tokio::test]
    async fn list_room_rejects_queries_for_a_different_office() {
        let hub = Hub::new();
        hub.join_office("a1", enter(Role::Agent, "robot-A", "room1")).await.expect("join");
        let err = hub.list_room("a1", "room2", "req1").await.unwrap_err();
        assert_eq!(err, HubError::ListRoomPermissionDenied);
    }

    #[tokio::test]
    async fn list_room_returns_every_member_of_the_agents_own_office() {
        let hub = Hub::new();
        hub.join_office("a1", enter(Role::Agent, "robot-A", "room1")).await.expect("agent join");
        hub.join_office("c1", enter(Role::Computer, "comp1", "room1")).await.expect("computer join");
        hub.join_office("c2", enter(Role::Computer, "comp2", "room1")).await.expect("computer join");
        let ret = hub.list_room("a1", "room1", "req1").await.expect("list");
        assert_eq!(ret.sessions.len(), 3);
        assert_eq!(ret.req_id, "req1");
    }

    #[tokio::test]
    async fn forward_to_unknown_computer_errors() {
        let hub = Hub::new();
        hub.join_office("a1", enter(Role::Agent, "robot-A", "room1")).await.expect("join");
        let err = hub
            .forward_to_computer("a1", "ghost", events::TOOL_CALL, "req1", serde_json::json!({}), None)
            .await
            .unwrap_err();
        assert_eq!(err, HubError::ComputerNotFound("ghost".to_string()));
    }

    #[tokio::test]
    async fn forward_does_not_cross_office_boundaries() {
        let hub = Hub::new();
        hub.join_office("a1", enter(Role::Agent, "robot-A", "room1")).await.expect("agent join");
        // Same Computer name, but registered in a different office.
        hub.join_office("c1", enter(Role::Computer, "comp1", "room2")).await.expect("computer join");
        let err = hub
            .forward_to_computer("a1", "comp1", events::TOOL_CALL, "req1", serde_json::json!({}), None)
            .await
            .unwrap_err();
        assert_eq!(err, HubError::ComputerNotFound("comp1".to_string()));
    }
}
