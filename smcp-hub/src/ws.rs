//! Axum WebSocket transport: one task pair (reader + forwarder) per
//! connection, wired into [`Hub`] via a `sid` assigned at upgrade time.

use std::sync::Arc;

use axum::extract::ws::Message;
use axum::extract::ws::WebSocket;
use axum::extract::State;
use axum::extract::WebSocketUpgrade;
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use smcp_protocol::events;
use smcp_protocol::validate_outgoing;
use smcp_protocol::Ack;
use smcp_protocol::CancelToolCallReq;
use smcp_protocol::EnterOfficeReq;
use smcp_protocol::Envelope;
use smcp_protocol::LeaveOfficeReq;
use smcp_protocol::ListRoomReq;
use smcp_protocol::Role;
use smcp_protocol::UpdateConfigReq;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::warn;
use uuid::Uuid;

use crate::hub::ack_from;
use crate::hub::Hub;

pub async fn ws_handler(ws: WebSocketUpgrade, State(hub): State<Arc<Hub>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

async fn handle_socket(socket: WebSocket, hub: Arc<Hub>) {
    let sid = Uuid::new_v4().to_string();
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();

    hub.register_connection(&sid, tx).await;

    let forward_task = tokio::spawn(async move {
        while let Some(envelope) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&envelope) else {
                warn!("failed to serialize outgoing envelope");
                continue;
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = receiver.next().await {
        let Message::Text(text) = message else { continue };
        let envelope: Envelope = match serde_json::from_str(&text) {
            Ok(e) => e,
            Err(e) => {
                warn!(sid, error = %e, "dropped malformed envelope");
                continue;
            }
        };
        dispatch(&hub, &sid, envelope).await;
    }

    forward_task.abort();
    hub.disconnect(&sid).await;
    debug!(sid, "connection closed");
}

async fn dispatch(hub: &Arc<Hub>, sid: &str, envelope: Envelope) {
    // A Computer's reply to a forwarded `client:*` request carries the same
    // event name as the original forward and would otherwise be rejected by
    // the direction check below (Computers may never *originate* client:*
    // events) or re-forwarded as if it were a fresh request. Req-id presence
    // in the pending table is what actually distinguishes a reply.
    if let Some(req_id) = envelope.req_id.clone() {
        if hub.resolve_if_pending(&req_id, envelope.clone()).await {
            return;
        }
    }

    let role_hint = if envelope.event == events::JOIN_OFFICE { None } else { current_role(hub, sid).await };
    if let Some(role) = role_hint {
        if let Err(e) = validate_outgoing(role, &envelope.event) {
            warn!(sid, event = %envelope.event, error = %e, "rejected out-of-policy event");
            return;
        }
    }

    match envelope.event.as_str() {
        events::JOIN_OFFICE => {
            let ack = match serde_json::from_value::<EnterOfficeReq>(envelope.data) {
                Ok(req) => ack_from(hub.join_office(sid, req).await),
                Err(e) => Ack::err(format!("invalid join_office payload: {e}")),
            };
            reply(hub, sid, events::JOIN_OFFICE, envelope.req_id, ack).await;
        }
        events::LEAVE_OFFICE => {
            let ack = match serde_json::from_value::<LeaveOfficeReq>(envelope.data) {
                Ok(req) => ack_from(hub.leave_office(sid, req).await),
                Err(e) => Ack::err(format!("invalid leave_office payload: {e}")),
            };
            reply(hub, sid, events::LEAVE_OFFICE, envelope.req_id, ack).await;
        }
        events::UPDATE_CONFIG => {
            let data = envelope.data.clone();
            if let Err(e) = serde_json::from_value::<UpdateConfigReq>(data.clone()) {
                warn!(sid, error = %e, "invalid update_config payload");
            } else if let Err(e) = hub.broadcast_computer_update(sid, envelope.event.as_str(), events::NOTIFY_UPDATE_CONFIG, data).await {
                warn!(sid, error = %e, "update_config rejected");
            }
        }
        events::UPDATE_TOOL_LIST => {
            if let Err(e) = hub.broadcast_computer_update(sid, envelope.event.as_str(), events::NOTIFY_UPDATE_TOOL_LIST, envelope.data).await {
                warn!(sid, error = %e, "update_tool_list rejected");
            }
        }
        events::UPDATE_DESKTOP => {
            if let Err(e) = hub.broadcast_computer_update(sid, envelope.event.as_str(), events::NOTIFY_UPDATE_DESKTOP, envelope.data).await {
                warn!(sid, error = %e, "update_desktop rejected");
            }
        }
        events::CANCEL_TOOL_CALL => {
            let data = envelope.data.clone();
            if serde_json::from_value::<CancelToolCallReq>(data.clone()).is_ok() {
                if let Err(e) = hub.cancel_tool_call(sid, data).await {
                    warn!(sid, error = %e, "cancel_tool_call rejected");
                }
            }
        }
        events::LIST_ROOM => {
            let ack_or_ret = match serde_json::from_value::<ListRoomReq>(envelope.data) {
                Ok(req) => match hub.list_room(sid, &req.office_id, &req.req_id).await {
                    Ok(ret) => serde_json::to_value(ret).unwrap_or_default(),
                    Err(e) => serde_json::to_value(Ack::err(e.to_string())).unwrap_or_default(),
                },
                Err(e) => serde_json::to_value(Ack::err(format!("invalid list_room payload: {e}"))).unwrap_or_default(),
            };
            let mut response = Envelope::new(envelope.event, ack_or_ret);
            response.req_id = envelope.req_id;
            let _ = hub.send_direct(sid, response).await;
        }
        events::TOOL_CALL | events::GET_TOOLS | events::GET_CONFIG | events::GET_DESKTOP => {
            forward_client_event(hub, sid, envelope).await;
        }
        other => {
            warn!(sid, event = other, "unrecognized event");
        }
    }
}

async fn forward_client_event(hub: &Arc<Hub>, sid: &str, envelope: Envelope) {
    let computer_name = envelope.data.get("computer").and_then(|v| v.as_str()).map(str::to_string);
    let req_id = envelope.req_id.clone().unwrap_or_default();
    let timeout = envelope
        .data
        .get("timeout")
        .and_then(|v| v.as_f64())
        .map(std::time::Duration::from_secs_f64);

    let Some(computer_name) = computer_name else {
        warn!(sid, event = %envelope.event, "forwarded event missing 'computer' field");
        return;
    };

    match hub.forward_to_computer(sid, &computer_name, &envelope.event, &req_id, envelope.data.clone(), timeout).await {
        Ok(response) => {
            let _ = hub.send_direct(sid, response).await;
        }
        Err(e) => {
            warn!(sid, event = %envelope.event, error = %e, "forwarding failed");
            let error_envelope = Envelope::new(envelope.event, serde_json::json!({"error": e.to_string()})).with_req_id(req_id);
            let _ = hub.send_direct(sid, error_envelope).await;
        }
    }
}

async fn current_role(hub: &Arc<Hub>, sid: &str) -> Option<Role> {
    hub.session_role(sid).await
}

async fn reply(hub: &Arc<Hub>, sid: &str, event: &str, req_id: Option<String>, ack: Ack) {
    let mut envelope = Envelope::new(event, serde_json::to_value(ack).unwrap_or_default());
    envelope.req_id = req_id;
    let _ = hub.send_direct(sid, envelope).await;
}
