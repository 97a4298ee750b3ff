//! Exercises `AgentClient::join_office`/`leave_office` against a minimal
//! in-process mock hub that just echoes back an `Ack`.

use std::sync::Arc;

use futures::SinkExt;
use futures::StreamExt;
use smcp_agent::AgentClient;
use smcp_agent::NullHandlers;
use smcp_protocol::Ack;
use smcp_protocol::Envelope;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

async fn spawn_mock_hub() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = tokio_tungstenite::accept_async(stream).await.expect("handshake");
        while let Some(Ok(Message::Text(text))) = ws.next().await {
            let envelope: Envelope = serde_json::from_str(&text).expect("valid envelope");
            let mut reply = Envelope::new(envelope.event, serde_json::to_value(Ack::ok()).expect("ack"));
            reply.req_id = envelope.req_id;
            let text = serde_json::to_string(&reply).expect("serialize reply");
            if ws.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    format!("ws://{addr}")
}

#[tokio::test]
async fn join_then_leave_office_round_trips_through_the_wire() {
    let url = spawn_mock_hub().await;
    let client = AgentClient::connect_to_server(&url, Arc::new(NullHandlers)).await.expect("connect");

    client.join_office("room1", "robot-A").await.expect("join");
    assert_eq!(client.office_id().await.as_deref(), Some("room1"));
    assert_eq!(client.name().await.as_deref(), Some("robot-A"));

    client.leave_office("room1").await.expect("leave");
    assert_eq!(client.office_id().await, None);
}
