//! Request/response correlation for the Computer socket's own `server:*`
//! calls (`join_office`, `leave_office`), mirroring the same oneshot-keyed-
//! by-id table used on the hub and agent sides of the wire.

use std::collections::HashMap;

use smcp_protocol::Envelope;
use tokio::sync::oneshot;
use tokio::sync::Mutex;

#[derive(Default)]
pub struct PendingRequests {
    table: Mutex<HashMap<String, oneshot::Sender<Envelope>>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, req_id: String) -> oneshot::Receiver<Envelope> {
        let (tx, rx) = oneshot::channel();
        self.table.lock().await.insert(req_id, tx);
        rx
    }

    /// Resolves `req_id` if a caller is waiting on it, returning whether one
    /// was found. A miss isn't an error here: it just means the envelope is
    /// an inbound request for us to answer, not a response to our own call.
    pub async fn resolve_if_present(&self, req_id: &str, response: Envelope) -> bool {
        match self.table.lock().await.remove(req_id) {
            Some(tx) => {
                let _ = tx.send(response);
                true
            }
            None => false,
        }
    }

    pub async fn cancel(&self, req_id: &str) {
        self.table.lock().await.remove(req_id);
    }
}
