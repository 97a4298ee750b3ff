//! Request/response correlation for outgoing calls, mirroring the hub's own
//! oneshot-keyed-by-id table so both sides of the wire use the same pattern.

use std::collections::HashMap;

use smcp_protocol::Envelope;
use tokio::sync::oneshot;
use tokio::sync::Mutex;
use tracing::warn;

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

    pub async fn resolve(&self, req_id: &str, response: Envelope) {
        match self.table.lock().await.remove(req_id) {
            Some(tx) => {
                if tx.send(response).is_err() {
                    warn!(req_id, "caller for response no longer listening");
                }
            }
            None => warn!(req_id, "no pending caller for response"),
        }
    }

    pub async fn cancel(&self, req_id: &str) {
        self.table.lock().await.remove(req_id);
    }
}
