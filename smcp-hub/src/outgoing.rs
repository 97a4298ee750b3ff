//! Per-connection outbound channel and request/response correlation for
//! point-to-point forwarding, adapted from the request-id-keyed callback
//! table pattern used for the out-of-band JSON-RPC channel in MCP servers:
//! a request gets a generated id, a oneshot sits in a table keyed by that
//! id, and the matching response drains and fulfills it.

use std::collections::HashMap;

use smcp_protocol::Envelope;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::sync::Mutex;
use tracing::warn;

pub type OutgoingTx = mpsc::UnboundedSender<Envelope>;

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
        if !self.resolve_if_present(req_id, response).await {
            warn!(req_id, "no pending caller for response");
        }
    }

    /// Resolves `req_id` if a caller is waiting on it, reporting whether one
    /// was found. Lets a dispatcher tell a reply to an outstanding forward
    /// apart from a fresh request carrying the same event name.
    pub async fn resolve_if_present(&self, req_id: &str, response: Envelope) -> bool {
        match self.table.lock().await.remove(req_id) {
            Some(tx) => {
                if tx.send(response).is_err() {
                    warn!(req_id, "caller for request no longer listening");
                }
                true
            }
            None => false,
        }
    }

    pub async fn cancel(&self, req_id: &str) {
        self.table.lock().await.remove(req_id);
    }
}
