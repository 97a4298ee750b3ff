//! Office (room) membership bookkeeping: which `sid`s are in which office.

use std::collections::HashMap;
use std::collections::HashSet;

use tokio::sync::RwLock;

#[derive(Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, HashSet<String>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn join(&self, office_id: &str, sid: &str) {
        self.rooms.write().await.entry(office_id.to_string()).or_default().insert(sid.to_string());
    }

    pub async fn leave(&self, office_id: &str, sid: &str) {
        let mut rooms = self.rooms.write().await;
        if let Some(members) = rooms.get_mut(office_id) {
            members.remove(sid);
            if members.is_empty() {
                rooms.remove(office_id);
            }
        }
    }

    /// Every `sid` currently in `office_id`, excluding `sid` itself if it is
    /// already a member (used for pre-join duplicate checks before the
    /// connecting sid has actually joined).
    pub async fn participants(&self, office_id: &str) -> Vec<String> {
        self.rooms.read().await.get(office_id).map(|m| m.iter().cloned().collect()).unwrap_or_default()
    }
}
