//! Per-connection session state: the role/name/office a `sid` has registered
//! under. Role is fixed at the first successful join and never changes.

use std::collections::HashMap;

use smcp_protocol::Role;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct SessionState {
    pub sid: String,
    pub role: Option<Role>,
    pub name: Option<String>,
    pub office_id: Option<String>,
}

impl SessionState {
    fn new(sid: impl Into<String>) -> Self {
        Self { sid: sid.into(), role: None, name: None, office_id: None }
    }
}

/// Registry of live sessions, plus a name index scoped per office used to
/// resolve a Computer's name to its `sid` for point-to-point forwarding.
/// Computer names are only unique within the office they were registered in
/// (the per-room uniqueness check happens at join time in
/// [`crate::hub::Hub::join_office`]), so the same name may legitimately
/// resolve to different sids in different offices — the index is keyed on
/// `(office_id, name)` rather than `name` alone to keep that scoping.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionState>>,
    name_index: RwLock<HashMap<(String, String), String>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_create(&self, sid: &str) -> SessionState {
        let mut sessions = self.sessions.write().await;
        sessions.entry(sid.to_string()).or_insert_with(|| SessionState::new(sid)).clone()
    }

    pub async fn get(&self, sid: &str) -> Option<SessionState> {
        self.sessions.read().await.get(sid).cloned()
    }

    pub async fn save(&self, session: SessionState) {
        if let (Some(name), Some(office_id)) = (session.name.clone(), session.office_id.clone()) {
            self.name_index.write().await.insert((office_id, name), session.sid.clone());
        }
        self.sessions.write().await.insert(session.sid.clone(), session);
    }

    /// Resolves a Computer's `sid` by name, scoped to `office_id` so a
    /// same-named Computer registered in a different office is never
    /// returned.
    pub async fn sid_for_name(&self, office_id: &str, name: &str) -> Option<String> {
        self.name_index.read().await.get(&(office_id.to_string(), name.to_string())).cloned()
    }

    pub async fn remove(&self, sid: &str) -> Option<SessionState> {
        let removed = self.sessions.write().await.remove(sid);
        if let Some(session) = &removed {
            if let (Some(name), Some(office_id)) = (&session.name, &session.office_id) {
                let mut index = self.name_index.write().await;
                let key = (office_id.clone(), name.clone());
                if index.get(&key).map(|s| s.as_str()) == Some(sid) {
                    index.remove(&key);
                }
            }
        }
        removed
    }
}
