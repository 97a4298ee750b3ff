//! Errors surfaced by room join/leave and point-to-point forwarding.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HubError {
    #[error("Role mismatch: session already registered as '{existing}', cannot rejoin as '{attempted}'")]
    RoleMismatch { existing: String, attempted: String },

    #[error("agent is already in office '{0}'")]
    AgentAlreadyInOtherOffice(String),

    #[error("office '{0}' already has an agent")]
    AgentAlreadyPresent(String),

    #[error("Computer with name '{name}' already exists in room '{office_id}'")]
    ComputerNameConflict { name: String, office_id: String },

    #[error("unknown session '{0}'")]
    UnknownSession(String),

    #[error("session '{0}' has not joined any office")]
    NotInOffice(String),

    #[error("only an agent may query a room, and only its own")]
    ListRoomPermissionDenied,

    #[error("only an agent may perform this action")]
    AgentOnly,

    #[error("only a computer may perform this action")]
    ComputerOnly,

    #[error("no computer named '{0}' is present in the office")]
    ComputerNotFound(String),

    #[error("request '{0}' timed out waiting for a response")]
    Timeout(String),

    #[error("connection for session '{0}' is gone")]
    ConnectionGone(String),
}
