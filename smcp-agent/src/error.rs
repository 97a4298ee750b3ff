use smcp_protocol::DirectionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Direction(#[from] DirectionError),

    #[error("request timed out")]
    Timeout,

    #[error("not connected to a hub")]
    NotConnected,

    #[error("hub returned an error: {0}")]
    Rpc(String),

    #[error("malformed payload: {0}")]
    Serde(#[from] serde_json::Error),
}
