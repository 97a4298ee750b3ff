use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("not connected to a signaling hub")]
    NotConnected,
    #[error("already connected to a signaling hub")]
    AlreadyConnected,
    #[error("remote call failed: {0}")]
    Rpc(String),
    #[error("call timed out")]
    Timeout,
    #[error(transparent)]
    Direction(#[from] smcp_protocol::DirectionError),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}
