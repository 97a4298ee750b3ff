use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("call timed out")]
    Timeout,

    #[error("tool arguments must be a JSON object or null")]
    InvalidArguments,

    #[error("client is not connected (state: {0})")]
    NotConnected(String),

    #[error("client is already connected")]
    AlreadyConnected,
}
