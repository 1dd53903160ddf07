use thiserror::Error;

use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("a command session is already active")]
    SessionBusy,
    #[error("no command is executing")]
    NothingToCancel,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("failed to serialize command request: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum StateQueryError {
    #[error("deployment state request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid deployment lookup url: {0}")]
    Url(#[from] url::ParseError),
    #[error("server url `{0}` cannot carry a path")]
    CannotBeABase(String),
    #[error("unexpected deployment document: {0}")]
    Decode(#[from] shared::error::DecodeError),
    #[error("deployment state lookup is not configured")]
    Unavailable,
}
