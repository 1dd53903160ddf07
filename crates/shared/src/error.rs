use thiserror::Error;

/// Failures decoding messages received from the testbed server.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected a json object")]
    NotAnObject,
    #[error("missing field `{0}`")]
    MissingField(&'static str),
}
