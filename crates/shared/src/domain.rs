use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DecodeError;

/// Deployment state as reported by the server's deployment lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Up,
    Down,
    Running,
    Failed,
    Other(String),
}

impl DeploymentStatus {
    /// Reads the `state` field of a deployment document. The server encodes a failed
    /// deployment as `{"failed": <command>}`.
    pub fn from_deployment(deployment: &Value) -> Result<Self, DecodeError> {
        let state = deployment
            .get("state")
            .ok_or(DecodeError::MissingField("state"))?;
        Ok(Self::from_state(state))
    }

    pub fn from_state(state: &Value) -> Self {
        match state {
            Value::String(s) => match s.as_str() {
                "up" => Self::Up,
                "down" => Self::Down,
                "running" => Self::Running,
                "failed" => Self::Failed,
                other => Self::Other(other.to_string()),
            },
            Value::Object(map) if map.contains_key("failed") => Self::Failed,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => f.write_str("UP"),
            Self::Down => f.write_str("DOWN"),
            Self::Running => f.write_str("RUNNING"),
            Self::Failed => f.write_str("CMD FAILED"),
            Self::Other(raw) => f.write_str(raw),
        }
    }
}
