use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Lifecycle state of an operation instance, and the `state` field of every
/// response envelope. Progression is forward-only:
/// `accepted → pending → {complete, error}`, plus `accepted → error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OpState {
    Accepted,
    Pending,
    Complete,
    Error,
}

impl OpState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpState::Accepted => "accepted",
            OpState::Pending => "pending",
            OpState::Complete => "complete",
            OpState::Error => "error",
        }
    }

    /// Position in the forward order. `complete` and `error` share a rank:
    /// both are terminal and neither precedes the other.
    pub fn rank(&self) -> u8 {
        match self {
            OpState::Accepted => 0,
            OpState::Pending => 1,
            OpState::Complete | OpState::Error => 2,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OpState::Complete | OpState::Error)
    }
}

impl std::str::FromStr for OpState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accepted" => Ok(OpState::Accepted),
            "pending" => Ok(OpState::Pending),
            "complete" => Ok(OpState::Complete),
            "error" => Ok(OpState::Error),
            other => Err(format!("unknown operation state {other:?}")),
        }
    }
}

impl std::fmt::Display for OpState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
