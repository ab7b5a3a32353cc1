//! Failure-handling policy selected per chat by the transport layer

use serde::{Deserialize, Serialize};

/// How the manager reacts when the engine runs out of memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Evict the oldest turns and retry.
    Window,
    /// Keep the full history and fail on exhaustion.
    Inline,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Window => "window",
            Mode::Inline => "inline",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "window" => Some(Mode::Window),
            "inline" => Some(Mode::Inline),
            _ => None,
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
