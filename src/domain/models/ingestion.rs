#[cfg(test)]
#[path = "ingestion_test.rs"]
mod tests;

use serde::Deserialize;
use serde::Serialize;

/// How a raw job status label moves the monitor's state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusClass {
    Active,
    Succeeded,
    Failed,
}

impl StatusClass {
    /// Only the backend's two terminal labels end a watch. Anything else,
    /// including labels this client has never seen, keeps polling.
    pub fn of(label: &str) -> StatusClass {
        return match label {
            "completed" => StatusClass::Succeeded,
            "failed" => StatusClass::Failed,
            _ => StatusClass::Active,
        };
    }

    pub fn is_terminal(&self) -> bool {
        return *self != StatusClass::Active;
    }
}

/// Snapshot of an ingestion job as reported by the backend.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionStatus {
    #[serde(default)]
    pub step: String,
    #[serde(default)]
    pub logs: Vec<String>,
    pub status: String,
    #[serde(default)]
    pub error: Option<String>,
}

impl IngestionStatus {
    pub fn class(&self) -> StatusClass {
        return StatusClass::of(&self.status);
    }
}
