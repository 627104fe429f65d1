use serde::{Deserialize, Serialize};

/// Coarse job phase, ordered by progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Starting,
    Loading,
    Processing,
    Converting,
    Complete,
    Error,
    Cancelled,
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Complete | Stage::Error | Stage::Cancelled)
    }

    /// Position in the happy path; terminal failures sort last.
    pub fn rank(&self) -> u8 {
        match self {
            Stage::Starting => 0,
            Stage::Loading => 1,
            Stage::Processing => 2,
            Stage::Converting => 3,
            Stage::Complete | Stage::Error | Stage::Cancelled => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressState {
    pub stage: Stage,
    pub percent: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl ProgressState {
    pub fn starting() -> Self {
        Self { stage: Stage::Starting, percent: 0, message: "Job accepted".into(), result: None }
    }
}
