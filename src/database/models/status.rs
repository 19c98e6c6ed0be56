// Database models - Pipeline stage status
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// State of one pipeline stage of a speech recording.
///
/// Every stage runs the same machine: `Pending -> InProgress -> {Completed, Failed}`,
/// with `Failed -> InProgress` allowed for retries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::InProgress => "in_progress",
            StageStatus::Completed => "completed",
            StageStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(StageStatus::Pending),
            "in_progress" => Some(StageStatus::InProgress),
            "completed" => Some(StageStatus::Completed),
            "failed" => Some(StageStatus::Failed),
            _ => None,
        }
    }

    /// Map a status string reported by the backend. Unknown values are pending.
    pub fn from_api(status: &str) -> Self {
        match status.trim().to_lowercase().as_str() {
            "processing" | "running" | "in_progress" | "uploading" => StageStatus::InProgress,
            "complete" | "completed" | "done" | "uploaded" => StageStatus::Completed,
            "failed" | "error" => StageStatus::Failed,
            _ => StageStatus::Pending,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            StageStatus::Pending => "Pending",
            StageStatus::InProgress => "In progress...",
            StageStatus::Completed => "Complete",
            StageStatus::Failed => "Failed",
        }
    }

    pub fn is_complete(&self) -> bool {
        *self == StageStatus::Completed
    }

    /// Full state machine used by the record-level stage helpers.
    /// Staying in the same state is always allowed.
    pub fn can_transition_to(&self, next: StageStatus) -> bool {
        use StageStatus::*;
        matches!(
            (*self, next),
            (Pending, Pending)
                | (InProgress, InProgress)
                | (Completed, Completed)
                | (Failed, Failed)
                | (Pending, InProgress)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (Failed, InProgress)
        )
    }
}

sql_text_enum!(StageStatus);

/// The independently tracked stages of a recording
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Upload,
    Processing,
    Transcription,
    Feedback,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Upload,
        Stage::Processing,
        Stage::Transcription,
        Stage::Feedback,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Upload => "upload",
            Stage::Processing => "processing",
            Stage::Transcription => "transcription",
            Stage::Feedback => "feedback",
        }
    }
}

/// Check a status write against the previously stored value.
///
/// The orchestrator owns the full state machine; the store only refuses a
/// direct regression from `Completed` back to `Pending`.
pub fn check_stored_transition(stage: Stage, from: StageStatus, to: StageStatus) -> Result<()> {
    if from == StageStatus::Completed && to == StageStatus::Pending {
        return Err(StoreError::InvalidTransition(format!(
            "{} status cannot regress from completed to pending",
            stage.as_str()
        )));
    }
    Ok(())
}

/// Check a state-machine step requested through the record helpers
pub fn check_step(stage: Stage, from: StageStatus, to: StageStatus) -> Result<()> {
    if !from.can_transition_to(to) {
        return Err(StoreError::InvalidTransition(format!(
            "{} status cannot move from {} to {}",
            stage.as_str(),
            from.as_str(),
            to.as_str()
        )));
    }
    Ok(())
}
