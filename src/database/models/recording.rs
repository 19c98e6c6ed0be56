// Database models - Speech recording
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::now_millis;
use super::status::{check_step, Stage, StageStatus};
use crate::error::{Result, StoreError};

/// One recorded speech and the state of its upload, transcription and feedback stages
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpeechRecording {
    pub id: String,
    pub speaker_name: String,
    pub speaker_position: String,
    #[serde(default)]
    pub student_id: Option<String>,
    /// Audio file owned by the recording subsystem; only the path is stored
    pub local_file_path: String,
    pub duration_seconds: u32,
    /// Persisted at millisecond precision. Finer digits are truncated on write.
    pub recorded_at: DateTime<Utc>,
    pub upload_status: StageStatus,
    pub processing_status: StageStatus,
    pub transcription_status: StageStatus,
    pub feedback_status: StageStatus,
    pub feedback_url: Option<String>,
    /// Backend speech id used to poll transcription and feedback
    pub speech_id: Option<String>,
    pub feedback_content: Option<String>,
    pub transcript_url: Option<String>,
    pub transcript_text: Option<String>,
    pub transcription_error_message: Option<String>,
    pub feedback_error_message: Option<String>,
    pub upload_progress: f64,
    pub debate_session_id: String,
}

impl SpeechRecording {
    /// A freshly recorded speech with every stage pending
    pub fn new(
        debate_session_id: &str,
        speaker_name: &str,
        speaker_position: &str,
        local_file_path: &str,
        duration_seconds: u32,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            speaker_name: speaker_name.to_string(),
            speaker_position: speaker_position.to_string(),
            student_id: None,
            local_file_path: local_file_path.to_string(),
            duration_seconds,
            recorded_at: now_millis(),
            upload_status: StageStatus::Pending,
            processing_status: StageStatus::Pending,
            transcription_status: StageStatus::Pending,
            feedback_status: StageStatus::Pending,
            feedback_url: None,
            speech_id: None,
            feedback_content: None,
            transcript_url: None,
            transcript_text: None,
            transcription_error_message: None,
            feedback_error_message: None,
            upload_progress: 0.0,
            debate_session_id: debate_session_id.to_string(),
        }
    }

    pub fn status(&self, stage: Stage) -> StageStatus {
        match stage {
            Stage::Upload => self.upload_status,
            Stage::Processing => self.processing_status,
            Stage::Transcription => self.transcription_status,
            Stage::Feedback => self.feedback_status,
        }
    }

    fn status_mut(&mut self, stage: Stage) -> &mut StageStatus {
        match stage {
            Stage::Upload => &mut self.upload_status,
            Stage::Processing => &mut self.processing_status,
            Stage::Transcription => &mut self.transcription_status,
            Stage::Feedback => &mut self.feedback_status,
        }
    }

    fn error_slot(&mut self, stage: Stage) -> Option<&mut Option<String>> {
        match stage {
            Stage::Transcription => Some(&mut self.transcription_error_message),
            Stage::Feedback => Some(&mut self.feedback_error_message),
            Stage::Upload | Stage::Processing => None,
        }
    }

    fn step(&mut self, stage: Stage, next: StageStatus) -> Result<()> {
        check_step(stage, self.status(stage), next)?;
        *self.status_mut(stage) = next;
        Ok(())
    }

    /// Enter `InProgress` (first attempt or retry). Clears the stage error.
    pub fn begin_stage(&mut self, stage: Stage) -> Result<()> {
        self.step(stage, StageStatus::InProgress)?;
        if let Some(slot) = self.error_slot(stage) {
            *slot = None;
        }
        if stage == Stage::Upload {
            self.upload_progress = 0.0;
        }
        Ok(())
    }

    pub fn complete_stage(&mut self, stage: Stage) -> Result<()> {
        self.step(stage, StageStatus::Completed)?;
        if stage == Stage::Upload {
            self.upload_progress = 1.0;
        }
        Ok(())
    }

    /// Enter `Failed`, recording the error for stages that carry one
    pub fn fail_stage(&mut self, stage: Stage, message: &str) -> Result<()> {
        self.step(stage, StageStatus::Failed)?;
        if let Some(slot) = self.error_slot(stage) {
            *slot = Some(message.to_string());
        }
        Ok(())
    }

    /// Update upload progress. Only legal while the upload is in progress.
    pub fn set_upload_progress(&mut self, progress: f64) -> Result<()> {
        if self.upload_status != StageStatus::InProgress {
            return Err(StoreError::InvalidTransition(format!(
                "upload progress can only change while uploading (status is {})",
                self.upload_status.as_str()
            )));
        }
        check_progress(progress)?;
        self.upload_progress = progress;
        Ok(())
    }

    /// Status that tracks the slowest of transcription and feedback
    pub fn aggregated_status(&self) -> StageStatus {
        use StageStatus::*;
        if self.feedback_status == Failed || self.transcription_status == Failed {
            Failed
        } else if self.feedback_status == Completed {
            Completed
        } else if self.feedback_status == InProgress
            || self.transcription_status == Completed
            || self.transcription_status == InProgress
        {
            InProgress
        } else {
            Pending
        }
    }

    pub fn refresh_processing_status(&mut self) {
        self.processing_status = self.aggregated_status();
    }

    /// Human readable reason for a failed transcription or feedback stage
    pub fn failure_details(&self) -> Option<String> {
        if self.transcription_status == StageStatus::Failed {
            return Some(
                self.transcription_error_message
                    .clone()
                    .unwrap_or_else(|| "Transcription failed".to_string()),
            );
        }
        if self.feedback_status == StageStatus::Failed {
            return Some(
                self.feedback_error_message
                    .clone()
                    .unwrap_or_else(|| "Feedback generation failed".to_string()),
            );
        }
        None
    }

    /// Drop error messages left on stages that are no longer `Failed`.
    /// Applied to every recording before it is written.
    pub(crate) fn clear_stale_errors(&mut self) {
        if self.transcription_status != StageStatus::Failed {
            self.transcription_error_message = None;
        }
        if self.feedback_status != StageStatus::Failed {
            self.feedback_error_message = None;
        }
    }

    /// Field-level invariants checked on every write
    pub(crate) fn validate(&self) -> Result<()> {
        check_progress(self.upload_progress)
    }
}

fn check_progress(progress: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&progress) {
        return Err(StoreError::InvalidTransition(format!(
            "upload progress {} outside [0, 1]",
            progress
        )));
    }
    Ok(())
}
