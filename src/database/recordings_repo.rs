// Speech recordings repository for the debate feedback store
// Handles recordings and their upload, transcription and feedback state

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, Row};

use super::entity::{self, int, opt_text, read_timestamp, text, timestamp, Entity, Order, Predicate};
use super::manager::WriteScope;
use super::models::{check_stored_transition, SpeechRecording, Stage, StageStatus};
use super::notifier::{Observation, Table, TableSet};
use super::DatabaseManager;
use crate::error::{Result, StoreError};

impl Entity for SpeechRecording {
    const TABLE: Table = Table::SpeechRecordings;
    const NAME: &'static str = "speech recording";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "speaker_name",
        "speaker_position",
        "student_id",
        "local_file_path",
        "duration_seconds",
        "recorded_at",
        "upload_status",
        "processing_status",
        "transcription_status",
        "feedback_status",
        "feedback_url",
        "speech_id",
        "feedback_content",
        "transcript_url",
        "transcript_text",
        "transcription_error_message",
        "feedback_error_message",
        "upload_progress",
        "debate_session_id",
    ];

    fn id(&self) -> &str {
        &self.id
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(SpeechRecording {
            id: row.get("id")?,
            speaker_name: row.get("speaker_name")?,
            speaker_position: row.get("speaker_position")?,
            student_id: row.get("student_id")?,
            local_file_path: row.get("local_file_path")?,
            duration_seconds: row.get("duration_seconds")?,
            recorded_at: read_timestamp(row, "recorded_at")?,
            upload_status: row.get("upload_status")?,
            processing_status: row.get("processing_status")?,
            transcription_status: row.get("transcription_status")?,
            feedback_status: row.get("feedback_status")?,
            feedback_url: row.get("feedback_url")?,
            speech_id: row.get("speech_id")?,
            feedback_content: row.get("feedback_content")?,
            transcript_url: row.get("transcript_url")?,
            transcript_text: row.get("transcript_text")?,
            transcription_error_message: row.get("transcription_error_message")?,
            feedback_error_message: row.get("feedback_error_message")?,
            upload_progress: row.get("upload_progress")?,
            debate_session_id: row.get("debate_session_id")?,
        })
    }

    fn to_values(&self) -> Result<Vec<Value>> {
        Ok(vec![
            text(&self.id),
            text(&self.speaker_name),
            text(&self.speaker_position),
            opt_text(&self.student_id),
            text(&self.local_file_path),
            int(self.duration_seconds),
            timestamp(&self.recorded_at),
            self.upload_status.into(),
            self.processing_status.into(),
            self.transcription_status.into(),
            self.feedback_status.into(),
            opt_text(&self.feedback_url),
            opt_text(&self.speech_id),
            opt_text(&self.feedback_content),
            opt_text(&self.transcript_url),
            opt_text(&self.transcript_text),
            opt_text(&self.transcription_error_message),
            opt_text(&self.feedback_error_message),
            Value::Real(self.upload_progress),
            text(&self.debate_session_id),
        ])
    }
}

fn recordings_for_session(conn: &Connection, session_id: &str) -> Result<Vec<SpeechRecording>> {
    entity::scan(
        conn,
        &Predicate::eq("debate_session_id", session_id.to_string()),
        Order::asc("recorded_at"),
    )
}

impl DatabaseManager {
    /// Insert a recording or replace the stored one with the same id
    pub fn upsert_recording(&self, recording: &SpeechRecording) -> Result<()> {
        self.with_transaction(|scope| upsert_recording_impl(scope, recording))
    }

    /// Insert or replace every recording in one transaction
    pub fn upsert_recordings(&self, recordings: &[SpeechRecording]) -> Result<()> {
        if recordings.is_empty() {
            return Ok(());
        }
        self.with_transaction(|scope| {
            for recording in recordings {
                upsert_recording_impl(scope, recording)?;
            }
            Ok(())
        })
    }

    /// Full-row replace of an existing recording. `NotFound` when absent.
    pub fn update_recording(&self, recording: &SpeechRecording) -> Result<()> {
        self.with_transaction(|scope| {
            let previous: SpeechRecording = scope
                .get(&recording.id)?
                .ok_or_else(|| StoreError::not_found(SpeechRecording::NAME, recording.id.as_str()))?;
            check_transitions(&previous, recording)?;
            let recording = prepare_write(recording);
            check_recording(scope, &recording)?;
            scope.update(&recording)
        })
    }

    /// Delete a recording by id. Absent recordings are a no-op.
    pub fn delete_recording(&self, recording: &SpeechRecording) -> Result<()> {
        let deleted = self.with_transaction(|scope| scope.delete_by_id(Table::SpeechRecordings, &recording.id))?;
        if deleted == 0 {
            log::debug!("Recording {} already deleted", recording.id);
        }
        Ok(())
    }

    /// Swap the recordings of a session for `recordings` in one transaction
    pub fn replace_recordings(&self, session_id: &str, recordings: &[SpeechRecording]) -> Result<()> {
        self.with_transaction(|scope| replace_recordings_impl(scope, session_id, recordings))
    }

    pub fn delete_recordings(&self, session_id: &str) -> Result<usize> {
        self.with_transaction(|scope| scope.delete_where(Table::SpeechRecordings, "debate_session_id", session_id))
    }

    /// Recordings of a session in speaking order
    pub fn get_recordings(&self, session_id: &str) -> Result<Vec<SpeechRecording>> {
        self.with_connection(|conn| recordings_for_session(conn, session_id))
    }

    pub fn get_recording(&self, id: &str) -> Result<Option<SpeechRecording>> {
        self.with_connection(|conn| entity::get(conn, id))
    }

    /// Recordings whose upload has not started or has failed, oldest first
    pub fn pending_uploads(&self) -> Result<Vec<SpeechRecording>> {
        self.with_connection(|conn| {
            entity::scan(
                conn,
                &Predicate::any_of(
                    "upload_status",
                    vec![StageStatus::Pending.into(), StageStatus::Failed.into()],
                ),
                Order::asc("recorded_at"),
            )
        })
    }

    /// Recordings made strictly before `cutoff`, oldest first. Used to find
    /// local audio past its retention window.
    pub fn recordings_recorded_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<SpeechRecording>> {
        self.with_connection(|conn| {
            entity::scan(
                conn,
                &Predicate::less_than("recorded_at", timestamp(&cutoff)),
                Order::asc("recorded_at"),
            )
        })
    }

    /// Live `get_recordings`: the current list, then a fresh one after every
    /// commit that changed a recording
    pub fn observe_recordings(&self, session_id: &str) -> Result<Observation<SpeechRecording>> {
        let session_id = session_id.to_string();
        self.observe(TableSet::of(&[Table::SpeechRecordings]), move |conn: &Connection| {
            recordings_for_session(conn, &session_id)
        })
    }
}

/// Status writes may not regress a completed stage straight back to pending
fn check_transitions(previous: &SpeechRecording, next: &SpeechRecording) -> Result<()> {
    for stage in Stage::ALL {
        check_stored_transition(stage, previous.status(stage), next.status(stage))?;
    }
    Ok(())
}

/// Row as it will be stored. Error messages only survive on failed stages,
/// so a retry that still carries the last failure writes them as cleared.
fn prepare_write(recording: &SpeechRecording) -> SpeechRecording {
    let mut row = recording.clone();
    row.clear_stale_errors();
    row
}

/// Field invariants plus the owning session reference
fn check_recording(scope: &WriteScope<'_>, recording: &SpeechRecording) -> Result<()> {
    recording.validate()?;
    if !scope.exists(Table::DebateSessions, &recording.debate_session_id)? {
        return Err(StoreError::Constraint(format!(
            "recording {} references missing debate session {}",
            recording.id, recording.debate_session_id
        )));
    }
    Ok(())
}

pub(crate) fn upsert_recording_impl(scope: &mut WriteScope<'_>, recording: &SpeechRecording) -> Result<()> {
    if let Some(previous) = scope.get::<SpeechRecording>(&recording.id)? {
        check_transitions(&previous, recording)?;
    }
    let recording = prepare_write(recording);
    check_recording(scope, &recording)?;
    scope.upsert(&recording)
}

pub(crate) fn replace_recordings_impl(
    scope: &mut WriteScope<'_>,
    session_id: &str,
    recordings: &[SpeechRecording],
) -> Result<()> {
    // Transition checks need the rows that are about to be deleted
    for recording in recordings {
        if let Some(previous) = scope.get::<SpeechRecording>(&recording.id)? {
            check_transitions(&previous, recording)?;
        }
    }

    let removed = scope.delete_where(Table::SpeechRecordings, "debate_session_id", session_id)?;

    for recording in recordings {
        if recording.debate_session_id != session_id {
            return Err(StoreError::Constraint(format!(
                "recording {} does not belong to session {}",
                recording.id, session_id
            )));
        }
        upsert_recording_impl(scope, recording)?;
    }

    log::debug!(
        "Replaced recordings of session {}: {} removed, {} inserted",
        session_id,
        removed,
        recordings.len()
    );
    Ok(())
}
