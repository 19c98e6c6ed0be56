// Debate sessions repository for the debate feedback store
// Handles session configuration, sync correlation and session teardown

use rusqlite::types::Value;
use rusqlite::Row;

use super::entity::{self, flag, int, opt_int, opt_text, read_timestamp, text, timestamp, Entity, Order, Predicate};
use super::models::{DebateSession, Student};
use super::notifier::{Observation, Table, TableSet};
use super::students_repo::replace_students_impl;
use super::DatabaseManager;
use crate::error::{Result, StoreError};

impl Entity for DebateSession {
    const TABLE: Table = Table::DebateSessions;
    const NAME: &'static str = "debate session";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "motion",
        "format",
        "student_level",
        "speech_time_seconds",
        "reply_time_seconds",
        "created_at",
        "is_guest_mode",
        "teacher_id",
        "class_id",
        "schedule_id",
        "backend_debate_id",
        "team_composition",
    ];

    fn id(&self) -> &str {
        &self.id
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(DebateSession {
            id: row.get("id")?,
            motion: row.get("motion")?,
            format: row.get("format")?,
            student_level: row.get("student_level")?,
            speech_time_seconds: row.get("speech_time_seconds")?,
            reply_time_seconds: row.get("reply_time_seconds")?,
            created_at: read_timestamp(row, "created_at")?,
            is_guest_mode: row.get("is_guest_mode")?,
            teacher_id: row.get("teacher_id")?,
            class_id: row.get("class_id")?,
            schedule_id: row.get("schedule_id")?,
            backend_debate_id: row.get("backend_debate_id")?,
            team_composition: row.get("team_composition")?,
        })
    }

    fn to_values(&self) -> Result<Vec<Value>> {
        let team_composition = match &self.team_composition {
            Some(composition) => Value::Text(serde_json::to_string(composition)?),
            None => Value::Null,
        };

        Ok(vec![
            text(&self.id),
            text(&self.motion),
            self.format.into(),
            self.student_level.into(),
            int(self.speech_time_seconds),
            opt_int(self.reply_time_seconds),
            timestamp(&self.created_at),
            flag(self.is_guest_mode),
            opt_text(&self.teacher_id),
            opt_text(&self.class_id),
            opt_text(&self.schedule_id),
            opt_text(&self.backend_debate_id),
            team_composition,
        ])
    }
}

fn sessions_newest_first(conn: &rusqlite::Connection) -> Result<Vec<DebateSession>> {
    entity::scan(conn, &Predicate::all(), Order::desc("created_at"))
}

impl DatabaseManager {
    /// Insert a session or replace the stored one with the same id
    pub fn upsert_session(&self, session: &DebateSession) -> Result<()> {
        self.with_transaction(|scope| scope.upsert(session))
    }

    /// Store a session together with its roster in one transaction
    pub fn save_session(&self, session: &DebateSession, students: &[Student]) -> Result<()> {
        self.with_transaction(|scope| {
            scope.upsert(session)?;
            replace_students_impl(scope, &session.id, students)
        })?;
        log::info!(
            "Saved debate session {} ({}, {} students)",
            session.id,
            session.format.display_name(),
            students.len()
        );
        Ok(())
    }

    /// Delete a session with its recordings and roster. Returns false when
    /// the session did not exist.
    pub fn delete_session(&self, id: &str) -> Result<bool> {
        let deleted = self.with_transaction(|scope| {
            let recordings = scope.delete_where(Table::SpeechRecordings, "debate_session_id", id)?;
            let students = scope.delete_where(Table::Students, "session_id", id)?;
            let sessions = scope.delete_by_id(Table::DebateSessions, id)?;
            log::debug!(
                "Deleting session {}: {} recordings, {} students",
                id,
                recordings,
                students
            );
            Ok(sessions > 0)
        })?;
        if deleted {
            log::info!("Deleted debate session {}", id);
        }
        Ok(deleted)
    }

    /// Record the backend id once remote sync has created the debate.
    ///
    /// Setting the same id again is a no-op. A session already linked to a
    /// different backend debate is left untouched.
    pub fn attach_backend_debate_id(&self, session_id: &str, backend_debate_id: &str) -> Result<DebateSession> {
        self.with_transaction(|scope| {
            let mut session: DebateSession = scope
                .get(session_id)?
                .ok_or_else(|| StoreError::not_found(DebateSession::NAME, session_id))?;

            match session.backend_debate_id.as_deref() {
                Some(existing) if existing == backend_debate_id => return Ok(session),
                Some(existing) => {
                    return Err(StoreError::InvalidTransition(format!(
                        "session {} is already linked to backend debate {}",
                        session_id, existing
                    )))
                }
                None => {}
            }

            session.backend_debate_id = Some(backend_debate_id.to_string());
            scope.update(&session)?;
            Ok(session)
        })
    }

    pub fn get_session(&self, id: &str) -> Result<Option<DebateSession>> {
        self.with_connection(|conn| entity::get(conn, id))
    }

    /// Every session, newest first
    pub fn list_sessions(&self) -> Result<Vec<DebateSession>> {
        self.with_connection(sessions_newest_first)
    }

    /// Live `list_sessions`: the current list, then a fresh one after every
    /// commit that changed a session
    pub fn observe_sessions(&self) -> Result<Observation<DebateSession>> {
        self.observe(TableSet::of(&[Table::DebateSessions]), sessions_newest_first)
    }
}
