// Students repository for the debate feedback store
// Session rosters, replaced as a whole when re-synced

use rusqlite::types::Value;
use rusqlite::Row;

use super::entity::{self, opt_text, read_timestamp, text, timestamp, Entity, Order, Predicate};
use super::manager::WriteScope;
use super::models::Student;
use super::notifier::Table;
use super::DatabaseManager;
use crate::error::{Result, StoreError};

impl Entity for Student {
    const TABLE: Table = Table::Students;
    const NAME: &'static str = "student";
    const COLUMNS: &'static [&'static str] = &["id", "name", "level", "created_at", "session_id"];

    fn id(&self) -> &str {
        &self.id
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Student {
            id: row.get("id")?,
            name: row.get("name")?,
            level: row.get("level")?,
            created_at: read_timestamp(row, "created_at")?,
            session_id: row.get("session_id")?,
        })
    }

    fn to_values(&self) -> Result<Vec<Value>> {
        Ok(vec![
            text(&self.id),
            text(&self.name),
            self.level.into(),
            timestamp(&self.created_at),
            opt_text(&self.session_id),
        ])
    }
}

impl DatabaseManager {
    /// Insert or replace every student in one transaction. Empty input is a no-op.
    pub fn upsert_students(&self, students: &[Student]) -> Result<()> {
        if students.is_empty() {
            return Ok(());
        }
        self.with_transaction(|scope| upsert_students_impl(scope, students))
    }

    /// Swap the roster of a session for `students` in one transaction.
    /// Readers see either the old roster or the new one, never an empty gap.
    pub fn replace_students(&self, session_id: &str, students: &[Student]) -> Result<()> {
        self.with_transaction(|scope| replace_students_impl(scope, session_id, students))
    }

    pub fn delete_students_for_session(&self, session_id: &str) -> Result<usize> {
        self.with_transaction(|scope| scope.delete_where(Table::Students, "session_id", session_id))
    }

    /// Roster of a session, oldest first
    pub fn get_students_for_session(&self, session_id: &str) -> Result<Vec<Student>> {
        self.with_connection(|conn| {
            entity::scan(
                conn,
                &Predicate::eq("session_id", session_id.to_string()),
                Order::asc("created_at"),
            )
        })
    }
}

pub(crate) fn upsert_students_impl(scope: &mut WriteScope<'_>, students: &[Student]) -> Result<()> {
    for student in students {
        if let Some(session_id) = &student.session_id {
            if !scope.exists(Table::DebateSessions, session_id)? {
                return Err(StoreError::Constraint(format!(
                    "student {} references missing debate session {}",
                    student.id, session_id
                )));
            }
        }
        scope.upsert(student)?;
    }
    Ok(())
}

pub(crate) fn replace_students_impl(
    scope: &mut WriteScope<'_>,
    session_id: &str,
    students: &[Student],
) -> Result<()> {
    let removed = scope.delete_where(Table::Students, "session_id", session_id)?;

    for student in students {
        if student.session_id.as_deref() != Some(session_id) {
            return Err(StoreError::Constraint(format!(
                "student {} does not belong to session {}",
                student.id, session_id
            )));
        }
    }
    upsert_students_impl(scope, students)?;

    log::debug!(
        "Replaced roster of session {}: {} removed, {} inserted",
        session_id,
        removed,
        students.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{DebateFormat, DebateSession, StudentLevel};
    use chrono::Duration;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    fn create_test_db() -> (TempDir, DatabaseManager) {
        let dir = tempdir().unwrap();
        let db = DatabaseManager::new(dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    fn create_session(db: &DatabaseManager) -> DebateSession {
        let session = DebateSession::new("This house would ban homework", DebateFormat::Wsdc, StudentLevel::Secondary);
        db.upsert_session(&session).unwrap();
        session
    }

    /// Students with strictly increasing creation times
    fn roster(session_id: &str, names: &[&str]) -> Vec<Student> {
        let mut students: Vec<Student> = names
            .iter()
            .map(|name| Student::new(name, StudentLevel::Secondary, Some(session_id)))
            .collect();
        let base = students[0].created_at;
        for (i, student) in students.iter_mut().enumerate() {
            student.created_at = base + Duration::milliseconds(i as i64);
        }
        students
    }

    fn names(students: &[Student]) -> Vec<String> {
        students.iter().map(|s| s.name.clone()).collect()
    }

    #[test]
    fn test_replace_students_scenario() {
        let (_dir, db) = create_test_db();
        let session = create_session(&db);

        db.replace_students(&session.id, &roster(&session.id, &["Alice", "Bob"]))
            .unwrap();
        assert_eq!(names(&db.get_students_for_session(&session.id).unwrap()), vec!["Alice", "Bob"]);

        db.replace_students(&session.id, &roster(&session.id, &["Carol"]))
            .unwrap();
        assert_eq!(names(&db.get_students_for_session(&session.id).unwrap()), vec!["Carol"]);
    }

    #[test]
    fn test_replace_with_empty_list_is_idempotent() {
        let (_dir, db) = create_test_db();
        let session = create_session(&db);
        db.replace_students(&session.id, &roster(&session.id, &["Alice"]))
            .unwrap();

        db.replace_students(&session.id, &[]).unwrap();
        assert!(db.get_students_for_session(&session.id).unwrap().is_empty());
        db.replace_students(&session.id, &[]).unwrap();
        assert!(db.get_students_for_session(&session.id).unwrap().is_empty());
    }

    #[test]
    fn test_upsert_students_empty_is_noop() {
        let (_dir, db) = create_test_db();
        db.upsert_students(&[]).unwrap();
    }

    #[test]
    fn test_student_without_session() {
        let (_dir, db) = create_test_db();
        let student = Student::new("Dana", StudentLevel::Primary, None);
        db.upsert_students(std::slice::from_ref(&student)).unwrap();

        let stored = db
            .with_connection(|conn| entity::get::<Student>(conn, &student.id))
            .unwrap()
            .unwrap();
        assert_eq!(stored, student);
    }

    #[test]
    fn test_dangling_session_is_rejected() {
        let (_dir, db) = create_test_db();
        let session = create_session(&db);
        let ghost = Student::new("Ghost", StudentLevel::Secondary, Some("no-such-session"));
        let ok = Student::new("Eve", StudentLevel::Secondary, Some(&session.id));

        let err = db.upsert_students(&[ok, ghost]).unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
        // The valid row was rolled back with the invalid one
        assert!(db.get_students_for_session(&session.id).unwrap().is_empty());
    }

    #[test]
    fn test_failed_replace_keeps_old_roster() {
        let (_dir, db) = create_test_db();
        let session = create_session(&db);
        let other = create_session(&db);
        db.replace_students(&session.id, &roster(&session.id, &["Alice", "Bob"]))
            .unwrap();

        // A row scoped to another session fails after the delete ran
        let mut new_roster = roster(&session.id, &["Carol"]);
        new_roster.extend(roster(&other.id, &["Mallory"]));
        assert!(db.replace_students(&session.id, &new_roster).is_err());

        assert_eq!(names(&db.get_students_for_session(&session.id).unwrap()), vec!["Alice", "Bob"]);
    }

    #[test]
    fn test_reader_never_sees_empty_roster() {
        let (_dir, db) = create_test_db();
        let db = Arc::new(db);
        let session = create_session(&db);
        db.replace_students(&session.id, &roster(&session.id, &["Alice", "Bob"]))
            .unwrap();

        let done = Arc::new(AtomicBool::new(false));
        let reader = {
            let db = Arc::clone(&db);
            let done = Arc::clone(&done);
            let session_id = session.id.clone();
            std::thread::spawn(move || {
                let mut reads = 0;
                loop {
                    let students = db.get_students_for_session(&session_id).unwrap();
                    assert!(!students.is_empty(), "observed an empty roster");
                    reads += 1;
                    if done.load(Ordering::SeqCst) {
                        break reads;
                    }
                }
            })
        };

        for round in 0..50 {
            let name = format!("Student {}", round);
            db.replace_students(&session.id, &roster(&session.id, &[name.as_str(), "Bob"]))
                .unwrap();
        }
        done.store(true, Ordering::SeqCst);
        assert!(reader.join().unwrap() > 0);
    }
}
