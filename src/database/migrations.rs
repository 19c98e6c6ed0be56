// Database migrations for the debate feedback store
// Creates the schema and refuses to open files laid out by another build

use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};

use crate::error::{Result, StoreError};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

const SCHEMA_V1: &str = r#"
    -- Teachers registered on this device
    CREATE TABLE IF NOT EXISTS teachers (
        id TEXT PRIMARY KEY NOT NULL,
        name TEXT NOT NULL,
        device_id TEXT NOT NULL,
        auth_token TEXT,
        is_admin INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL
    );

    -- Configured debates
    CREATE TABLE IF NOT EXISTS debate_sessions (
        id TEXT PRIMARY KEY NOT NULL,
        motion TEXT NOT NULL,
        format TEXT NOT NULL,
        student_level TEXT NOT NULL,
        speech_time_seconds INTEGER NOT NULL,
        reply_time_seconds INTEGER,
        created_at INTEGER NOT NULL,
        is_guest_mode INTEGER NOT NULL DEFAULT 0,
        teacher_id TEXT,
        class_id TEXT,
        schedule_id TEXT,
        backend_debate_id TEXT,
        team_composition TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_debate_sessions_created_at
    ON debate_sessions(created_at);

    -- Session rosters
    CREATE TABLE IF NOT EXISTS students (
        id TEXT PRIMARY KEY NOT NULL,
        name TEXT NOT NULL,
        level TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        session_id TEXT REFERENCES debate_sessions(id)
    );

    CREATE INDEX IF NOT EXISTS idx_students_session
    ON students(session_id, created_at);

    -- Recorded speeches and their pipeline state
    CREATE TABLE IF NOT EXISTS speech_recordings (
        id TEXT PRIMARY KEY NOT NULL,
        speaker_name TEXT NOT NULL,
        speaker_position TEXT NOT NULL,
        student_id TEXT,
        local_file_path TEXT NOT NULL,
        duration_seconds INTEGER NOT NULL,
        recorded_at INTEGER NOT NULL,
        upload_status TEXT NOT NULL DEFAULT 'pending',
        processing_status TEXT NOT NULL DEFAULT 'pending',
        transcription_status TEXT NOT NULL DEFAULT 'pending',
        feedback_status TEXT NOT NULL DEFAULT 'pending',
        feedback_url TEXT,
        speech_id TEXT,
        feedback_content TEXT,
        transcript_url TEXT,
        transcript_text TEXT,
        transcription_error_message TEXT,
        feedback_error_message TEXT,
        upload_progress REAL NOT NULL DEFAULT 0.0
            CHECK (upload_progress >= 0.0 AND upload_progress <= 1.0),
        debate_session_id TEXT NOT NULL REFERENCES debate_sessions(id)
    );

    CREATE INDEX IF NOT EXISTS idx_speech_recordings_session
    ON speech_recordings(debate_session_id, recorded_at);

    CREATE INDEX IF NOT EXISTS idx_speech_recordings_upload_status
    ON speech_recordings(upload_status);
"#;

/// Identity marker of the current layout: SHA-256 of the DDL
pub fn schema_identity() -> String {
    format!("{:x}", Sha256::digest(SCHEMA_V1.as_bytes()))
}

fn expected_marker() -> String {
    format!("v{} ({})", SCHEMA_VERSION, schema_identity())
}

/// Create the schema on a fresh file or verify the marker on an existing one
pub fn run_migrations(conn: &Connection) -> Result<()> {
    match read_marker(conn)? {
        None => {
            let tables = user_tables(conn)?;
            if !tables.is_empty() {
                return Err(StoreError::SchemaMismatch {
                    expected: expected_marker(),
                    found: format!("unversioned tables [{}]", tables.join(", ")),
                });
            }
            migrate_v1(conn)
        }
        Some((version, identity)) if version == SCHEMA_VERSION && identity == schema_identity() => {
            log::debug!("Schema v{} verified", version);
            Ok(())
        }
        Some((version, identity)) => Err(StoreError::SchemaMismatch {
            expected: expected_marker(),
            found: format!("v{} ({})", version, identity),
        }),
    }
}

/// Latest (version, identity) pair, or None when the file has no marker table
fn read_marker(conn: &Connection) -> Result<Option<(i32, String)>> {
    let table_exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version'",
        [],
        |row| row.get(0),
    )?;

    if !table_exists {
        return Ok(None);
    }

    let marker = conn
        .query_row(
            "SELECT version, identity FROM schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    // A marker table with no rows is as unknown as no marker at all
    Ok(Some(marker.unwrap_or((0, String::new()))))
}

fn user_tables(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let names = stmt.query_map([], |row| row.get(0))?;
    Ok(names.collect::<rusqlite::Result<Vec<String>>>()?)
}

/// Initial schema creation (version 1)
fn migrate_v1(conn: &Connection) -> Result<()> {
    log::info!("Running database migration v1");

    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            identity TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        "#,
    )?;
    tx.execute_batch(SCHEMA_V1)?;
    tx.execute(
        "INSERT INTO schema_version (version, identity) VALUES (?1, ?2)",
        params![SCHEMA_VERSION, schema_identity()],
    )?;
    tx.commit()?;

    log::info!("Migration v1 complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_database_gets_schema() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let tables = user_tables(&conn).unwrap();
        for table in ["debate_sessions", "schema_version", "speech_recordings", "students", "teachers"] {
            assert!(tables.iter().any(|t| t == table), "missing {}", table);
        }

        // Second run only verifies
        run_migrations(&conn).unwrap();
        let markers: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(markers, 1);
    }

    #[test]
    fn test_newer_version_is_a_mismatch() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn.execute(
            "INSERT INTO schema_version (version, identity) VALUES (2, 'future')",
            [],
        )
        .unwrap();

        let err = run_migrations(&conn).unwrap_err();
        assert!(err.is_schema_mismatch());
        assert!(err.to_string().contains("v2 (future)"));
    }

    #[test]
    fn test_changed_identity_is_a_mismatch() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn.execute("UPDATE schema_version SET identity = 'edited'", [])
            .unwrap();

        assert!(run_migrations(&conn).unwrap_err().is_schema_mismatch());
    }

    #[test]
    fn test_unversioned_tables_are_a_mismatch() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE recordings (id TEXT PRIMARY KEY)", [])
            .unwrap();

        let err = run_migrations(&conn).unwrap_err();
        assert!(err.is_schema_mismatch());
        assert!(err.to_string().contains("recordings"));
    }

    #[test]
    fn test_identity_is_stable_hex() {
        let identity = schema_identity();
        assert_eq!(identity.len(), 64);
        assert_eq!(identity, schema_identity());
        assert!(identity.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
