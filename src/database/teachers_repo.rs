// Teachers repository for the debate feedback store
// Device registration, re-auth and logout

use rusqlite::types::Value;
use rusqlite::Row;

use super::entity::{self, flag, opt_text, read_timestamp, text, timestamp, Entity};
use super::models::Teacher;
use super::notifier::Table;
use super::DatabaseManager;
use crate::error::Result;

impl Entity for Teacher {
    const TABLE: Table = Table::Teachers;
    const NAME: &'static str = "teacher";
    const COLUMNS: &'static [&'static str] =
        &["id", "name", "device_id", "auth_token", "is_admin", "created_at"];

    fn id(&self) -> &str {
        &self.id
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Teacher {
            id: row.get("id")?,
            name: row.get("name")?,
            device_id: row.get("device_id")?,
            auth_token: row.get("auth_token")?,
            is_admin: row.get("is_admin")?,
            created_at: read_timestamp(row, "created_at")?,
        })
    }

    fn to_values(&self) -> Result<Vec<Value>> {
        Ok(vec![
            text(&self.id),
            text(&self.name),
            text(&self.device_id),
            opt_text(&self.auth_token),
            flag(self.is_admin),
            timestamp(&self.created_at),
        ])
    }
}

impl DatabaseManager {
    /// Insert a teacher or replace the stored one with the same id
    pub fn upsert_teacher(&self, teacher: &Teacher) -> Result<()> {
        self.with_transaction(|scope| scope.upsert(teacher))
    }

    pub fn get_teacher(&self, id: &str) -> Result<Option<Teacher>> {
        self.with_connection(|conn| entity::get(conn, id))
    }

    /// Delete every teacher (logout / device reset)
    pub fn clear_teachers(&self) -> Result<usize> {
        let cleared = self.with_transaction(|scope| scope.delete_all(Table::Teachers))?;
        log::info!("Cleared {} teacher(s)", cleared);
        Ok(cleared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    fn create_test_db() -> (TempDir, DatabaseManager) {
        let dir = tempdir().unwrap();
        let db = DatabaseManager::new(dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    #[test]
    fn test_upsert_and_get_teacher() {
        let (_dir, db) = create_test_db();
        let mut teacher = Teacher::new("Ms Rivera", "device-42");
        db.upsert_teacher(&teacher).unwrap();

        let stored = db.get_teacher(&teacher.id).unwrap().unwrap();
        assert_eq!(stored, teacher);

        // Re-auth replaces in place
        teacher.auth_token = Some("token-2".to_string());
        teacher.is_admin = true;
        db.upsert_teacher(&teacher).unwrap();
        let stored = db.get_teacher(&teacher.id).unwrap().unwrap();
        assert_eq!(stored.auth_token.as_deref(), Some("token-2"));
        assert!(stored.is_admin);

        assert!(db.get_teacher("missing").unwrap().is_none());
    }

    #[test]
    fn test_clear_teachers() {
        let (_dir, db) = create_test_db();
        db.upsert_teacher(&Teacher::new("A", "d1")).unwrap();
        db.upsert_teacher(&Teacher::new("B", "d2")).unwrap();

        assert_eq!(db.clear_teachers().unwrap(), 2);
        assert_eq!(db.clear_teachers().unwrap(), 0);
    }
}
