// Async handle for the debate feedback store
//
// Every call runs on the blocking pool so a UI or event-loop thread is never
// stalled on SQLite I/O.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::StoreConfig;
use crate::database::{DatabaseManager, DebateSession, Observation, SpeechRecording, Student, Teacher};
use crate::error::Result;

/// Cloneable async front end over a shared `DatabaseManager`
#[derive(Clone)]
pub struct DebateStore {
    inner: Arc<DatabaseManager>,
    retention: chrono::Duration,
}

impl DebateStore {
    pub fn new(db: DatabaseManager) -> Self {
        Self {
            inner: Arc::new(db),
            retention: StoreConfig::default().retention(),
        }
    }

    /// Open the database described by `config` on the blocking pool
    pub async fn open(config: StoreConfig) -> Result<Self> {
        let retention = config.retention();
        let db = tokio::task::spawn_blocking(move || DatabaseManager::open(&config)).await??;
        Ok(Self {
            inner: Arc::new(db),
            retention,
        })
    }

    pub fn inner(&self) -> &DatabaseManager {
        &self.inner
    }

    pub fn arc(&self) -> Arc<DatabaseManager> {
        self.inner.clone()
    }

    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&DatabaseManager) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || f(&db)).await?
    }

    // ============ Teachers ============

    pub async fn upsert_teacher(&self, teacher: Teacher) -> Result<()> {
        self.run(move |db| db.upsert_teacher(&teacher)).await
    }

    pub async fn get_teacher(&self, id: &str) -> Result<Option<Teacher>> {
        let id = id.to_string();
        self.run(move |db| db.get_teacher(&id)).await
    }

    pub async fn clear_teachers(&self) -> Result<usize> {
        self.run(|db| db.clear_teachers()).await
    }

    // ============ Sessions ============

    pub async fn upsert_session(&self, session: DebateSession) -> Result<()> {
        self.run(move |db| db.upsert_session(&session)).await
    }

    pub async fn save_session(&self, session: DebateSession, students: Vec<Student>) -> Result<()> {
        self.run(move |db| db.save_session(&session, &students)).await
    }

    pub async fn delete_session(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.run(move |db| db.delete_session(&id)).await
    }

    pub async fn attach_backend_debate_id(&self, session_id: &str, backend_debate_id: &str) -> Result<DebateSession> {
        let session_id = session_id.to_string();
        let backend_debate_id = backend_debate_id.to_string();
        self.run(move |db| db.attach_backend_debate_id(&session_id, &backend_debate_id))
            .await
    }

    pub async fn get_session(&self, id: &str) -> Result<Option<DebateSession>> {
        let id = id.to_string();
        self.run(move |db| db.get_session(&id)).await
    }

    pub async fn list_sessions(&self) -> Result<Vec<DebateSession>> {
        self.run(|db| db.list_sessions()).await
    }

    pub async fn observe_sessions(&self) -> Result<Observation<DebateSession>> {
        self.run(|db| db.observe_sessions()).await
    }

    // ============ Students ============

    pub async fn upsert_students(&self, students: Vec<Student>) -> Result<()> {
        self.run(move |db| db.upsert_students(&students)).await
    }

    pub async fn replace_students(&self, session_id: &str, students: Vec<Student>) -> Result<()> {
        let session_id = session_id.to_string();
        self.run(move |db| db.replace_students(&session_id, &students)).await
    }

    pub async fn delete_students_for_session(&self, session_id: &str) -> Result<usize> {
        let session_id = session_id.to_string();
        self.run(move |db| db.delete_students_for_session(&session_id)).await
    }

    pub async fn get_students_for_session(&self, session_id: &str) -> Result<Vec<Student>> {
        let session_id = session_id.to_string();
        self.run(move |db| db.get_students_for_session(&session_id)).await
    }

    // ============ Recordings ============

    pub async fn upsert_recording(&self, recording: SpeechRecording) -> Result<()> {
        self.run(move |db| db.upsert_recording(&recording)).await
    }

    pub async fn upsert_recordings(&self, recordings: Vec<SpeechRecording>) -> Result<()> {
        self.run(move |db| db.upsert_recordings(&recordings)).await
    }

    pub async fn update_recording(&self, recording: SpeechRecording) -> Result<()> {
        self.run(move |db| db.update_recording(&recording)).await
    }

    pub async fn delete_recording(&self, recording: SpeechRecording) -> Result<()> {
        self.run(move |db| db.delete_recording(&recording)).await
    }

    pub async fn replace_recordings(&self, session_id: &str, recordings: Vec<SpeechRecording>) -> Result<()> {
        let session_id = session_id.to_string();
        self.run(move |db| db.replace_recordings(&session_id, &recordings))
            .await
    }

    pub async fn delete_recordings(&self, session_id: &str) -> Result<usize> {
        let session_id = session_id.to_string();
        self.run(move |db| db.delete_recordings(&session_id)).await
    }

    pub async fn get_recordings(&self, session_id: &str) -> Result<Vec<SpeechRecording>> {
        let session_id = session_id.to_string();
        self.run(move |db| db.get_recordings(&session_id)).await
    }

    pub async fn get_recording(&self, id: &str) -> Result<Option<SpeechRecording>> {
        let id = id.to_string();
        self.run(move |db| db.get_recording(&id)).await
    }

    pub async fn pending_uploads(&self) -> Result<Vec<SpeechRecording>> {
        self.run(|db| db.pending_uploads()).await
    }

    pub async fn recordings_recorded_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<SpeechRecording>> {
        self.run(move |db| db.recordings_recorded_before(cutoff)).await
    }

    /// Recordings whose local audio is older than the configured retention.
    /// A window reaching past the earliest representable date matches nothing.
    pub async fn recordings_past_retention(&self) -> Result<Vec<SpeechRecording>> {
        let cutoff = Utc::now()
            .checked_sub_signed(self.retention)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.recordings_recorded_before(cutoff).await
    }

    pub async fn observe_recordings(&self, session_id: &str) -> Result<Observation<SpeechRecording>> {
        let session_id = session_id.to_string();
        self.run(move |db| db.observe_recordings(&session_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{DebateFormat, Stage, StageStatus, StudentLevel};
    use chrono::Duration;
    use futures_util::StreamExt;
    use tempfile::{tempdir, TempDir};

    async fn create_test_store() -> (TempDir, DebateStore) {
        let dir = tempdir().unwrap();
        let store = DebateStore::open(StoreConfig::at(dir.path().join("store.db")))
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_session_round_trip() {
        let (_dir, store) = create_test_store().await;
        let session = DebateSession::new("This house would ban exams", DebateFormat::Australs, StudentLevel::Secondary);
        let students = vec![Student::new("Alice", StudentLevel::Secondary, Some(&session.id))];

        store.save_session(session.clone(), students.clone()).await.unwrap();

        assert_eq!(store.get_session(&session.id).await.unwrap(), Some(session.clone()));
        assert_eq!(store.get_students_for_session(&session.id).await.unwrap(), students);
        assert_eq!(store.list_sessions().await.unwrap().len(), 1);

        store.replace_students(&session.id, vec![]).await.unwrap();
        assert!(store.get_students_for_session(&session.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recording_pipeline_through_store() {
        let (_dir, store) = create_test_store().await;
        let session = DebateSession::new("This house would tax sugar", DebateFormat::Wsdc, StudentLevel::Primary);
        store.upsert_session(session.clone()).await.unwrap();

        let mut rec = SpeechRecording::new(&session.id, "Alice", "Prop 1", "/tmp/a.m4a", 300);
        store.upsert_recording(rec.clone()).await.unwrap();
        assert_eq!(store.pending_uploads().await.unwrap().len(), 1);

        rec.begin_stage(Stage::Upload).unwrap();
        rec.set_upload_progress(0.5).unwrap();
        store.update_recording(rec.clone()).await.unwrap();
        rec.complete_stage(Stage::Upload).unwrap();
        rec.speech_id = Some("speech-1".to_string());
        store.update_recording(rec.clone()).await.unwrap();
        assert!(store.pending_uploads().await.unwrap().is_empty());

        let stored = store.get_recording(&rec.id).await.unwrap().unwrap();
        assert_eq!(stored.upload_status, StageStatus::Completed);
        assert_eq!(stored.upload_progress, 1.0);

        store.delete_recording(rec.clone()).await.unwrap();
        assert!(store.get_recordings(&session.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_observation_stream() {
        let (_dir, store) = create_test_store().await;
        let session = DebateSession::new("This house would go to Mars", DebateFormat::Ap, StudentLevel::Secondary);
        store.upsert_session(session.clone()).await.unwrap();

        let mut obs = store.observe_recordings(&session.id).await.unwrap();
        assert_eq!(obs.next().await, Some(vec![]));

        let rec = SpeechRecording::new(&session.id, "Alice", "Gov 1", "/tmp/a.m4a", 120);
        store.upsert_recording(rec.clone()).await.unwrap();
        assert_eq!(obs.recv().await, Some(vec![rec]));

        obs.cancel();
        assert_eq!(obs.recv().await, None);
    }

    #[tokio::test]
    async fn test_recordings_past_retention() {
        let (_dir, store) = create_test_store().await;
        let session = DebateSession::new("This house would ban cars", DebateFormat::Bp, StudentLevel::Secondary);
        store.upsert_session(session.clone()).await.unwrap();

        let mut stale = SpeechRecording::new(&session.id, "Old", "OG 1", "/tmp/old.m4a", 60);
        stale.recorded_at -= Duration::days(8);
        let fresh = SpeechRecording::new(&session.id, "New", "OO 1", "/tmp/new.m4a", 60);
        store.upsert_recordings(vec![stale.clone(), fresh]).await.unwrap();

        let expired = store.recordings_past_retention().await.unwrap();
        assert_eq!(expired, vec![stale]);
    }

    #[tokio::test]
    async fn test_huge_retention_window_matches_nothing() {
        let dir = tempdir().unwrap();
        let config = StoreConfig {
            local_retention_days: 1_000_000_000,
            ..StoreConfig::at(dir.path().join("store.db"))
        };
        let store = DebateStore::open(config).await.unwrap();
        let session = DebateSession::new("This house would ban cars", DebateFormat::Bp, StudentLevel::Secondary);
        store.upsert_session(session.clone()).await.unwrap();

        let mut ancient = SpeechRecording::new(&session.id, "Old", "OG 1", "/tmp/old.m4a", 60);
        ancient.recorded_at -= Duration::days(3650);
        store.upsert_recording(ancient).await.unwrap();

        assert!(store.recordings_past_retention().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_errors_cross_the_blocking_pool() {
        let (_dir, store) = create_test_store().await;
        let rec = SpeechRecording::new("missing", "Ghost", "Prop 1", "/tmp/g.m4a", 10);
        assert!(store.update_recording(rec.clone()).await.unwrap_err().is_not_found());
        assert!(store.upsert_recording(rec).await.unwrap_err().is_storage());
    }
}
