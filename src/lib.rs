// Debate Feedback - local-first store for recorded debate speeches
//
// Persists teachers, debate sessions, rosters and speech recordings, tracks
// each recording through its upload, transcription and feedback stages, and
// pushes fresh query snapshots to observers after every commit.

// Column mapping macros used by the models
#[macro_use]
mod macros;

pub mod config;
pub mod database;
pub mod error;
pub mod state;

pub use config::StoreConfig;
pub use database::{
    DatabaseManager, DebateFormat, DebateSession, Observation, SpeakerSlot, SpeechRecording, Stage,
    StageStatus, Student, StudentLevel, Teacher, TeamComposition,
};
pub use error::{Result, StoreError};
pub use state::DebateStore;

/// Install `env_logger` reading `RUST_LOG` (default `info`). Later calls are ignored.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}

/// Open the store described by `config`, ready for async callers
pub async fn open_store(config: StoreConfig) -> Result<DebateStore> {
    log::info!("Opening debate feedback store at {:?}", config.db_path);
    DebateStore::open(config).await
}
