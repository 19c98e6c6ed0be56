// Database models - Re-exports all domain-specific models
//
// This module is split into focused files by entity:
// - status.rs: Pipeline stage status and transition rules
// - teacher.rs: Teachers registered on the device
// - student.rs: Students and their level
// - session.rs: Debate sessions, formats and team composition
// - recording.rs: Speech recordings and their stage helpers

mod status;
mod teacher;
mod student;
mod session;
mod recording;

use chrono::{DateTime, SubsecRound, Utc};

pub use status::{check_step, check_stored_transition, Stage, StageStatus};
pub use teacher::Teacher;
pub use student::{Student, StudentLevel};
pub use session::{DebateFormat, DebateSession, SpeakerSlot, TeamComposition, TeamStructure};
pub use recording::SpeechRecording;

/// Current time at the precision timestamps are persisted with
pub fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}
