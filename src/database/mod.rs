// Database module for the debate feedback store
// Provides SQLite persistence for teachers, students, debate sessions and speech recordings

pub mod entity;
pub mod manager;
pub mod migrations;
pub mod models;
pub mod notifier;
pub mod teachers_repo;
pub mod students_repo;
pub mod sessions_repo;
pub mod recordings_repo;

pub use manager::{DatabaseManager, WriteScope};
pub use models::*;
pub use notifier::{ChangeNotifier, Observation, Table, TableSet};
