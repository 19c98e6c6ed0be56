// Database models - Student
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::now_millis;

/// Age band a student or debate is pitched at
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StudentLevel {
    Primary,
    Secondary,
}

impl StudentLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            StudentLevel::Primary => "primary",
            StudentLevel::Secondary => "secondary",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "primary" => Some(StudentLevel::Primary),
            "secondary" => Some(StudentLevel::Secondary),
            _ => None,
        }
    }

    /// Lenient parse for user or backend input, defaulting to secondary
    pub fn from_raw(raw: Option<&str>) -> Self {
        raw.and_then(|r| Self::parse(&r.trim().to_lowercase()))
            .unwrap_or(StudentLevel::Secondary)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            StudentLevel::Primary => "Primary",
            StudentLevel::Secondary => "Secondary",
        }
    }
}

sql_text_enum!(StudentLevel);

/// A student on a debate roster.
///
/// `session_id` is a relation, not ownership: a student can exist without a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Student {
    pub id: String,
    pub name: String,
    pub level: StudentLevel,
    /// Persisted at millisecond precision. Finer digits are truncated on write.
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl Student {
    pub fn new(name: &str, level: StudentLevel, session_id: Option<&str>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            level,
            created_at: now_millis(),
            session_id: session_id.map(str::to_string),
        }
    }
}
