// Database models - Teacher
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::now_millis;

/// A teacher registered on this device
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Teacher {
    pub id: String,
    pub name: String,
    pub device_id: String,
    pub auth_token: Option<String>,
    pub is_admin: bool,
    /// Persisted at millisecond precision. Finer digits are truncated on write.
    pub created_at: DateTime<Utc>,
}

impl Teacher {
    pub fn new(name: &str, device_id: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            device_id: device_id.to_string(),
            auth_token: None,
            is_admin: false,
            created_at: now_millis(),
        }
    }
}
