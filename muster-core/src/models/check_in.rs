use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Role;

/// A person's presence record for an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckIn {
    pub id: Uuid,
    pub user_id: Uuid,
    pub operation_id: Uuid,
    #[serde(default)]
    pub terminal_id: Option<String>,
    #[serde(default)]
    pub role_on_checkin: Option<Role>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub overnight: bool,
    pub checked_in_at: DateTime<Utc>,
    #[serde(default)]
    pub checked_out_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub checkout_note: Option<String>,
}

impl CheckIn {
    pub fn is_open(&self) -> bool {
        self.checked_out_at.is_none()
    }

    /// Applies a check-out to this record.
    pub fn close(&mut self, at: DateTime<Utc>, note: Option<String>) {
        self.checked_out_at = Some(at);
        self.checkout_note = note;
    }
}
