use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Server-wide settings. There is at most one record; a fresh install has none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSettings {
    pub id: Uuid,
    #[serde(default)]
    pub organization_name: Option<String>,
    #[serde(default = "enabled")]
    pub meal_tracking_enabled: bool,
    #[serde(default)]
    pub overnight_enabled: bool,
    pub updated_at: DateTime<Utc>,
}

fn enabled() -> bool {
    true
}
