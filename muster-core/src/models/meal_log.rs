use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::MealType;

/// Meals served from a terminal, optionally attributed to a person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealLog {
    pub id: Uuid,
    pub meal_type: MealType,
    pub quantity: u32,
    pub served_at: DateTime<Utc>,
    #[serde(default)]
    pub terminal_id: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub operation_id: Option<Uuid>,
    #[serde(default)]
    pub user_id: Option<Uuid>,
}

impl fmt::Display for MealLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} x{} at {}",
            self.meal_type,
            self.quantity,
            self.served_at.format("%Y-%m-%d %H:%M")
        )?;
        if let Some(notes) = &self.notes {
            write!(f, " ({})", notes)?;
        }
        Ok(())
    }
}
