//! Write intents accepted by the domain services and stored in the write queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::models::{CheckIn, MealLog, MealType, Role};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckInRequest {
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
}

impl CheckInRequest {
    pub fn new(user_id: Uuid, operation_id: Uuid) -> Self {
        Self {
            user_id,
            operation_id,
            terminal_id: None,
            role_on_checkin: None,
            notes: None,
            overnight: false,
        }
    }

    pub fn with_terminal(mut self, terminal_id: impl Into<String>) -> Self {
        self.terminal_id = Some(terminal_id.into());
        self
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role_on_checkin = Some(role);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn overnight(mut self, overnight: bool) -> Self {
        self.overnight = overnight;
        self
    }

    /// The record a client shows before the server has confirmed it.
    pub fn to_local(&self, id: Uuid, at: DateTime<Utc>) -> CheckIn {
        CheckIn {
            id,
            user_id: self.user_id,
            operation_id: self.operation_id,
            terminal_id: self.terminal_id.clone(),
            role_on_checkin: self.role_on_checkin,
            notes: self.notes.clone(),
            overnight: self.overnight,
            checked_in_at: at,
            checked_out_at: None,
            checkout_note: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckOutRequest {
    pub check_in_id: Uuid,
    #[serde(default)]
    pub checkout_note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealLogRequest {
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

impl MealLogRequest {
    pub fn new(meal_type: MealType, quantity: u32, served_at: DateTime<Utc>) -> Self {
        Self {
            meal_type,
            quantity,
            served_at,
            terminal_id: None,
            notes: None,
            operation_id: None,
            user_id: None,
        }
    }

    pub fn to_local(&self, id: Uuid) -> MealLog {
        MealLog {
            id,
            meal_type: self.meal_type,
            quantity: self.quantity,
            served_at: self.served_at,
            terminal_id: self.terminal_id.clone(),
            notes: self.notes.clone(),
            operation_id: self.operation_id,
            user_id: self.user_id,
        }
    }
}

/// A write that could not be sent live and waits in the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WriteIntent {
    CheckIn(CheckInRequest),
    CheckOut(CheckOutRequest),
    MealLog(MealLogRequest),
}

impl WriteIntent {
    pub fn kind(&self) -> &'static str {
        match self {
            WriteIntent::CheckIn(_) => "check_in",
            WriteIntent::CheckOut(_) => "check_out",
            WriteIntent::MealLog(_) => "meal_log",
        }
    }
}

impl fmt::Display for WriteIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteIntent::CheckIn(req) => write!(
                f,
                "check-in user {} to operation {}",
                req.user_id, req.operation_id
            ),
            WriteIntent::CheckOut(req) => write!(f, "check-out {}", req.check_in_id),
            WriteIntent::MealLog(req) => {
                write!(f, "meal log {} x{}", req.meal_type, req.quantity)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_intent_is_tagged_by_type() {
        let intent = WriteIntent::CheckOut(CheckOutRequest {
            check_in_id: Uuid::nil(),
            checkout_note: Some("end of shift".to_string()),
        });

        let json = serde_json::to_value(&intent).unwrap();
        assert_eq!(json["type"], "check_out");
        assert_eq!(json["checkout_note"], "end of shift");
    }

    #[test]
    fn test_check_in_request_to_local() {
        let at = Utc::now();
        let req = CheckInRequest::new(Uuid::new_v4(), Uuid::new_v4())
            .with_terminal("gate-2")
            .overnight(true);
        let local = req.to_local(Uuid::nil(), at);

        assert_eq!(local.id, Uuid::nil());
        assert_eq!(local.terminal_id.as_deref(), Some("gate-2"));
        assert!(local.overnight);
        assert!(local.is_open());
    }
}
