use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Access role assigned to a person on the server.
///
/// `Kiosk` is the restricted role used by shared check-in terminals; the
/// server refuses some bulk reads for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Supervisor,
    Member,
    Kiosk,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Supervisor => write!(f, "supervisor"),
            Role::Member => write!(f, "member"),
            Role::Kiosk => write!(f, "kiosk"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "supervisor" => Ok(Role::Supervisor),
            "member" => Ok(Role::Member),
            "kiosk" => Ok(Role::Kiosk),
            _ => Err(format!(
                "Invalid role '{}'. Valid options: admin, supervisor, member, kiosk",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub display_name: String,
    pub role: Role,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl User {
    pub fn new(display_name: impl Into<String>, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            display_name: display_name.into(),
            role,
            unit: None,
            active: true,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_defaults_active_when_missing() {
        let json = r#"{"id":"6f1c1f36-5b7e-4c57-9f2e-8d2c4a1b0c11","display_name":"Ana","role":"kiosk"}"#;
        let user: User = serde_json::from_str(json).unwrap();
        assert!(user.active);
        assert_eq!(user.role, Role::Kiosk);
        assert!(user.unit.is_none());
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!("Supervisor".parse::<Role>().unwrap(), Role::Supervisor);
        assert!("owner".parse::<Role>().unwrap_err().contains("owner"));
    }
}
