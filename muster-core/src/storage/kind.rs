//! Snapshot collection enumeration.

use std::fmt;
use std::str::FromStr;

/// Entity collections cached by the snapshot store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotKind {
    Users,
    Operations,
    CheckIns,
    MealLogs,
    SystemSettings,
}

impl SnapshotKind {
    pub const ALL: [SnapshotKind; 5] = [
        SnapshotKind::Users,
        SnapshotKind::Operations,
        SnapshotKind::CheckIns,
        SnapshotKind::MealLogs,
        SnapshotKind::SystemSettings,
    ];

    /// Returns the filename for this collection.
    pub fn filename(&self) -> &'static str {
        match self {
            SnapshotKind::Users => "users.json",
            SnapshotKind::Operations => "operations.json",
            SnapshotKind::CheckIns => "check_ins.json",
            SnapshotKind::MealLogs => "meal_logs.json",
            SnapshotKind::SystemSettings => "system_settings.json",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SnapshotKind::Users => "users",
            SnapshotKind::Operations => "operations",
            SnapshotKind::CheckIns => "check-ins",
            SnapshotKind::MealLogs => "meal-logs",
            SnapshotKind::SystemSettings => "settings",
        }
    }
}

impl fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SnapshotKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "users" => Ok(SnapshotKind::Users),
            "operations" => Ok(SnapshotKind::Operations),
            "check-ins" | "checkins" => Ok(SnapshotKind::CheckIns),
            "meal-logs" | "meals" => Ok(SnapshotKind::MealLogs),
            "settings" | "system-settings" => Ok(SnapshotKind::SystemSettings),
            _ => Err(format!(
                "Unknown collection '{}'. Valid options: users, operations, check-ins, meal-logs, settings",
                s
            )),
        }
    }
}
