mod check_in;
mod meal_log;
mod meal_type;
mod operation;
mod snapshot;
mod system_settings;
mod user;

pub use check_in::CheckIn;
pub use meal_log::MealLog;
pub use meal_type::MealType;
pub use operation::Operation;
pub use snapshot::{Snapshot, SnapshotEntity};
pub use system_settings::SystemSettings;
pub use user::{Role, User};
