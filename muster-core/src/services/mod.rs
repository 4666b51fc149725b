//! Seams to the remote system.
//!
//! The engine never talks to the network directly: live writes and replays go
//! through [`CheckInService`] and [`MealService`], pulls go through
//! [`RemoteReader`]. [`crate::backend::HttpBackend`] implements all three.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::ServiceResult;
use crate::models::{CheckIn, MealLog, Operation, SystemSettings, User};

mod request;

#[cfg(test)]
pub(crate) mod fake;

pub use request::{CheckInRequest, CheckOutRequest, MealLogRequest, WriteIntent};

#[async_trait]
pub trait CheckInService: Send + Sync {
    async fn check_in(&self, request: &CheckInRequest) -> ServiceResult<CheckIn>;

    async fn check_out(&self, check_in_id: Uuid, note: Option<&str>) -> ServiceResult<CheckIn>;
}

#[async_trait]
pub trait MealService: Send + Sync {
    async fn create_meal_log(&self, request: &MealLogRequest) -> ServiceResult<MealLog>;
}

/// Bulk reads of server-owned collections.
#[async_trait]
pub trait RemoteReader: Send + Sync {
    async fn fetch_users(&self) -> ServiceResult<Vec<User>>;

    async fn fetch_operations(&self) -> ServiceResult<Vec<Operation>>;

    async fn fetch_check_ins(&self) -> ServiceResult<Vec<CheckIn>>;

    async fn fetch_meal_logs(&self) -> ServiceResult<Vec<MealLog>>;

    /// Returns `NotFound` when the server has no settings record yet.
    async fn fetch_system_settings(&self) -> ServiceResult<SystemSettings>;
}
