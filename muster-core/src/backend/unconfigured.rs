//! Stand-in remote for terminals with no server configured.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use crate::models::{CheckIn, MealLog, Operation, SystemSettings, User};
use crate::services::{CheckInRequest, CheckInService, MealLogRequest, MealService, RemoteReader};

/// Fails every call as unreachable, so writes queue and reads serve the
/// local snapshots.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unconfigured;

fn not_configured<T>() -> ServiceResult<T> {
    Err(ServiceError::Network("no sync server configured".to_string()))
}

#[async_trait]
impl CheckInService for Unconfigured {
    async fn check_in(&self, _request: &CheckInRequest) -> ServiceResult<CheckIn> {
        not_configured()
    }

    async fn check_out(&self, _check_in_id: Uuid, _note: Option<&str>) -> ServiceResult<CheckIn> {
        not_configured()
    }
}

#[async_trait]
impl MealService for Unconfigured {
    async fn create_meal_log(&self, _request: &MealLogRequest) -> ServiceResult<MealLog> {
        not_configured()
    }
}

#[async_trait]
impl RemoteReader for Unconfigured {
    async fn fetch_users(&self) -> ServiceResult<Vec<User>> {
        not_configured()
    }

    async fn fetch_operations(&self) -> ServiceResult<Vec<Operation>> {
        not_configured()
    }

    async fn fetch_check_ins(&self) -> ServiceResult<Vec<CheckIn>> {
        not_configured()
    }

    async fn fetch_meal_logs(&self) -> ServiceResult<Vec<MealLog>> {
        not_configured()
    }

    async fn fetch_system_settings(&self) -> ServiceResult<SystemSettings> {
        not_configured()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_call_is_a_connectivity_failure() {
        let backend = Unconfigured;
        let request = CheckInRequest::new(Uuid::new_v4(), Uuid::new_v4());
        assert!(backend.check_in(&request).await.unwrap_err().is_connectivity());
        assert!(backend.fetch_users().await.unwrap_err().is_connectivity());
        assert!(backend
            .fetch_system_settings()
            .await
            .unwrap_err()
            .is_connectivity());
    }
}
