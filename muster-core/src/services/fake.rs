//! Scripted in-memory remote used by engine tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{CheckInRequest, CheckInService, MealLogRequest, MealService, RemoteReader};
use crate::error::{ServiceError, ServiceResult};
use crate::models::{CheckIn, MealLog, Operation, SystemSettings, User};

#[derive(Default)]
pub(crate) struct FakeState {
    pub users: Vec<User>,
    pub operations: Vec<Operation>,
    pub check_ins: Vec<CheckIn>,
    pub meal_logs: Vec<MealLog>,
    pub settings: Option<SystemSettings>,
    /// Every call in the order it was made.
    pub calls: Vec<&'static str>,
    /// Consumed one per write call; an empty queue means success.
    pub write_failures: VecDeque<ServiceError>,
    /// Persistent failures keyed by call name.
    pub read_failures: HashMap<&'static str, ServiceError>,
    /// Calls that signal the first `Notify` and then wait on the second.
    pub holds: HashMap<&'static str, (Arc<Notify>, Arc<Notify>)>,
}

#[derive(Default)]
pub(crate) struct FakeBackend {
    state: Mutex<FakeState>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn fail_next_writes(&self, errors: impl IntoIterator<Item = ServiceError>) {
        self.with_state(|s| s.write_failures.extend(errors));
    }

    pub fn fail_reads(&self, call: &'static str, error: ServiceError) {
        self.with_state(|s| {
            s.read_failures.insert(call, error);
        });
    }

    /// Makes `call` block until released. Returns `(started, release)`.
    pub fn hold(&self, call: &'static str) -> (Arc<Notify>, Arc<Notify>) {
        let pair = (Arc::new(Notify::new()), Arc::new(Notify::new()));
        self.with_state(|s| {
            s.holds.insert(call, pair.clone());
        });
        pair
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.with_state(|s| s.calls.clone())
    }

    fn record_write(&self, call: &'static str) -> ServiceResult<()> {
        self.with_state(|s| {
            s.calls.push(call);
            match s.write_failures.pop_front() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        })
    }

    async fn read<T>(
        &self,
        call: &'static str,
        get: impl FnOnce(&FakeState) -> T,
    ) -> ServiceResult<T> {
        let hold = self.with_state(|s| s.holds.get(call).cloned());
        if let Some((started, release)) = hold {
            started.notify_one();
            release.notified().await;
        }
        self.with_state(|s| {
            s.calls.push(call);
            match s.read_failures.get(call) {
                Some(err) => Err(err.clone()),
                None => Ok(get(s)),
            }
        })
    }
}

#[async_trait]
impl CheckInService for FakeBackend {
    async fn check_in(&self, request: &CheckInRequest) -> ServiceResult<CheckIn> {
        self.record_write("check_in")?;
        let check_in = request.to_local(Uuid::new_v4(), Utc::now());
        self.with_state(|s| s.check_ins.push(check_in.clone()));
        Ok(check_in)
    }

    async fn check_out(&self, check_in_id: Uuid, note: Option<&str>) -> ServiceResult<CheckIn> {
        self.record_write("check_out")?;
        self.with_state(|s| {
            let check_in = s
                .check_ins
                .iter_mut()
                .find(|c| c.id == check_in_id)
                .ok_or_else(|| ServiceError::NotFound(format!("check-in {}", check_in_id)))?;
            check_in.close(Utc::now(), note.map(str::to_string));
            Ok(check_in.clone())
        })
    }
}

#[async_trait]
impl MealService for FakeBackend {
    async fn create_meal_log(&self, request: &MealLogRequest) -> ServiceResult<MealLog> {
        self.record_write("create_meal_log")?;
        let log = request.to_local(Uuid::new_v4());
        self.with_state(|s| s.meal_logs.push(log.clone()));
        Ok(log)
    }
}

#[async_trait]
impl RemoteReader for FakeBackend {
    async fn fetch_users(&self) -> ServiceResult<Vec<User>> {
        self.read("fetch_users", |s| s.users.clone()).await
    }

    async fn fetch_operations(&self) -> ServiceResult<Vec<Operation>> {
        self.read("fetch_operations", |s| s.operations.clone()).await
    }

    async fn fetch_check_ins(&self) -> ServiceResult<Vec<CheckIn>> {
        self.read("fetch_check_ins", |s| s.check_ins.clone()).await
    }

    async fn fetch_meal_logs(&self) -> ServiceResult<Vec<MealLog>> {
        self.read("fetch_meal_logs", |s| s.meal_logs.clone()).await
    }

    async fn fetch_system_settings(&self) -> ServiceResult<SystemSettings> {
        self.read("fetch_system_settings", |s| s.settings.clone())
            .await?
            .ok_or_else(|| ServiceError::NotFound("system settings".to_string()))
    }
}
