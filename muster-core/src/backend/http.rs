//! JSON-over-HTTP implementation of the remote services.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::debug;
use uuid::Uuid;

use super::classify::{classify_status, classify_transport};
use super::url::build_http_url;
use crate::error::{ServiceError, ServiceResult};
use crate::models::{CheckIn, MealLog, Operation, Role, SystemSettings, User};
use crate::services::{
    CheckInRequest, CheckInService, MealLogRequest, MealService, RemoteReader,
};

/// Used when no timeout is configured.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Who the API key belongs to, as reported by `/me`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: Uuid,
    #[serde(default)]
    pub display_name: Option<String>,
    pub role: Role,
}

#[derive(Serialize)]
struct CheckOutBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    checkout_note: Option<&'a str>,
}

/// Client for the server's JSON API.
#[derive(Debug)]
pub struct HttpBackend {
    server_url: String,
    api_key: String,
    client: Client,
    /// Cached identity from `/me`.
    identity: OnceCell<Identity>,
}

impl HttpBackend {
    pub fn new(server_url: String, api_key: String, timeout: Duration) -> ServiceResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::Unexpected(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            server_url,
            api_key,
            client,
            identity: OnceCell::new(),
        })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Fetches the identity for the API key. Cached after the first success.
    pub async fn identity(&self) -> ServiceResult<&Identity> {
        self.identity
            .get_or_try_init(|| async { self.get_json::<Identity>("/me").await })
            .await
    }

    /// True if the server answered its health check.
    pub async fn ping(&self) -> bool {
        let url = build_http_url(&self.server_url, "/health");
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "Health check failed");
                false
            }
        }
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header("Authorization", format!("Bearer {}", self.api_key))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ServiceResult<T> {
        let url = build_http_url(&self.server_url, path);
        debug!(%url, "GET");
        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;
        decode(response).await
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> ServiceResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = build_http_url(&self.server_url, path);
        debug!(%url, "POST");
        let response = self
            .authorized(self.client.post(&url))
            .json(body)
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> ServiceResult<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(classify_status(status, &body));
    }
    response.json::<T>().await.map_err(|e| classify_transport(&e))
}

#[async_trait]
impl CheckInService for HttpBackend {
    async fn check_in(&self, request: &CheckInRequest) -> ServiceResult<CheckIn> {
        self.post_json("/api/check-ins", request).await
    }

    async fn check_out(&self, check_in_id: Uuid, note: Option<&str>) -> ServiceResult<CheckIn> {
        let path = format!("/api/check-ins/{}/checkout", check_in_id);
        self.post_json(&path, &CheckOutBody { checkout_note: note })
            .await
    }
}

#[async_trait]
impl MealService for HttpBackend {
    async fn create_meal_log(&self, request: &MealLogRequest) -> ServiceResult<MealLog> {
        self.post_json("/api/meal-logs", request).await
    }
}

#[async_trait]
impl RemoteReader for HttpBackend {
    async fn fetch_users(&self) -> ServiceResult<Vec<User>> {
        self.get_json("/api/users").await
    }

    async fn fetch_operations(&self) -> ServiceResult<Vec<Operation>> {
        self.get_json("/api/operations").await
    }

    async fn fetch_check_ins(&self) -> ServiceResult<Vec<CheckIn>> {
        self.get_json("/api/check-ins").await
    }

    async fn fetch_meal_logs(&self) -> ServiceResult<Vec<MealLog>> {
        self.get_json("/api/meal-logs").await
    }

    async fn fetch_system_settings(&self) -> ServiceResult<SystemSettings> {
        self.get_json("/api/system-settings").await
    }
}
