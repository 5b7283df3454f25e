use super::error::ApiError;
use crate::config::PortalConfig;
use crate::models::{OrgData, UserData};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use tracing::{debug, error};

/// HTTP client for the portal backend.
///
/// All calls are credentialed: the backend issues a session cookie during the
/// GitHub login flow and the cookie store replays it on every request.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Build a client from the portal configuration.
    pub fn new(config: &PortalConfig) -> Result<Self, String> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .cookie_store(true)
            .default_headers(headers)
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, ApiError> {
        let url = self.endpoint(path);
        debug!("GET {}", url);

        let response = self.http.get(&url).send().await.map_err(|e| {
            error!("Request to {} failed: {}", url, e);
            ApiError::from(e)
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            return Err(ApiError::Server(status.as_u16()));
        }

        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.get(path).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Fetch the authenticated user's canonical data.
    pub async fn user_info(&self) -> Result<UserData, ApiError> {
        self.get_json("/auth/user_info").await
    }

    /// Tell the backend to end the session.
    pub async fn logout(&self) -> Result<(), ApiError> {
        self.get("/auth/logout").await.map(|_| ())
    }

    /// Confirm the session is still accepted by the server.
    pub async fn validate(&self) -> Result<(), ApiError> {
        self.get("/auth/validate").await.map(|_| ())
    }

    /// Extend the session's server-side validity.
    pub async fn renew(&self) -> Result<(), ApiError> {
        self.get("/auth/renew").await.map(|_| ())
    }

    /// Fetch organization data for the install flow.
    pub async fn fetch_org(&self) -> Result<OrgData, ApiError> {
        self.get_json("/org/fetch").await
    }
}
