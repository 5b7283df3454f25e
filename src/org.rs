// Organization data service for the install flow

use crate::api::{ApiClient, ApiError};
use crate::models::OrgData;
use crate::session::{SessionError, SessionStore};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Fetches organization data and caches it inside the session.
pub struct OrgService {
    api: Arc<ApiClient>,
    store: Arc<SessionStore>,
}

impl OrgService {
    /// Reserved session data key holding the cached organization lookup.
    /// Application CRUD should treat this key as taken.
    pub const ORG_DATA_KEY: &'static str = "org_data";

    pub fn new(api: Arc<ApiClient>, store: Arc<SessionStore>) -> Self {
        Self { api, store }
    }

    /// Fetch organization data from the server and cache it in the session.
    pub async fn fetch_org(&self) -> Result<OrgData, ApiError> {
        info!("Fetching organization data");
        let org = self.api.fetch_org().await?;

        match serde_json::to_value(&org) {
            Ok(value) => {
                let result = match self.store.create(Self::ORG_DATA_KEY, value.clone()).await {
                    Err(SessionError::KeyExists(_)) => {
                        self.store.update(Self::ORG_DATA_KEY, value).await
                    }
                    other => other,
                };
                if let Err(e) = result {
                    warn!("Could not cache organization data in session: {}", e);
                }
            }
            Err(e) => warn!("Could not serialize organization data: {}", e),
        }

        Ok(org)
    }

    /// Organization data from the session cache, if present and readable.
    pub async fn cached_org(&self) -> Option<OrgData> {
        let value = self.store.read(Self::ORG_DATA_KEY).await?;
        match serde_json::from_value(value) {
            Ok(org) => Some(org),
            Err(e) => {
                warn!("Discarding unreadable cached organization data: {}", e);
                None
            }
        }
    }

    /// Organization data, cached-first.
    pub async fn org_data(&self) -> Result<OrgData, ApiError> {
        if let Some(org) = self.cached_org().await {
            debug!("Using cached organization data");
            return Ok(org);
        }
        self.fetch_org().await
    }

    /// Whether the install step is still needed (no organization yet).
    pub async fn needs_install(&self) -> Result<bool, ApiError> {
        Ok(self.org_data().await?.needs_install())
    }
}
