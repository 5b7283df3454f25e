// Authentication service over the session store

use crate::api::{ApiClient, ApiError};
use crate::guard::LOGIN_ROUTE;
use crate::models::UserData;
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::session::SessionStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Authentication lookup and logout over an injected store and client.
///
/// The lookup prefers the local session; only a miss goes to the server's
/// who-am-I endpoint, and a successful fetch seeds a new session.
pub struct AuthService {
    api: Arc<ApiClient>,
    store: Arc<SessionStore>,
    lookup_retry: RetryConfig,
}

impl AuthService {
    pub fn new(api: Arc<ApiClient>, store: Arc<SessionStore>) -> Self {
        Self {
            api,
            store,
            // Up to two retries for the lookup; unauthorized is never retried
            lookup_retry: RetryConfig {
                max_attempts: 3,
                initial_delay: Duration::from_millis(500),
                max_delay: Duration::from_secs(5),
                multiplier: 2.0,
            },
        }
    }

    /// Override the lookup retry policy.
    pub fn with_lookup_retry(mut self, retry: RetryConfig) -> Self {
        self.lookup_retry = retry;
        self
    }

    /// Resolve the authenticated user.
    pub async fn current_user(&self) -> Result<UserData, ApiError> {
        if self.store.has_active_session().await {
            if let Some(session) = self.store.get_session().await {
                debug!("Using existing session data");
                return Ok(session.user);
            }
        }

        info!("Fetching user authentication data");
        let user = retry_with_backoff(
            &self.lookup_retry,
            |e: &ApiError| !e.is_unauthorized(),
            || {
                let api = Arc::clone(&self.api);
                async move { api.user_info().await }
            },
        )
        .await?;

        self.store.set_session(user.clone()).await;
        info!("User authenticated and session created");
        Ok(user)
    }

    /// Log out: ask the backend to end the session, then clear local state.
    ///
    /// The local session is cleared even when the remote call fails. Returns
    /// the route the application should navigate to.
    pub async fn logout(&self) -> &'static str {
        info!("Initiating logout process");

        if let Err(e) = self.api.logout().await {
            error!("Error during logout: {}", e);
        }

        self.store.clear_session().await;
        info!("User logged out");
        LOGIN_ROUTE
    }
}
