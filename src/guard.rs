// Access guard for protected views

use crate::auth::AuthService;
use crate::models::UserData;
use std::sync::Arc;
use tracing::warn;

/// Login entry point of the portal.
pub const LOGIN_ROUTE: &str = "/";

/// Decision for a protected view: render it or bounce to login.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardDecision {
    Allow(UserData),
    RedirectToLogin,
}

/// Two-state gate checked before each protected view.
///
/// A valid session passes; an absent one falls back to a server fetch via the
/// auth service; any failure redirects to the login route.
pub struct RouteGuard {
    auth: Arc<AuthService>,
}

impl RouteGuard {
    pub fn new(auth: Arc<AuthService>) -> Self {
        Self { auth }
    }

    pub async fn check(&self) -> GuardDecision {
        match self.auth.current_user().await {
            Ok(user) => GuardDecision::Allow(user),
            Err(e) => {
                warn!("Access check failed, redirecting to login: {}", e);
                GuardDecision::RedirectToLogin
            }
        }
    }
}
