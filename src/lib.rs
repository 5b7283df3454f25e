// Client session layer for the org installation portal.
// The backend (/auth/*, /org/*) is an external collaborator; this crate owns
// the encrypted session record, its lifecycle, and the services around it.

pub mod api;
pub mod auth;
pub mod config;
pub mod guard;
pub mod logging;
pub mod models;
pub mod monitor;
pub mod org;
pub mod recovery;
pub mod retry;
pub mod session;

pub use api::{ApiClient, ApiError};
pub use auth::AuthService;
pub use config::{load_config, load_config_with_fallback, PortalConfig};
pub use guard::{GuardDecision, RouteGuard, LOGIN_ROUTE};
pub use models::{OrgData, UserData};
pub use monitor::ConnectivityMonitor;
pub use org::OrgService;
pub use recovery::{run_with_recovery, RecoveryPolicy};
pub use retry::{retry_with_backoff, RetryConfig};
pub use session::{
    FileSessionStorage, MemorySessionStorage, SessionConfig, SessionData, SessionError,
    SessionEvent, SessionInfo, SessionStorage, SessionStore,
};
