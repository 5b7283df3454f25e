// Session types and data structures

use crate::models::UserData;
use crate::retry::RetryConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Session lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Session lifetime, measured from the moment the envelope was captured
    pub timeout_secs: u64,
    /// Remaining validity below which a renewal is triggered
    pub renewal_threshold_secs: u64,
    /// Interval between periodic server validations
    pub validation_interval_secs: u64,
    /// Minimum gap between validation attempts (debounces reconnect bursts)
    pub validation_cooldown_secs: u64,
    /// Maximum validation/renewal attempts before the session is treated as expired
    pub max_retries: u32,
    /// Base delay for exponential backoff between attempts
    pub retry_base_delay_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 1800,            // 30 minutes
            renewal_threshold_secs: 300,   // renew within the last 5 minutes
            validation_interval_secs: 300, // validate every 5 minutes
            validation_cooldown_secs: 30,
            max_retries: 3,
            retry_base_delay_ms: 1000,
        }
    }
}

impl SessionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn renewal_threshold(&self) -> Duration {
        Duration::from_secs(self.renewal_threshold_secs)
    }

    pub fn validation_interval(&self) -> Duration {
        Duration::from_secs(self.validation_interval_secs)
    }

    pub fn validation_cooldown(&self) -> Duration {
        Duration::from_secs(self.validation_cooldown_secs)
    }

    /// Backoff policy for validation and renewal calls.
    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_retries,
            initial_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

/// Decrypted session record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionData {
    /// Authenticated user
    pub user: UserData,
    /// Arbitrary keyed payload managed through the store's CRUD surface
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
    /// Last mutation of the record
    pub last_modified: DateTime<Utc>,
    /// Last successful server validation or renewal
    pub last_validated: DateTime<Utc>,
    /// Random session token
    pub session_id: String,
}

impl SessionData {
    /// Create a fresh session for a user
    pub fn new(user: UserData) -> Self {
        let now = Utc::now();
        Self {
            user,
            data: HashMap::new(),
            last_modified: now,
            last_validated: now,
            session_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

/// Encrypted session envelope as held in the cache slot and durable storage.
///
/// `captured_at` is the authoritative clock for expiry: a session is dead once
/// `timeout_secs` have elapsed since capture, regardless of payload content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealedSession {
    pub captured_at: DateTime<Utc>,
    /// base64( nonce || ciphertext ) of the serialized session
    pub payload: String,
}

/// Point-in-time snapshot of session health for observers
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub is_valid: bool,
    pub time_remaining_secs: u64,
    pub last_validated: Option<DateTime<Utc>>,
    pub needs_validation: bool,
    pub is_renewing: bool,
    /// Attempts made by the most recent validation or renewal cycle
    pub retry_count: u32,
}

/// Lifecycle transitions broadcast by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Created,
    Updated,
    Renewed,
    Validated,
    Cleared,
    /// The session timed out or was rejected by the server; the application
    /// should send the user back to the login entry point.
    Expired,
}

/// Errors surfaced by the session store
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no active session")]
    NoSession,
    #[error("session key '{0}' already exists")]
    KeyExists(String),
    #[error("session key '{0}' not found")]
    KeyNotFound(String),
    #[error("session storage error: {0}")]
    Storage(String),
    #[error("session cipher error: {0}")]
    Crypto(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserData;

    #[test]
    fn test_new_session_is_stamped() {
        let session = SessionData::new(UserData::named("octocat"));

        assert_eq!(session.user.name, "octocat");
        assert!(session.data.is_empty());
        assert_eq!(session.last_modified, session.last_validated);
        assert!(!session.session_id.is_empty());
    }

    #[test]
    fn test_session_ids_are_unique() {
        let a = SessionData::new(UserData::named("octocat"));
        let b = SessionData::new(UserData::named("octocat"));
        assert_ne!(a.session_id, b.session_id);
    }

    #[test]
    fn test_config_defaults_are_consistent() {
        let config = SessionConfig::default();
        assert!(config.renewal_threshold_secs < config.timeout_secs);
        assert!(config.max_retries >= 1);
        assert_eq!(config.retry().max_attempts, config.max_retries);
    }

    #[test]
    fn test_session_serde_round_trip() {
        let mut session = SessionData::new(UserData::named("octocat"));
        session
            .data
            .insert("org_data".to_string(), serde_json::json!({"total": 1}));

        let json = serde_json::to_string(&session).unwrap();
        let back: SessionData = serde_json::from_str(&json).unwrap();
        assert_eq!(session, back);
    }
}
