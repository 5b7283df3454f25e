// Session store: encrypted record, persistence, and time-based lifecycle

use super::crypto::SessionCipher;
use super::storage::SessionStorage;
use super::types::{SealedSession, SessionConfig, SessionData, SessionError, SessionEvent, SessionInfo};
use crate::api::{ApiClient, ApiError};
use crate::models::UserData;
use crate::retry::retry_with_backoff;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Outcome of a renewal attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewOutcome {
    Renewed,
    /// Another renewal was already running; this call did nothing
    InFlight,
    NoSession,
    Expired,
}

/// Outcome of a validation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidateOutcome {
    Valid,
    /// Suppressed by the cooldown window or a validation already in flight
    Skipped,
    NoSession,
    Expired,
}

/// One scheduled callback per lifecycle concern. Arming a timer always aborts
/// the previous handle first, so at most one of each is ever live.
#[derive(Default)]
struct SessionTimers {
    expiry: Option<JoinHandle<()>>,
    renewal: Option<JoinHandle<()>>,
    validation: Option<JoinHandle<()>>,
}

impl SessionTimers {
    fn abort_all(&mut self) {
        for handle in [
            self.expiry.take(),
            self.renewal.take(),
            self.validation.take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.abort();
        }
    }
}

/// Owns the encrypted session record, its persistence, and its lifecycle.
///
/// Constructed explicitly and shared via `Arc`; timer tasks hold only a
/// `Weak` back-reference, so dropping the last external handle shuts the
/// store down.
pub struct SessionStore {
    me: Weak<SessionStore>,
    api: Arc<ApiClient>,
    storage: Arc<dyn SessionStorage>,
    cipher: SessionCipher,
    config: SessionConfig,
    /// In-memory copy of the envelope; durable storage is the fallback
    cached: RwLock<Option<SealedSession>>,
    timers: Mutex<SessionTimers>,
    active: AtomicBool,
    renewing: AtomicBool,
    validating: AtomicBool,
    retry_count: AtomicU32,
    last_validation: Mutex<Option<Instant>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionStore {
    /// Create a store, loading or generating the envelope key.
    pub async fn new(
        api: Arc<ApiClient>,
        storage: Arc<dyn SessionStorage>,
        config: SessionConfig,
    ) -> Result<Arc<Self>, SessionError> {
        let key = match storage.load_key().await.map_err(SessionError::Storage)? {
            Some(key) => key,
            None => {
                debug!("Generating new session key");
                let key = SessionCipher::generate_key();
                storage
                    .store_key(&key)
                    .await
                    .map_err(SessionError::Storage)?;
                key
            }
        };
        let cipher = SessionCipher::from_key(&key).map_err(SessionError::Crypto)?;

        let (events, _) = broadcast::channel(32);

        Ok(Arc::new_cyclic(|me| Self {
            me: me.clone(),
            api,
            storage,
            cipher,
            config,
            cached: RwLock::new(None),
            timers: Mutex::new(SessionTimers::default()),
            active: AtomicBool::new(false),
            renewing: AtomicBool::new(false),
            validating: AtomicBool::new(false),
            retry_count: AtomicU32::new(0),
            last_validation: Mutex::new(None),
            events,
        }))
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Replace the session with a fresh record for `user`.
    ///
    /// Never fails: if sealing or persisting goes wrong the session is
    /// cleared and the error logged.
    pub async fn set_session(&self, user: UserData) {
        let session = SessionData::new(user);
        debug!("Setting session for user {}", session.user.name);

        let captured_at = Utc::now();
        if let Err(e) = self.seal_and_write(&session, captured_at).await {
            error!("Failed to persist session: {}", e);
            self.clear_session().await;
            return;
        }

        self.retry_count.store(0, Ordering::SeqCst);
        self.renewing.store(false, Ordering::SeqCst);
        self.arm_timers_for(captured_at);
        let _ = self.events.send(SessionEvent::Created);
    }

    /// Read the current session.
    ///
    /// Returns `None` once the envelope is older than the configured timeout
    /// (clearing it in the process) or when decryption fails. When remaining
    /// validity is inside the renewal threshold an asynchronous renewal is
    /// triggered, at most one at a time.
    pub async fn get_session(&self) -> Option<SessionData> {
        let envelope = self.load_envelope().await?;

        let elapsed = Utc::now() - envelope.captured_at;
        let timeout = chrono::Duration::seconds(self.config.timeout_secs as i64);
        if elapsed >= timeout {
            debug!("Session envelope is older than the timeout, expiring");
            self.expire_session().await;
            return None;
        }

        let session = match self.cipher.open(&envelope.payload) {
            Ok(session) => session,
            Err(e) => {
                warn!("Discarding undecryptable session: {}", e);
                self.clear_session().await;
                return None;
            }
        };

        let remaining = timeout - elapsed;
        if remaining <= chrono::Duration::seconds(self.config.renewal_threshold_secs as i64) {
            self.spawn_renewal();
        }

        Some(session)
    }

    /// Whether a fresh session envelope is present, without decrypting it
    /// and without recovering or renewing anything.
    pub async fn has_active_session(&self) -> bool {
        match self.peek_envelope().await {
            Some(envelope) => {
                let elapsed = Utc::now() - envelope.captured_at;
                elapsed < chrono::Duration::seconds(self.config.timeout_secs as i64)
            }
            None => false,
        }
    }

    /// Add `key` to the session data map. Fails if the key already exists.
    pub async fn create(&self, key: &str, value: serde_json::Value) -> Result<(), SessionError> {
        self.update_session(|session| {
            if session.data.contains_key(key) {
                return Err(SessionError::KeyExists(key.to_string()));
            }
            session.data.insert(key.to_string(), value);
            Ok(())
        })
        .await
    }

    /// Read a value from the session data map.
    pub async fn read(&self, key: &str) -> Option<serde_json::Value> {
        self.get_session().await?.data.get(key).cloned()
    }

    /// Replace an existing value. Fails if the key is absent.
    pub async fn update(&self, key: &str, value: serde_json::Value) -> Result<(), SessionError> {
        self.update_session(|session| {
            if !session.data.contains_key(key) {
                return Err(SessionError::KeyNotFound(key.to_string()));
            }
            session.data.insert(key.to_string(), value);
            Ok(())
        })
        .await
    }

    /// Remove a value. Fails if the key is absent.
    pub async fn delete(&self, key: &str) -> Result<(), SessionError> {
        self.update_session(|session| {
            if session.data.remove(key).is_none() {
                return Err(SessionError::KeyNotFound(key.to_string()));
            }
            Ok(())
        })
        .await
    }

    /// Drop the session: cancel timers, wipe both stores, reset flags.
    pub async fn clear_session(&self) {
        debug!("Clearing session");
        let cleared = self.clear_inner().await;
        if cleared {
            let _ = self.events.send(SessionEvent::Cleared);
        }
        // Last: aborting may cancel the very task running this method
        self.cancel_timers();
    }

    /// Force a server round-trip and overwrite the session with canonical
    /// user data.
    pub async fn refresh_session(&self) -> Result<UserData, ApiError> {
        info!("Refreshing session from server");
        let user = self.api.user_info().await?;
        self.set_session(user.clone()).await;
        Ok(user)
    }

    /// Renew the session's server-side validity.
    ///
    /// A second call while one is in flight is a no-op (`InFlight`).
    pub async fn renew_session(&self) -> RenewOutcome {
        if !self.has_active_session().await {
            return RenewOutcome::NoSession;
        }

        if self.renewing.swap(true, Ordering::SeqCst) {
            debug!("Renewal already in flight, skipping");
            return RenewOutcome::InFlight;
        }

        let outcome = self.renew_inner().await;
        self.renewing.store(false, Ordering::SeqCst);
        outcome
    }

    async fn renew_inner(&self) -> RenewOutcome {
        info!("Renewing session");
        self.retry_count.store(0, Ordering::SeqCst);

        let result = retry_with_backoff(
            &self.config.retry(),
            |e: &ApiError| e.is_network_related(),
            || {
                self.retry_count.fetch_add(1, Ordering::SeqCst);
                let api = Arc::clone(&self.api);
                async move { api.renew().await }
            },
        )
        .await;

        match result {
            Ok(()) => {
                self.retry_count.store(0, Ordering::SeqCst);
                // Renewal restarts the validity window: fresh capture
                self.stamp_validated(true, SessionEvent::Renewed).await;
                info!("Session renewed");
                RenewOutcome::Renewed
            }
            Err(ApiError::Unauthorized) => {
                warn!("Renewal rejected by server, expiring session");
                self.expire_session().await;
                RenewOutcome::Expired
            }
            Err(e) => {
                warn!("Renewal failed after retries, expiring session: {}", e);
                self.expire_session().await;
                RenewOutcome::Expired
            }
        }
    }

    /// Confirm the session with the server.
    ///
    /// Skipped inside the cooldown window and while another validation is in
    /// flight. Unauthorized responses clear immediately; transient failures
    /// are retried with backoff, then treated as expiry.
    pub async fn validate_session(&self) -> ValidateOutcome {
        if !self.has_active_session().await {
            return ValidateOutcome::NoSession;
        }

        {
            let mut last = self.last_validation.lock().unwrap();
            if let Some(at) = *last {
                if at.elapsed() < self.config.validation_cooldown() {
                    debug!("Validation suppressed by cooldown window");
                    return ValidateOutcome::Skipped;
                }
            }
            *last = Some(Instant::now());
        }

        if self.validating.swap(true, Ordering::SeqCst) {
            debug!("Validation already in flight, skipping");
            return ValidateOutcome::Skipped;
        }

        let outcome = self.validate_inner().await;
        self.validating.store(false, Ordering::SeqCst);
        outcome
    }

    async fn validate_inner(&self) -> ValidateOutcome {
        debug!("Validating session with server");
        self.retry_count.store(0, Ordering::SeqCst);

        let result = retry_with_backoff(
            &self.config.retry(),
            |e: &ApiError| e.is_network_related(),
            || {
                self.retry_count.fetch_add(1, Ordering::SeqCst);
                let api = Arc::clone(&self.api);
                async move { api.validate().await }
            },
        )
        .await;

        match result {
            Ok(()) => {
                self.retry_count.store(0, Ordering::SeqCst);
                // Validation confirms the session but does not extend it
                self.stamp_validated(false, SessionEvent::Validated).await;
                ValidateOutcome::Valid
            }
            Err(ApiError::Unauthorized) => {
                warn!("Session no longer accepted by server");
                self.expire_session().await;
                ValidateOutcome::Expired
            }
            Err(e) => {
                warn!(
                    "Validation failed after {} attempts, expiring session: {}",
                    self.config.max_retries, e
                );
                self.expire_session().await;
                ValidateOutcome::Expired
            }
        }
    }

    /// Point-in-time snapshot for observers.
    pub async fn session_info(&self) -> SessionInfo {
        let is_renewing = self.renewing.load(Ordering::SeqCst);
        let retry_count = self.retry_count.load(Ordering::SeqCst);

        let Some(envelope) = self.peek_envelope().await else {
            return SessionInfo {
                is_valid: false,
                time_remaining_secs: 0,
                last_validated: None,
                needs_validation: false,
                is_renewing,
                retry_count,
            };
        };

        let elapsed = (Utc::now() - envelope.captured_at)
            .to_std()
            .unwrap_or_default();
        let remaining = self.config.timeout().saturating_sub(elapsed);
        let last_validated = self.cipher.open(&envelope.payload).ok().map(|s| s.last_validated);
        let needs_validation = match last_validated {
            Some(at) => Utc::now() - at >= chrono::Duration::seconds(self.config.validation_interval_secs as i64),
            None => true,
        };

        SessionInfo {
            is_valid: !remaining.is_zero(),
            time_remaining_secs: remaining.as_secs(),
            last_validated,
            needs_validation,
            is_renewing,
            retry_count,
        }
    }

    // ── internals ──

    /// Read-modify-write on the session record. Every successful mutation
    /// re-captures the envelope and re-arms the timers.
    async fn update_session<F>(&self, mutate: F) -> Result<(), SessionError>
    where
        F: FnOnce(&mut SessionData) -> Result<(), SessionError>,
    {
        let mut session = self.get_session().await.ok_or(SessionError::NoSession)?;
        mutate(&mut session)?;
        session.last_modified = Utc::now();

        let captured_at = Utc::now();
        self.seal_and_write(&session, captured_at).await?;
        self.arm_timers_for(captured_at);
        let _ = self.events.send(SessionEvent::Updated);
        Ok(())
    }

    async fn seal_and_write(
        &self,
        session: &SessionData,
        captured_at: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        let payload = self.cipher.seal(session).map_err(SessionError::Crypto)?;
        let envelope = SealedSession {
            captured_at,
            payload,
        };

        *self.cached.write().await = Some(envelope.clone());
        self.active.store(true, Ordering::SeqCst);
        self.storage
            .store_envelope(&envelope)
            .await
            .map_err(SessionError::Storage)
    }

    /// Read the envelope without recovering it: cache first, then durable
    /// storage, with no caching or timer side effects. Probe and snapshot
    /// paths use this so observing a session never starts its lifecycle.
    async fn peek_envelope(&self) -> Option<SealedSession> {
        if let Some(envelope) = self.cached.read().await.clone() {
            return Some(envelope);
        }

        match self.storage.load_envelope().await {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Failed to read persisted session: {}", e);
                None
            }
        }
    }

    /// Cached envelope, falling back to durable storage (cross-restart
    /// recovery). Recovery re-arms the timers for the remaining validity.
    async fn load_envelope(&self) -> Option<SealedSession> {
        if let Some(envelope) = self.cached.read().await.clone() {
            return Some(envelope);
        }

        match self.storage.load_envelope().await {
            Ok(Some(envelope)) => {
                debug!("Recovered persisted session envelope");
                *self.cached.write().await = Some(envelope.clone());
                self.active.store(true, Ordering::SeqCst);
                self.arm_timers_for(envelope.captured_at);
                Some(envelope)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to read persisted session: {}", e);
                None
            }
        }
    }

    /// Re-stamp `last_validated`, optionally extending the validity window.
    async fn stamp_validated(&self, extend: bool, event: SessionEvent) {
        let Some(envelope) = self.load_envelope().await else {
            return;
        };
        let mut session = match self.cipher.open(&envelope.payload) {
            Ok(session) => session,
            Err(e) => {
                warn!("Discarding undecryptable session: {}", e);
                self.clear_session().await;
                return;
            }
        };

        session.last_validated = Utc::now();
        let captured_at = if extend {
            Utc::now()
        } else {
            envelope.captured_at
        };

        match self.seal_and_write(&session, captured_at).await {
            Ok(()) => {
                self.arm_timers_for(captured_at);
                let _ = self.events.send(event);
            }
            Err(e) => {
                error!("Failed to persist session stamp: {}", e);
                self.clear_session().await;
            }
        }
    }

    /// Expire the session, emitting `Expired` at most once per session.
    async fn expire_session(&self) {
        let cleared = self.clear_inner().await;
        if cleared {
            info!("Session expired");
            let _ = self.events.send(SessionEvent::Expired);
        }
        self.cancel_timers();
    }

    /// Wipe both stores and reset per-session state. Returns whether the
    /// session was still active, which gates the lifecycle event so that the
    /// expiry timer, a concurrent read, and a failed validation cannot
    /// double-report the same expiry. The `active` swap is the sole gate:
    /// every path that fills the cache slot also sets the flag, and the swap
    /// is atomic where a combined check of flag and slot would not be.
    async fn clear_inner(&self) -> bool {
        let was_active = self.active.swap(false, Ordering::SeqCst);
        self.cached.write().await.take();

        if let Err(e) = self.storage.remove_envelope().await {
            warn!("Failed to remove persisted session: {}", e);
        }

        self.retry_count.store(0, Ordering::SeqCst);
        self.renewing.store(false, Ordering::SeqCst);
        self.validating.store(false, Ordering::SeqCst);
        *self.last_validation.lock().unwrap() = None;

        was_active
    }

    fn spawn_renewal(&self) {
        if self.renewing.load(Ordering::SeqCst) {
            return;
        }
        let me = self.me.clone();
        tokio::spawn(async move {
            if let Some(store) = me.upgrade() {
                store.renew_session().await;
            }
        });
    }

    fn cancel_timers(&self) {
        if let Ok(mut timers) = self.timers.lock() {
            timers.abort_all();
        }
    }

    /// Arm all three timers relative to the envelope's capture time.
    fn arm_timers_for(&self, captured_at: DateTime<Utc>) {
        let elapsed = (Utc::now() - captured_at).to_std().unwrap_or_default();
        let remaining = self.config.timeout().saturating_sub(elapsed);

        self.arm_expiry_timer(remaining);
        self.arm_renewal_timer(remaining.saturating_sub(self.config.renewal_threshold()));
        self.arm_validation_timer(self.config.validation_interval());
    }

    fn arm_expiry_timer(&self, delay: Duration) {
        let me = self.me.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(store) = me.upgrade() {
                store.expire_session().await;
            }
        });
        if let Some(old) = self.timers.lock().unwrap().expiry.replace(handle) {
            old.abort();
        }
    }

    fn arm_renewal_timer(&self, delay: Duration) {
        let me = self.me.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(store) = me.upgrade() {
                store.renew_session().await;
            }
        });
        if let Some(old) = self.timers.lock().unwrap().renewal.replace(handle) {
            old.abort();
        }
    }

    fn arm_validation_timer(&self, interval: Duration) {
        let me = self.me.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(store) = me.upgrade() else { break };
                store.validate_session().await;
            }
        });
        if let Some(old) = self.timers.lock().unwrap().validation.replace(handle) {
            old.abort();
        }
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        if let Ok(mut timers) = self.timers.lock() {
            timers.abort_all();
        }
    }
}
