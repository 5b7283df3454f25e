// Connectivity and session observation

use crate::session::{SessionInfo, SessionStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Tracks online/offline state and keeps an eye on session health.
///
/// The application reports connectivity transitions (the browser's
/// online/offline events in the original portal); regaining connectivity
/// triggers a validation round-trip, which the store's cooldown window
/// debounces when transitions arrive in bursts.
pub struct ConnectivityMonitor {
    store: Arc<SessionStore>,
    online: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    pub fn new(store: Arc<SessionStore>) -> Self {
        let (online, _) = watch::channel(true);
        Self { store, online }
    }

    pub fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    /// Observe connectivity changes.
    pub fn watch_online(&self) -> watch::Receiver<bool> {
        self.online.subscribe()
    }

    /// Report a connectivity transition. Repeated reports of the same state
    /// are ignored.
    pub async fn set_online(&self, online: bool) {
        if *self.online.borrow() == online {
            return;
        }
        self.online.send_replace(online);

        if online {
            info!("Connection restored");
            self.store.validate_session().await;
        } else {
            warn!("Connection lost");
        }
    }

    /// Periodically log a session health snapshot.
    pub fn spawn_sampler(&self, interval: Duration) -> JoinHandle<()> {
        let store = Arc::downgrade(&self.store);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(store) = store.upgrade() else { break };
                let info: SessionInfo = store.session_info().await;
                debug!(
                    valid = info.is_valid,
                    remaining_secs = info.time_remaining_secs,
                    needs_validation = info.needs_validation,
                    renewing = info.is_renewing,
                    retries = info.retry_count,
                    "session status"
                );
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiClient;
    use crate::config::PortalConfig;
    use crate::session::{MemorySessionStorage, SessionConfig};

    async fn monitor() -> ConnectivityMonitor {
        let mut config = PortalConfig::default();
        config.api_base_url = "http://127.0.0.1:9".to_string();
        config.request_timeout_secs = 1;

        let api = Arc::new(ApiClient::new(&config).unwrap());
        let store = SessionStore::new(
            api,
            Arc::new(MemorySessionStorage::new()),
            SessionConfig::default(),
        )
        .await
        .unwrap();
        ConnectivityMonitor::new(store)
    }

    #[tokio::test]
    async fn test_starts_online() {
        assert!(monitor().await.is_online());
    }

    #[tokio::test]
    async fn test_transitions_are_observable() {
        let monitor = monitor().await;
        let mut rx = monitor.watch_online();

        monitor.set_online(false).await;
        assert!(rx.has_changed().unwrap());
        assert!(!*rx.borrow_and_update());
        assert!(!monitor.is_online());

        monitor.set_online(true).await;
        assert!(*rx.borrow_and_update());
    }

    #[tokio::test]
    async fn test_repeated_state_is_ignored() {
        let monitor = monitor().await;
        let mut rx = monitor.watch_online();

        monitor.set_online(true).await;
        assert!(!rx.has_changed().unwrap());
    }
}
