// Tracing subscriber setup

use crate::config::PortalConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global tracing subscriber.
///
/// `PORTAL_LOG` and `RUST_LOG` take precedence over the configured filter.
/// Safe to call more than once; later calls are no-ops.
pub fn init(config: &PortalConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_env("PORTAL_LOG")
        .or_else(|_| tracing_subscriber::EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let config = PortalConfig::default();
        init(&config);
        init(&config);
    }
}
