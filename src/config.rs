use crate::session::SessionConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Top-level portal client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// Base URL of the portal backend API
    pub api_base_url: String,
    /// Per-request timeout for backend calls
    pub request_timeout_secs: u64,
    /// Session lifecycle tuning
    pub session: SessionConfig,
    /// Default tracing filter (overridable via PORTAL_LOG / RUST_LOG)
    pub log_filter: String,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080/api".to_string(),
            request_timeout_secs: 10,
            session: SessionConfig::default(),
            log_filter: "portal_session=info".to_string(),
        }
    }
}

impl PortalConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.api_base_url.trim().is_empty() {
            return Err("api_base_url must not be empty".to_string());
        }

        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be greater than zero".to_string());
        }

        if self.session.timeout_secs == 0 {
            return Err("session timeout must be greater than zero".to_string());
        }

        if self.session.renewal_threshold_secs >= self.session.timeout_secs {
            return Err(
                "renewal threshold must be smaller than the session timeout".to_string(),
            );
        }

        if self.session.max_retries == 0 {
            return Err("max_retries must be at least 1".to_string());
        }

        Ok(())
    }
}

/// Load configuration from a YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Arc<PortalConfig>, String> {
    let path = path.as_ref();
    info!("Loading configuration from: {}", path.display());

    let contents = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;

    let config: PortalConfig = serde_yaml::from_str(&contents)
        .map_err(|e| format!("Failed to parse YAML config: {}", e))?;

    config.validate()?;

    info!(
        "Configuration loaded: backend {} (session timeout {}s, renewal threshold {}s)",
        config.api_base_url, config.session.timeout_secs, config.session.renewal_threshold_secs
    );

    Ok(Arc::new(config))
}

/// Load configuration with fallback options
///
/// Tries `PORTAL_CONFIG_PATH`, then well-known file names, then falls back to
/// defaults with environment-variable overrides.
pub fn load_config_with_fallback() -> Result<Arc<PortalConfig>, String> {
    dotenvy::dotenv().ok();

    if let Ok(config_path) = std::env::var("PORTAL_CONFIG_PATH") {
        match load_config(&config_path) {
            Ok(config) => return Ok(config),
            Err(e) => warn!(
                "Failed to load config from PORTAL_CONFIG_PATH ({}): {}",
                config_path, e
            ),
        }
    }

    for path in ["portal.yaml", "portal.yml"] {
        if Path::new(path).exists() {
            match load_config(path) {
                Ok(config) => return Ok(config),
                Err(e) => warn!("Failed to load config from '{}': {}", path, e),
            }
        }
    }

    let mut config = PortalConfig::default();
    apply_env_overrides(&mut config);
    config.validate()?;

    info!(
        "No configuration file found, using defaults with env overrides (backend {})",
        config.api_base_url
    );

    Ok(Arc::new(config))
}

fn apply_env_overrides(config: &mut PortalConfig) {
    if let Ok(v) = std::env::var("PORTAL_API_BASE_URL") {
        config.api_base_url = v;
    }

    if let Ok(v) = std::env::var("PORTAL_SESSION_TIMEOUT_SECS") {
        match v.parse() {
            Ok(secs) => config.session.timeout_secs = secs,
            Err(_) => warn!("Ignoring non-numeric PORTAL_SESSION_TIMEOUT_SECS: {}", v),
        }
    }

    if let Ok(v) = std::env::var("PORTAL_RENEWAL_THRESHOLD_SECS") {
        match v.parse() {
            Ok(secs) => config.session.renewal_threshold_secs = secs,
            Err(_) => warn!("Ignoring non-numeric PORTAL_RENEWAL_THRESHOLD_SECS: {}", v),
        }
    }

    if let Ok(v) = std::env::var("PORTAL_LOG") {
        config.log_filter = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_valid_yaml() {
        let yaml = r#"
api_base_url: "https://portal.example.com/api"
request_timeout_secs: 5
session:
  timeout_secs: 600
  renewal_threshold_secs: 60
  max_retries: 2
"#;

        let config: PortalConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.api_base_url, "https://portal.example.com/api");
        assert_eq!(config.request_timeout_secs, 5);
        assert_eq!(config.session.timeout_secs, 600);
        assert_eq!(config.session.renewal_threshold_secs, 60);
        assert_eq!(config.session.max_retries, 2);
        // Unspecified fields keep their defaults
        assert_eq!(
            config.session.validation_interval_secs,
            SessionConfig::default().validation_interval_secs
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(PortalConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validation_empty_base_url() {
        let mut config = PortalConfig::default();
        config.api_base_url = "  ".to_string();

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("api_base_url"));
    }

    #[test]
    fn test_validation_zero_session_timeout() {
        let mut config = PortalConfig::default();
        config.session.timeout_secs = 0;

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("session timeout"));
    }

    #[test]
    fn test_validation_threshold_not_below_timeout() {
        let mut config = PortalConfig::default();
        config.session.timeout_secs = 60;
        config.session.renewal_threshold_secs = 60;

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("renewal threshold"));
    }

    #[test]
    fn test_validation_zero_retries() {
        let mut config = PortalConfig::default();
        config.session.max_retries = 0;

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("max_retries"));
    }
}
