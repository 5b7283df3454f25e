/// Typed failure categories for backend calls.
///
/// Callers branch on the category instead of matching error message text:
/// `Unauthorized` ends the session immediately, everything network-related is
/// a candidate for bounded retry.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("server returned status {0}")]
    Server(u16),
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Whether this failure looks like a transient network or server problem.
    pub fn is_network_related(&self) -> bool {
        match self {
            ApiError::Timeout | ApiError::Network(_) => true,
            ApiError::Server(status) => *status >= 500,
            _ => false,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout
        } else if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Network(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_related_classification() {
        assert!(ApiError::Timeout.is_network_related());
        assert!(ApiError::Network("connection refused".to_string()).is_network_related());
        assert!(ApiError::Server(503).is_network_related());

        assert!(!ApiError::Server(404).is_network_related());
        assert!(!ApiError::Unauthorized.is_network_related());
        assert!(!ApiError::Decode("bad json".to_string()).is_network_related());
    }

    #[test]
    fn test_unauthorized_is_terminal() {
        assert!(ApiError::Unauthorized.is_unauthorized());
        assert!(!ApiError::Timeout.is_unauthorized());
    }
}
