// src/error.rs
use thiserror::Error;

/// Coarse failure class used by the retry policy.
///
/// Network failures and server-side errors are transient by assumption;
/// client-side errors mean the request itself is wrong and must not be
/// replayed, with the 408/429 exceptions the platform documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Network,
    Client,
    Server,
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error: status {0}")]
    Http(u16),

    #[error("Session expired or invalid")]
    Unauthorized,

    #[error("API error {code}: {message}")]
    Api { code: String, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Ride already terminated: {0}")]
    RideTerminated(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Paid stop already running")]
    PaidStopAlreadyRunning,

    #[error("No paid stop running")]
    PaidStopNotRunning,

    #[error("Payment submission failed: {0}")]
    PaymentFailed(String),

    #[error("Gateway connection error: {0}")]
    GatewayConnection(String),

    #[error("Gateway handshake rejected: {0}")]
    GatewayHandshake(String),

    #[error("Not logged in")]
    NotLoggedIn,

    #[error("Session store error: {0}")]
    SessionStore(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Classify per the platform's error handling contract.
    pub fn class(&self) -> Option<ErrorClass> {
        match self {
            EngineError::Network(_) | EngineError::GatewayConnection(_) => {
                Some(ErrorClass::Network)
            }
            EngineError::Http(status) if *status >= 500 => Some(ErrorClass::Server),
            EngineError::Http(_) | EngineError::Unauthorized => Some(ErrorClass::Client),
            _ => None,
        }
    }

    /// Whether the request that produced this error may be retried.
    ///
    /// Network errors and 5xx retry; 4xx never retry except 408 and 429.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Network(_) | EngineError::GatewayConnection(_) => true,
            EngineError::Http(status) => *status >= 500 || *status == 408 || *status == 429,
            _ => false,
        }
    }

    pub fn error_code(&self) -> &str {
        match self {
            EngineError::Network(_) => "network_error",
            EngineError::Http(_) => "http_error",
            EngineError::Unauthorized => "unauthorized",
            EngineError::Api { .. } => "api_error",
            EngineError::Parse(_) => "parse_error",
            EngineError::OrderNotFound(_) => "order_not_found",
            EngineError::RideTerminated(_) => "ride_terminated",
            EngineError::InvalidTransition(_) => "invalid_transition",
            EngineError::PaidStopAlreadyRunning => "paid_stop_already_running",
            EngineError::PaidStopNotRunning => "paid_stop_not_running",
            EngineError::PaymentFailed(_) => "payment_failed",
            EngineError::GatewayConnection(_) => "gateway_connection_error",
            EngineError::GatewayHandshake(_) => "gateway_handshake_error",
            EngineError::NotLoggedIn => "not_logged_in",
            EngineError::SessionStore(_) => "session_store_error",
            EngineError::Config(_) => "config_error",
            EngineError::Internal(_) => "internal_error",
        }
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            return EngineError::Network(err.to_string());
        }
        if let Some(status) = err.status() {
            if status.as_u16() == 401 {
                return EngineError::Unauthorized;
            }
            return EngineError::Http(status.as_u16());
        }
        EngineError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Parse(err.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::GatewayConnection(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(EngineError::Network("refused".into()).is_retryable());
        assert!(EngineError::Http(500).is_retryable());
        assert!(EngineError::Http(503).is_retryable());
        assert!(EngineError::Http(408).is_retryable());
        assert!(EngineError::Http(429).is_retryable());

        assert!(!EngineError::Http(400).is_retryable());
        assert!(!EngineError::Http(404).is_retryable());
        assert!(!EngineError::Unauthorized.is_retryable());
        assert!(!EngineError::PaymentFailed("declined".into()).is_retryable());
    }

    #[test]
    fn test_error_class() {
        assert_eq!(
            EngineError::Network("x".into()).class(),
            Some(ErrorClass::Network)
        );
        assert_eq!(EngineError::Http(502).class(), Some(ErrorClass::Server));
        assert_eq!(EngineError::Http(404).class(), Some(ErrorClass::Client));
        assert_eq!(EngineError::Parse("x".into()).class(), None);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(EngineError::Unauthorized.error_code(), "unauthorized");
        assert_eq!(
            EngineError::PaidStopAlreadyRunning.error_code(),
            "paid_stop_already_running"
        );
    }
}
