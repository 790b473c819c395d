//! Error types for the XMLHttpRequest engine
//!
//! Only [`XhrError`] is ever returned to script-facing callers. Network and
//! parse failures are observable through readyState, status and events.

use thiserror::Error;

/// Usage errors surfaced synchronously to the caller
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum XhrError {
    /// Method called in the wrong readyState or while a send is pending
    #[error("InvalidStateError: {0}")]
    InvalidState(&'static str),
    /// Malformed method, URL, header name or header value
    #[error("SyntaxError: {0}")]
    Syntax(String),
    /// Operation not permitted for synchronous requests
    #[error("InvalidAccessError: {0}")]
    InvalidAccess(&'static str),
}

/// Network-level failures reported by a [`crate::network::NetworkExecutor`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    /// Host name could not be resolved
    #[error("DNS resolution failed: {0}")]
    DnsResolution(String),
    /// Connection refused or could not be established
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    /// Request exceeded its timeout
    #[error("request timed out")]
    Timeout,
    /// TLS/SSL handshake error
    #[error("TLS error: {0}")]
    Tls(String),
    /// Transport broke while transferring the response
    #[error("transport error: {0}")]
    Transport(String),
    /// Executor delivered events out of order
    #[error("protocol violation: {0}")]
    Protocol(String),
    /// URL cannot be fetched by this executor
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl NetworkError {
    /// Whether this failure should surface as a `timeout` event
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

/// Document parsing errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// XML is not well-formed
    #[error("XML parse error: {0}")]
    Xml(String),
    /// HTML could not be parsed
    #[error("HTML parse error: {0}")]
    Html(String),
}

/// Failures while setting up a script context
#[derive(Debug, Error)]
pub enum EngineError {
    /// The worker runtime could not be started
    #[error("failed to start worker runtime: {0}")]
    Runtime(#[from] std::io::Error),
    /// The HTTP executor could not be built
    #[error("failed to build network executor: {0}")]
    Network(#[from] NetworkError),
}

/// Convenience Result type for script-facing operations
pub type Result<T> = std::result::Result<T, XhrError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = XhrError::InvalidState("send() requires OPENED");
        assert_eq!(err.to_string(), "InvalidStateError: send() requires OPENED");

        let err = NetworkError::DnsResolution("this.doesnt.exist".into());
        assert!(err.to_string().contains("this.doesnt.exist"));
    }

    #[test]
    fn test_timeout_classification() {
        assert!(NetworkError::Timeout.is_timeout());
        assert!(!NetworkError::ConnectionFailed("refused".into()).is_timeout());
    }

    #[test]
    fn test_engine_error_from_network() {
        let err: EngineError = NetworkError::Tls("bad certificate".into()).into();
        assert!(matches!(err, EngineError::Network(NetworkError::Tls(_))));
        assert!(err.to_string().contains("bad certificate"));
    }
}
