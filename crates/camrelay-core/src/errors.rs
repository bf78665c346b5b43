//! Error type for the relay.

use std::net::SocketAddr;

use thiserror::Error;

/// Errors raised while starting or running the relay.
///
/// The query surface itself never fails; these cover the plumbing around it.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The HTTP listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address we tried to bind.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The HTTP server stopped with an I/O error.
    #[error("http server on {addr} failed: {source}")]
    Serve {
        /// Address the server was bound to.
        addr: SocketAddr,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The pub/sub subscription could not be opened.
    #[error("failed to subscribe to {namespace}: {reason}")]
    Subscribe {
        /// Namespace we tried to join.
        namespace: String,
        /// Transport error description.
        reason: String,
    },

    /// A configuration value was rejected.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn bind_error_display() {
        let err = RelayError::Bind {
            addr: "0.0.0.0:3001".into(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert_eq!(err.to_string(), "failed to bind 0.0.0.0:3001: in use");
    }

    #[test]
    fn subscribe_error_display() {
        let err = RelayError::Subscribe {
            namespace: "/cam".into(),
            reason: "invalid url".into(),
        };
        assert_eq!(err.to_string(), "failed to subscribe to /cam: invalid url");
    }

    #[test]
    fn invalid_config_display() {
        let err = RelayError::InvalidConfig("port out of range".into());
        assert_eq!(err.to_string(), "invalid configuration: port out of range");
    }

    #[test]
    fn serve_error_keeps_source() {
        let err = RelayError::Serve {
            addr: "127.0.0.1:3001".parse().unwrap(),
            source: std::io::Error::other("boom"),
        };
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_matches!(source.as_deref(), Some("boom"));
    }
}
