//! Error types for the SMART authorization client.

use crate::transport::TransportError;

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, SmartError>;

/// Upstream bodies longer than this are cut before they land in an error.
pub const MAX_ERROR_BODY_LEN: usize = 512;

/// Coarse classification of a [`SmartError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Discovery,
    Auth,
    Validation,
    Network,
}

/// Errors that can occur while discovering a server or running the flow.
#[derive(Debug, thiserror::Error)]
pub enum SmartError {
    /// Invalid configuration value, missing scope or missing secret.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// One or more required configuration attributes are absent.
    #[error("Missing required configuration: {}", .fields.join(", "))]
    MissingConfiguration { fields: Vec<String> },

    /// Unknown client authentication mode.
    #[error("Invalid auth type '{value}'. Valid types: {}", .valid.join(", "))]
    InvalidAuthType {
        value: String,
        valid: Vec<&'static str>,
    },

    /// The SMART configuration document could not be fetched or is unusable.
    #[error("Discovery failed for {endpoint}: {message}")]
    Discovery {
        endpoint: String,
        status: Option<u16>,
        message: String,
    },

    /// Token exchange or refresh failed.
    #[error("Authorization failed at {endpoint}: {message}")]
    Auth {
        endpoint: String,
        status: Option<u16>,
        message: String,
    },

    /// Malformed PKCE input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Transport failure below the protocol layer.
    #[error("Network error: {0}")]
    Network(#[from] TransportError),
}

impl SmartError {
    /// The taxonomy bucket this error falls into.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SmartError::Configuration(_)
            | SmartError::MissingConfiguration { .. }
            | SmartError::InvalidAuthType { .. } => ErrorKind::Configuration,
            SmartError::Discovery { .. } => ErrorKind::Discovery,
            SmartError::Auth { .. } => ErrorKind::Auth,
            SmartError::Validation(_) => ErrorKind::Validation,
            SmartError::Network(_) => ErrorKind::Network,
        }
    }

    /// HTTP status reported by the upstream server, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            SmartError::Discovery { status, .. } | SmartError::Auth { status, .. } => *status,
            SmartError::Network(e) => e.status(),
            _ => None,
        }
    }

    pub fn is_configuration(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }

    pub fn is_discovery(&self) -> bool {
        self.kind() == ErrorKind::Discovery
    }

    pub fn is_auth(&self) -> bool {
        self.kind() == ErrorKind::Auth
    }

    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    pub(crate) fn discovery(endpoint: &str, message: impl Into<String>) -> Self {
        SmartError::Discovery {
            endpoint: endpoint.to_string(),
            status: None,
            message: message.into(),
        }
    }

    pub(crate) fn auth(endpoint: &str, message: impl Into<String>) -> Self {
        SmartError::Auth {
            endpoint: endpoint.to_string(),
            status: None,
            message: message.into(),
        }
    }
}

/// Cut an upstream body down to [`MAX_ERROR_BODY_LEN`] characters.
pub(crate) fn truncate_body(body: &str) -> String {
    if body.chars().count() <= MAX_ERROR_BODY_LEN {
        return body.to_string();
    }
    let cut: String = body.chars().take(MAX_ERROR_BODY_LEN).collect();
    format!("{}... (truncated)", cut)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_configuration_lists_every_field() {
        let err = SmartError::MissingConfiguration {
            fields: vec!["client_id".to_string(), "redirect_uri".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Missing required configuration: client_id, redirect_uri"
        );
        assert!(err.is_configuration());
    }

    #[test]
    fn test_invalid_auth_type_message() {
        let err = SmartError::InvalidAuthType {
            value: "magic".to_string(),
            valid: vec!["public", "confidential_symmetric"],
        };
        let msg = err.to_string();
        assert!(msg.contains("'magic'"));
        assert!(msg.contains("public, confidential_symmetric"));
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_network_kind_and_status() {
        let err = SmartError::from(TransportError::Status {
            status: 503,
            body: "down".to_string(),
        });
        assert_eq!(err.kind(), ErrorKind::Network);
        assert_eq!(err.status(), Some(503));
    }

    #[test]
    fn test_truncate_body() {
        assert_eq!(truncate_body("short"), "short");

        let long = "x".repeat(MAX_ERROR_BODY_LEN + 100);
        let cut = truncate_body(&long);
        assert!(cut.ends_with("... (truncated)"));
        assert_eq!(cut.chars().filter(|c| *c == 'x').count(), MAX_ERROR_BODY_LEN);
    }
}
