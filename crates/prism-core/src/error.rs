//! Error types for Prism.

use thiserror::Error;

/// A shared error type for the entire Prism workspace.
///
/// Storage primitives propagate it directly. The repository and preference
/// layers absorb it into sentinel values, and the orchestrator converts it
/// into user-facing messages.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PrismError {
    /// Entity not found error with type information
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization { format: String, message: String },

    /// A node name that cannot be addressed in the namespace
    #[error("Invalid node name: '{0}'")]
    InvalidName(String),

    /// Input rejected before any side effect happened
    #[error("{0}")]
    Validation(String),

    /// Another generation is still in flight
    #[error("A generation is already in progress")]
    Busy,

    /// The remote call succeeded but yielded no usable image
    #[error("No images were generated")]
    NoImages,

    /// Remote inference API error
    #[error("API error: {message}")]
    Api {
        status: Option<u16>,
        message: String,
        retryable: bool,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PrismError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    /// Creates a NotFound error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates an IO error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates a Validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates an Api error
    pub fn api(status: Option<u16>, message: impl Into<String>, retryable: bool) -> Self {
        Self::Api {
            status,
            message: message.into(),
            retryable,
        }
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    /// Check if this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check if this is a retryable API error
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Api { retryable: true, .. })
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for PrismError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for PrismError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for PrismError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::ser::Error> for PrismError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<std::string::FromUtf8Error> for PrismError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        Self::Serialization {
            format: "UTF-8".to_string(),
            message: err.to_string(),
        }
    }
}

/// A type alias for `Result<T, PrismError>`.
pub type Result<T> = std::result::Result<T, PrismError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion_keeps_kind() {
        let err: PrismError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        match err {
            PrismError::Io { message } => assert!(message.contains("PermissionDenied")),
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn test_predicates() {
        assert!(PrismError::not_found("Conversation", "1000").is_not_found());
        assert!(PrismError::validation("missing prompt").is_validation());
        assert!(PrismError::api(Some(503), "overloaded", true).is_retryable());
        assert!(!PrismError::api(Some(400), "bad request", false).is_retryable());
    }

    #[test]
    fn test_validation_message_is_verbatim() {
        let err = PrismError::validation("Please enter a prompt");
        assert_eq!(err.to_string(), "Please enter a prompt");
    }
}
