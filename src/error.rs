//! Error types and handling for Chargeshare
//!
//! Errors only surface at the edges of the system: configuration loading,
//! logging setup and the work queue. The control loop itself never returns
//! an error for a station; degraded conditions reduce to "allocate 0".

use thiserror::Error;

/// Result type alias for Chargeshare operations
pub type Result<T> = std::result::Result<T, ChargeShareError>;

/// Main error type for Chargeshare
#[derive(Debug, Error)]
pub enum ChargeShareError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Station communication errors
    #[error("Station error: {station} - {message}")]
    Station { station: String, message: String },

    /// Work queue closed or full
    #[error("Queue error: {message}")]
    Queue { message: String },
}

impl ChargeShareError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        ChargeShareError::Config {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        ChargeShareError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        ChargeShareError::Io {
            message: message.into(),
        }
    }

    /// Create a new station error
    pub fn station<I: Into<String>, M: Into<String>>(station: I, message: M) -> Self {
        ChargeShareError::Station {
            station: station.into(),
            message: message.into(),
        }
    }

    /// Create a new queue error
    pub fn queue<S: Into<String>>(message: S) -> Self {
        ChargeShareError::Queue {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for ChargeShareError {
    fn from(err: std::io::Error) -> Self {
        ChargeShareError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for ChargeShareError {
    fn from(err: serde_yaml::Error) -> Self {
        ChargeShareError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ChargeShareError {
    fn from(err: serde_json::Error) -> Self {
        ChargeShareError::Serialization {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = ChargeShareError::config("test config error");
        assert!(matches!(err, ChargeShareError::Config { .. }));

        let err = ChargeShareError::station("s1", "offline");
        assert!(matches!(err, ChargeShareError::Station { .. }));

        let err = ChargeShareError::validation("field", "test validation error");
        assert!(matches!(err, ChargeShareError::Validation { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = ChargeShareError::config("test error");
        assert_eq!(format!("{}", err), "Configuration error: test error");

        let err = ChargeShareError::validation("test_field", "invalid value");
        assert_eq!(
            format!("{}", err),
            "Validation error: test_field - invalid value"
        );

        let err = ChargeShareError::station("s1", "unreachable");
        assert_eq!(format!("{}", err), "Station error: s1 - unreachable");
    }
}
