use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Core error types for the Relay platform
#[derive(Error, Debug)]
pub enum Error {
    #[error("Event error: {message}")]
    Event { message: String },

    #[error("Job error: {message}")]
    Job { message: String },

    #[error("Transition error: {message}")]
    Transition { message: String },

    #[error("Store error: {message}")]
    Store { message: String },

    #[error("Schedule error: {message}")]
    Schedule { message: String },

    #[error("Lock error: {message}")]
    Lock { message: String },

    #[error("PubSub error: {message}")]
    PubSub { message: String },

    #[error("Execution error: {message}")]
    Execution { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("{message}{}", format_validations(.validations))]
    Validation {
        message: String,
        validations: Vec<Validation>,
    },

    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },

    #[error("Generic error: {message}")]
    Generic { message: String },
}

impl Error {
    /// Create a new event error
    pub fn event(message: impl Into<String>) -> Self {
        Self::Event {
            message: message.into(),
        }
    }

    /// Create a new job error
    pub fn job(message: impl Into<String>) -> Self {
        Self::Job {
            message: message.into(),
        }
    }

    /// Create a new transition error
    pub fn transition(message: impl Into<String>) -> Self {
        Self::Transition {
            message: message.into(),
        }
    }

    /// Create a new store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create a new schedule error
    pub fn schedule(message: impl Into<String>) -> Self {
        Self::Schedule {
            message: message.into(),
        }
    }

    /// Create a new lock error
    pub fn lock(message: impl Into<String>) -> Self {
        Self::Lock {
            message: message.into(),
        }
    }

    /// Create a new pubsub error
    pub fn pubsub(message: impl Into<String>) -> Self {
        Self::PubSub {
            message: message.into(),
        }
    }

    /// Create a new execution error
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new validation error from a report
    pub fn validation(message: impl Into<String>, validations: Vec<Validation>) -> Self {
        Self::Validation {
            message: message.into(),
            validations,
        }
    }

    /// Create a new generic error
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }
}

/// One entry of a validation report. An error can carry several validations,
/// each pointing at the offending part of the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validation {
    /// The validation message
    pub message: String,
    /// Where the validation failed, outermost element first
    pub path: Vec<String>,
}

impl Validation {
    /// Create a new validation entry
    pub fn new(message: impl Into<String>, path: &[&str]) -> Self {
        Self {
            message: message.into(),
            path: path.iter().map(|p| p.to_string()).collect(),
        }
    }
}

fn format_validations(validations: &[Validation]) -> String {
    let mut out = String::new();
    for validation in validations {
        out.push_str("\n  - ");
        out.push_str(&validation.message);
    }
    out
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_error_creation() {
        let fixture = "test error message";
        let actual = Error::event(fixture);
        let expected = Error::Event {
            message: "test error message".to_string(),
        };
        assert_eq!(format!("{}", actual), format!("{}", expected));
    }

    #[test]
    fn test_error_from_serde() {
        let fixture = serde_json::from_str::<serde_json::Value>("invalid json");
        let actual = Error::from(fixture.unwrap_err());
        assert!(matches!(actual, Error::Serialization { .. }));
    }

    #[test]
    fn test_validation_error_display() {
        let fixture = Error::validation(
            "destination: Failed to register",
            vec![
                Validation::new("Destination ID must not be empty", &["Destination", "name"]),
                Validation::new("Action ID must not be empty", &["Destination", "actions"]),
            ],
        );
        let actual = format!("{}", fixture);
        assert!(actual.contains("destination: Failed to register"));
        assert!(actual.contains("- Destination ID must not be empty"));
        assert!(actual.contains("- Action ID must not be empty"));
    }
}
