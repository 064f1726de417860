//! Error types for the forwarder.

use thiserror::Error;

/// Result type alias using the forwarder's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for forwarder operations.
///
/// The first five variants form the failure taxonomy of a pipeline:
/// configuration and topology problems are fatal at startup, resource
/// problems are fatal only when hit synchronously, and delivery/transport
/// problems are handled inside a running stage.
#[derive(Error, Debug)]
pub enum Error {
    /// Bad or missing settings, or an unknown plugin name.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An external dependency could not be reached or prepared.
    #[error("resource error: {0}")]
    Resource(String),

    /// A single message was rejected (oversize, malformed payload).
    #[error("delivery error: {0}")]
    Delivery(String),

    /// The feed or an edge failed while moving records.
    #[error("transport error: {0}")]
    Transport(String),

    /// The pipeline does not have exactly one source, transform and sink.
    #[error("topology error: {0}")]
    Topology(String),

    /// A lifecycle operation was invoked from the wrong stage state.
    #[error("stage '{stage}' cannot {operation} while {state}")]
    InvalidState {
        /// Name of the stage.
        stage: String,
        /// Operation that was attempted.
        operation: &'static str,
        /// State the stage was in.
        state: &'static str,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed.
    #[error("config parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl Error {
    /// Whether this error belongs to the configuration class.
    ///
    /// Topology and parse errors are configuration problems too: all of them
    /// abort startup and are never retried.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::Configuration(_) | Error::Topology(_) | Error::TomlParse(_)
        )
    }

    /// Whether a running stage should drop the current message and continue.
    pub fn is_delivery(&self) -> bool {
        matches!(self, Error::Delivery(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert!(Error::Configuration("x".into()).is_configuration());
        assert!(Error::Topology("x".into()).is_configuration());
        assert!(!Error::Resource("x".into()).is_configuration());
        assert!(Error::Delivery("x".into()).is_delivery());
        assert!(!Error::Transport("x".into()).is_delivery());
    }

    #[test]
    fn test_invalid_state_message() {
        let err = Error::InvalidState {
            stage: "kafka_consumer".into(),
            operation: "start",
            state: "constructed",
        };
        assert_eq!(
            err.to_string(),
            "stage 'kafka_consumer' cannot start while constructed"
        );
    }
}
