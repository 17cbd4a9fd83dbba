//! Error types for hotswap-daemon.

use std::fmt;

/// Result type alias for hotswap-daemon operations.
pub type Result<T> = std::result::Result<T, FrameError>;

/// Errors raised while assembling, running or stopping a daemon.
///
/// Errors from the front-loaded phases (import, start) abort the launch. Errors
/// from the steady-state phase (config reload, component stop) are logged by the
/// framework and never propagate past the subsystem that produced them.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The launch descriptor names a component type nobody registered.
    #[error("Component type '{0}' is not registered")]
    ComponentTypeNotRegistered(String),

    /// A component failed while being imported.
    #[error("Component type '{component_type}' failed to initialize")]
    ComponentInitialization {
        /// Type name of the failing component
        component_type: String,
        /// Underlying failure
        #[source]
        source: Box<FrameError>,
    },

    /// A component failed to start.
    #[error("Component '{id}' failed to start")]
    ComponentStart {
        /// Identity of the failing component
        id: String,
        /// Underlying failure
        #[source]
        source: Box<FrameError>,
    },

    /// A component failed to stop.
    #[error("Component '{id}' failed to stop")]
    ComponentStop {
        /// Identity of the failing component
        id: String,
        /// Underlying failure
        #[source]
        source: Box<FrameError>,
    },

    /// Keyword arguments could not be decoded into the component's model.
    #[error("Failed to decode keyword arguments: {0}")]
    KeywordDecode(String),

    /// The directory watch for a configuration key could not be established.
    #[error("Failed to watch configuration '{key}': {reason}")]
    ConfigWatchSetup {
        /// Configuration key
        key: String,
        /// Why the watch could not be added
        reason: String,
    },

    /// A configuration payload could not be decoded into its model.
    #[error("Failed to decode configuration '{key}': {reason}")]
    ConfigDecode {
        /// Configuration key
        key: String,
        /// Decoder failure
        reason: String,
    },

    /// No watcher exists for the requested configuration key.
    #[error("Configuration '{0}' is not registered")]
    ConfigNotRegistered(String),

    /// OS signal handlers could not be installed.
    #[error("Failed to install signal handlers: {0}")]
    SignalHandlerSetup(#[source] std::io::Error),

    /// The launch descriptor could not be read or parsed.
    #[error("Invalid launch configuration: {0}")]
    LaunchConfig(String),

    /// Process settings could not be loaded.
    #[error("Failed to load settings: {0}")]
    Settings(String),

    /// The logging subsystem could not be installed.
    #[error("Logging error: {0}")]
    Logging(String),

    /// An operation was attempted from the wrong lifecycle state.
    #[error("Invalid application state: expected {expected}, found {found}")]
    InvalidState {
        /// State required by the operation
        expected: &'static str,
        /// State the application was in
        found: &'static str,
    },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    /// IO error occurred.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Generic error for other cases.
    #[error("{0}")]
    Other(String),
}

impl FrameError {
    /// Build a free-form error, typically returned from component code.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

/// Validation error for configuration validation.
#[derive(Debug)]
pub enum ValidationError {
    /// Custom validation error with a message.
    Custom(String),

    /// A specific field has an invalid value.
    InvalidField {
        /// The field name/path
        field: String,
        /// The reason why it's invalid
        reason: String,
    },

    /// Multiple validation errors occurred.
    Multiple(Vec<ValidationError>),
}

impl ValidationError {
    /// Create a custom validation error.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Create an invalid field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(msg) => write!(f, "{}", msg),
            Self::InvalidField { field, reason } => {
                write!(f, "Field '{}' is invalid: {}", field, reason)
            }
            Self::Multiple(errors) => {
                writeln!(f, "Multiple validation errors:")?;
                for (i, err) in errors.iter().enumerate() {
                    writeln!(f, "  {}. {}", i + 1, err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for FrameError {
    fn from(err: ValidationError) -> Self {
        FrameError::ValidationError(err.to_string())
    }
}
