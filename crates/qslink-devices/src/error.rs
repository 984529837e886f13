//! Error types for controllers, devices and system configuration.

/// Result type alias for device operations.
pub type Result<T> = std::result::Result<T, DeviceError>;

/// Errors raised above the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// Failure reported by the session, login or response parser.
    #[error(transparent)]
    Protocol(#[from] qslink_core::Error),

    /// No controller or device with this name.
    #[error("Unknown controller or device: {name}")]
    UnknownTarget { name: String },

    /// The controller or device has no such operation.
    #[error("Unknown operation: {operation} for {target}")]
    UnknownOperation { target: String, operation: String },

    /// An operation was called with unusable arguments.
    #[error("Invalid argument for {operation}: {message}")]
    InvalidArgument { operation: String, message: String },

    /// The `type` of a controller or device is not registered.
    #[error("Unsupported type: {kind}")]
    UnsupportedType { kind: String },

    /// A device names a controller that is not configured.
    #[error("Device {device} refers to unknown controller {controller}")]
    UnknownController { device: String, controller: String },

    /// Invalid or inconsistent configuration.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Reading a configuration or keys file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A configuration or keys file is not valid YAML for its schema.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl DeviceError {
    pub fn unknown_target(name: impl Into<String>) -> Self {
        Self::UnknownTarget { name: name.into() }
    }

    pub fn unknown_operation(target: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::UnknownOperation {
            target: target.into(),
            operation: operation.into(),
        }
    }

    pub fn invalid_argument(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn unsupported_type(kind: impl Into<String>) -> Self {
        Self::UnsupportedType { kind: kind.into() }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// The protocol error underneath, if this is one.
    pub fn protocol(&self) -> Option<&qslink_core::Error> {
        match self {
            Self::Protocol(err) => Some(err),
            _ => None,
        }
    }
}
