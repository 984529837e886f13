use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Numbered error conditions reported in-band by the processor as
/// `~ERROR,<n>`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessPointError {
    #[error("access point parameter count mismatch")]
    ParameterCount,

    #[error("access point object does not exist")]
    ObjectDoesNotExist,

    #[error("access point invalid action number")]
    InvalidActionNumber,

    #[error("access point parameter out of range")]
    ParameterOutOfRange,

    #[error("access point parameter malformed")]
    ParameterMalformed,

    #[error("access point unsupported command")]
    UnsupportedCommand,
}

impl AccessPointError {
    /// Map a wire error number (1-6) to its condition.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::ParameterCount),
            2 => Some(Self::ObjectDoesNotExist),
            3 => Some(Self::InvalidActionNumber),
            4 => Some(Self::ParameterOutOfRange),
            5 => Some(Self::ParameterMalformed),
            6 => Some(Self::UnsupportedCommand),
            _ => None,
        }
    }

    /// Wire error number for this condition.
    pub fn code(&self) -> u8 {
        match self {
            Self::ParameterCount => 1,
            Self::ObjectDoesNotExist => 2,
            Self::InvalidActionNumber => 3,
            Self::ParameterOutOfRange => 4,
            Self::ParameterMalformed => 5,
            Self::UnsupportedCommand => 6,
        }
    }
}

/// Errors produced by the protocol, session and connection layers.
///
/// The type is `Clone` because a session records the first failure and hands
/// the same value back to every later caller.
#[derive(Error, Debug, Clone)]
pub enum Error {
    // Transport errors
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Connection to {addr} failed: {message}")]
    ConnectionFailed { addr: String, message: String },

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Not connected")]
    NotConnected,

    #[error("{operation} timed out after {duration_ms}ms")]
    Timeout {
        operation: &'static str,
        duration_ms: u64,
    },

    // Authentication errors
    #[error("Login failed")]
    Login,

    #[error("No credentials found for key id: {0}")]
    MissingCredentials(String),

    // Protocol errors
    #[error("Unknown command")]
    UnknownCommand,

    #[error(transparent)]
    AccessPoint(#[from] AccessPointError),

    #[error("Unknown access point error: {0}")]
    UnknownAccessPointError(i64),

    #[error("Empty response after parsing for command, prompt and errors")]
    NullParsedResponse,

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Frame too large: {size} bytes (max {max_size})")]
    FrameTooLarge { size: usize, max_size: usize },

    // Caller gave up
    #[error("Operation cancelled")]
    Cancelled,

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a timeout error for the named operation.
    pub fn timeout(operation: &'static str, after: Duration) -> Self {
        Self::Timeout {
            operation,
            duration_ms: u64::try_from(after.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Returns `true` for failures of the underlying byte stream. These always
    /// invalidate the session they occurred on.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Io(_)
                | Self::ConnectionFailed { .. }
                | Self::ConnectionClosed
                | Self::NotConnected
                | Self::Timeout { .. }
                | Self::FrameTooLarge { .. }
        )
    }

    /// Returns `true` for in-band protocol errors. The connection that
    /// reported them remains usable.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Self::UnknownCommand
                | Self::AccessPoint(_)
                | Self::UnknownAccessPointError(_)
                | Self::NullParsedResponse
                | Self::MalformedResponse(_)
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
