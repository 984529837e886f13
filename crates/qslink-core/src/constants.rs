//! Core constants for the QS integration protocol.
//!
//! The processor speaks a line-oriented ASCII protocol over telnet:
//!
//! ```text
//! request:   {?|#}GROUP[,param,...]<CR><LF>
//! response:  ~GROUP,param,...,value<CR><LF>
//! prompt:    QNET>␠
//! ```
//!
//! Where:
//! - `?` - Query prefix
//! - `#` - Set (action) prefix
//! - `~` - Response/monitoring prefix
//! - `GROUP` - Command group keyword (`SYSTEM`, `OUTPUT`, ...)
//! - `,` - Parameter delimiter
//!
//! # Usage
//!
//! ```
//! use qslink_core::constants::*;
//!
//! let request = format!("{}SYSTEM,1{}", QUERY_PREFIX as char, LINE_TERMINATOR);
//! assert_eq!(request, "?SYSTEM,1\r\n");
//! assert!("QNET> ".ends_with(PROMPT));
//! ```

// ============================================================================
// Framing
// ============================================================================

/// Prefix byte for query requests.
pub const QUERY_PREFIX: u8 = b'?';

/// Prefix byte for set (action) requests.
pub const SET_PREFIX: u8 = b'#';

/// Prefix byte for responses and monitoring notifications.
pub const RESPONSE_PREFIX: u8 = b'~';

/// Parameter delimiter.
pub const DELIMITER: u8 = b',';

/// Request line terminator.
pub const LINE_TERMINATOR: &str = "\r\n";

// ============================================================================
// Prompts
// ============================================================================

/// Operational prompt that ends every logical exchange.
pub const PROMPT: &str = "QNET> ";

/// Prompt requesting the user name.
pub const LOGIN_PROMPT: &str = "login: ";

/// Prompt requesting the password.
pub const PASSWORD_PROMPT: &str = "password: ";

/// Login prompt as repeated after a failed attempt (no trailing space).
pub const LOGIN_RETRY_PROMPT: &str = "login:";

// ============================================================================
// In-band error markers
// ============================================================================

/// Marker for a numbered access-point error, followed by the error number.
///
/// # Examples
///
/// ```
/// use qslink_core::constants::ERROR_MARKER;
///
/// let line = "~ERROR,3";
/// let code: i64 = line[ERROR_MARKER.len()..].parse().unwrap();
/// assert_eq!(code, 3);
/// ```
pub const ERROR_MARKER: &str = "~ERROR,";

/// Text emitted when authentication fails.
pub const BAD_LOGIN: &str = "bad login";

/// Text emitted for a command the processor does not recognise.
pub const UNKNOWN_COMMAND: &str = "unknown command";

// ============================================================================
// Defaults
// ============================================================================

/// Default telnet port.
pub const DEFAULT_PORT: u16 = 23;

/// Default timeout for a single dial, send or read (5 seconds).
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

/// Default idle period after which an unused connection is closed (5 minutes).
pub const DEFAULT_KEEP_ALIVE_MS: u64 = 5 * 60 * 1_000;
