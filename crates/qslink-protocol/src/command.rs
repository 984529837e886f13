//! Outbound command encoding.
//!
//! A [`Command`] is an immutable value describing one request. It derives
//! two byte sequences:
//!
//! ```text
//! request:          ?SYSTEM,1,23<CR><LF>
//! response prefix:  ~SYSTEM,1,23,
//! ```
//!
//! The response prefix is used only to recognise the line that answers the
//! request among unrelated monitoring traffic; it is not a terminator.

use bytes::{BufMut, Bytes, BytesMut};
use qslink_core::{CommandGroup, SystemAction, constants::*};
use std::fmt;

/// A single protocol request.
///
/// # Example
/// ```
/// use qslink_core::CommandGroup;
/// use qslink_protocol::Command;
///
/// let cmd = Command::new(CommandGroup::System, false, "1,23");
/// assert_eq!(&cmd.request()[..], b"?SYSTEM,1,23\r\n");
/// assert_eq!(&cmd.response_prefix()[..], b"~SYSTEM,1,23,");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    group: CommandGroup,
    set: bool,
    parameters: Bytes,
}

impl Command {
    /// Create a command. `set` selects `#` (action) rather than `?` (query).
    pub fn new(group: CommandGroup, set: bool, parameters: impl Into<Bytes>) -> Self {
        Self {
            group,
            set,
            parameters: parameters.into(),
        }
    }

    /// Create a query (`?`) command.
    pub fn query(group: CommandGroup, parameters: impl Into<Bytes>) -> Self {
        Self::new(group, false, parameters)
    }

    /// Create a set (`#`) command.
    pub fn set(group: CommandGroup, parameters: impl Into<Bytes>) -> Self {
        Self::new(group, true, parameters)
    }

    /// Create a `SYSTEM` command for the given action and extra parameters.
    pub fn system(set: bool, action: SystemAction, extra: &[&str]) -> Self {
        let mut params = action.code().to_string();
        for p in extra {
            params.push(char::from(DELIMITER));
            params.push_str(p);
        }
        Self::new(CommandGroup::System, set, params)
    }

    pub fn group(&self) -> CommandGroup {
        self.group
    }

    pub fn is_set(&self) -> bool {
        self.set
    }

    pub fn parameters(&self) -> &[u8] {
        &self.parameters
    }

    /// Exact bytes to write to the transport.
    pub fn request(&self) -> Bytes {
        let prefix = if self.set { SET_PREFIX } else { QUERY_PREFIX };
        let mut buf = self.encode_body(prefix, LINE_TERMINATOR.len());
        buf.put_slice(LINE_TERMINATOR.as_bytes());
        buf.freeze()
    }

    /// Bytes that a line answering this command starts with.
    pub fn response_prefix(&self) -> Bytes {
        let mut buf = self.encode_body(RESPONSE_PREFIX, 1);
        buf.put_u8(DELIMITER);
        buf.freeze()
    }

    fn encode_body(&self, prefix: u8, trailer: usize) -> BytesMut {
        let keyword = self.group.keyword();
        let mut buf = BytesMut::with_capacity(2 + keyword.len() + self.parameters.len() + trailer);
        buf.put_u8(prefix);
        buf.put_slice(keyword.as_bytes());
        if !self.parameters.is_empty() {
            buf.put_u8(DELIMITER);
            buf.put_slice(&self.parameters);
        }
        buf
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let request = self.request();
        let line = &request[..request.len() - LINE_TERMINATOR.len()];
        write!(f, "{}", String::from_utf8_lossy(line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_query_command() {
        let cmd = Command::new(CommandGroup::System, false, "1,23");
        assert_eq!(&cmd.request()[..], b"?SYSTEM,1,23\r\n");
        assert_eq!(&cmd.response_prefix()[..], b"~SYSTEM,1,23,");
    }

    #[rstest]
    #[case(CommandGroup::Output, true, "3,1,75", "#OUTPUT,3,1,75\r\n", "~OUTPUT,3,1,75,")]
    #[case(CommandGroup::Output, false, "3,1", "?OUTPUT,3,1\r\n", "~OUTPUT,3,1,")]
    #[case(CommandGroup::Device, true, "2,4,3", "#DEVICE,2,4,3\r\n", "~DEVICE,2,4,3,")]
    #[case(CommandGroup::ShadeGroup, true, "7,2", "#SHADEGRP,7,2\r\n", "~SHADEGRP,7,2,")]
    #[case(CommandGroup::Monitor, true, "5,1", "#MONITOR,5,1\r\n", "~MONITOR,5,1,")]
    fn test_command_encoding(
        #[case] group: CommandGroup,
        #[case] set: bool,
        #[case] params: &'static str,
        #[case] request: &str,
        #[case] prefix: &str,
    ) {
        let cmd = Command::new(group, set, params);
        assert_eq!(&cmd.request()[..], request.as_bytes());
        assert_eq!(&cmd.response_prefix()[..], prefix.as_bytes());
    }

    #[test]
    fn test_command_without_parameters() {
        let cmd = Command::query(CommandGroup::System, Bytes::new());
        assert_eq!(&cmd.request()[..], b"?SYSTEM\r\n");
        assert_eq!(&cmd.response_prefix()[..], b"~SYSTEM,");
    }

    #[test]
    fn test_prefix_does_not_alias_request() {
        let cmd = Command::set(CommandGroup::Output, "1,1,100");
        let _ = cmd.response_prefix();
        assert_eq!(&cmd.request()[..], b"#OUTPUT,1,1,100\r\n");
    }

    #[test]
    fn test_system_command() {
        let cmd = Command::system(false, SystemAction::TimeZone, &[]);
        assert_eq!(&cmd.request()[..], b"?SYSTEM,5\r\n");

        let cmd = Command::system(true, SystemAction::Time, &["12:00:00"]);
        assert_eq!(&cmd.request()[..], b"#SYSTEM,1,12:00:00\r\n");
    }

    #[test]
    fn test_display() {
        let cmd = Command::set(CommandGroup::ShadeGroup, "4,1,50");
        assert_eq!(cmd.to_string(), "#SHADEGRP,4,1,50");
    }
}
