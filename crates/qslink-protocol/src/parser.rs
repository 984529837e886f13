//! Response parsing and in-band error classification.
//!
//! The processor shares one telnet stream between command responses and
//! unsolicited monitoring notifications, so the bytes read up to the prompt
//! may contain lines that have nothing to do with the issued command:
//!
//! ```text
//! ~OUTPUT,450,29,6<CR><LF>      <- monitoring, discarded
//! ~SYSTEM,5,-8:00<CR><LF>       <- matches "~SYSTEM,5,", payload "-8:00"
//! QNET>␠                        <- prompt, discarded
//! ```
//!
//! # Error precedence
//!
//! Every line is inspected for the in-band error markers (`bad login`,
//! `unknown command`, `~ERROR,<n>`) regardless of whether it matches the
//! expected prefix. The first such marker found wins over any matching line.
//! A buffer with neither an error nor a matching line yields
//! [`Error::NullParsedResponse`].

use qslink_core::{
    AccessPointError, Error, Result,
    constants::{BAD_LOGIN, ERROR_MARKER, PROMPT, UNKNOWN_COMMAND},
};
use tracing::trace;

/// Stateless parser for raw transport output.
///
/// # Example
///
/// ```
/// use qslink_protocol::ResponseParser;
///
/// let raw = b"~OUTPUT,450,29,6\r\n~SYSTEM,5,-8:00\r\nQNET> ";
/// let payload = ResponseParser::parse(b"~SYSTEM,5,", raw).unwrap();
/// assert_eq!(payload, "-8:00");
/// ```
pub struct ResponseParser;

impl ResponseParser {
    /// Extract the payload of the first line starting with `prefix`.
    ///
    /// # Errors
    ///
    /// - [`Error::Login`] if any line contains `bad login`
    /// - [`Error::UnknownCommand`] if any line contains `unknown command`
    /// - [`Error::AccessPoint`] / [`Error::UnknownAccessPointError`] for `~ERROR,<n>`
    /// - [`Error::NullParsedResponse`] if no line matches
    pub fn parse(prefix: &[u8], raw: &[u8]) -> Result<String> {
        let cleaned = strip_nul(raw);
        let mut payload = None;

        for line in lines(&cleaned) {
            classify(line)?;
            if payload.is_none() {
                if let Some(rest) = line.strip_prefix(prefix) {
                    payload = Some(String::from_utf8_lossy(rest).into_owned());
                }
            } else {
                trace!(line = %String::from_utf8_lossy(line), "Ignoring trailing line");
            }
        }

        payload.ok_or(Error::NullParsedResponse)
    }

    /// Apply only the error conditions of [`parse`](Self::parse).
    ///
    /// Set commands are answered with a bare prompt, so a missing echo line is
    /// not a failure for them.
    pub fn check(raw: &[u8]) -> Result<()> {
        let cleaned = strip_nul(raw);
        lines(&cleaned).try_for_each(classify)
    }

    /// Parse the number following `~ERROR,` in `line`.
    ///
    /// # Example
    ///
    /// ```
    /// use qslink_core::{AccessPointError, Error};
    /// use qslink_protocol::ResponseParser;
    ///
    /// let err = ResponseParser::access_point_error("~ERROR,3");
    /// assert!(matches!(err, Error::AccessPoint(AccessPointError::InvalidActionNumber)));
    /// ```
    pub fn access_point_error(line: &str) -> Error {
        let Some(start) = line.find(ERROR_MARKER) else {
            return Error::MalformedResponse(line.to_string());
        };
        let digits: String = line[start + ERROR_MARKER.len()..]
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '-')
            .collect();
        match digits.parse::<i64>() {
            Ok(n) => match AccessPointError::from_code(n) {
                Some(err) => Error::AccessPoint(err),
                None => Error::UnknownAccessPointError(n),
            },
            Err(_) => Error::MalformedResponse(line.to_string()),
        }
    }
}

fn strip_nul(raw: &[u8]) -> Vec<u8> {
    raw.iter().copied().filter(|b| *b != 0).collect()
}

fn lines(buf: &[u8]) -> impl Iterator<Item = &[u8]> {
    buf.split(|b| *b == b'\r' || *b == b'\n')
        .map(|line| line.strip_suffix(PROMPT.as_bytes()).unwrap_or(line))
        .filter(|line| !line.is_empty())
}

fn classify(line: &[u8]) -> Result<()> {
    if contains(line, BAD_LOGIN.as_bytes()) {
        return Err(Error::Login);
    }
    if contains(line, UNKNOWN_COMMAND.as_bytes()) {
        return Err(Error::UnknownCommand);
    }
    if contains(line, ERROR_MARKER.as_bytes()) {
        return Err(ResponseParser::access_point_error(&String::from_utf8_lossy(
            line,
        )));
    }
    Ok(())
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_parse_single_line() {
        let payload = ResponseParser::parse(b"~SYSTEM,8,", b"~SYSTEM,8,8.102\r\nQNET> ").unwrap();
        assert_eq!(payload, "8.102");
    }

    #[test]
    fn test_parse_skips_monitoring_noise() {
        let raw = b"~OUTPUT,450,29,6\r\n~DEVICE,12,4,3\r\n~SYSTEM,5,-8:00\r\n~OUTPUT,3,1,0.00\r\nQNET> ";
        assert_eq!(ResponseParser::parse(b"~SYSTEM,5,", raw).unwrap(), "-8:00");
    }

    #[test]
    fn test_parse_strips_nul_bytes() {
        let raw = b"\0~SYSTEM,1,12:30:00\r\n\0QNET> ";
        assert_eq!(ResponseParser::parse(b"~SYSTEM,1,", raw).unwrap(), "12:30:00");
    }

    #[test]
    fn test_parse_first_match_wins() {
        let raw = b"~SYSTEM,2,01/02/2024\r\n~SYSTEM,2,01/03/2024\r\nQNET> ";
        assert_eq!(ResponseParser::parse(b"~SYSTEM,2,", raw).unwrap(), "01/02/2024");
    }

    #[test]
    fn test_parse_prompt_only_is_null_response() {
        let err = ResponseParser::parse(b"~SYSTEM,1,", b"QNET> ").unwrap_err();
        assert!(matches!(err, Error::NullParsedResponse));
    }

    #[test]
    fn test_parse_empty_buffer_is_null_response() {
        let err = ResponseParser::parse(b"~SYSTEM,1,", b"").unwrap_err();
        assert!(matches!(err, Error::NullParsedResponse));
    }

    #[test]
    fn test_parse_prefix_must_match_exactly() {
        // "~SYSTEM,1," must not match "~SYSTEM,10,..."
        let err = ResponseParser::parse(b"~SYSTEM,1,", b"~SYSTEM,10,x\r\nQNET> ").unwrap_err();
        assert!(matches!(err, Error::NullParsedResponse));
    }

    #[rstest]
    #[case(1, AccessPointError::ParameterCount)]
    #[case(2, AccessPointError::ObjectDoesNotExist)]
    #[case(3, AccessPointError::InvalidActionNumber)]
    #[case(4, AccessPointError::ParameterOutOfRange)]
    #[case(5, AccessPointError::ParameterMalformed)]
    #[case(6, AccessPointError::UnsupportedCommand)]
    fn test_parse_access_point_errors(#[case] code: u8, #[case] expected: AccessPointError) {
        let raw = format!("~ERROR,{code}\r\nQNET> ");
        match ResponseParser::parse(b"~SYSTEM,9,", raw.as_bytes()) {
            Err(Error::AccessPoint(err)) => assert_eq!(err, expected),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_parse_unknown_error_number() {
        let err = ResponseParser::parse(b"~SYSTEM,1,", b"~ERROR,9\r\nQNET> ").unwrap_err();
        assert!(matches!(err, Error::UnknownAccessPointError(9)));
    }

    #[test]
    fn test_error_takes_priority_over_match() {
        let raw = b"~OUTPUT,1,1,50\r\n~ERROR,4\r\nQNET> ";
        let err = ResponseParser::parse(b"~OUTPUT,1,1,", raw).unwrap_err();
        assert!(matches!(
            err,
            Error::AccessPoint(AccessPointError::ParameterOutOfRange)
        ));
    }

    #[test]
    fn test_bad_login_and_unknown_command() {
        let err = ResponseParser::parse(b"~SYSTEM,1,", b"bad login\r\nlogin: ").unwrap_err();
        assert!(matches!(err, Error::Login));

        let err = ResponseParser::parse(b"~SYSTEM,1,", b"unknown command\r\nQNET> ").unwrap_err();
        assert!(matches!(err, Error::UnknownCommand));
    }

    #[test]
    fn test_malformed_error_line() {
        let err = ResponseParser::parse(b"~SYSTEM,1,", b"~ERROR,abc\r\nQNET> ").unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }

    #[test]
    fn test_check_accepts_bare_prompt() {
        assert!(ResponseParser::check(b"QNET> ").is_ok());
        assert!(ResponseParser::check(b"~OUTPUT,5,1,100.00\r\nQNET> ").is_ok());
    }

    #[test]
    fn test_check_reports_errors() {
        let err = ResponseParser::check(b"~ERROR,2\r\nQNET> ").unwrap_err();
        assert!(matches!(
            err,
            Error::AccessPoint(AccessPointError::ObjectDoesNotExist)
        ));
    }
}
