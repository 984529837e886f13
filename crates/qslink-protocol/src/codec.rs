//! Tokio codec for the telnet byte stream.
//!
//! The processor is reached over a plain telnet connection. This module
//! provides [`TelnetCodec`], which hides telnet option negotiation from the
//! layers above and frames the remaining data by terminator strings
//! (prompts) rather than by length or delimiter bytes.
//!
//! # Overview
//!
//! - [`Decoder`]: strips telnet command sequences, queues refusals for any
//!   option the peer asks for, and yields everything read so far once it
//!   ends with one of the current terminators.
//! - [`Encoder<Bytes>`]: writes raw bytes, doubling any `0xFF` data byte.
//!
//! # Architecture
//!
//! ```text
//! TCP Stream -> Decoder -> Bytes (up to and including a terminator)
//!                  \-> replies (IAC WONT/DONT), flushed by the transport
//! Bytes -> Encoder -> TCP Stream (IAC escaped)
//! ```
//!
//! Terminators change per read: the login handshake waits for `login: `,
//! then `password: `, then `QNET> ` or `login:`. Callers set them with
//! [`TelnetCodec::set_terminators`] before polling the stream.
//!
//! # Usage with Tokio Framed
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use futures::{SinkExt, StreamExt};
//! use tokio::net::TcpStream;
//! use tokio_util::codec::Framed;
//! use qslink_protocol::TelnetCodec;
//!
//! # async fn example() -> qslink_core::Result<()> {
//! let stream = TcpStream::connect("192.168.1.10:23").await?;
//! let mut framed = Framed::new(stream, TelnetCodec::new());
//!
//! framed.codec_mut().set_terminators(&["login: "]);
//! if let Some(frame) = framed.next().await {
//!     println!("{:?}", frame?);
//! }
//! framed.send(Bytes::from_static(b"lutron\r\n")).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # DoS Protection
//!
//! Data accumulated without reaching a terminator is bounded by a maximum
//! frame size (default 64 KB); exceeding it yields [`Error::FrameTooLarge`].

use bytes::{Buf, BufMut, Bytes, BytesMut};
use qslink_core::{Error, Result, constants::PROMPT};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, trace};

/// Default maximum frame size in bytes (64 KB).
const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

// Telnet command bytes (RFC 854).
const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250;
const SE: u8 = 240;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Data,
    Iac,
    Negotiate(u8),
    Subnegotiation,
    SubnegotiationIac,
}

/// Tokio codec for terminator-framed telnet data.
///
/// # Example
///
/// ```
/// use bytes::BytesMut;
/// use tokio_util::codec::Decoder;
/// use qslink_protocol::TelnetCodec;
///
/// let mut codec = TelnetCodec::new();
/// codec.set_terminators(&["QNET> "]);
///
/// // IAC DO ECHO, followed by the prompt
/// let mut src = BytesMut::from(&b"\xff\xfd\x01QNET> "[..]);
/// let frame = codec.decode(&mut src).unwrap().unwrap();
/// assert_eq!(&frame[..], b"QNET> ");
///
/// // the refusal the transport must write back: IAC WONT ECHO
/// assert_eq!(&codec.take_replies().unwrap()[..], b"\xff\xfc\x01");
/// ```
#[derive(Debug)]
pub struct TelnetCodec {
    state: State,

    /// Decoded data not yet returned as a frame.
    data: BytesMut,

    /// Negotiation replies waiting to be written.
    replies: BytesMut,

    terminators: Vec<Bytes>,

    max_frame_size: usize,
}

impl TelnetCodec {
    /// Create a codec that frames on the operational prompt.
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a codec with a custom maximum frame size.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            state: State::Data,
            data: BytesMut::with_capacity(1024),
            replies: BytesMut::new(),
            terminators: vec![Bytes::from_static(PROMPT.as_bytes())],
            max_frame_size,
        }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Replace the strings that end a frame.
    ///
    /// With no terminators, every decode call returns whatever data is
    /// available.
    pub fn set_terminators<S: AsRef<str>>(&mut self, terminators: &[S]) {
        self.terminators = terminators
            .iter()
            .map(|t| Bytes::copy_from_slice(t.as_ref().as_bytes()))
            .collect();
    }

    /// Take queued negotiation replies, if any.
    pub fn take_replies(&mut self) -> Option<Bytes> {
        if self.replies.is_empty() {
            None
        } else {
            Some(self.replies.split().freeze())
        }
    }

    fn at_terminator(&self) -> bool {
        self.terminators
            .iter()
            .any(|t| !t.is_empty() && self.data.ends_with(t))
    }

    fn refuse(&mut self, verb: u8, option: u8) {
        let reply = match verb {
            DO => WONT,
            WILL => DONT,
            _ => return,
        };
        debug!(option, "Refusing telnet option");
        self.replies.put_slice(&[IAC, reply, option]);
    }

    /// Advance the state machine by one byte, returning it if it is data.
    fn step(&mut self, byte: u8) -> Option<u8> {
        match self.state {
            State::Data => {
                if byte == IAC {
                    self.state = State::Iac;
                    None
                } else {
                    Some(byte)
                }
            }
            State::Iac => match byte {
                IAC => {
                    self.state = State::Data;
                    Some(IAC)
                }
                DO | DONT | WILL | WONT => {
                    self.state = State::Negotiate(byte);
                    None
                }
                SB => {
                    self.state = State::Subnegotiation;
                    None
                }
                _ => {
                    trace!(command = byte, "Dropping telnet command");
                    self.state = State::Data;
                    None
                }
            },
            State::Negotiate(verb) => {
                self.refuse(verb, byte);
                self.state = State::Data;
                None
            }
            State::Subnegotiation => {
                if byte == IAC {
                    self.state = State::SubnegotiationIac;
                }
                None
            }
            State::SubnegotiationIac => {
                self.state = if byte == SE {
                    State::Data
                } else {
                    State::Subnegotiation
                };
                None
            }
        }
    }
}

impl Default for TelnetCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for TelnetCodec {
    type Item = Bytes;
    type Error = Error;

    /// Consume bytes from `src` until a terminator is reached.
    ///
    /// Bytes after the terminator are left in `src` for the next frame.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        while src.has_remaining() {
            let byte = src.get_u8();
            let Some(data) = self.step(byte) else {
                continue;
            };
            self.data.put_u8(data);

            if self.at_terminator() {
                trace!(len = self.data.len(), "Frame complete");
                return Ok(Some(self.data.split().freeze()));
            }
            if self.data.len() > self.max_frame_size {
                let size = self.data.len();
                self.data.clear();
                return Err(Error::FrameTooLarge {
                    size,
                    max_size: self.max_frame_size,
                });
            }
        }

        if self.terminators.is_empty() && !self.data.is_empty() {
            return Ok(Some(self.data.split().freeze()));
        }
        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if self.data.is_empty() => Ok(None),
            None => {
                debug!(
                    pending = self.data.len(),
                    "Stream ended before terminator"
                );
                self.data.clear();
                Err(Error::ConnectionClosed)
            }
        }
    }
}

impl Encoder<Bytes> for TelnetCodec {
    type Error = Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<()> {
        dst.reserve(item.len());
        for &byte in item.iter() {
            if byte == IAC {
                dst.put_u8(IAC);
            }
            dst.put_u8(byte);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &mut TelnetCodec, input: &[u8]) -> Vec<Bytes> {
        let mut src = BytesMut::from(input);
        let mut frames = Vec::new();
        while let Some(frame) = codec.decode(&mut src).unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_frame_on_prompt() {
        let mut codec = TelnetCodec::new();
        let frames = decode_all(&mut codec, b"~SYSTEM,8,8.102\r\nQNET> ");
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], b"~SYSTEM,8,8.102\r\nQNET> ");
    }

    #[test]
    fn test_partial_then_complete() {
        let mut codec = TelnetCodec::new();
        let mut src = BytesMut::from(&b"~SYSTEM,1,12:00"[..]);
        assert!(codec.decode(&mut src).unwrap().is_none());
        assert!(src.is_empty());

        src.extend_from_slice(b":00\r\nQNET> ");
        let frame = codec.decode(&mut src).unwrap().unwrap();
        assert_eq!(&frame[..], b"~SYSTEM,1,12:00:00\r\nQNET> ");
    }

    #[test]
    fn test_leaves_remainder_in_source() {
        let mut codec = TelnetCodec::new();
        codec.set_terminators(&["login: "]);
        let mut src = BytesMut::from(&b"login: extra"[..]);
        let frame = codec.decode(&mut src).unwrap().unwrap();
        assert_eq!(&frame[..], b"login: ");
        assert_eq!(&src[..], b"extra");
    }

    #[test]
    fn test_multiple_terminators() {
        let mut codec = TelnetCodec::new();
        codec.set_terminators(&[PROMPT, "login:"]);
        let frames = decode_all(&mut codec, b"bad login\r\nlogin:");
        assert_eq!(&frames[0][..], b"bad login\r\nlogin:");
    }

    #[test]
    fn test_negotiation_is_stripped_and_refused() {
        let mut codec = TelnetCodec::new();
        // IAC WILL ECHO, IAC DO NAWS, IAC DONT 1
        let input = b"\xff\xfb\x01\xff\xfd\x1f\xff\xfe\x01login: ";
        codec.set_terminators(&["login: "]);
        let frames = decode_all(&mut codec, input);
        assert_eq!(&frames[0][..], b"login: ");
        assert_eq!(
            &codec.take_replies().unwrap()[..],
            b"\xff\xfe\x01\xff\xfc\x1f"
        );
        assert!(codec.take_replies().is_none());
    }

    #[test]
    fn test_negotiation_split_across_reads() {
        let mut codec = TelnetCodec::new();
        let mut src = BytesMut::from(&b"\xff"[..]);
        assert!(codec.decode(&mut src).unwrap().is_none());
        src.extend_from_slice(b"\xfd");
        assert!(codec.decode(&mut src).unwrap().is_none());
        src.extend_from_slice(b"\x03QNET> ");
        let frame = codec.decode(&mut src).unwrap().unwrap();
        assert_eq!(&frame[..], b"QNET> ");
        assert_eq!(&codec.take_replies().unwrap()[..], b"\xff\xfc\x03");
    }

    #[test]
    fn test_subnegotiation_skipped() {
        let mut codec = TelnetCodec::new();
        let frames = decode_all(&mut codec, b"\xff\xfa\x18\x01\xff\xf0QNET> ");
        assert_eq!(&frames[0][..], b"QNET> ");
    }

    #[test]
    fn test_escaped_iac_is_data() {
        let mut codec = TelnetCodec::new();
        codec.set_terminators(&[] as &[&str]);
        let frames = decode_all(&mut codec, b"a\xff\xffb");
        assert_eq!(&frames[0][..], b"a\xffb");
    }

    #[test]
    fn test_frame_too_large() {
        let mut codec = TelnetCodec::with_max_frame_size(8);
        let mut src = BytesMut::from(&b"0123456789"[..]);
        let err = codec.decode(&mut src).unwrap_err();
        assert!(matches!(err, Error::FrameTooLarge { size: 9, max_size: 8 }));
    }

    #[test]
    fn test_eof_with_pending_data() {
        let mut codec = TelnetCodec::new();
        let mut src = BytesMut::from(&b"~SYSTEM"[..]);
        assert!(codec.decode(&mut src).unwrap().is_none());
        let err = codec.decode_eof(&mut src).unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[test]
    fn test_eof_clean() {
        let mut codec = TelnetCodec::new();
        let mut src = BytesMut::new();
        assert!(codec.decode_eof(&mut src).unwrap().is_none());
    }

    #[test]
    fn test_encode_escapes_iac() {
        let mut codec = TelnetCodec::new();
        let mut dst = BytesMut::new();
        codec
            .encode(Bytes::from_static(b"?SYSTEM,1\r\n"), &mut dst)
            .unwrap();
        assert_eq!(&dst[..], b"?SYSTEM,1\r\n");

        dst.clear();
        codec.encode(Bytes::from_static(b"\xff"), &mut dst).unwrap();
        assert_eq!(&dst[..], b"\xff\xff");
    }
}
