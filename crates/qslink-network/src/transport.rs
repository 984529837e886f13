//! Byte-stream transport to the processor.
//!
//! A [`Transport`] knows nothing about the protocol: it writes raw bytes,
//! reads until one of several terminator strings appears, and closes. The
//! production implementation is [`TelnetTransport`], a TCP connection whose
//! reads pass through [`TelnetCodec`].
//!
//! # Architecture
//!
//! ```text
//! Session
//!   │
//!   └─> TelnetTransport ───(TCP/telnet)───> QS processor
//!          │
//!          └─> TelnetCodec (IAC stripping, terminator framing)
//! ```
//!
//! # Timeout Handling
//!
//! Dial, send and every read are bounded by the configured timeout
//! (default: 5000ms). Expiry is reported as [`Error::Timeout`], separate from
//! caller cancellation which the session layer handles.

use bytes::{Bytes, BytesMut};
use qslink_core::{Error, Result, constants::DEFAULT_TIMEOUT_MS};
use qslink_protocol::TelnetCodec;
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, info, trace, warn};

/// Raw byte stream used by a [`Session`](crate::Session).
///
/// Implementations apply their own I/O deadline to every call.
pub trait Transport: Send + 'static {
    /// Write `buf` in full.
    fn send(&mut self, buf: Bytes) -> impl Future<Output = Result<()>> + Send;

    /// Read until the data received so far ends with one of `terminators`,
    /// returning everything up to and including it.
    fn read_until(&mut self, terminators: &[&str])
    -> impl Future<Output = Result<Bytes>> + Send;

    /// Release the connection. Idempotent.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// Configuration for [`TelnetTransport`].
///
/// # Example
///
/// ```
/// use qslink_network::TelnetConfig;
/// use std::time::Duration;
///
/// let config = TelnetConfig {
///     addr: "192.168.1.50:23".to_string(),
///     timeout: Duration::from_secs(2),
/// };
/// ```
#[derive(Debug, Clone)]
pub struct TelnetConfig {
    /// `host:port` of the processor.
    pub addr: String,

    /// Timeout for dial, send and each read.
    pub timeout: Duration,
}

impl Default for TelnetConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:23".to_string(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}

struct Connection {
    stream: TcpStream,
    codec: TelnetCodec,
    read_buf: BytesMut,
    write_buf: BytesMut,
}

impl Connection {
    /// Write any queued telnet refusals.
    async fn flush_replies(&mut self) -> Result<()> {
        if let Some(replies) = self.codec.take_replies() {
            trace!(len = replies.len(), "Writing telnet negotiation replies");
            self.stream.write_all(&replies).await?;
        }
        Ok(())
    }

    async fn read_frame(&mut self) -> Result<Bytes> {
        loop {
            let frame = self.codec.decode(&mut self.read_buf)?;
            self.flush_replies().await?;
            if let Some(frame) = frame {
                return Ok(frame);
            }

            if self.stream.read_buf(&mut self.read_buf).await? == 0 {
                return match self.codec.decode_eof(&mut self.read_buf)? {
                    Some(frame) => Ok(frame),
                    None => Err(Error::ConnectionClosed),
                };
            }
        }
    }

    async fn write(&mut self, buf: Bytes) -> Result<()> {
        self.codec.encode(buf, &mut self.write_buf)?;
        self.stream.write_all(&self.write_buf).await?;
        self.write_buf.clear();
        self.stream.flush().await?;
        Ok(())
    }
}

/// Telnet connection to a processor.
///
/// # Example
///
/// ```no_run
/// use qslink_network::{TelnetConfig, TelnetTransport, Transport};
///
/// # async fn example() -> qslink_core::Result<()> {
/// let mut transport = TelnetTransport::dial(&TelnetConfig {
///     addr: "192.168.1.50:23".to_string(),
///     ..Default::default()
/// })
/// .await?;
///
/// let greeting = transport.read_until(&["login: "]).await?;
/// transport.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct TelnetTransport {
    addr: String,
    timeout: Duration,
    conn: Option<Connection>,
}

impl TelnetTransport {
    /// Connect to the configured address.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] if the connection is not established in time
    /// - [`Error::ConnectionFailed`] if the peer refuses or is unreachable
    pub async fn dial(config: &TelnetConfig) -> Result<Self> {
        info!(addr = %config.addr, "Dialing processor");

        let stream =
            match tokio::time::timeout(config.timeout, TcpStream::connect(&config.addr)).await {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    warn!(addr = %config.addr, error = %e, "Dial failed");
                    return Err(Error::ConnectionFailed {
                        addr: config.addr.clone(),
                        message: e.to_string(),
                    });
                }
                Err(_) => {
                    warn!(
                        addr = %config.addr,
                        "Dial timeout after {}ms",
                        config.timeout.as_millis()
                    );
                    return Err(Error::timeout("dial", config.timeout));
                }
            };

        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }

        let addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| config.addr.clone());
        debug!(%addr, "Connected");

        Ok(Self {
            addr,
            timeout: config.timeout,
            conn: Some(Connection {
                stream,
                codec: TelnetCodec::new(),
                read_buf: BytesMut::with_capacity(4096),
                write_buf: BytesMut::with_capacity(256),
            }),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl Transport for TelnetTransport {
    async fn send(&mut self, buf: Bytes) -> Result<()> {
        let conn = self.conn.as_mut().ok_or(Error::NotConnected)?;
        trace!(addr = %self.addr, len = buf.len(), "Sending");

        match tokio::time::timeout(self.timeout, conn.write(buf)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(addr = %self.addr, "Send timeout after {}ms", self.timeout.as_millis());
                Err(Error::timeout("send", self.timeout))
            }
        }
    }

    async fn read_until(&mut self, terminators: &[&str]) -> Result<Bytes> {
        let conn = self.conn.as_mut().ok_or(Error::NotConnected)?;
        conn.codec.set_terminators(terminators);

        match tokio::time::timeout(self.timeout, conn.read_frame()).await {
            Ok(Ok(frame)) => {
                trace!(addr = %self.addr, len = frame.len(), ?terminators, "Read frame");
                Ok(frame)
            }
            Ok(Err(e)) => {
                warn!(addr = %self.addr, error = %e, ?terminators, "Read failed");
                Err(e)
            }
            Err(_) => {
                warn!(
                    addr = %self.addr,
                    ?terminators,
                    "Read timeout after {}ms",
                    self.timeout.as_millis()
                );
                Err(Error::timeout("read", self.timeout))
            }
        }
    }

    /// Shutdown is bounded by 500ms so an unresponsive peer cannot stall
    /// teardown.
    async fn close(&mut self) -> Result<()> {
        if let Some(mut conn) = self.conn.take() {
            info!(addr = %self.addr, "Closing connection");

            let shutdown_timeout = Duration::from_millis(500);
            match tokio::time::timeout(shutdown_timeout, conn.stream.shutdown()).await {
                Ok(Ok(())) => debug!("Shutdown completed"),
                Ok(Err(e)) => warn!("Error during shutdown: {}", e),
                Err(_) => warn!(
                    "Shutdown timeout during close ({}ms)",
                    shutdown_timeout.as_millis()
                ),
            }
        }
        Ok(())
    }
}

impl Drop for TelnetTransport {
    fn drop(&mut self) {
        if self.conn.is_some() {
            debug!(addr = %self.addr, "TelnetTransport dropped while connected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_config_default() {
        let config = TelnetConfig::default();
        assert_eq!(config.addr, "127.0.0.1:23");
        assert_eq!(config.timeout, Duration::from_millis(5000));
    }

    #[tokio::test]
    async fn test_dial_refused() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let result = TelnetTransport::dial(&TelnetConfig {
            addr,
            timeout: Duration::from_millis(500),
        })
        .await;
        assert!(matches!(result, Err(Error::ConnectionFailed { .. })));
    }

    #[tokio::test]
    async fn test_operations_after_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let _conn = listener.accept().await;
            tokio::time::sleep(Duration::from_secs(1)).await;
        });

        let mut transport = TelnetTransport::dial(&TelnetConfig {
            addr,
            timeout: Duration::from_millis(500),
        })
        .await
        .unwrap();
        assert!(transport.is_connected());

        transport.close().await.unwrap();
        transport.close().await.unwrap();
        assert!(!transport.is_connected());

        let result = transport.send(Bytes::from_static(b"?SYSTEM,1\r\n")).await;
        assert!(matches!(result, Err(Error::NotConnected)));
        let result = transport.read_until(&["QNET> "]).await;
        assert!(matches!(result, Err(Error::NotConnected)));
    }
}
