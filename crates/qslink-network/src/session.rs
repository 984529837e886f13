//! Authenticated use of a transport with sticky errors.
//!
//! A [`Session`] pairs a [`Transport`] with the [`IdleTimer`] of its
//! connection. Every send and read resets the timer. The first failure of any
//! I/O call is recorded and returned by every later call without touching the
//! transport again, so a stream that may be out of sync is never reused.
//!
//! # Cancellation
//!
//! Each blocking call takes a [`CancellationToken`]. Cancelling it while the
//! call waits for its turn on the transport returns [`Error::Cancelled`] and
//! leaves the session untouched. Cancelling it during I/O abandons the
//! exchange half way, so the cancellation becomes the session's sticky error.

use crate::{IdleTimer, Transport};
use bytes::Bytes;
use qslink_core::{Error, Result};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::MutexGuard;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

struct Live<T> {
    transport: tokio::sync::Mutex<T>,
    idle: Arc<IdleTimer>,
}

/// A transport in use by one connection, or the error that prevented one.
///
/// # Example
///
/// ```no_run
/// use bytes::Bytes;
/// use qslink_network::{IdleTimer, Session, TelnetConfig, TelnetTransport};
/// use std::sync::Arc;
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> qslink_core::Result<()> {
/// let transport = TelnetTransport::dial(&TelnetConfig::default()).await?;
/// let idle = Arc::new(IdleTimer::new(Duration::from_secs(300)));
/// let session = Session::new(transport, idle);
///
/// let cancel = CancellationToken::new();
/// let reply = session
///     .exchange(Bytes::from_static(b"?SYSTEM,8\r\n"), &["QNET> "], &cancel)
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct Session<T> {
    live: Option<Live<T>>,
    error: Mutex<Option<Error>>,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T, idle: Arc<IdleTimer>) -> Self {
        Self {
            live: Some(Live {
                transport: tokio::sync::Mutex::new(transport),
                idle,
            }),
            error: Mutex::new(None),
        }
    }

    /// A session for a connection that could not be established. Every call
    /// returns `err`.
    pub fn failed(err: Error) -> Self {
        Self {
            live: None,
            error: Mutex::new(Some(err)),
        }
    }

    /// The recorded error, if any.
    pub fn error(&self) -> Option<Error> {
        self.error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_failed(&self) -> bool {
        self.error().is_some()
    }

    pub fn idle_timer(&self) -> Option<&Arc<IdleTimer>> {
        self.live.as_ref().map(|live| &live.idle)
    }

    /// Write `buf`.
    pub async fn send(&self, buf: Bytes, cancel: &CancellationToken) -> Result<()> {
        let (live, mut transport) = self.lock(cancel).await?;
        debug!(text = %printable(&buf), "Sending");
        self.send_locked(live, &mut transport, buf, cancel).await
    }

    /// Write `buf` without ever logging its content.
    pub async fn send_sensitive(&self, buf: Bytes, cancel: &CancellationToken) -> Result<()> {
        let (live, mut transport) = self.lock(cancel).await?;
        debug!(text = "<redacted>", len = buf.len(), "Sending");
        self.send_locked(live, &mut transport, buf, cancel).await
    }

    /// Read until one of `terminators` is seen.
    pub async fn read_until(
        &self,
        terminators: &[&str],
        cancel: &CancellationToken,
    ) -> Result<Bytes> {
        let (live, mut transport) = self.lock(cancel).await?;
        self.read_locked(live, &mut transport, terminators, cancel)
            .await
    }

    /// Write `request` and read its reply without letting another caller's
    /// traffic interleave.
    pub async fn exchange(
        &self,
        request: Bytes,
        terminators: &[&str],
        cancel: &CancellationToken,
    ) -> Result<Bytes> {
        let (live, mut transport) = self.lock(cancel).await?;
        debug!(text = %printable(&request), "Sending");
        self.send_locked(live, &mut transport, request, cancel)
            .await?;
        self.read_locked(live, &mut transport, terminators, cancel)
            .await
    }

    /// Release the transport.
    ///
    /// The transport is closed even when an error has been recorded; that
    /// error is then returned in preference to the close result.
    pub async fn close(&self) -> Result<()> {
        let Some(live) = &self.live else {
            return match self.error() {
                Some(err) => Err(err),
                None => Ok(()),
            };
        };
        let result = live.transport.lock().await.close().await;
        match self.error() {
            Some(err) => Err(err),
            None => result,
        }
    }

    async fn lock(
        &self,
        cancel: &CancellationToken,
    ) -> Result<(&Live<T>, MutexGuard<'_, T>)> {
        self.check()?;
        let Some(live) = &self.live else {
            return Err(Error::NotConnected);
        };
        let guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            guard = live.transport.lock() => guard,
        };
        // another caller may have failed while we waited
        self.check()?;
        Ok((live, guard))
    }

    async fn send_locked(
        &self,
        live: &Live<T>,
        transport: &mut T,
        buf: Bytes,
        cancel: &CancellationToken,
    ) -> Result<()> {
        live.idle.reset();
        let result = cancellable(cancel, transport.send(buf)).await;
        self.settle(result)
    }

    async fn read_locked(
        &self,
        live: &Live<T>,
        transport: &mut T,
        terminators: &[&str],
        cancel: &CancellationToken,
    ) -> Result<Bytes> {
        live.idle.reset();
        let result = cancellable(cancel, transport.read_until(terminators)).await;
        if let Ok(data) = &result {
            trace!(text = %printable(data), "Received");
        }
        self.settle(result)
    }

    fn check(&self) -> Result<()> {
        match self.error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Record the first failure.
    fn settle<R>(&self, result: Result<R>) -> Result<R> {
        if let Err(err) = &result {
            let mut slot = self.error.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_none() {
                warn!(error = %err, "Session failed");
                *slot = Some(err.clone());
            }
        }
        result
    }
}

async fn cancellable<R>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<R>>,
) -> Result<R> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = fut => result,
    }
}

fn printable(buf: &[u8]) -> String {
    String::from_utf8_lossy(buf).trim_end().escape_debug().to_string()
}
