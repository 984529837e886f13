//! On-demand connection management.
//!
//! [`OnDemandConnection`] owns the single live session of one processor. It
//! dials and logs in on first use, hands the same session to every caller
//! while it is healthy, and closes it after the connector's keep-alive period
//! passes without activity.
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected ──acquire──> Connecting ──ok──> Connected
//!      ^                        │                 │
//!      └────────── error ───────┘                 │
//!      └──────── idle expiry / close / failure ───┘
//! ```
//!
//! Creation happens under the state mutex, so concurrent callers that find
//! no session wait for the one in progress instead of dialing again. A
//! failed dial or login caches nothing; the next call starts from scratch.
//!
//! # Idle watcher
//!
//! Each connected session gets a watcher task that sleeps until the idle
//! timer would expire, re-checks it, and then re-checks under the mutex that
//! the cached session is still its own before closing it. [`close`] cancels
//! the watcher and waits for it to finish.
//!
//! [`close`]: OnDemandConnection::close

use crate::{IdleTimer, Session, Transport};
use qslink_core::Result;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Supplies the controller-specific steps of establishing a session.
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport;

    /// Name used in logs.
    fn name(&self) -> &str;

    /// Idle period after which an unused session is closed.
    fn keep_alive(&self) -> Duration;

    /// Open a fresh transport.
    fn dial(
        &self,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Self::Transport>> + Send;

    /// Authenticate a freshly dialed session.
    fn login(
        &self,
        session: &Session<Self::Transport>,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Release a session that is no longer wanted.
    fn disconnect(
        &self,
        session: &Session<Self::Transport>,
    ) -> impl Future<Output = Result<()>> + Send {
        session.close()
    }
}

struct Entry<T> {
    session: Arc<Session<T>>,
    idle: Arc<IdleTimer>,
    stop: CancellationToken,
    watcher: Option<JoinHandle<()>>,
}

struct Inner<C: Connector> {
    connector: C,
    state: Mutex<Option<Entry<C::Transport>>>,
    shutdown: CancellationToken,
}

/// Lazily connected, shared, idle-closed session for one processor.
///
/// # Example
///
/// ```no_run
/// use qslink_network::{Connector, OnDemandConnection};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example<C: Connector>(connector: C) -> qslink_core::Result<()> {
/// let connection = OnDemandConnection::new(connector);
/// let cancel = CancellationToken::new();
///
/// let session = connection.acquire(&cancel).await?;
/// // ... exchange commands ...
///
/// connection.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct OnDemandConnection<C: Connector> {
    inner: Arc<Inner<C>>,
}

impl<C: Connector> OnDemandConnection<C> {
    pub fn new(connector: C) -> Self {
        Self {
            inner: Arc::new(Inner {
                connector,
                state: Mutex::new(None),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn connector(&self) -> &C {
        &self.inner.connector
    }

    /// Return the live session, connecting first if there is none.
    ///
    /// A cached session that has recorded an error is closed and replaced.
    ///
    /// # Errors
    ///
    /// Any dial, login or cancellation error. Nothing is cached on failure.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<Arc<Session<C::Transport>>> {
        let mut state = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(qslink_core::Error::Cancelled),
            state = self.inner.state.lock() => state,
        };

        if let Some(entry) = state.as_ref() {
            match entry.session.error() {
                None => {
                    entry.idle.reset();
                    return Ok(entry.session.clone());
                }
                Some(err) => {
                    info!(name = self.name(), error = %err, "Replacing failed session");
                    if let Some(stale) = state.take() {
                        self.teardown(stale).await;
                    }
                }
            }
        }

        let entry = self.connect(cancel).await?;
        let session = entry.session.clone();
        *state = Some(entry);
        Ok(session)
    }

    /// As [`acquire`](Self::acquire), but a failure is returned as a
    /// [`Session::failed`] session.
    pub async fn session(&self, cancel: &CancellationToken) -> Arc<Session<C::Transport>> {
        match self.acquire(cancel).await {
            Ok(session) => session,
            Err(err) => Arc::new(Session::failed(err)),
        }
    }

    /// Close the live session, if any. Idempotent.
    ///
    /// # Errors
    ///
    /// The error reported while closing the session.
    pub async fn close(&self) -> Result<()> {
        let entry = self.inner.state.lock().await.take();
        match entry {
            Some(mut entry) => {
                info!(name = self.name(), "Closing connection");
                entry.stop.cancel();
                if let Some(watcher) = entry.watcher.take() {
                    if let Err(e) = watcher.await {
                        warn!(name = self.name(), error = %e, "Idle watcher failed");
                    }
                }
                self.inner.connector.disconnect(&entry.session).await
            }
            None => Ok(()),
        }
    }

    /// Whether a healthy session is cached.
    pub async fn is_connected(&self) -> bool {
        self.inner
            .state
            .lock()
            .await
            .as_ref()
            .is_some_and(|entry| !entry.session.is_failed())
    }

    fn name(&self) -> &str {
        self.inner.connector.name()
    }

    async fn connect(&self, cancel: &CancellationToken) -> Result<Entry<C::Transport>> {
        let connector = &self.inner.connector;
        info!(name = connector.name(), "Connecting");

        let transport = connector.dial(cancel).await?;
        let idle = Arc::new(IdleTimer::new(connector.keep_alive()));
        let session = Arc::new(Session::new(transport, idle.clone()));

        if let Err(err) = connector.login(&session, cancel).await {
            warn!(name = connector.name(), error = %err, "Login failed");
            if let Err(e) = connector.disconnect(&session).await {
                debug!(name = connector.name(), error = %e, "Disconnect after failed login");
            }
            return Err(err);
        }

        let stop = self.inner.shutdown.child_token();
        let watcher = tokio::spawn(watch_idle(
            Arc::downgrade(&self.inner),
            idle.clone(),
            stop.clone(),
        ));

        info!(
            name = connector.name(),
            keep_alive = ?connector.keep_alive(),
            "Connected"
        );
        Ok(Entry {
            session,
            idle,
            stop,
            watcher: Some(watcher),
        })
    }

    /// Stop the watcher of `entry` and close its session.
    async fn teardown(&self, mut entry: Entry<C::Transport>) {
        entry.stop.cancel();
        if let Some(watcher) = entry.watcher.take() {
            let _ = watcher.await;
        }
        if let Err(e) = self.inner.connector.disconnect(&entry.session).await {
            debug!(name = self.name(), error = %e, "Disconnect of failed session");
        }
    }
}

impl<C: Connector> Drop for OnDemandConnection<C> {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}

async fn watch_idle<C: Connector>(
    inner: Weak<Inner<C>>,
    idle: Arc<IdleTimer>,
    stop: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => return,
            _ = tokio::time::sleep(idle.remaining()) => {}
        }
        if !idle.expired() {
            continue;
        }

        let Some(inner) = inner.upgrade() else {
            return;
        };
        let mut state = tokio::select! {
            biased;
            _ = stop.cancelled() => return,
            state = inner.state.lock() => state,
        };

        let ours = state
            .as_ref()
            .is_some_and(|entry| Arc::ptr_eq(&entry.idle, &idle));
        if !ours {
            return;
        }
        // activity may have happened while waiting for the lock
        if !idle.expired() {
            continue;
        }

        if let Some(entry) = state.take() {
            let name = inner.connector.name();
            info!(name, idle = ?idle.idle_time(), "Closing idle connection");
            if let Err(e) = inner.connector.disconnect(&entry.session).await {
                debug!(name, error = %e, "Disconnect of idle session");
            }
        }
        return;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockConnector, MockTransport};
    use bytes::Bytes;
    use qslink_core::Error;

    const KEEP_ALIVE: Duration = Duration::from_secs(60);

    fn connector() -> MockConnector {
        MockConnector::new("home", KEEP_ALIVE, "lutron", "integration", || {
            MockTransport::processor("lutron", "integration")
        })
    }

    #[tokio::test]
    async fn test_acquire_connects_once() {
        let connection = OnDemandConnection::new(connector());
        let cancel = CancellationToken::new();

        let first = connection.acquire(&cancel).await.unwrap();
        let second = connection.acquire(&cancel).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(connection.connector().dials(), 1);
        assert!(connection.is_connected().await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_acquire_is_single_flight() {
        let connection = Arc::new(OnDemandConnection::new(
            connector().with_dial_delay(Duration::from_millis(50)),
        ));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let connection = connection.clone();
            handles.push(tokio::spawn(async move {
                connection.acquire(&CancellationToken::new()).await.unwrap()
            }));
        }

        let mut sessions = Vec::new();
        for handle in handles {
            sessions.push(handle.await.unwrap());
        }
        assert_eq!(connection.connector().dials(), 1);
        assert!(sessions.iter().all(|s| Arc::ptr_eq(s, &sessions[0])));
    }

    #[tokio::test]
    async fn test_bad_login_caches_nothing() {
        let connector = MockConnector::new("home", KEEP_ALIVE, "lutron", "wrong", || {
            MockTransport::processor("lutron", "integration")
        });
        let connection = OnDemandConnection::new(connector);
        let cancel = CancellationToken::new();

        let err = connection.acquire(&cancel).await.err().unwrap();
        assert!(matches!(err, Error::Login));
        assert!(!connection.is_connected().await);
        assert!(connection.connector().transports()[0].is_closed());

        let err = connection.acquire(&cancel).await.err().unwrap();
        assert!(matches!(err, Error::Login));
        assert_eq!(connection.connector().dials(), 2);
    }

    #[tokio::test]
    async fn test_dial_failure_returns_failed_session() {
        let connection = OnDemandConnection::new(connector());
        connection.connector().fail_dials(true);
        let cancel = CancellationToken::new();

        let session = connection.session(&cancel).await;
        assert!(matches!(
            session.error(),
            Some(Error::ConnectionFailed { .. })
        ));
        assert!(matches!(
            session.send(Bytes::from_static(b"?SYSTEM,1\r\n"), &cancel).await,
            Err(Error::ConnectionFailed { .. })
        ));

        connection.connector().fail_dials(false);
        let session = connection.session(&cancel).await;
        assert!(session.error().is_none());
        assert_eq!(connection.connector().dials(), 2);
    }

    #[tokio::test]
    async fn test_failed_session_is_replaced() {
        let connection = OnDemandConnection::new(connector());
        let cancel = CancellationToken::new();

        let first = connection.acquire(&cancel).await.unwrap();
        connection.connector().transports()[0].fail_sends(Some(Error::ConnectionClosed));
        assert!(first
            .send(Bytes::from_static(b"?SYSTEM,1\r\n"), &cancel)
            .await
            .is_err());
        assert!(!connection.is_connected().await);

        let second = connection.acquire(&cancel).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(second.error().is_none());
        assert_eq!(connection.connector().dials(), 2);
        assert!(connection.connector().transports()[0].is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_expiry_closes_connection() {
        let connection = OnDemandConnection::new(connector());
        let cancel = CancellationToken::new();

        connection.acquire(&cancel).await.unwrap();
        assert!(connection.is_connected().await);

        tokio::time::sleep(KEEP_ALIVE + Duration::from_secs(1)).await;
        assert!(!connection.is_connected().await);
        assert!(connection.connector().transports()[0].is_closed());

        connection.acquire(&cancel).await.unwrap();
        assert_eq!(connection.connector().dials(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_postpones_idle_expiry() {
        let connection = OnDemandConnection::new(connector());
        let cancel = CancellationToken::new();

        let session = connection.acquire(&cancel).await.unwrap();
        connection.connector().transports()[0].push_output("QNET> ");

        tokio::time::sleep(Duration::from_secs(45)).await;
        session.read_until(&["QNET> "], &cancel).await.unwrap();

        tokio::time::sleep(Duration::from_secs(45)).await;
        assert!(connection.is_connected().await);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(!connection.is_connected().await);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let connection = OnDemandConnection::new(connector());
        let cancel = CancellationToken::new();

        connection.close().await.unwrap();
        connection.acquire(&cancel).await.unwrap();
        connection.close().await.unwrap();
        connection.close().await.unwrap();

        assert!(!connection.is_connected().await);
        assert!(connection.connector().transports()[0].is_closed());
    }

    #[tokio::test]
    async fn test_acquire_after_close_reconnects() {
        let connection = OnDemandConnection::new(connector());
        let cancel = CancellationToken::new();

        connection.acquire(&cancel).await.unwrap();
        connection.close().await.unwrap();
        connection.acquire(&cancel).await.unwrap();
        assert_eq!(connection.connector().dials(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_acquire() {
        let connection = OnDemandConnection::new(connector());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = connection.acquire(&cancel).await.err().unwrap();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(connection.connector().dials(), 0);
    }
}
