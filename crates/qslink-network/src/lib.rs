//! Network layer for qslink
//!
//! This crate turns a telnet byte stream into authenticated, shared sessions
//! with a QS processor.
//!
//! # Components
//!
//! - **Transport**: byte stream abstraction; [`TelnetTransport`] over TCP
//! - **Session**: transport plus idle tracking and sticky errors
//! - **login**: the `login: ` / `password: ` handshake
//! - **OnDemandConnection**: lazy dial, single-flight connect, idle teardown
//!
//! # Example
//!
//! ```no_run
//! use qslink_network::{OnDemandConnection, mock::MockConnector, mock::MockTransport};
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> qslink_core::Result<()> {
//! let connector = MockConnector::new("home", Duration::from_secs(60), "lutron", "integration", || {
//!     MockTransport::processor("lutron", "integration")
//! });
//! let connection = OnDemandConnection::new(connector);
//!
//! let session = connection.acquire(&CancellationToken::new()).await?;
//! assert!(session.error().is_none());
//! connection.close().await?;
//! # Ok(())
//! # }
//! ```

mod connection;
mod idle;
mod login;
pub mod mock;
mod session;
mod transport;

pub use connection::{Connector, OnDemandConnection};
pub use idle::IdleTimer;
pub use login::{CredentialStore, Credentials, login};
pub use session::Session;
pub use transport::{TelnetConfig, TelnetTransport, Transport};
