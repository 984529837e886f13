//! HomeWorks QS processor controller.
//!
//! [`QsProcessor`] issues commands over an [`OnDemandConnection`], so the
//! first command dials and logs in and the connection is dropped again after
//! the configured keep-alive period without traffic. Devices hold an
//! `Arc<QsProcessor>` and go through [`QsProcessor::command`].

use crate::config;
use crate::error::{DeviceError, Result};
use crate::traits::{Controller, Operation, lookup, no_args};
use chrono::{DateTime, FixedOffset, NaiveTime};
use qslink_core::constants::{DEFAULT_KEEP_ALIVE_MS, DEFAULT_PORT, DEFAULT_TIMEOUT_MS, PROMPT};
use qslink_core::{CommandGroup, Error, SystemAction};
use qslink_network::{
    Connector, CredentialStore, OnDemandConnection, Session, TelnetConfig, TelnetTransport, login,
};
use qslink_protocol::{Command, ResponseParser, parse_clock_time, parse_lat_long, parse_system_time};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Registry type name.
pub const KIND: &str = "homeworks-qs";

const OPERATIONS: &[Operation] = &[
    Operation::new("gettime", "get the current time, date and timezone"),
    Operation::new("getlocation", "get the current location in latitude and longitude"),
    Operation::new("getsuntimes", "get the current sunrise and sunset times in local time"),
    Operation::new("os_version", "get the OS version running on QS processor"),
];

/// Settings of a `homeworks-qs` controller entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QsProcessorConfig {
    /// `host` or `host:port`; port 23 is used when absent.
    pub ip_address: String,

    /// Dial, send and read timeout.
    #[serde(default = "default_timeout", with = "config::duration")]
    pub timeout: Duration,

    /// Idle period after which the connection is closed.
    #[serde(default = "default_keep_alive", with = "config::duration")]
    pub keep_alive: Duration,

    /// Credentials to log in with.
    pub key_id: String,
}

fn default_timeout() -> Duration {
    Duration::from_millis(DEFAULT_TIMEOUT_MS)
}

fn default_keep_alive() -> Duration {
    Duration::from_millis(DEFAULT_KEEP_ALIVE_MS)
}

impl QsProcessorConfig {
    pub fn new(ip_address: impl Into<String>, key_id: impl Into<String>) -> Self {
        Self {
            ip_address: ip_address.into(),
            timeout: default_timeout(),
            keep_alive: default_keep_alive(),
            key_id: key_id.into(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// `ip_address` with the default port filled in.
    pub fn address(&self) -> String {
        let addr = self.ip_address.trim();
        if addr.parse::<SocketAddr>().is_ok() {
            return addr.to_string();
        }
        let bare = addr
            .strip_prefix('[')
            .and_then(|inner| inner.strip_suffix(']'))
            .unwrap_or(addr);
        if let Ok(ip) = bare.parse::<IpAddr>() {
            return SocketAddr::new(ip, DEFAULT_PORT).to_string();
        }
        // A host name; more than one colon is never a port separator.
        match addr.rsplit_once(':') {
            Some((host, port))
                if !host.is_empty() && !host.contains(':') && port.parse::<u16>().is_ok() =>
            {
                addr.to_string()
            }
            _ => format!("{addr}:{DEFAULT_PORT}"),
        }
    }
}

/// Dials the processor over telnet and logs in with credentials from a
/// [`CredentialStore`].
pub struct QsConnector {
    name: String,
    config: QsProcessorConfig,
    store: Arc<dyn CredentialStore>,
}

impl QsConnector {
    pub fn new(
        name: impl Into<String>,
        config: QsProcessorConfig,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            store,
        }
    }

    pub fn config(&self) -> &QsProcessorConfig {
        &self.config
    }
}

impl Connector for QsConnector {
    type Transport = TelnetTransport;

    fn name(&self) -> &str {
        &self.name
    }

    fn keep_alive(&self) -> Duration {
        self.config.keep_alive
    }

    async fn dial(&self, cancel: &CancellationToken) -> qslink_core::Result<TelnetTransport> {
        let telnet = TelnetConfig {
            addr: self.config.address(),
            timeout: self.config.timeout,
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            transport = TelnetTransport::dial(&telnet) => transport,
        }
    }

    async fn login(
        &self,
        session: &Session<TelnetTransport>,
        cancel: &CancellationToken,
    ) -> qslink_core::Result<()> {
        let credentials = self.store.lookup(&self.config.key_id)?;
        login(session, &credentials, cancel).await
    }
}

/// A HomeWorks QS processor.
///
/// # Example
///
/// ```no_run
/// use qslink_devices::{Controller, KeyStore, QsProcessor, QsProcessorConfig};
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> qslink_devices::Result<()> {
/// let keys = KeyStore::load("keys.yaml")?;
/// let processor = QsProcessor::new(
///     "home",
///     QsProcessorConfig::new("192.168.1.50", "home"),
///     Arc::new(keys),
/// );
///
/// let cancel = CancellationToken::new();
/// println!("{}", processor.version(&cancel).await?);
/// processor.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct QsProcessor<C: Connector = QsConnector> {
    name: String,
    connection: OnDemandConnection<C>,
}

impl QsProcessor {
    pub fn new(
        name: impl Into<String>,
        config: QsProcessorConfig,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        let name = name.into();
        let connector = QsConnector::new(name.clone(), config, store);
        Self::with_connector(name, connector)
    }

    pub fn config(&self) -> &QsProcessorConfig {
        self.connection.connector().config()
    }
}

impl<C: Connector> QsProcessor<C> {
    /// A processor that connects through `connector`.
    pub fn with_connector(name: impl Into<String>, connector: C) -> Self {
        Self {
            name: name.into(),
            connection: OnDemandConnection::new(connector),
        }
    }

    pub fn connector(&self) -> &C {
        self.connection.connector()
    }

    pub async fn is_connected(&self) -> bool {
        self.connection.is_connected().await
    }

    /// The live session, or a failed session carrying the connect error.
    pub async fn session(&self, cancel: &CancellationToken) -> Arc<Session<C::Transport>> {
        self.connection.session(cancel).await
    }

    /// Issue `command` and decode its reply.
    ///
    /// Queries return the payload of the matching response line. Set
    /// commands return an empty string once the reply is known to carry no
    /// error.
    pub async fn run(&self, command: &Command, cancel: &CancellationToken) -> Result<String> {
        debug!(name = %self.name, command = %command, "Issuing command");
        let session = self.session(cancel).await;
        let reply = session.exchange(command.request(), &[PROMPT], cancel).await?;
        if command.is_set() {
            ResponseParser::check(&reply)?;
            return Ok(String::new());
        }
        Ok(ResponseParser::parse(&command.response_prefix(), &reply)?)
    }

    /// Issue a command of `group` with comma separated `parameters`.
    pub async fn command(
        &self,
        group: CommandGroup,
        set: bool,
        parameters: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        self.run(&Command::new(group, set, parameters.to_string()), cancel)
            .await
    }

    pub async fn system(
        &self,
        set: bool,
        action: SystemAction,
        parameters: &[&str],
        cancel: &CancellationToken,
    ) -> Result<String> {
        self.run(&Command::system(set, action, parameters), cancel)
            .await
    }

    pub async fn system_query(
        &self,
        action: SystemAction,
        cancel: &CancellationToken,
    ) -> Result<String> {
        self.system(false, action, &[], cancel).await
    }

    /// Current date, time and zone of the processor.
    pub async fn time(&self, cancel: &CancellationToken) -> Result<DateTime<FixedOffset>> {
        let date = self.system_query(SystemAction::Date, cancel).await?;
        let time = self.system_query(SystemAction::Time, cancel).await?;
        let zone = self.system_query(SystemAction::TimeZone, cancel).await?;
        Ok(parse_system_time(&date, &time, &zone)?)
    }

    /// Latitude and longitude.
    pub async fn lat_long(&self, cancel: &CancellationToken) -> Result<(f64, f64)> {
        let payload = self.system_query(SystemAction::LatLong, cancel).await?;
        Ok(parse_lat_long(&payload)?)
    }

    /// Sunrise and sunset in processor local time.
    pub async fn sun_times(&self, cancel: &CancellationToken) -> Result<(NaiveTime, NaiveTime)> {
        let sunrise = self.system_query(SystemAction::Sunrise, cancel).await?;
        let sunset = self.system_query(SystemAction::Sunset, cancel).await?;
        Ok((parse_clock_time(&sunrise)?, parse_clock_time(&sunset)?))
    }

    /// Firmware revision.
    pub async fn version(&self, cancel: &CancellationToken) -> Result<String> {
        self.system_query(SystemAction::OsRevision, cancel).await
    }
}

impl<C: Connector> Controller for QsProcessor<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        KIND
    }

    fn operations(&self) -> &'static [Operation] {
        OPERATIONS
    }

    async fn invoke(
        &self,
        operation: &str,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<String> {
        let op = lookup(OPERATIONS, &self.name, operation)?;
        no_args(op.name, args)?;
        match op.name {
            "gettime" => Ok(format!("gettime: {}", self.time(cancel).await?)),
            "getlocation" => {
                let (lat, long) = self.lat_long(cancel).await?;
                Ok(format!("latlong: {lat}N {long}W"))
            }
            "getsuntimes" => {
                let (rise, set) = self.sun_times(cancel).await?;
                Ok(format!(
                    "sunrise: {}, sunset: {}",
                    rise.format("%H:%M:%S"),
                    set.format("%H:%M:%S")
                ))
            }
            "os_version" => self.version(cancel).await,
            other => Err(DeviceError::unknown_operation(&self.name, other)),
        }
    }

    async fn close(&self) -> Result<()> {
        Ok(self.connection.close().await?)
    }
}
