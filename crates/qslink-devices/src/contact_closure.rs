//! Contact closure outputs.
//!
//! A pulse drives the output to one level, holds it for the pulse duration
//! and drives it back:
//!
//! ```text
//! #OUTPUT,<id>,1,<a>
//! ... pulse duration ...
//! #OUTPUT,<id>,1,<b>
//! ```
//!
//! Pulses on one device are serialised, and a pulse does not start until the
//! operation interval has passed since the previous one started.

use crate::config;
use crate::error::{DeviceError, Result};
use crate::processor::{QsConnector, QsProcessor};
use crate::traits::{Controller, Device, Operation, lookup, no_args};
use qslink_core::{CommandGroup, Error};
use qslink_network::Connector;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Registry type name of a single contact closure.
pub const CONTACT_CLOSURE: &str = "contact-closure";

/// Registry type name of an open/close pair.
pub const CONTACT_CLOSURE_OPEN_CLOSE: &str = "contact-closure-open-close";

/// Shortest pulse of an open/close pair.
pub const MIN_PULSE_DURATION: Duration = Duration::from_millis(10);

/// Shortest spacing between pulses of an open/close pair.
pub const MIN_OPERATION_INTERVAL: Duration = Duration::from_secs(60);

const HIGH: char = '1';
const LOW: char = '0';

const CLOSURE_OPERATIONS: &[Operation] = &[
    Operation::new("pulse-on", "pulse the contact closure to on"),
    Operation::new("pulse-off", "pulse the contact closure to off"),
];

const OPEN_CLOSE_OPERATIONS: &[Operation] = &[
    Operation::new("open", "pulse the contact closure to open"),
    Operation::new("close", "pulse the contact closure to close"),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactClosureConfig {
    pub id: u32,
    #[serde(default, with = "config::duration")]
    pub pulse_duration: Duration,
    #[serde(default, with = "config::duration")]
    pub operation_interval: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactClosureOpenCloseConfig {
    pub open_id: u32,
    pub close_id: u32,
    /// Pulse low then high instead of high then low.
    #[serde(default)]
    pub pulse_low: bool,
    #[serde(default, with = "config::duration")]
    pub pulse_duration: Duration,
    #[serde(default, with = "config::duration")]
    pub operation_interval: Duration,
}

/// Serialises pulses and spaces them out.
struct Pulser {
    /// Start of the previous pulse.
    last: Mutex<Option<Instant>>,
}

impl Pulser {
    fn new() -> Self {
        Self {
            last: Mutex::new(None),
        }
    }

    async fn pulse<C: Connector>(
        &self,
        processor: &QsProcessor<C>,
        id: u32,
        (first, second): (char, char),
        duration: Duration,
        interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut last = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled.into()),
            last = self.last.lock() => last,
        };

        if let Some(previous) = *last {
            let ready = previous + interval;
            if ready > Instant::now() {
                debug!(id, wait = ?(ready - Instant::now()), "Waiting for operation interval");
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(Error::Cancelled.into()),
                    _ = tokio::time::sleep_until(ready) => {}
                }
            }
        }

        info!(id, pulse = ?duration, level = %first, "Pulsing contact closure");
        set_output(processor, id, first, cancel).await?;
        *last = Some(Instant::now());

        tokio::time::sleep(duration).await;
        // the closure is released even if the caller has given up
        set_output(processor, id, second, &CancellationToken::new()).await
    }
}

async fn set_output<C: Connector>(
    processor: &QsProcessor<C>,
    id: u32,
    level: char,
    cancel: &CancellationToken,
) -> Result<()> {
    processor
        .command(CommandGroup::Output, true, &format!("{id},1,{level}"), cancel)
        .await?;
    Ok(())
}

/// A single contact closure output.
pub struct ContactClosure<C: Connector = QsConnector> {
    name: String,
    config: ContactClosureConfig,
    processor: Arc<QsProcessor<C>>,
    pulser: Pulser,
}

impl<C: Connector> ContactClosure<C> {
    pub fn new(
        name: impl Into<String>,
        config: ContactClosureConfig,
        processor: Arc<QsProcessor<C>>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            processor,
            pulser: Pulser::new(),
        }
    }

    /// High, then low.
    pub async fn pulse_on(&self, cancel: &CancellationToken) -> Result<()> {
        self.pulse((HIGH, LOW), cancel).await
    }

    /// Low, then high.
    pub async fn pulse_off(&self, cancel: &CancellationToken) -> Result<()> {
        self.pulse((LOW, HIGH), cancel).await
    }

    async fn pulse(&self, levels: (char, char), cancel: &CancellationToken) -> Result<()> {
        self.pulser
            .pulse(
                &self.processor,
                self.config.id,
                levels,
                self.config.pulse_duration,
                self.config.operation_interval,
                cancel,
            )
            .await
    }
}

impl<C: Connector> Device for ContactClosure<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        CONTACT_CLOSURE
    }

    fn controller_name(&self) -> &str {
        self.processor.name()
    }

    fn operations(&self) -> &'static [Operation] {
        CLOSURE_OPERATIONS
    }

    async fn invoke(
        &self,
        operation: &str,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<String> {
        let op = lookup(CLOSURE_OPERATIONS, &self.name, operation)?;
        no_args(op.name, args)?;
        match op.name {
            "pulse-on" => self.pulse_on(cancel).await?,
            "pulse-off" => self.pulse_off(cancel).await?,
            other => return Err(DeviceError::unknown_operation(&self.name, other)),
        }
        Ok(String::new())
    }
}

/// A gate or door driven by separate open and close contact closures.
///
/// Pulses are at least [`MIN_PULSE_DURATION`] long and at least
/// [`MIN_OPERATION_INTERVAL`] apart, whichever output they drive.
pub struct ContactClosureOpenClose<C: Connector = QsConnector> {
    name: String,
    config: ContactClosureOpenCloseConfig,
    processor: Arc<QsProcessor<C>>,
    pulser: Pulser,
}

impl<C: Connector> ContactClosureOpenClose<C> {
    pub fn new(
        name: impl Into<String>,
        config: ContactClosureOpenCloseConfig,
        processor: Arc<QsProcessor<C>>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            processor,
            pulser: Pulser::new(),
        }
    }

    pub fn pulse_duration(&self) -> Duration {
        self.config.pulse_duration.max(MIN_PULSE_DURATION)
    }

    pub fn operation_interval(&self) -> Duration {
        self.config.operation_interval.max(MIN_OPERATION_INTERVAL)
    }

    pub async fn open(&self, cancel: &CancellationToken) -> Result<()> {
        self.pulse(self.config.open_id, cancel).await
    }

    pub async fn close(&self, cancel: &CancellationToken) -> Result<()> {
        self.pulse(self.config.close_id, cancel).await
    }

    async fn pulse(&self, id: u32, cancel: &CancellationToken) -> Result<()> {
        let levels = if self.config.pulse_low {
            (LOW, HIGH)
        } else {
            (HIGH, LOW)
        };
        self.pulser
            .pulse(
                &self.processor,
                id,
                levels,
                self.pulse_duration(),
                self.operation_interval(),
                cancel,
            )
            .await
    }
}

impl<C: Connector> Device for ContactClosureOpenClose<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        CONTACT_CLOSURE_OPEN_CLOSE
    }

    fn controller_name(&self) -> &str {
        self.processor.name()
    }

    fn operations(&self) -> &'static [Operation] {
        OPEN_CLOSE_OPERATIONS
    }

    async fn invoke(
        &self,
        operation: &str,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<String> {
        let op = lookup(OPEN_CLOSE_OPERATIONS, &self.name, operation)?;
        no_args(op.name, args)?;
        match op.name {
            "open" => self.open(cancel).await?,
            "close" => self.close(cancel).await?,
            other => return Err(DeviceError::unknown_operation(&self.name, other)),
        }
        Ok(String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DeviceError;
    use qslink_network::mock::{MockConnector, MockTransport};

    fn processor() -> Arc<QsProcessor<MockConnector>> {
        let connector = MockConnector::new(
            "home",
            Duration::from_secs(3600),
            "lutron",
            "integration",
            || {
                let transport = MockTransport::processor("lutron", "integration");
                for id in [5, 30, 31] {
                    transport.on(&format!("#OUTPUT,{id},1,1\r\n"), "QNET> ");
                    transport.on(&format!("#OUTPUT,{id},1,0\r\n"), "QNET> ");
                }
                transport
            },
        );
        Arc::new(QsProcessor::with_connector("home", connector))
    }

    /// Output commands sent after login.
    fn outputs(processor: &QsProcessor<MockConnector>) -> Vec<String> {
        processor.connector().transports()[0]
            .sent()
            .iter()
            .map(|b| String::from_utf8_lossy(b).trim_end().to_string())
            .filter(|line| line.starts_with("#OUTPUT"))
            .collect()
    }

    fn gate(processor: Arc<QsProcessor<MockConnector>>, pulse_low: bool) -> ContactClosureOpenClose<MockConnector> {
        ContactClosureOpenClose::new(
            "gate",
            ContactClosureOpenCloseConfig {
                open_id: 30,
                close_id: 31,
                pulse_low,
                pulse_duration: Duration::ZERO,
                operation_interval: Duration::ZERO,
            },
            processor,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_pulse_on_and_off() {
        let processor = processor();
        let closure = ContactClosure::new(
            "pump",
            ContactClosureConfig {
                id: 5,
                pulse_duration: Duration::from_millis(500),
                operation_interval: Duration::ZERO,
            },
            processor.clone(),
        );
        let cancel = CancellationToken::new();

        let start = Instant::now();
        closure.invoke("pulse-on", &[], &cancel).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(500));
        closure.invoke("pulse-off", &[], &cancel).await.unwrap();

        assert_eq!(
            outputs(&processor),
            [
                "#OUTPUT,5,1,1",
                "#OUTPUT,5,1,0",
                "#OUTPUT,5,1,0",
                "#OUTPUT,5,1,1",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_close_polarity() {
        let processor = processor();
        let cancel = CancellationToken::new();

        gate(processor.clone(), false).open(&cancel).await.unwrap();
        assert_eq!(outputs(&processor), ["#OUTPUT,30,1,1", "#OUTPUT,30,1,0"]);

        let processor = self::processor();
        gate(processor.clone(), true).close(&cancel).await.unwrap();
        assert_eq!(outputs(&processor), ["#OUTPUT,31,1,0", "#OUTPUT,31,1,1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_close_floors() {
        let gate = gate(processor(), false);
        assert_eq!(gate.pulse_duration(), MIN_PULSE_DURATION);
        assert_eq!(gate.operation_interval(), MIN_OPERATION_INTERVAL);

        let start = Instant::now();
        gate.open(&CancellationToken::new()).await.unwrap();
        assert!(start.elapsed() >= MIN_PULSE_DURATION);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_pulse_waits_for_interval() {
        let processor = processor();
        let gate = gate(processor.clone(), false);
        let cancel = CancellationToken::new();

        let start = Instant::now();
        gate.open(&cancel).await.unwrap();
        gate.close(&cancel).await.unwrap();
        assert!(start.elapsed() >= MIN_OPERATION_INTERVAL);
        assert_eq!(
            outputs(&processor),
            [
                "#OUTPUT,30,1,1",
                "#OUTPUT,30,1,0",
                "#OUTPUT,31,1,1",
                "#OUTPUT,31,1,0",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_pulses_do_not_interleave() {
        let processor = processor();
        let gate = Arc::new(gate(processor.clone(), false));

        let opener = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.open(&CancellationToken::new()).await })
        };
        let closer = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.close(&CancellationToken::new()).await })
        };
        opener.await.unwrap().unwrap();
        closer.await.unwrap().unwrap();

        let sent = outputs(&processor);
        assert_eq!(sent.len(), 4);
        // each pulse's two edges are adjacent
        assert_eq!(sent[0][..10], sent[1][..10]);
        assert_eq!(sent[2][..10], sent[3][..10]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_waiting_for_interval() {
        let processor = processor();
        let gate = gate(processor.clone(), false);

        gate.open(&CancellationToken::new()).await.unwrap();

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            canceller.cancel();
        });
        let err = gate.close(&cancel).await.unwrap_err();
        assert!(matches!(err, DeviceError::Protocol(Error::Cancelled)));
        assert_eq!(outputs(&processor).len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_operation_and_arguments() {
        let gate = gate(processor(), false);
        let cancel = CancellationToken::new();

        assert!(matches!(
            gate.invoke("pulse-on", &[], &cancel).await,
            Err(DeviceError::UnknownOperation { .. })
        ));
        assert!(matches!(
            gate.invoke("open", &["now".to_string()], &cancel).await,
            Err(DeviceError::InvalidArgument { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_close_operations_by_name() {
        let processor = processor();
        let gate = gate(processor.clone(), false);
        let cancel = CancellationToken::new();

        for op in gate.operations() {
            gate.invoke(op.name, &[], &cancel).await.unwrap();
        }
        assert_eq!(
            outputs(&processor),
            [
                "#OUTPUT,30,1,1",
                "#OUTPUT,30,1,0",
                "#OUTPUT,31,1,1",
                "#OUTPUT,31,1,0",
            ]
        );

        assert!(matches!(
            gate.invoke("OPEN", &[], &cancel).await,
            Err(DeviceError::UnknownOperation { .. })
        ));
        assert_eq!(outputs(&processor).len(), 4);
    }

    #[test]
    fn test_config_durations() {
        let config: ContactClosureOpenCloseConfig = serde_yaml::from_str(
            "open_id: 1\nclose_id: 2\npulse_low: true\npulse_duration: 250ms\noperation_interval: 2m\n",
        )
        .unwrap();
        assert!(config.pulse_low);
        assert_eq!(config.pulse_duration, Duration::from_millis(250));
        assert_eq!(config.operation_interval, Duration::from_secs(120));

        let config: ContactClosureConfig = serde_yaml::from_str("id: 9\n").unwrap();
        assert_eq!(config.pulse_duration, Duration::ZERO);
    }
}
