//! Controllers and devices of a HomeWorks QS installation.
//!
//! This crate sits on top of the session layer in `qslink-network` and turns
//! a configuration file into named controllers and devices with string
//! operations:
//!
//! - [`QsProcessor`]: system queries (time, location, sun times, firmware)
//!   over an on-demand connection
//! - [`Shade`]: single shades and shade groups
//! - [`ContactClosure`] / [`ContactClosureOpenClose`]: pulsed outputs
//! - [`Registry`] / [`System`]: type names to constructors, and the
//!   assembled installation
//! - [`SystemConfig`] / [`KeyStore`]: the YAML configuration and
//!   credentials files
//!
//! # Example
//!
//! ```no_run
//! use qslink_devices::{KeyStore, Registry, System, SystemConfig};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> qslink_devices::Result<()> {
//! let config = SystemConfig::load("system.yaml")?;
//! let keys = KeyStore::load("keys.yaml")?;
//! let system = System::build(&config, &Registry::default(), Arc::new(keys))?;
//!
//! let cancel = CancellationToken::new();
//! system.invoke("living room.lower", &[], &cancel).await?;
//! println!("{}", system.invoke("home.getsuntimes", &[], &cancel).await?);
//!
//! system.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod contact_closure;
pub mod devices;
pub mod error;
pub mod keystore;
pub mod processor;
pub mod registry;
pub mod shades;
pub mod traits;

pub use config::{ControllerConfig, DeviceConfig, Operations, SystemConfig};
pub use contact_closure::{
    ContactClosure, ContactClosureConfig, ContactClosureOpenClose, ContactClosureOpenCloseConfig,
};
pub use devices::{AnyController, AnyDevice};
pub use error::{DeviceError, Result};
pub use keystore::KeyStore;
pub use processor::{QsConnector, QsProcessor, QsProcessorConfig};
pub use registry::{ControllerFactory, DeviceFactory, Registry, System};
pub use shades::{Shade, ShadeConfig};
pub use traits::{Controller, Device, Operation};
