//! Type registry and system assembly.
//!
//! A [`Registry`] maps the `type` names used in the configuration file to
//! constructors. [`System::build`] runs them for every configured entry and
//! resolves each device's controller while doing so, so a built system never
//! holds a device without a usable controller.
//!
//! Each entry's `operations` map is checked against the operations its type
//! provides. [`System::invoke`] runs a configured operation with its preset
//! arguments when the caller supplies none.

use crate::config::{ControllerConfig, DeviceConfig, Operations, SystemConfig};
use crate::contact_closure::{self, ContactClosure, ContactClosureOpenClose};
use crate::devices::{AnyController, AnyDevice};
use crate::error::{DeviceError, Result};
use crate::processor::{self, QsProcessor};
use crate::shades::{self, Shade};
use crate::traits::{Controller, Device, Operation};
use qslink_network::CredentialStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Builds a controller from its configuration entry.
pub type ControllerFactory =
    fn(&ControllerConfig, &Arc<dyn CredentialStore>) -> Result<AnyController>;

/// Builds a device from its configuration entry and its resolved controller.
pub type DeviceFactory = fn(&DeviceConfig, &AnyController) -> Result<AnyDevice>;

/// Constructors by type name.
#[derive(Clone)]
pub struct Registry {
    controllers: BTreeMap<String, ControllerFactory>,
    devices: BTreeMap<String, DeviceFactory>,
}

impl Registry {
    /// A registry that knows no types.
    pub fn empty() -> Self {
        Self {
            controllers: BTreeMap::new(),
            devices: BTreeMap::new(),
        }
    }

    pub fn register_controller(&mut self, kind: impl Into<String>, factory: ControllerFactory) -> &mut Self {
        self.controllers.insert(kind.into(), factory);
        self
    }

    pub fn register_device(&mut self, kind: impl Into<String>, factory: DeviceFactory) -> &mut Self {
        self.devices.insert(kind.into(), factory);
        self
    }

    pub fn controller_types(&self) -> impl Iterator<Item = &str> {
        self.controllers.keys().map(String::as_str)
    }

    pub fn device_types(&self) -> impl Iterator<Item = &str> {
        self.devices.keys().map(String::as_str)
    }
}

impl Default for Registry {
    /// The HomeWorks QS processor and its shade and contact closure devices.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register_controller(processor::KIND, build_qs_processor)
            .register_device(shades::SHADE, build_shade)
            .register_device(shades::SHADE_GROUP, build_shade_group)
            .register_device(contact_closure::CONTACT_CLOSURE, build_contact_closure)
            .register_device(
                contact_closure::CONTACT_CLOSURE_OPEN_CLOSE,
                build_contact_closure_open_close,
            );
        registry
    }
}

fn build_qs_processor(
    config: &ControllerConfig,
    store: &Arc<dyn CredentialStore>,
) -> Result<AnyController> {
    Ok(AnyController::QsProcessor(Arc::new(QsProcessor::new(
        &config.name,
        config.settings()?,
        store.clone(),
    ))))
}

fn qs_processor(config: &DeviceConfig, controller: &AnyController) -> Result<Arc<QsProcessor>> {
    controller.qs_processor().cloned().ok_or_else(|| {
        DeviceError::configuration(format!(
            "{}: controller {} is not a {}",
            config.name,
            controller.name(),
            processor::KIND
        ))
    })
}

fn build_shade(config: &DeviceConfig, controller: &AnyController) -> Result<AnyDevice> {
    let processor = qs_processor(config, controller)?;
    Ok(AnyDevice::Shade(Shade::new(&config.name, config.settings()?, processor)))
}

fn build_shade_group(config: &DeviceConfig, controller: &AnyController) -> Result<AnyDevice> {
    let processor = qs_processor(config, controller)?;
    Ok(AnyDevice::Shade(Shade::group(&config.name, config.settings()?, processor)))
}

fn build_contact_closure(config: &DeviceConfig, controller: &AnyController) -> Result<AnyDevice> {
    let processor = qs_processor(config, controller)?;
    Ok(AnyDevice::ContactClosure(ContactClosure::new(
        &config.name,
        config.settings()?,
        processor,
    )))
}

fn build_contact_closure_open_close(
    config: &DeviceConfig,
    controller: &AnyController,
) -> Result<AnyDevice> {
    let processor = qs_processor(config, controller)?;
    Ok(AnyDevice::ContactClosureOpenClose(ContactClosureOpenClose::new(
        &config.name,
        config.settings()?,
        processor,
    )))
}

/// Configured controllers and devices, by name.
pub struct System {
    location: Option<String>,
    controllers: BTreeMap<String, AnyController>,
    devices: BTreeMap<String, AnyDevice>,
    configured: BTreeMap<String, Operations>,
}

impl System {
    /// Construct every configured controller and device.
    ///
    /// Nothing connects here; each processor dials on first use.
    ///
    /// # Errors
    ///
    /// - [`DeviceError::UnsupportedType`] for a type missing from `registry`
    /// - [`DeviceError::UnknownController`] for a device whose controller is
    ///   not configured
    /// - [`DeviceError::UnknownOperation`] for a configured operation the
    ///   type does not provide
    /// - [`DeviceError::Configuration`] for duplicate names or bad settings
    pub fn build(
        config: &SystemConfig,
        registry: &Registry,
        store: Arc<dyn CredentialStore>,
    ) -> Result<Self> {
        let mut controllers = BTreeMap::new();
        let mut configured = BTreeMap::new();
        for entry in &config.controllers {
            let factory = registry
                .controllers
                .get(&entry.kind)
                .ok_or_else(|| DeviceError::unsupported_type(&entry.kind))?;
            if controllers.contains_key(&entry.name) {
                return Err(duplicate(&entry.name));
            }
            let controller = factory(entry, &store)?;
            check_configured(&entry.name, &entry.operations, controller.operations())?;
            configured.insert(entry.name.clone(), entry.operations.clone());
            controllers.insert(entry.name.clone(), controller);
        }

        let mut devices = BTreeMap::new();
        for entry in &config.devices {
            let factory = registry
                .devices
                .get(&entry.kind)
                .ok_or_else(|| DeviceError::unsupported_type(&entry.kind))?;
            if devices.contains_key(&entry.name) || controllers.contains_key(&entry.name) {
                return Err(duplicate(&entry.name));
            }
            let controller =
                controllers
                    .get(&entry.controller)
                    .ok_or_else(|| DeviceError::UnknownController {
                        device: entry.name.clone(),
                        controller: entry.controller.clone(),
                    })?;
            let device = factory(entry, controller)?;
            check_configured(&entry.name, &entry.operations, device.operations())?;
            configured.insert(entry.name.clone(), entry.operations.clone());
            devices.insert(entry.name.clone(), device);
        }

        info!(
            controllers = controllers.len(),
            devices = devices.len(),
            "System configured"
        );
        Ok(Self {
            location: config.location.clone(),
            controllers,
            devices,
            configured,
        })
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn controller(&self, name: &str) -> Option<&AnyController> {
        self.controllers.get(name)
    }

    pub fn device(&self, name: &str) -> Option<&AnyDevice> {
        self.devices.get(name)
    }

    /// Controllers in name order.
    pub fn controllers(&self) -> impl Iterator<Item = &AnyController> {
        self.controllers.values()
    }

    /// Devices in name order.
    pub fn devices(&self) -> impl Iterator<Item = &AnyDevice> {
        self.devices.values()
    }

    /// Operations configured for the controller or device `name`.
    pub fn configured_operations(&self, name: &str) -> Option<&Operations> {
        self.configured.get(name)
    }

    /// Preset arguments of `operation` on `name`, if it is configured.
    pub fn configured(&self, name: &str, operation: &str) -> Option<&[String]> {
        self.configured.get(name)?.get(operation).map(Vec::as_slice)
    }

    /// Run `target`, written `name.operation`, on the controller or device
    /// of that name.
    ///
    /// Without `args`, a configured operation runs with its preset
    /// arguments. Operations that are not configured can still be run.
    pub async fn invoke(
        &self,
        target: &str,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<String> {
        let (name, operation) = split_target(target)?;
        let args = match self.configured(name, operation) {
            Some(preset) if args.is_empty() => {
                debug!(name, operation, args = ?preset, "Using configured arguments");
                preset
            }
            _ => args,
        };
        if let Some(controller) = self.controllers.get(name) {
            return controller.invoke(operation, args, cancel).await;
        }
        if let Some(device) = self.devices.get(name) {
            return device.invoke(operation, args, cancel).await;
        }
        Err(DeviceError::unknown_target(name))
    }

    /// Close every controller's connection.
    ///
    /// All controllers are closed; the first error is returned.
    pub async fn close(&self) -> Result<()> {
        let mut first = None;
        for controller in self.controllers.values() {
            if let Err(e) = controller.close().await {
                warn!(name = controller.name(), error = %e, "Close failed");
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }
}

fn check_configured(name: &str, configured: &Operations, provided: &[Operation]) -> Result<()> {
    match configured
        .keys()
        .find(|op| !provided.iter().any(|p| p.name == op.as_str()))
    {
        Some(op) => Err(DeviceError::unknown_operation(name, op)),
        None => Ok(()),
    }
}

fn duplicate(name: &str) -> DeviceError {
    DeviceError::configuration(format!("duplicate name: {name}"))
}

fn split_target(target: &str) -> Result<(&str, &str)> {
    match target.split('.').collect::<Vec<_>>()[..] {
        [name, operation] if !name.is_empty() && !operation.is_empty() => Ok((name, operation)),
        _ => Err(DeviceError::invalid_argument(
            target,
            "should be name.operation",
        )),
    }
}
