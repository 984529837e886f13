//! Controller and device trait definitions.
//!
//! A controller owns the connection to a processor; a device is addressed
//! through one controller by its integration id. Both expose a fixed table of
//! named operations that take string arguments, so a command line or a
//! scheduler can drive any of them without knowing the concrete type.
//!
//! The traits use native `async fn` methods. Dispatch over the concrete types
//! goes through the enums in [`devices`](crate::devices).

#![allow(async_fn_in_trait)]

use crate::error::{DeviceError, Result};
use tokio_util::sync::CancellationToken;

/// A named operation and its one-line help text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operation {
    pub name: &'static str,
    pub help: &'static str,
}

impl Operation {
    pub const fn new(name: &'static str, help: &'static str) -> Self {
        Self { name, help }
    }
}

/// Owner of the connection to one processor.
pub trait Controller: Send + Sync {
    /// Configured name.
    fn name(&self) -> &str;

    /// Registry type name, e.g. `homeworks-qs`.
    fn kind(&self) -> &'static str;

    fn operations(&self) -> &'static [Operation];

    /// Run `operation` and return its printable output.
    ///
    /// # Errors
    ///
    /// [`DeviceError::UnknownOperation`] for a name not in
    /// [`operations`](Self::operations), otherwise whatever the operation
    /// reports.
    async fn invoke(
        &self,
        operation: &str,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<String>;

    /// Close the connection, if open.
    async fn close(&self) -> Result<()>;
}

/// A load, shade or contact closure addressed through a controller.
pub trait Device: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> &'static str;

    /// Name of the controller this device is wired to.
    fn controller_name(&self) -> &str;

    fn operations(&self) -> &'static [Operation];

    /// Run `operation` and return its printable output.
    ///
    /// # Errors
    ///
    /// [`DeviceError::UnknownOperation`], [`DeviceError::InvalidArgument`] or
    /// the protocol error of the underlying command.
    async fn invoke(
        &self,
        operation: &str,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<String>;
}

/// Resolve `name` in `operations`, reporting it against `target` if absent.
pub(crate) fn lookup<'a>(
    operations: &'a [Operation],
    target: &str,
    name: &str,
) -> Result<&'a Operation> {
    operations
        .iter()
        .find(|op| op.name == name)
        .ok_or_else(|| DeviceError::unknown_operation(target, name))
}

/// Fail unless `args` is empty.
pub(crate) fn no_args(operation: &str, args: &[String]) -> Result<()> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(DeviceError::invalid_argument(
            operation,
            format!("takes no arguments, got {}", args.len()),
        ))
    }
}
