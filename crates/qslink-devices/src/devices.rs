//! Enum wrappers for controller and device dispatch.
//!
//! Native `async fn` in traits is not object safe, so a configured system
//! holds its controllers and devices as these enums instead of
//! `Box<dyn Controller>`. Each variant forwards to the concrete type.

use crate::contact_closure::{ContactClosure, ContactClosureOpenClose};
use crate::error::Result;
use crate::processor::QsProcessor;
use crate::shades::Shade;
use crate::traits::{Controller, Device, Operation};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Any configured controller.
#[derive(Clone)]
#[non_exhaustive]
pub enum AnyController {
    QsProcessor(Arc<QsProcessor>),
}

impl AnyController {
    /// The processor behind this controller, for wiring devices to it.
    pub fn qs_processor(&self) -> Option<&Arc<QsProcessor>> {
        match self {
            Self::QsProcessor(processor) => Some(processor),
        }
    }
}

impl Controller for AnyController {
    fn name(&self) -> &str {
        match self {
            Self::QsProcessor(c) => c.name(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::QsProcessor(c) => c.kind(),
        }
    }

    fn operations(&self) -> &'static [Operation] {
        match self {
            Self::QsProcessor(c) => c.operations(),
        }
    }

    async fn invoke(
        &self,
        operation: &str,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<String> {
        match self {
            Self::QsProcessor(c) => c.invoke(operation, args, cancel).await,
        }
    }

    async fn close(&self) -> Result<()> {
        match self {
            Self::QsProcessor(c) => c.close().await,
        }
    }
}

/// Any configured device.
#[non_exhaustive]
pub enum AnyDevice {
    /// A shade or a shade group.
    Shade(Shade),
    ContactClosure(ContactClosure),
    ContactClosureOpenClose(ContactClosureOpenClose),
}

impl Device for AnyDevice {
    fn name(&self) -> &str {
        match self {
            Self::Shade(d) => d.name(),
            Self::ContactClosure(d) => d.name(),
            Self::ContactClosureOpenClose(d) => d.name(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Shade(d) => d.kind(),
            Self::ContactClosure(d) => d.kind(),
            Self::ContactClosureOpenClose(d) => d.kind(),
        }
    }

    fn controller_name(&self) -> &str {
        match self {
            Self::Shade(d) => d.controller_name(),
            Self::ContactClosure(d) => d.controller_name(),
            Self::ContactClosureOpenClose(d) => d.controller_name(),
        }
    }

    fn operations(&self) -> &'static [Operation] {
        match self {
            Self::Shade(d) => d.operations(),
            Self::ContactClosure(d) => d.operations(),
            Self::ContactClosureOpenClose(d) => d.operations(),
        }
    }

    async fn invoke(
        &self,
        operation: &str,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<String> {
        match self {
            Self::Shade(d) => d.invoke(operation, args, cancel).await,
            Self::ContactClosure(d) => d.invoke(operation, args, cancel).await,
            Self::ContactClosureOpenClose(d) => d.invoke(operation, args, cancel).await,
        }
    }
}
