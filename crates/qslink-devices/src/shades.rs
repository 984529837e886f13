//! Shades and shade groups.
//!
//! A single shade is addressed as an `OUTPUT`, a group as a `SHADEGRP`; both
//! take the same actions:
//!
//! | operation | request          |
//! |-----------|------------------|
//! | raise     | `#GRP,id,2`      |
//! | lower     | `#GRP,id,3`      |
//! | set       | `#GRP,id,1,lvl`  |

use crate::error::{DeviceError, Result};
use crate::processor::{QsConnector, QsProcessor};
use crate::traits::{Controller, Device, Operation, lookup, no_args};
use qslink_core::CommandGroup;
use qslink_network::Connector;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Registry type name of a single shade.
pub const SHADE: &str = "shade";

/// Registry type name of a shade group.
pub const SHADE_GROUP: &str = "shadegrp";

/// Highest shade level, fully open.
pub const MAX_LEVEL: u8 = 100;

const ACTION_SET_LEVEL: u8 = 1;
const ACTION_RAISE: u8 = 2;
const ACTION_LOWER: u8 = 3;

const OPERATIONS: &[Operation] = &[
    Operation::new("raise", "raise the shade"),
    Operation::new("lower", "lower the shade"),
    Operation::new("set", "set the shade level"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadeConfig {
    /// Integration id.
    pub id: u32,
}

pub struct Shade<C: Connector = QsConnector> {
    name: String,
    id: u32,
    group: CommandGroup,
    processor: Arc<QsProcessor<C>>,
}

impl<C: Connector> Shade<C> {
    /// A single shade, addressed as an `OUTPUT`.
    pub fn new(name: impl Into<String>, config: ShadeConfig, processor: Arc<QsProcessor<C>>) -> Self {
        Self {
            name: name.into(),
            id: config.id,
            group: CommandGroup::Output,
            processor,
        }
    }

    /// A shade group, addressed as a `SHADEGRP`.
    pub fn group(
        name: impl Into<String>,
        config: ShadeConfig,
        processor: Arc<QsProcessor<C>>,
    ) -> Self {
        Self {
            group: CommandGroup::ShadeGroup,
            ..Self::new(name, config, processor)
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub async fn raise(&self, cancel: &CancellationToken) -> Result<()> {
        self.act(&format!("{},{ACTION_RAISE}", self.id), cancel).await
    }

    pub async fn lower(&self, cancel: &CancellationToken) -> Result<()> {
        self.act(&format!("{},{ACTION_LOWER}", self.id), cancel).await
    }

    /// Move to `level` percent open.
    ///
    /// # Errors
    ///
    /// [`DeviceError::InvalidArgument`] above [`MAX_LEVEL`], before anything
    /// is sent.
    pub async fn set_level(&self, level: u8, cancel: &CancellationToken) -> Result<()> {
        if level > MAX_LEVEL {
            return Err(out_of_range(level));
        }
        self.act(&format!("{},{ACTION_SET_LEVEL},{level}", self.id), cancel)
            .await
    }

    async fn act(&self, parameters: &str, cancel: &CancellationToken) -> Result<()> {
        self.processor
            .command(self.group, true, parameters, cancel)
            .await?;
        Ok(())
    }
}

fn out_of_range(level: impl std::fmt::Display) -> DeviceError {
    DeviceError::invalid_argument("set", format!("level {level} out of range 0..={MAX_LEVEL}"))
}

/// Parse the single level argument of `set`.
fn parse_level(args: &[String]) -> Result<u8> {
    let [arg] = args else {
        return Err(DeviceError::invalid_argument(
            "set",
            format!("takes exactly one level, got {} arguments", args.len()),
        ));
    };
    let level: i64 = arg
        .trim()
        .parse()
        .map_err(|_| DeviceError::invalid_argument("set", format!("not an integer: {arg}")))?;
    match u8::try_from(level) {
        Ok(level) if level <= MAX_LEVEL => Ok(level),
        _ => Err(out_of_range(level)),
    }
}

impl<C: Connector> Device for Shade<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        match self.group {
            CommandGroup::ShadeGroup => SHADE_GROUP,
            _ => SHADE,
        }
    }

    fn controller_name(&self) -> &str {
        self.processor.name()
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
        match op.name {
            "raise" => {
                no_args(op.name, args)?;
                self.raise(cancel).await?;
            }
            "lower" => {
                no_args(op.name, args)?;
                self.lower(cancel).await?;
            }
            "set" => self.set_level(parse_level(args)?, cancel).await?,
            other => return Err(DeviceError::unknown_operation(&self.name, other)),
        }
        Ok(String::new())
    }
}
