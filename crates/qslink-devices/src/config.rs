//! System configuration file.
//!
//! ```yaml
//! location: America/Los_Angeles
//! controllers:
//!   - name: home
//!     type: homeworks-qs
//!     ip_address: 192.168.1.50:23
//!     timeout: 1m
//!     keep_alive: 5m
//!     key_id: home
//! devices:
//!   - name: living room
//!     type: shadegrp
//!     controller: home
//!     id: 1
//!     operations:
//!       raise: []
//!       set: [40]
//! ```
//!
//! `name`, `type`, `operations` and (for devices) `controller` are common to
//! every entry. All other keys are kept as raw YAML and decoded by the type's
//! constructor through [`ControllerConfig::settings`] /
//! [`DeviceConfig::settings`].
//!
//! `operations` lists the operations configured for an entry, each with the
//! arguments it runs with when invoked without any.

use crate::error::{DeviceError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Configured operations and their preset arguments, by operation name.
pub type Operations = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Time zone name of the installation, informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub controllers: Vec<ControllerConfig>,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(
        default,
        skip_serializing_if = "Operations::is_empty",
        deserialize_with = "operations::deserialize"
    )]
    pub operations: Operations,
    #[serde(flatten)]
    pub settings: Mapping,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub controller: String,
    #[serde(
        default,
        skip_serializing_if = "Operations::is_empty",
        deserialize_with = "operations::deserialize"
    )]
    pub operations: Operations,
    #[serde(flatten)]
    pub settings: Mapping,
}

impl SystemConfig {
    /// Parse a configuration document.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read and parse a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading system configuration");
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

impl ControllerConfig {
    /// Decode the type-specific keys.
    pub fn settings<T: DeserializeOwned>(&self) -> Result<T> {
        decode(&self.name, &self.settings)
    }
}

impl DeviceConfig {
    /// Decode the type-specific keys.
    pub fn settings<T: DeserializeOwned>(&self) -> Result<T> {
        decode(&self.name, &self.settings)
    }
}

fn decode<T: DeserializeOwned>(name: &str, settings: &Mapping) -> Result<T> {
    serde_yaml::from_value(Value::Mapping(settings.clone()))
        .map_err(|e| DeviceError::configuration(format!("{name}: {e}")))
}

/// Preset arguments may be written as YAML strings, numbers or booleans.
mod operations {
    use super::Operations;
    use serde::{Deserialize, Deserializer, de};
    use serde_yaml::Value;
    use std::collections::BTreeMap;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Operations, D::Error> {
        let raw = BTreeMap::<String, Option<Vec<Value>>>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(name, args)| {
                let args = args
                    .unwrap_or_default()
                    .into_iter()
                    .map(|arg| match arg {
                        Value::String(s) => Ok(s),
                        Value::Number(n) => Ok(n.to_string()),
                        Value::Bool(b) => Ok(b.to_string()),
                        other => Err(de::Error::custom(format!(
                            "{name}: arguments must be scalars, got {other:?}"
                        ))),
                    })
                    .collect::<Result<_, D::Error>>()?;
                Ok((name, args))
            })
            .collect()
    }
}

/// Serde adapter for durations written as `500ms`, `1m`, `1h 30m`.
pub mod duration {
    use serde::{Deserialize, Deserializer, Serializer, de};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(de::Error::custom)
    }
}
