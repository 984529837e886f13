use crate::{Result, error::Error};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Protocol namespace that prefixes every request and response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandGroup {
    System,
    Device,
    Output,
    Monitor,
    ShadeGroup,
}

impl CommandGroup {
    /// Wire keyword for this group.
    #[must_use]
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::System => "SYSTEM",
            Self::Device => "DEVICE",
            Self::Output => "OUTPUT",
            Self::Monitor => "MONITOR",
            Self::ShadeGroup => "SHADEGRP",
        }
    }
}

impl fmt::Display for CommandGroup {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl std::str::FromStr for CommandGroup {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "SYSTEM" => Ok(Self::System),
            "DEVICE" => Ok(Self::Device),
            "OUTPUT" => Ok(Self::Output),
            "MONITOR" => Ok(Self::Monitor),
            "SHADEGRP" => Ok(Self::ShadeGroup),
            _ => Err(Error::Config(format!("unknown command group: {s}"))),
        }
    }
}

/// Action numbers of the `SYSTEM` command group.
///
/// Action 3 is not assigned by the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SystemAction {
    Time,
    Date,
    LatLong,
    TimeZone,
    Sunset,
    Sunrise,
    OsRevision,
}

impl SystemAction {
    /// Wire action number.
    #[must_use]
    pub fn code(&self) -> u8 {
        match self {
            Self::Time => 1,
            Self::Date => 2,
            Self::LatLong => 4,
            Self::TimeZone => 5,
            Self::Sunset => 6,
            Self::Sunrise => 7,
            Self::OsRevision => 8,
        }
    }

    /// Look up an action by its wire number.
    ///
    /// # Errors
    /// Returns `Error::Config` for unassigned numbers.
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            1 => Ok(Self::Time),
            2 => Ok(Self::Date),
            4 => Ok(Self::LatLong),
            5 => Ok(Self::TimeZone),
            6 => Ok(Self::Sunset),
            7 => Ok(Self::Sunrise),
            8 => Ok(Self::OsRevision),
            _ => Err(Error::Config(format!("unknown system action: {code}"))),
        }
    }
}

impl fmt::Display for SystemAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Self::Time => "time",
            Self::Date => "date",
            Self::LatLong => "latlong",
            Self::TimeZone => "timezone",
            Self::Sunset => "sunset",
            Self::Sunrise => "sunrise",
            Self::OsRevision => "os-revision",
        };
        f.write_str(name)
    }
}
