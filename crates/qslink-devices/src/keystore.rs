//! Credentials file.
//!
//! ```yaml
//! - key_id: home
//!   user: lutron
//!   token: integration
//! ```

use crate::error::{DeviceError, Result};
use qslink_network::{CredentialStore, Credentials};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

#[derive(Deserialize)]
struct KeyEntry {
    key_id: String,
    user: String,
    token: String,
}

/// In-memory credential store keyed by `key_id`.
#[derive(Debug, Clone, Default)]
pub struct KeyStore {
    keys: HashMap<String, Credentials>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a keys document. Duplicate key ids are rejected.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let entries: Vec<KeyEntry> = serde_yaml::from_str(yaml)?;
        let mut store = Self::new();
        for entry in entries {
            if store.keys.contains_key(&entry.key_id) {
                return Err(DeviceError::configuration(format!(
                    "duplicate key id: {}",
                    entry.key_id
                )));
            }
            store.insert(entry.key_id, Credentials::new(entry.user, entry.token));
        }
        Ok(store)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading keys");
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    pub fn insert(&mut self, key_id: impl Into<String>, credentials: Credentials) {
        self.keys.insert(key_id.into(), credentials);
    }

    /// Key ids with their user names, sorted by key id. Tokens are not
    /// exposed.
    pub fn entries(&self) -> Vec<(&str, &str)> {
        let mut entries: Vec<_> = self
            .keys
            .iter()
            .map(|(id, creds)| (id.as_str(), creds.user.as_str()))
            .collect();
        entries.sort_unstable();
        entries
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl CredentialStore for KeyStore {
    fn lookup(&self, key_id: &str) -> qslink_core::Result<Credentials> {
        self.keys
            .get(key_id)
            .cloned()
            .ok_or_else(|| qslink_core::Error::MissingCredentials(key_id.to_string()))
    }
}
