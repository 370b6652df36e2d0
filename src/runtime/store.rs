//! File-backed credential persistence.
//!
//! Credentials live in a single JSON object mapping well-known keys to
//! opaque token values. Reads tolerate a missing file; writes create the
//! parent directory on demand.

use anyhow::{Context, Result};
use log::warn;
use std::collections::HashMap;
use std::fs;

use super::RealRuntime;

impl RealRuntime {
    #[tracing::instrument(skip(self))]
    pub(crate) fn credential_impl(&self, key: &str) -> Option<String> {
        match self.read_store() {
            Ok(store) => store.get(key).cloned(),
            Err(e) => {
                warn!("Failed to read credential store: {:#}", e);
                None
            }
        }
    }

    #[tracing::instrument(skip(self, value))]
    pub(crate) fn set_credential_impl(&self, key: &str, value: &str) -> Result<()> {
        let mut store = self.read_store().unwrap_or_default();
        store.insert(key.to_string(), value.to_string());
        self.write_store(&store)
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn remove_credential_impl(&self, key: &str) -> Result<()> {
        let mut store = self.read_store().unwrap_or_default();
        if store.remove(key).is_some() {
            self.write_store(&store)?;
        }
        Ok(())
    }

    fn read_store(&self) -> Result<HashMap<String, String>> {
        if !self.store_path.exists() {
            return Ok(HashMap::new());
        }
        let contents = fs::read_to_string(&self.store_path)
            .with_context(|| format!("Failed to read {}", self.store_path.display()))?;
        serde_json::from_str(&contents).context("Failed to parse credential store")
    }

    fn write_store(&self, store: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.store_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let contents =
            serde_json::to_string_pretty(store).context("Failed to serialize credential store")?;
        fs::write(&self.store_path, contents)
            .with_context(|| format!("Failed to write {}", self.store_path.display()))
    }
}
