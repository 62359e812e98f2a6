use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_METADATA_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_MAX_ENTRY_BYTES: u64 = 4 * 1024 * 1024;
pub const DEFAULT_MAX_ENTRIES: usize = 64;
pub const DEFAULT_DESCRIPTOR_NAME: &str = "config.json";

/// Tunables for one pipeline run. Every field has a default, so an empty
/// JSON object deserializes to [`BundleOptions::default`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleOptions {
    pub metadata_timeout_ms: u64,
    /// Parent directory for the staging area; the system temp dir when unset.
    pub staging_root: Option<PathBuf>,
    pub max_entry_bytes: u64,
    pub max_entries: usize,
    pub descriptor_name: String,
}

impl Default for BundleOptions {
    fn default() -> Self {
        Self {
            metadata_timeout_ms: DEFAULT_METADATA_TIMEOUT_MS,
            staging_root: None,
            max_entry_bytes: DEFAULT_MAX_ENTRY_BYTES,
            max_entries: DEFAULT_MAX_ENTRIES,
            descriptor_name: DEFAULT_DESCRIPTOR_NAME.to_string(),
        }
    }
}

impl BundleOptions {
    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_millis(self.metadata_timeout_ms.max(1))
    }

    pub fn with_metadata_timeout(mut self, timeout: Duration) -> Self {
        self.metadata_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_staging_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.staging_root = Some(root.into());
        self
    }

    pub fn with_max_entry_bytes(mut self, limit: u64) -> Self {
        self.max_entry_bytes = limit;
        self
    }

    pub fn with_max_entries(mut self, limit: usize) -> Self {
        self.max_entries = limit;
        self
    }
}
