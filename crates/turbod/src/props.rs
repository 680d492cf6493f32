//! Process-wide property mirror
//!
//! Caches the last value the engine applied so other readers (settings UI,
//! shell tooling) can see it without touching the sysfs node. Values are
//! kept in memory and shadowed as single files under the runtime directory;
//! each set replaces the whole value, so readers never see a torn write.
//! The mirror is a cache only - the policy store stays the source of truth.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

/// Default runtime directory for mirrored properties
pub const RUN_DIR: &str = "/run/turbod";

/// Key holding the last charge current the engine applied
pub const PROP_TURBO_CURRENT: &str = "turbo_charge_current";

#[derive(Clone)]
pub struct PropertyMirror {
    dir: PathBuf,
    values: Arc<RwLock<HashMap<String, String>>>,
}

impl PropertyMirror {
    pub fn new() -> Self {
        Self::with_dir(RUN_DIR)
    }

    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            values: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Set a property. Never fails from the caller's perspective: the
    /// in-memory value always updates, and a failed file shadow is only
    /// logged.
    pub fn set(&self, key: &str, value: &str) {
        if let Ok(mut values) = self.values.write() {
            values.insert(key.to_string(), value.to_string());
        }

        if let Err(e) = self.persist(key, value) {
            tracing::warn!("Failed to mirror property {} to file: {}", key, e);
        }
    }

    fn persist(&self, key: &str, value: &str) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.dir.join(key), value)
    }

    /// Get a property, preferring the in-memory value, then the file
    /// shadow (survives a daemon restart), then the supplied default.
    pub fn get(&self, key: &str, default: &str) -> String {
        if let Ok(values) = self.values.read() {
            if let Some(value) = values.get(key) {
                return value.clone();
            }
        }

        fs::read_to_string(self.dir.join(key))
            .map(|s| s.trim_end().to_string())
            .unwrap_or_else(|_| default.to_string())
    }
}

impl Default for PropertyMirror {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_set_then_get() {
        let dir = TempDir::new().unwrap();
        let mirror = PropertyMirror::with_dir(dir.path());

        mirror.set(PROP_TURBO_CURRENT, "9750000");
        assert_eq!(mirror.get(PROP_TURBO_CURRENT, "6000000"), "9750000");
    }

    #[test]
    fn test_missing_key_returns_default() {
        let dir = TempDir::new().unwrap();
        let mirror = PropertyMirror::with_dir(dir.path());

        assert_eq!(mirror.get("nothing_here", "6000000"), "6000000");
    }

    #[test]
    fn test_file_shadow_survives_new_instance() {
        let dir = TempDir::new().unwrap();

        let mirror = PropertyMirror::with_dir(dir.path());
        mirror.set(PROP_TURBO_CURRENT, "8000000");

        // A fresh mirror over the same directory sees the shadowed value.
        let restarted = PropertyMirror::with_dir(dir.path());
        assert_eq!(restarted.get(PROP_TURBO_CURRENT, "6000000"), "8000000");
    }

    #[test]
    fn test_set_replaces_whole_value() {
        let dir = TempDir::new().unwrap();
        let mirror = PropertyMirror::with_dir(dir.path());

        mirror.set(PROP_TURBO_CURRENT, "9750000");
        mirror.set(PROP_TURBO_CURRENT, "6000000");
        assert_eq!(mirror.get(PROP_TURBO_CURRENT, ""), "6000000");

        let on_disk = fs::read_to_string(dir.path().join(PROP_TURBO_CURRENT)).unwrap();
        assert_eq!(on_disk, "6000000");
    }
}
