//! Sysfs attribute access
//!
//! Whole-value read/write over a single sysfs node. The firmware behind a
//! node may rewrite it at any time (charger re-plug resets the charge
//! current, for instance), so callers that care about a particular value
//! have to re-check and re-apply it; this type does no retrying of its own.

use crate::HalError;
use std::fs;
use std::path::{Path, PathBuf};

/// One sysfs node, addressed by its full path.
#[derive(Debug, Clone)]
pub struct SysfsAttribute {
    path: PathBuf,
}

impl SysfsAttribute {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the underlying node
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the node currently exists.
    ///
    /// Nodes appear late when the driver probes after us, and can vanish on
    /// device teardown, so existence is only a hint.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read the current value, with the trailing newline stripped.
    pub fn read(&self) -> Result<String, HalError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => Ok(raw.trim_end_matches('\n').to_string()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(HalError::NotAvailable(self.path.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the node's value.
    pub fn write(&self, value: &str) -> Result<(), HalError> {
        match fs::write(&self.path, value) {
            Ok(()) => {
                tracing::debug!("wrote {} to {}", value, self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(HalError::NotAvailable(self.path.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
