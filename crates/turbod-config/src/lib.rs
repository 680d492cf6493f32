//! Charging policy storage for turbod
//!
//! Holds the user's intent (turbo charging on/off plus the selected charge
//! level) as a TOML file, and hands out a shared, concurrently readable
//! handle. The reconciliation engine treats this store as the single source
//! of truth; the sysfs node and the property mirror are derived from it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Standard configuration directory
pub const CONFIG_DIR: &str = "/etc/turbod";

/// Charge current levels the charger firmware accepts, in microamps.
///
/// `Standard` is the firmware baseline and what the engine enforces
/// whenever turbo charging is disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeLevel {
    Standard,
    Boost,
    Turbo,
}

impl ChargeLevel {
    /// Value written to the sysfs node
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeLevel::Standard => "6000000",
            ChargeLevel::Boost => "8000000",
            ChargeLevel::Turbo => "9750000",
        }
    }

    /// Parse from the sysfs/config representation
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "6000000" => Some(ChargeLevel::Standard),
            "8000000" => Some(ChargeLevel::Boost),
            "9750000" => Some(ChargeLevel::Turbo),
            _ => None,
        }
    }

    /// Baseline level applied while turbo charging is disabled
    pub fn baseline() -> Self {
        ChargeLevel::Standard
    }
}

fn default_level() -> String {
    ChargeLevel::Turbo.as_str().to_string()
}

/// Persisted charging policy.
///
/// `turbo_current` keeps the raw string so a selection survives disabling
/// and re-enabling turbo without the caller re-specifying it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargingPolicy {
    #[serde(default)]
    pub turbo_enabled: bool,

    #[serde(default = "default_level")]
    pub turbo_current: String,
}

impl Default for ChargingPolicy {
    fn default() -> Self {
        Self {
            turbo_enabled: false,
            turbo_current: default_level(),
        }
    }
}

impl ChargingPolicy {
    /// Load policy from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let policy: Self = toml::from_str(&contents)?;
        Ok(policy)
    }

    /// Save policy to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        tracing::debug!("Charging policy saved to {}", path.display());
        Ok(())
    }

    /// The level the user picked, falling back to the default on an
    /// unrecognized stored value.
    pub fn selected_level(&self) -> ChargeLevel {
        ChargeLevel::parse(&self.turbo_current).unwrap_or(ChargeLevel::Turbo)
    }

    /// The level the engine should enforce right now. Disabled always
    /// means baseline, whatever level is selected.
    pub fn effective_level(&self) -> ChargeLevel {
        if self.turbo_enabled {
            self.selected_level()
        } else {
            ChargeLevel::baseline()
        }
    }
}

/// Shared handle over the persisted policy.
///
/// Reads may race a concurrent setter; the engine snapshots both fields in
/// one lock acquisition per pass, and the next pass corrects anything a
/// stale read produced.
#[derive(Clone)]
pub struct PolicyStore {
    inner: Arc<RwLock<ChargingPolicy>>,
    path: PathBuf,
}

impl PolicyStore {
    /// Open the store at `path`, falling back to defaults when the file is
    /// missing or unreadable (first run).
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let policy = match ChargingPolicy::load(&path) {
            Ok(policy) => policy,
            Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No charging policy at {}, using defaults", path.display());
                ChargingPolicy::default()
            }
            Err(e) => {
                tracing::warn!("Failed to load charging policy: {}, using defaults", e);
                ChargingPolicy::default()
            }
        };

        Self {
            inner: Arc::new(RwLock::new(policy)),
            path,
        }
    }

    /// Backing file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// One consistent copy of both policy fields
    pub fn snapshot(&self) -> ChargingPolicy {
        self.inner
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn enabled(&self) -> bool {
        self.snapshot().turbo_enabled
    }

    pub fn selected_level(&self) -> ChargeLevel {
        self.snapshot().selected_level()
    }

    /// Replace the policy and persist it. Invoked by the settings surface,
    /// never by the reconciliation engine.
    pub fn set_policy(&self, enabled: bool, level: ChargeLevel) -> Result<(), ConfigError> {
        if let Ok(mut guard) = self.inner.write() {
            guard.turbo_enabled = enabled;
            guard.turbo_current = level.as_str().to_string();
            guard.save(&self.path)?;
        }
        Ok(())
    }

    /// Re-read the backing file, picking up edits made by another process.
    pub fn reload(&self) -> Result<(), ConfigError> {
        let policy = match ChargingPolicy::load(&self.path) {
            Ok(policy) => policy,
            Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(self.path.clone()));
            }
            Err(e) => return Err(e),
        };
        if let Ok(mut guard) = self.inner.write() {
            *guard = policy;
        }
        Ok(())
    }
}
