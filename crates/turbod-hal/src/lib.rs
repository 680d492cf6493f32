//! Hardware access layer for turbod
//!
//! Two thin interfaces over the kernel surfaces the daemon touches:
//!
//! - [`sysfs::SysfsAttribute`]: read/write access to a single sysfs node,
//!   such as the battery constant charge current.
//! - [`uevent::UEventWatcher`]: background listener for kernel kobject
//!   uevents, filtered by device path, used to react to charger hotplug.
//!
//! # Example
//!
//! ```no_run
//! use turbod_hal::sysfs::SysfsAttribute;
//!
//! fn main() -> turbod_hal::Result<()> {
//!     let node = SysfsAttribute::new("/sys/class/power_supply/battery/constant_charge_current");
//!     println!("charge current: {}", node.read()?);
//!     Ok(())
//! }
//! ```

pub mod sysfs;
pub mod uevent;

pub use sysfs::SysfsAttribute;
pub use uevent::{UEventSocket, UEventWatcher};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HalError {
    #[error("sysfs attribute not available: {0}")]
    NotAvailable(PathBuf),

    #[error("uevent socket error: {0}")]
    Uevent(String),

    #[error("system call failed: {0}")]
    Sys(#[from] nix::errno::Errno),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// HAL Result type
pub type Result<T> = std::result::Result<T, HalError>;
