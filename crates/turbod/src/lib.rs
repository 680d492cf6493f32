//! turbod - charging current policy daemon
//!
//! Enforces the user's turbo charging policy onto the battery's constant
//! charge current sysfs node. The charger firmware resets that node on
//! re-plug, so the daemon keeps reconciling observed against desired state:
//! charger uevents give low-latency correction, a 5 second poll covers
//! anything the event path misses, and one worker thread serializes every
//! write so concurrent triggers can never race each other on the node.

pub mod engine;
pub mod props;

pub use engine::{EngineConfig, EngineHandle, PassOutcome, ReconcileEngine};
pub use props::{PROP_TURBO_CURRENT, PropertyMirror};
