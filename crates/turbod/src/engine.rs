//! Charging current reconciliation engine
//!
//! One worker thread owns every read and write of the charge current node.
//! Charger uevents, explicit policy changes and a fixed-interval timer all
//! funnel into a single trigger channel, so exactly one reconciliation pass
//! runs at a time and the node never sees competing writers. The timer is
//! implemented as the channel receive timeout, which means it only rearms
//! after the current pass finishes - a slow sysfs write delays the next
//! pass instead of overlapping it.
//!
//! A pass recomputes the desired level from the policy store every time, so
//! triggers carry no payload and a burst of them just costs a few no-op
//! passes.

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};
use turbod_config::{ChargeLevel, ChargingPolicy, ConfigError, PolicyStore};
use turbod_hal::sysfs::SysfsAttribute;
use turbod_hal::uevent::{self, UEventWatcher};

use crate::props::{PROP_TURBO_CURRENT, PropertyMirror};

/// Engine configuration. Defaults target the real power supply class
/// devices; tests point the paths into a temp directory.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Node the charger firmware may reset behind our back
    pub charge_current_path: PathBuf,
    /// Probed once at startup to log charger presence
    pub usb_online_path: PathBuf,
    /// DEVPATH substring selecting charger uevents
    pub usb_devpath_match: String,
    /// Polling fallback interval; bounds convergence when no uevent arrives
    pub poll_interval: Duration,
    /// Mirror key for the last applied value
    pub mirror_key: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            charge_current_path: PathBuf::from(
                "/sys/class/power_supply/battery/constant_charge_current",
            ),
            usb_online_path: PathBuf::from("/sys/class/power_supply/usb/online"),
            usb_devpath_match: "power_supply/usb".to_string(),
            poll_interval: Duration::from_secs(5),
            mirror_key: PROP_TURBO_CURRENT.to_string(),
        }
    }
}

/// Reasons a reconciliation pass runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    ChargerConnected,
    PolicyChanged,
    Shutdown,
}

/// What one pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Node already held the desired value; nothing was written
    InSync,
    /// Node (and mirror) updated to the desired value
    Updated,
    /// Node could not be read or written; the next trigger retries
    Unavailable,
}

/// The reconciliation state machine: read policy, read node, write on
/// mismatch. Holds no cross-pass state beyond its collaborators, so every
/// pass starts from scratch.
pub struct ReconcileEngine {
    store: PolicyStore,
    attribute: SysfsAttribute,
    mirror: PropertyMirror,
    mirror_key: String,
}

impl ReconcileEngine {
    pub fn new(config: &EngineConfig, store: PolicyStore, mirror: PropertyMirror) -> Self {
        Self {
            store,
            attribute: SysfsAttribute::new(&config.charge_current_path),
            mirror,
            mirror_key: config.mirror_key.clone(),
        }
    }

    /// Run one reconciliation pass.
    ///
    /// Failures end the pass without propagating: the node keeps whatever
    /// value it has, and the next trigger (at latest the poll timer) tries
    /// again. Nothing here may panic or return an error upward - the
    /// engine outlives every failed pass.
    pub fn run_pass(&self) -> PassOutcome {
        let desired = self.store.snapshot().effective_level();

        let observed = match self.attribute.read() {
            Ok(value) => value,
            Err(e) => {
                warn!("Cannot read charge current node: {}", e);
                return PassOutcome::Unavailable;
            }
        };

        if observed.trim() == desired.as_str() {
            debug!("Charge current in sync at {}", desired.as_str());
            return PassOutcome::InSync;
        }

        if let Err(e) = self.attribute.write(desired.as_str()) {
            warn!("Cannot write charge current node: {}", e);
            return PassOutcome::Unavailable;
        }
        self.mirror.set(&self.mirror_key, desired.as_str());

        info!(
            "Charge current updated: {} -> {}",
            observed.trim(),
            desired.as_str()
        );
        PassOutcome::Updated
    }
}

fn worker_loop(engine: ReconcileEngine, rx: Receiver<Trigger>, interval: Duration) {
    info!("Reconciliation worker started");

    // Converge once at startup; the node's pre-boot value is unknown.
    engine.run_pass();

    loop {
        match rx.recv_timeout(interval) {
            Ok(Trigger::Shutdown) => break,
            Ok(trigger) => {
                debug!("Reconcile trigger: {:?}", trigger);
                engine.run_pass();
            }
            Err(RecvTimeoutError::Timeout) => {
                engine.run_pass();
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    info!("Reconciliation worker stopped");
}

/// Handle over a running engine: the worker thread, its trigger channel
/// and the charger uevent subscription.
pub struct EngineHandle {
    tx: Sender<Trigger>,
    store: PolicyStore,
    worker: Option<JoinHandle<()>>,
    watcher: Option<UEventWatcher>,
}

impl EngineHandle {
    /// Start the engine: spawn the worker (which runs a first pass
    /// immediately), subscribe to charger uevents and arm the poll timer.
    ///
    /// When the uevent socket cannot be opened (insufficient privileges,
    /// unusual kernel config) the engine still runs correctly on the poll
    /// timer alone, just with up to one interval of extra latency.
    pub fn spawn(config: EngineConfig, store: PolicyStore, mirror: PropertyMirror) -> Self {
        let engine = ReconcileEngine::new(&config, store.clone(), mirror);
        let (tx, rx) = mpsc::channel();

        let interval = config.poll_interval;
        let worker = thread::spawn(move || worker_loop(engine, rx, interval));

        let event_tx = tx.clone();
        let watcher = match UEventWatcher::start(&config.usb_devpath_match, move |event| {
            if uevent::charger_online(&event.env) {
                let _ = event_tx.send(Trigger::ChargerConnected);
            }
        }) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!("Charger uevents unavailable, relying on polling: {}", e);
                None
            }
        };

        Self {
            tx,
            store,
            worker: Some(worker),
            watcher,
        }
    }

    /// Persist a new policy and reconcile immediately, without waiting for
    /// the poll timer. This is the settings surface's entry point.
    pub fn update_policy(&self, enabled: bool, level: ChargeLevel) -> Result<(), ConfigError> {
        self.store.set_policy(enabled, level)?;
        self.notify_policy_changed();
        Ok(())
    }

    /// Trigger an immediate pass after the policy store changed through
    /// some other path (e.g. a reloaded config file).
    pub fn notify_policy_changed(&self) {
        let _ = self.tx.send(Trigger::PolicyChanged);
    }

    /// Current policy, for display
    pub fn policy(&self) -> ChargingPolicy {
        self.store.snapshot()
    }

    /// Stop the engine: unsubscribe from uevents, then stop the worker.
    /// An in-flight pass always finishes; the node is never left mid-write.
    pub fn shutdown(self) {
        // Drop runs the actual teardown.
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop();
        }
        let _ = self.tx.send(Trigger::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
