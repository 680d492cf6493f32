//! End-to-end reconciliation tests against a fake sysfs tree
//!
//! These drive the full engine (policy store, worker thread, poll timer,
//! property mirror) with the charge current node backed by a temp
//! directory, exercising the convergence scenarios the daemon exists for.

use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

use turbod::{EngineConfig, EngineHandle, PROP_TURBO_CURRENT, PropertyMirror};
use turbod_config::{ChargeLevel, ChargingPolicy, PolicyStore};

const BASELINE: &str = "6000000";
const TURBO: &str = "9750000";

/// Test environment: a fake power supply tree plus the daemon's state.
struct DaemonTestEnv {
    #[allow(dead_code)]
    temp_dir: TempDir,
    node_path: PathBuf,
    config_path: PathBuf,
    config: EngineConfig,
    mirror: PropertyMirror,
}

impl DaemonTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let node_path = temp_dir.path().join("constant_charge_current");
        let config_path = temp_dir.path().join("config.toml");

        let config = EngineConfig {
            charge_current_path: node_path.clone(),
            usb_online_path: temp_dir.path().join("online"),
            usb_devpath_match: "power_supply/usb".to_string(),
            poll_interval: Duration::from_millis(50),
            mirror_key: PROP_TURBO_CURRENT.to_string(),
        };
        let mirror = PropertyMirror::with_dir(temp_dir.path().join("run"));

        Self {
            temp_dir,
            node_path,
            config_path,
            config,
            mirror,
        }
    }

    fn store(&self) -> PolicyStore {
        PolicyStore::open(&self.config_path)
    }

    fn spawn(&self, store: &PolicyStore) -> EngineHandle {
        EngineHandle::spawn(self.config.clone(), store.clone(), self.mirror.clone())
    }

    fn write_node(&self, value: &str) {
        fs::write(&self.node_path, value).expect("Failed to write node");
    }

    fn read_node(&self) -> String {
        fs::read_to_string(&self.node_path).expect("Failed to read node")
    }

    /// Poll until the node holds `expected` or the deadline passes.
    fn wait_for_node(&self, expected: &str, deadline: Duration) -> bool {
        let start = std::time::Instant::now();
        while start.elapsed() < deadline {
            if self.read_node() == expected {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }
}

#[test]
fn test_first_pass_resets_stale_node() {
    // Fresh daemon, disabled policy, node stale at turbo.
    let env = DaemonTestEnv::new();
    env.write_node(TURBO);

    let store = env.store();
    let handle = env.spawn(&store);

    assert!(env.wait_for_node(BASELINE, Duration::from_secs(2)));
    assert_eq!(env.mirror.get(PROP_TURBO_CURRENT, ""), BASELINE);

    handle.shutdown();
}

#[test]
fn test_policy_change_applies_immediately() {
    let env = DaemonTestEnv::new();
    env.write_node(BASELINE);

    // Interval far beyond the test runtime, so only the explicit trigger
    // can produce the write.
    let mut config = env.config.clone();
    config.poll_interval = Duration::from_secs(60);

    let store = env.store();
    let handle = EngineHandle::spawn(config, store.clone(), env.mirror.clone());
    thread::sleep(Duration::from_millis(100));

    handle.update_policy(true, ChargeLevel::Turbo).unwrap();
    assert!(env.wait_for_node(TURBO, Duration::from_secs(2)));

    handle.shutdown();
}

#[test]
fn test_timer_restores_external_reset() {
    let env = DaemonTestEnv::new();
    env.write_node(BASELINE);

    let store = env.store();
    store.set_policy(true, ChargeLevel::Turbo).unwrap();

    let handle = env.spawn(&store);
    assert!(env.wait_for_node(TURBO, Duration::from_secs(2)));

    // Firmware-style reset with no uevent; the poll timer must catch it.
    env.write_node(BASELINE);
    assert!(env.wait_for_node(TURBO, Duration::from_secs(2)));

    handle.shutdown();
}

#[test]
fn test_policy_survives_daemon_restart() {
    let env = DaemonTestEnv::new();
    env.write_node(BASELINE);

    let store = env.store();
    let handle = env.spawn(&store);
    thread::sleep(Duration::from_millis(100));
    handle.update_policy(true, ChargeLevel::Boost).unwrap();
    assert!(env.wait_for_node(ChargeLevel::Boost.as_str(), Duration::from_secs(2)));
    handle.shutdown();

    // Node reset while the daemon is down; a new daemon restores it from
    // the persisted policy alone.
    env.write_node(BASELINE);
    let store = env.store();
    assert!(store.enabled());

    let handle = env.spawn(&store);
    assert!(env.wait_for_node(ChargeLevel::Boost.as_str(), Duration::from_secs(2)));
    handle.shutdown();
}

#[test]
fn test_reload_path_applies_external_config_edit() {
    let env = DaemonTestEnv::new();
    env.write_node(BASELINE);

    let store = env.store();
    let mut config = env.config.clone();
    config.poll_interval = Duration::from_secs(60);
    let handle = EngineHandle::spawn(config, store.clone(), env.mirror.clone());
    thread::sleep(Duration::from_millis(100));

    // Another process rewrites the config file, then pokes the daemon
    // (SIGUSR1 in production; the same store.reload + notify here).
    ChargingPolicy {
        turbo_enabled: true,
        turbo_current: ChargeLevel::Turbo.as_str().to_string(),
    }
    .save(&env.config_path)
    .unwrap();

    store.reload().unwrap();
    handle.notify_policy_changed();

    assert!(env.wait_for_node(TURBO, Duration::from_secs(2)));
    handle.shutdown();
}

#[test]
fn test_missing_node_never_kills_the_daemon() {
    // No node at all: every pass fails, the worker keeps running, and the
    // daemon converges as soon as the node appears.
    let env = DaemonTestEnv::new();

    let store = env.store();
    store.set_policy(true, ChargeLevel::Turbo).unwrap();

    let handle = env.spawn(&store);
    thread::sleep(Duration::from_millis(200));

    env.write_node(BASELINE);
    assert!(env.wait_for_node(TURBO, Duration::from_secs(2)));

    handle.shutdown();
}
