//! turbod daemon entrypoint
//!
//! Startup sequence:
//! 1. Logging and signal handlers
//! 2. Load the persisted charging policy
//! 3. Start the reconciliation engine (first pass, uevent subscription,
//!    poll timer)
//! 4. Idle until SIGTERM/SIGINT; SIGUSR1 reloads the policy file and
//!    triggers an immediate pass

use anyhow::Result;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

use turbod::{EngineConfig, EngineHandle, PROP_TURBO_CURRENT, PropertyMirror};
use turbod_config::PolicyStore;
use turbod_hal::SysfsAttribute;

static RUNNING: AtomicBool = AtomicBool::new(true);
static RELOAD: AtomicBool = AtomicBool::new(false);

fn main() -> Result<()> {
    setup_logging();

    info!("turbod starting...");

    setup_signal_handlers()?;

    let config = EngineConfig::default();
    let store = PolicyStore::open(Path::new(turbod_config::CONFIG_DIR).join("config.toml"));
    let mirror = PropertyMirror::new();

    log_charger_state(&config);

    let policy = store.snapshot();
    info!(
        "Charging policy: turbo_enabled={}, turbo_current={}",
        policy.turbo_enabled, policy.turbo_current
    );

    let engine = EngineHandle::spawn(config, store.clone(), mirror.clone());

    while RUNNING.load(Ordering::Relaxed) {
        if RELOAD.swap(false, Ordering::Relaxed) {
            match store.reload() {
                Ok(()) => {
                    info!("Charging policy reloaded");
                    engine.notify_policy_changed();
                }
                Err(e) => warn!("Failed to reload charging policy: {}", e),
            }
        }

        thread::sleep(Duration::from_secs(1));
    }

    info!(
        "turbod shutting down (last applied: {})",
        mirror.get(PROP_TURBO_CURRENT, "unknown")
    );
    engine.shutdown();

    Ok(())
}

/// Setup logging to console
fn setup_logging() {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_ansi(false))
        .init();
}

/// Setup signal handlers for shutdown and policy reload
fn setup_signal_handlers() -> Result<()> {
    use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};

    let action = SigAction::new(
        SigHandler::Handler(handle_signal),
        SaFlags::empty(),
        SigSet::empty(),
    );

    unsafe {
        sigaction(Signal::SIGTERM, &action)?;
        sigaction(Signal::SIGINT, &action)?;
        sigaction(Signal::SIGUSR1, &action)?;
    }

    Ok(())
}

/// Signal handler
extern "C" fn handle_signal(sig: i32) {
    match sig {
        libc::SIGTERM | libc::SIGINT => {
            RUNNING.store(false, Ordering::Relaxed);
        }
        libc::SIGUSR1 => {
            RELOAD.store(true, Ordering::Relaxed);
        }
        _ => {}
    }
}

/// Log whether a charger is already connected at startup
fn log_charger_state(config: &EngineConfig) {
    let online = SysfsAttribute::new(&config.usb_online_path);
    match online.read() {
        Ok(value) if value.trim() == "1" => info!("Charger connected at startup"),
        Ok(_) => info!("No charger connected at startup"),
        Err(e) => warn!("Could not probe charger state: {}", e),
    }
}
