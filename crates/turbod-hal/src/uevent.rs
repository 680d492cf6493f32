//! Kernel uevent listener
//!
//! Reads kobject uevents from a netlink socket and hands events whose
//! DEVPATH matches a configured substring to a callback on a background
//! thread. The charge current daemon uses this to catch charger hotplug,
//! where firmware is most likely to reset the current node.

use crate::HalError;
use kobject_uevent::UEvent;
use nix::poll::{self, PollFd, PollFlags, PollTimeout};
use nix::sys::socket::{
    self, AddressFamily, MsgFlags, NetlinkAddr, SockFlag, SockProtocol, SockType,
};
use std::collections::HashMap;
use std::os::fd::{AsFd, AsRawFd, OwnedFd};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Kernel-side receive buffer. Charger events are sparse, so a modest
/// buffer is enough; ueventd-scale consumers go much larger.
const UEVENT_BUF_SIZE: usize = 64 * 1024;

/// Poll granularity for the watcher thread. Bounds how long stop() waits.
const POLL_TICK_MS: u16 = 500;

/// Uevent key carrying power supply presence.
pub const POWER_SUPPLY_ONLINE: &str = "POWER_SUPPLY_ONLINE";

fn create_socket() -> Result<OwnedFd, HalError> {
    // Group mask 0xffffffff subscribes to all kernel uevent multicast groups.
    let addr = NetlinkAddr::new(0, 0xffffffff);
    let s = socket::socket(
        AddressFamily::Netlink,
        SockType::Datagram,
        SockFlag::SOCK_NONBLOCK | SockFlag::SOCK_CLOEXEC,
        SockProtocol::NetlinkKObjectUEvent,
    )?;
    socket::setsockopt(&s, socket::sockopt::RcvBuf, &UEVENT_BUF_SIZE)?;
    socket::bind(s.as_raw_fd(), &addr)?;

    Ok(s)
}

/// Socket for listening on kobject uevents.
pub struct UEventSocket {
    fd: OwnedFd,
}

impl UEventSocket {
    /// Create a netlink listener for kernel events.
    pub fn open() -> Result<Self, HalError> {
        let fd = create_socket()?;
        Ok(Self { fd })
    }

    /// Wait up to `timeout` for an event. Returns `Ok(None)` on timeout.
    pub fn poll_next(&self, timeout: Duration) -> Result<Option<UEvent>, HalError> {
        let timeout_ms = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);
        let mut fds = [PollFd::new(self.fd.as_fd(), PollFlags::POLLIN)];
        let nr = poll::poll(&mut fds, PollTimeout::from(timeout_ms))?;
        if nr == 0 {
            return Ok(None);
        }

        let mut buffer = [0u8; UEVENT_BUF_SIZE];
        let count = socket::recv(self.fd.as_raw_fd(), &mut buffer, MsgFlags::empty())?;
        if count == 0 {
            return Err(HalError::Uevent("netlink recv returned 0 bytes".into()));
        }
        match UEvent::from_netlink_packet(&buffer[..count]) {
            Ok(event) => Ok(Some(event)),
            Err(e) => Err(HalError::Uevent(e.to_string())),
        }
    }
}

/// DEVPATH substring match, the filter convention platform uevent
/// observers use (e.g. "power_supply/usb").
pub fn devpath_matches(devpath: &Path, filter: &str) -> bool {
    devpath.to_string_lossy().contains(filter)
}

/// Whether an event's key/value bundle reports a connected charger.
pub fn charger_online(env: &HashMap<String, String>) -> bool {
    env.get(POWER_SUPPLY_ONLINE).map(String::as_str) == Some("1")
}

/// Background listener delivering filtered uevents to a callback.
///
/// The callback runs on the watcher thread and must not block for long;
/// forwarding into a channel is the expected use.
pub struct UEventWatcher {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl UEventWatcher {
    /// Start observing uevents whose DEVPATH contains `devpath_match`.
    pub fn start<F>(devpath_match: &str, callback: F) -> Result<Self, HalError>
    where
        F: Fn(&UEvent) + Send + 'static,
    {
        let socket = UEventSocket::open()?;
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let filter = devpath_match.to_string();

        let thread = thread::spawn(move || {
            tracing::info!("uevent watcher started (filter: {})", filter);

            while flag.load(Ordering::Relaxed) {
                match socket.poll_next(Duration::from_millis(POLL_TICK_MS as u64)) {
                    Ok(Some(event)) => {
                        if devpath_matches(&event.devpath, &filter) {
                            callback(&event);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!("failed to read uevent: {}", e);
                        thread::sleep(Duration::from_millis(POLL_TICK_MS as u64));
                    }
                }
            }

            tracing::debug!("uevent watcher stopped");
        });

        Ok(Self {
            running,
            thread: Some(thread),
        })
    }

    /// Stop observing. Blocks until the watcher thread exits; no callback
    /// fires after this returns.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for UEventWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
