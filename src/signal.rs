//! Interrupt handling for the watch loop.
//!
//! Signal handlers must be async-signal-safe, so the handler only stores to an
//! atomic flag. The watch loop polls [`requested`] between select wakeups.

use std::sync::atomic::{AtomicBool, Ordering};

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_signal(_signal: libc::c_int) {
    SHUTDOWN.store(true, Ordering::SeqCst);
}

/// Installs SIGINT and SIGTERM handlers that request a shutdown.
pub fn install() {
    unsafe {
        libc::signal(libc::SIGINT, handle_signal as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handle_signal as libc::sighandler_t);
    }
}

/// Whether a shutdown has been requested.
pub fn requested() -> bool {
    SHUTDOWN.load(Ordering::SeqCst)
}
