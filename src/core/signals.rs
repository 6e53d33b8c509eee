//! SIGTERM/SIGINT shutdown flag for long-running commands.
//!
//! Uses the `signal-hook` crate for safe signal registration. Loops poll
//! `ShutdownSignal::should_shutdown` between waits rather than blocking on signals.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Thread-safe shutdown flag shared between the signal handler and a polling loop.
#[derive(Clone, Debug, Default)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
}

impl ShutdownSignal {
    /// Create a flag without registering any OS hooks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a flag wired to SIGTERM and SIGINT.
    ///
    /// Registration is best-effort; failures are logged to stderr but not fatal.
    #[cfg(feature = "signals")]
    #[must_use]
    pub fn install() -> Self {
        use signal_hook::consts::{SIGINT, SIGTERM};

        let signal = Self::new();
        for (name, sig) in [("SIGTERM", SIGTERM), ("SIGINT", SIGINT)] {
            if let Err(e) = signal_hook::flag::register(sig, Arc::clone(&signal.flag)) {
                eprintln!("[STO-SIGNAL] failed to register {name}: {e}");
            }
        }
        signal
    }

    /// Whether a signal arrived or `request_shutdown` was called on any clone.
    #[must_use]
    pub fn should_shutdown(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Raise the flag for every clone, as a signal would.
    pub fn request_shutdown(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Sleep up to `total`, waking early on shutdown. Returns `true` if shutdown
    /// was requested.
    pub fn sleep(&self, total: Duration) -> bool {
        let deadline = Instant::now() + total;
        loop {
            if self.should_shutdown() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep((deadline - now).min(Duration::from_millis(200)));
        }
    }
}
