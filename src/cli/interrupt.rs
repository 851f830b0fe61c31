//! Ctrl-C handling.
//!
//! The first SIGINT cancels the current run: no new steps start, steps
//! already running finish and are recorded. A second SIGINT terminates
//! the process immediately.

use crate::runner::{CancellationToken, EXIT_CANCELLED};
use std::sync::atomic::{AtomicBool, Ordering};

/// What a Ctrl-C press should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    /// Stop scheduling and let running steps finish.
    Cancel,
    /// Leave now.
    Abort,
}

/// Decide the response to a press; the first press cancels.
fn on_interrupt(seen: &AtomicBool, token: &CancellationToken) -> Interrupt {
    if seen.swap(true, Ordering::SeqCst) {
        return Interrupt::Abort;
    }
    token.cancel();
    Interrupt::Cancel
}

/// Cancel `token` when the user presses Ctrl-C.
///
/// Call once per process; later calls are ignored with a warning.
pub fn install_interrupt_handler(token: CancellationToken) {
    let seen = AtomicBool::new(false);

    let installed = ctrlc::set_handler(move || match on_interrupt(&seen, &token) {
        Interrupt::Cancel => {
            eprintln!("\nInterrupted: waiting for running steps (Ctrl-C again to abort)");
        }
        Interrupt::Abort => std::process::exit(EXIT_CANCELLED),
    });

    if let Err(e) = installed {
        tracing::warn!(error = %e, "could not install Ctrl-C handler");
    }
}
