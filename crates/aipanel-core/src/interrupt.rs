//! Ctrl+C handling.
//!
//! The handler only sets a flag and wakes waiters; front-ends decide what
//! an interrupt means (the chat command cancels its stream).

use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use tokio::sync::Notify;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);
static INTERRUPT_NOTIFY: OnceLock<Notify> = OnceLock::new();

/// Returned by commands that stopped because of Ctrl+C.
#[derive(Debug)]
pub struct InterruptedError;

impl std::fmt::Display for InterruptedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Interrupted")
    }
}

impl std::error::Error for InterruptedError {}

/// Installs the Ctrl+C handler. A second Ctrl+C exits immediately with 130.
///
/// # Errors
/// Returns an error if a handler is already installed.
pub fn init() -> Result<()> {
    ctrlc::set_handler(trigger).context("Failed to set Ctrl+C handler")
}

fn notify() -> &'static Notify {
    INTERRUPT_NOTIFY.get_or_init(Notify::new)
}

/// Records an interrupt and wakes every waiter.
pub fn trigger() {
    if INTERRUPTED.swap(true, Ordering::SeqCst) {
        std::process::exit(130);
    }
    notify().notify_waiters();
}

pub fn is_interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Waits until an interrupt is triggered.
pub async fn wait_for_interrupt() {
    loop {
        let notified = notify().notified();
        if is_interrupted() {
            return;
        }
        notified.await;
    }
}

/// Clears the interrupt flag.
pub fn reset() {
    INTERRUPTED.store(false, Ordering::SeqCst);
}
