//! The single open scale port, shared by the acquisition loop and the
//! on-demand reader.
//!
//! Whoever holds the lock owns the serial stream. The acquisition loop takes
//! it for one bounded read at a time; an on-demand capture holds it for the
//! whole capture and bumps the handoff counter so the loop knows its partial
//! buffer no longer lines up with the stream.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use weigher_traits::ScalePort;

pub type PortGuard<'a> = MutexGuard<'a, Option<Box<dyn ScalePort>>>;

#[derive(Default)]
pub struct PortSlot {
    port: Mutex<Option<Box<dyn ScalePort>>>,
    handoffs: AtomicU64,
}

impl PortSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the port lock. A holder that panicked leaves the slot usable: the
    /// poison is cleared and the caller decides whether to keep the port.
    pub fn lock(&self) -> PortGuard<'_> {
        match self.port.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("port slot was poisoned by a panicking holder");
                self.port.clear_poison();
                poisoned.into_inner()
            }
        }
    }

    /// Install a freshly opened port, replacing (and closing) any previous one.
    pub fn install(&self, port: Box<dyn ScalePort>) {
        *self.lock() = Some(port);
    }

    /// Close the current port, if any; returns its name.
    pub fn close(&self) -> Option<String> {
        let old = self.lock().take();
        old.map(|p| p.name().to_owned())
    }

    pub fn is_connected(&self) -> bool {
        self.lock().is_some()
    }

    pub fn port_name(&self) -> Option<String> {
        self.lock().as_ref().map(|p| p.name().to_owned())
    }

    /// Record that another reader consumed bytes from the stream.
    pub fn note_handoff(&self) {
        self.handoffs.fetch_add(1, Ordering::SeqCst);
    }

    pub fn handoffs(&self) -> u64 {
        self.handoffs.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for PortSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortSlot")
            .field("port", &self.port_name())
            .field("handoffs", &self.handoffs())
            .finish()
    }
}
