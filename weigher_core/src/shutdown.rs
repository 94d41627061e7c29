//! Cooperative stop signal shared by the worker threads.
//!
//! Triggering drops the only sender of a zero-capacity channel, so every
//! thread parked in `wait` wakes at once instead of finishing its sleep.
use crossbeam_channel as xch;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone)]
pub struct Shutdown {
    inner: Arc<Inner>,
}

struct Inner {
    flag: AtomicBool,
    tx: Mutex<Option<xch::Sender<()>>>,
    rx: xch::Receiver<()>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = xch::bounded(0);
        Self {
            inner: Arc::new(Inner {
                flag: AtomicBool::new(false),
                tx: Mutex::new(Some(tx)),
                rx,
            }),
        }
    }

    pub fn trigger(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        let mut tx = self
            .inner
            .tx
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        tx.take();
    }

    #[inline]
    pub fn is_triggered(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Sleep up to `d`; returns `true` if shutdown was requested meanwhile.
    pub fn wait(&self, d: Duration) -> bool {
        if self.is_triggered() {
            return true;
        }
        match self.inner.rx.recv_timeout(d) {
            Err(xch::RecvTimeoutError::Timeout) => self.is_triggered(),
            _ => true,
        }
    }

    /// Block until shutdown is requested.
    pub fn wait_forever(&self) {
        if self.is_triggered() {
            return;
        }
        let _ = self.inner.rx.recv();
    }
}

impl std::fmt::Debug for Shutdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shutdown")
            .field("triggered", &self.is_triggered())
            .finish()
    }
}
