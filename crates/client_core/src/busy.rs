use std::sync::Arc;

use tokio::sync::watch;

pub trait BusyIndicator: Send + Sync {
    /// Plain set, never read-modify-write: concurrent invocations race and the
    /// last write wins.
    fn set_busy(&self, busy: bool);
}

#[must_use = "the indicator is released as soon as the guard is dropped"]
pub struct BusyGuard {
    indicator: Arc<dyn BusyIndicator>,
}

impl BusyGuard {
    pub fn acquire(indicator: Arc<dyn BusyIndicator>) -> Self {
        indicator.set_busy(true);
        Self { indicator }
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.indicator.set_busy(false);
    }
}

pub struct BusyFlag {
    tx: watch::Sender<bool>,
}

impl BusyFlag {
    pub fn new() -> Arc<Self> {
        let (tx, _) = watch::channel(false);
        Arc::new(Self { tx })
    }

    pub fn is_busy(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl BusyIndicator for BusyFlag {
    fn set_busy(&self, busy: bool) {
        self.tx.send_replace(busy);
    }
}
