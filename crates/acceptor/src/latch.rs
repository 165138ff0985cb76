//! Latch — one-shot lifecycle signals.
//!
//! A [`Latch`] starts unfired, fires at most once and never resets. Any
//! number of [`Signal`] handles can observe it; waiters that subscribe after
//! the latch fired resolve immediately.

use std::sync::Arc;
use tokio::sync::watch;

/// A fire-once flag backed by a watch channel.
#[derive(Debug)]
pub struct Latch {
    tx: Arc<watch::Sender<bool>>,
}

impl Latch {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// A latch that has already fired.
    pub fn fired() -> Self {
        let latch = Self::new();
        latch.fire();
        latch
    }

    /// Fire the latch. Returns `true` only for the call that flipped it;
    /// later calls have no effect.
    pub fn fire(&self) -> bool {
        self.tx.send_if_modified(|fired| {
            if *fired {
                false
            } else {
                *fired = true;
                true
            }
        })
    }

    pub fn has_fired(&self) -> bool {
        *self.tx.borrow()
    }

    /// Read-only view for observers.
    pub fn signal(&self) -> Signal {
        Signal {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl Default for Latch {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only, cloneable handle onto a [`Latch`].
#[derive(Debug, Clone)]
pub struct Signal {
    tx: Arc<watch::Sender<bool>>,
}

impl Signal {
    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the latch fires.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // `self` keeps the sender alive, so the channel cannot close under us.
        let _ = rx.wait_for(|fired| *fired).await;
    }
}
