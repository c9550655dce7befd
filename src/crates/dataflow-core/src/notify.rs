//! Single-consumer notification channels.
//!
//! A [`NotificationSet`] queues items in FIFO order. Any number of tasks may
//! call [`NotificationSet::added`], but exactly one of them wakes per batch
//! and receives every item pending at that moment; the others keep waiting.

use tokio::sync::{mpsc, Mutex};

/// FIFO queue with batch-draining waiters
#[derive(Debug)]
pub struct NotificationSet<T> {
    tx: mpsc::UnboundedSender<T>,
    rx: Mutex<mpsc::UnboundedReceiver<T>>,
}

impl<T> NotificationSet<T> {
    /// Create an empty set
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Queue an item; never blocks
    pub fn add(&self, item: T) {
        // The receiver lives as long as `self`, so sending cannot fail.
        let _ = self.tx.send(item);
    }

    /// Wait for at least one item, then drain everything pending.
    ///
    /// Cancel-safe: a waiter dropped before an item arrives loses nothing.
    pub async fn added(&self) -> Vec<T> {
        let mut rx = self.rx.lock().await;
        let mut batch = Vec::new();
        if let Some(first) = rx.recv().await {
            batch.push(first);
        }
        while let Ok(item) = rx.try_recv() {
            batch.push(item);
        }
        batch
    }

    /// Drain pending items without waiting.
    pub async fn try_drain(&self) -> Vec<T> {
        let mut rx = self.rx.lock().await;
        let mut batch = Vec::new();
        while let Ok(item) = rx.try_recv() {
            batch.push(item);
        }
        batch
    }
}

impl<T> Default for NotificationSet<T> {
    fn default() -> Self {
        Self::new()
    }
}
