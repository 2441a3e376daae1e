//! Fire-and-forget user notifications.
//!
//! Payment handlers must never block on (or fail because of) Telegram, so
//! the notifier is a bounded queue drained by a small worker pool. Enqueue
//! is non-blocking; a full queue drops the message with a warning.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct Notification {
    pub telegram_id: i64,
    pub text: String,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// Transport that actually delivers a notification.
#[async_trait]
pub trait NotifySink: Send + Sync {
    async fn deliver(&self, note: &Notification) -> Result<(), NotifyError>;
}

/// Sink that only logs; used when no bot token is configured and in tests.
pub struct LogSink;

#[async_trait]
impl NotifySink for LogSink {
    async fn deliver(&self, note: &Notification) -> Result<(), NotifyError> {
        debug!(telegram_id = note.telegram_id, text = %note.text, "notification (log sink)");
        Ok(())
    }
}

/// Cheaply cloneable handle to the notification queue.
#[derive(Clone)]
pub struct NotifierHandle {
    tx: Option<mpsc::Sender<Notification>>,
}

impl NotifierHandle {
    /// Spawns `workers` drain tasks over a queue of `capacity` entries.
    pub fn spawn(sink: Arc<dyn NotifySink>, capacity: usize, workers: usize) -> Self {
        let (tx, rx) = mpsc::channel::<Notification>(capacity);
        let rx = Arc::new(Mutex::new(rx));

        for worker in 0..workers.max(1) {
            let rx = Arc::clone(&rx);
            let sink = Arc::clone(&sink);
            tokio::spawn(async move {
                loop {
                    let note = { rx.lock().await.recv().await };
                    let Some(note) = note else { break };
                    if let Err(err) = sink.deliver(&note).await {
                        warn!(worker, telegram_id = note.telegram_id, %err, "notification dropped");
                    }
                }
            });
        }

        Self { tx: Some(tx) }
    }

    /// Handle that silently discards everything.
    pub fn null() -> Self {
        Self { tx: None }
    }

    /// Enqueues a notification for a user, if the user is reachable.
    ///
    /// Never blocks and never reports failure to the caller.
    pub fn notify(&self, telegram_id: Option<i64>, text: impl Into<String>) {
        let Some(telegram_id) = telegram_id else { return };
        let Some(tx) = &self.tx else { return };

        let note = Notification { telegram_id, text: text.into() };
        if tx.try_send(note).is_err() {
            warn!(telegram_id, "notification queue full, message dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink(AtomicUsize);

    #[async_trait]
    impl NotifySink for CountingSink {
        async fn deliver(&self, _note: &Notification) -> Result<(), NotifyError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn delivers_enqueued_notifications() {
        let sink = Arc::new(CountingSink(AtomicUsize::new(0)));
        let handle = NotifierHandle::spawn(sink.clone(), 16, 2);

        handle.notify(Some(1), "hello");
        handle.notify(Some(2), "world");
        handle.notify(None, "unreachable user, skipped");

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(sink.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn null_handle_is_inert() {
        let handle = NotifierHandle::null();
        handle.notify(Some(1), "dropped");
    }
}
