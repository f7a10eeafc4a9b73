//! Observer registration for session and server events.

use std::sync::Mutex;
use tokio::sync::mpsc;

/// Receiving end handed out by `subscribe()`.
pub type EventStream<T> = mpsc::UnboundedReceiver<T>;

/// Fans events out to every live subscriber.
///
/// Channels are unbounded, so an event is queued for every subscriber that
/// still holds its receiver; dropped receivers are pruned on the next emit.
pub(crate) struct EventBus<T> {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<T>>>,
}

impl<T: Clone> EventBus<T> {
    pub(crate) fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn subscribe(&self) -> EventStream<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push(tx);
        rx
    }

    pub(crate) fn emit(&self, event: T) {
        self.lock().retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<mpsc::UnboundedSender<T>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
