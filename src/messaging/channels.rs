// Lock-free notification channel
// Producers live in stream error callbacks, so pushes must never block.

use crate::messaging::notification::Notification;
use ringbuf::traits::Producer;
use ringbuf::{HeapRb, traits::Split};
use std::sync::{Arc, Mutex};

pub type NotificationProducer = ringbuf::HeapProd<Notification>;
pub type NotificationConsumer = ringbuf::HeapCons<Notification>;

pub fn create_notification_channel(
    capacity: usize,
) -> (NotificationProducer, NotificationConsumer) {
    let rb = HeapRb::<Notification>::new(capacity);
    rb.split()
}

/// Producer shared by every worker that can report a problem
#[derive(Clone)]
pub struct SharedNotifier {
    inner: Arc<Mutex<NotificationProducer>>,
}

impl SharedNotifier {
    pub fn new(producer: NotificationProducer) -> Self {
        Self {
            inner: Arc::new(Mutex::new(producer)),
        }
    }

    /// Push without blocking; dropped if the lock is contended or the ring is full
    pub fn notify(&self, notification: Notification) {
        if let Ok(mut tx) = self.inner.try_lock() {
            if tx.try_push(notification).is_err() {
                log::trace!("Notification ring full, dropping");
            }
        }
    }
}
