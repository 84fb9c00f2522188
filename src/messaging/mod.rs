// Messaging - Notifications from audio workers to whoever renders status

pub mod channels;
pub mod notification;

pub use channels::{NotificationConsumer, NotificationProducer, SharedNotifier, create_notification_channel};
pub use notification::{Notification, NotificationCategory, NotificationLevel};
