//! Named publish/subscribe notifications.
//!
//! A [`NotificationCenter`] fans a [`Notification`] out to every subscriber
//! of its name. Success notifications carry the materialized objects under
//! [`DATA_KEY`]; failure notifications carry the error under [`ERROR_KEY`].

use crate::Error;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;

/// User-info key holding the success payload.
pub const DATA_KEY: &str = "data";

/// User-info key holding the failure payload.
pub const ERROR_KEY: &str = "error";

const CHANNEL_CAPACITY: usize = 64;

type Payload = Arc<dyn Any + Send + Sync>;

/// A named message with attached data.
#[derive(Clone)]
pub struct Notification {
    name: String,
    user_info: HashMap<&'static str, Payload>,
}

impl Notification {
    /// A notification with no attached data.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            user_info: HashMap::new(),
        }
    }

    /// Attaches `value` under `key`.
    pub fn with_user_info(mut self, key: &'static str, value: Payload) -> Self {
        self.user_info.insert(key, value);
        self
    }

    /// The name the notification was posted under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw access to attached data.
    pub fn user_info(&self, key: &str) -> Option<&Payload> {
        self.user_info.get(key)
    }

    /// The materialized objects of a success notification.
    ///
    /// Returns `None` when there is no data, or when `T` is not the type the
    /// request materialized.
    pub fn object_data<T: Send + Sync + 'static>(&self) -> Option<Arc<Vec<T>>> {
        Arc::clone(self.user_info.get(DATA_KEY)?)
            .downcast::<Vec<T>>()
            .ok()
    }

    /// The error of a failure notification.
    pub fn error_data(&self) -> Option<Arc<Error>> {
        Arc::clone(self.user_info.get(ERROR_KEY)?)
            .downcast::<Error>()
            .ok()
    }
}

impl fmt::Debug for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.user_info.keys().collect();
        keys.sort();
        f.debug_struct("Notification")
            .field("name", &self.name)
            .field("user_info", &keys)
            .finish()
    }
}

/// Broadcast hub keyed by notification name.
///
/// Cloning is cheap and every clone shares the same channels. Subscribers
/// only see notifications posted after they subscribed.
#[derive(Clone, Default)]
pub struct NotificationCenter {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<Notification>>>>,
}

impl NotificationCenter {
    /// Creates an empty center.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to notifications posted under `name`.
    pub fn subscribe(&self, name: impl Into<String>) -> broadcast::Receiver<Notification> {
        let mut channels = self
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        channels
            .entry(name.into())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Posts `notification` to all current subscribers of its name.
    ///
    /// Returns the number of subscribers that received it.
    pub fn post(&self, notification: Notification) -> usize {
        let sender = {
            let mut channels = self
                .channels
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match channels.get(notification.name()) {
                Some(sender) if sender.receiver_count() > 0 => sender.clone(),
                Some(_) => {
                    channels.remove(notification.name());
                    return 0;
                }
                None => return 0,
            }
        };

        let name = notification.name().to_string();
        let delivered = sender.send(notification).unwrap_or(0);
        tracing::debug!(name = %name, subscribers = delivered, "Posted notification");
        delivered
    }
}

impl fmt::Debug for NotificationCenter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let channels = self
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("NotificationCenter")
            .field("channels", &channels.len())
            .finish()
    }
}
