//! User-visible notifications.
//!
//! The resolver reports an overall failure to the user as well as to
//! programmatic callers. How a notification is shown (toast, banner, log
//! line) is up to the [`Notifier`] implementation.

use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// How prominently a notification should be shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational message.
    Info,
    /// Something went wrong.
    Error,
}

/// A fire-and-forget message for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Text to show.
    pub message: String,
    /// Severity of the message.
    pub severity: Severity,
}

impl Notification {
    /// Creates an informational notification.
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: Severity::Info,
        }
    }

    /// Creates an error notification.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: Severity::Error,
        }
    }
}

/// Presents notifications to the user.
///
/// Implementations must not block; the resolver calls `notify` from its
/// resolution task.
pub trait Notifier: Send + Sync {
    /// Shows a notification. The result is never awaited or inspected.
    fn notify(&self, notification: Notification);
}

/// Notifier that writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        match notification.severity {
            Severity::Info => info!(target: "deviceid::notify", "{}", notification.message),
            Severity::Error => error!(target: "deviceid::notify", "{}", notification.message),
        }
    }
}

impl<N: Notifier + ?Sized> Notifier for std::sync::Arc<N> {
    fn notify(&self, notification: Notification) {
        (**self).notify(notification);
    }
}
