//! Toast Notifications

use std::sync::{Arc, Mutex};

use mockall::automock;

/// Severity of a toast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    /// Informational message.
    Info,

    /// Successful action.
    Success,

    /// Error the shopper can act on.
    Error,
}

/// A short message shown to the shopper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    /// Severity.
    pub level: ToastLevel,

    /// Stable key for the localisation layer.
    pub key: &'static str,

    /// Default (English) message.
    pub message: String,
}

impl Toast {
    /// Error toast.
    pub fn error(key: &'static str, message: impl Into<String>) -> Self {
        Self {
            level: ToastLevel::Error,
            key,
            message: message.into(),
        }
    }

    /// Success toast.
    pub fn success(key: &'static str, message: impl Into<String>) -> Self {
        Self {
            level: ToastLevel::Success,
            key,
            message: message.into(),
        }
    }
}

/// Surface for toast messages.
#[automock]
pub trait Notifier: Send + Sync {
    /// Show `toast` to the shopper.
    fn toast(&self, toast: Toast);
}

/// Notifier that keeps every toast, for scenario runs and tests.
#[derive(Debug, Clone, Default)]
pub struct ToastLog {
    toasts: Arc<Mutex<Vec<Toast>>>,
}

impl ToastLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Toasts shown so far, oldest first.
    #[must_use]
    pub fn toasts(&self) -> Vec<Toast> {
        match self.toasts.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Most recent toast.
    #[must_use]
    pub fn last(&self) -> Option<Toast> {
        self.toasts().pop()
    }
}

impl Notifier for ToastLog {
    fn toast(&self, toast: Toast) {
        match self.toasts.lock() {
            Ok(mut guard) => guard.push(toast),
            Err(poisoned) => poisoned.into_inner().push(toast),
        }
    }
}
