use console::style;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

pub type NotificationId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Info,
    Completion,
}

/// User-visible lifecycle notice emitted by the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
}

impl Notification {
    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Info,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn completion(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Completion,
            title: title.into(),
            message: message.into(),
        }
    }
}

/// Where lifecycle notices go. The orchestrator only talks to this seam;
/// the front end decides how notices surface.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification) -> NotificationId;

    /// Withdraws a previously shown notice where the surface supports it.
    fn dismiss(&self, _id: NotificationId) {}

    fn info(&self, title: &str, message: &str) -> NotificationId {
        self.notify(Notification::info(title, message))
    }

    fn completion(&self, title: &str, message: &str) -> NotificationId {
        self.notify(Notification::completion(title, message))
    }
}

/// Prints notices to stderr so piped chat output stays clean.
pub struct ConsoleSink {
    next_id: AtomicU64,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
        }
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationSink for ConsoleSink {
    fn notify(&self, notification: Notification) -> NotificationId {
        let marker = match notification.kind {
            NotificationKind::Info => style("i").cyan().bold(),
            NotificationKind::Completion => style("✓").green().bold(),
        };
        eprintln!(
            "{} {} {}",
            marker,
            style(&notification.title).bold(),
            style(&notification.message).dim()
        );
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// Keeps notices in memory until a front end drains them. Also what tests
/// assert against.
pub struct BufferedSink {
    next_id: AtomicU64,
    entries: Mutex<Vec<(NotificationId, Notification)>>,
}

impl BufferedSink {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn drain(&self) -> Vec<Notification> {
        self.entries
            .lock()
            .drain(..)
            .map(|(_, notification)| notification)
            .collect()
    }

    pub fn snapshot(&self) -> Vec<Notification> {
        self.entries
            .lock()
            .iter()
            .map(|(_, notification)| notification.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for BufferedSink {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationSink for BufferedSink {
    fn notify(&self, notification: Notification) -> NotificationId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().push((id, notification));
        id
    }

    fn dismiss(&self, id: NotificationId) {
        self.entries.lock().retain(|(entry_id, _)| *entry_id != id);
    }
}

/// Discards everything. Default for embedders that bring no surface.
pub struct NullSink;

impl NotificationSink for NullSink {
    fn notify(&self, _notification: Notification) -> NotificationId {
        0
    }
}
