use crate::notifications::{NotificationId, NotificationSink};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub type SubscriptionId = u64;
type ModeListener = Arc<dyn Fn(bool) + Send + Sync>;

/// Snapshot of the background state, cheap to hand to status displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackgroundStatus {
    pub is_background: bool,
    pub activity_count: u32,
    pub has_activity: bool,
}

struct BackgroundState {
    background: bool,
    activity_count: u32,
    listeners: HashMap<SubscriptionId, ModeListener>,
    persistent_notification: Option<NotificationId>,
}

/// Tracks whether the assistant is running detached from the foreground and
/// how many background tasks are in flight. While backgrounded it keeps one
/// persistent notification alive and rewrites its text as the task count
/// moves.
pub struct BackgroundManager {
    state: Mutex<BackgroundState>,
    next_subscription: AtomicU64,
    notifications: Arc<dyn NotificationSink>,
}

impl BackgroundManager {
    pub fn new(notifications: Arc<dyn NotificationSink>) -> Self {
        Self {
            state: Mutex::new(BackgroundState {
                background: false,
                activity_count: 0,
                listeners: HashMap::new(),
                persistent_notification: None,
            }),
            next_subscription: AtomicU64::new(1),
            notifications,
        }
    }

    pub fn is_in_background(&self) -> bool {
        self.state.lock().background
    }

    /// Flips the mode. A no-op when already in the requested mode; on a real
    /// change it notifies subscribers and creates or dismisses the
    /// persistent notification.
    pub fn set_background_mode(&self, background: bool) {
        let listeners = {
            let mut state = self.state.lock();
            if state.background == background {
                return;
            }
            state.background = background;
            if background {
                tracing::info!("assistant moved to background mode");
                self.create_persistent(&mut state);
            } else {
                tracing::info!("assistant moved to foreground mode");
                self.remove_persistent(&mut state);
            }
            state.listeners.values().cloned().collect::<Vec<_>>()
        };
        notify(&listeners, background);
    }

    pub fn increment_activity(&self) {
        let mut state = self.state.lock();
        state.activity_count += 1;
        tracing::debug!(count = state.activity_count, "background activity up");
        self.refresh_persistent(&mut state);
    }

    pub fn decrement_activity(&self) {
        let mut state = self.state.lock();
        state.activity_count = state.activity_count.saturating_sub(1);
        tracing::debug!(count = state.activity_count, "background activity down");
        self.refresh_persistent(&mut state);
    }

    pub fn activity_count(&self) -> u32 {
        self.state.lock().activity_count
    }

    pub fn has_activity(&self) -> bool {
        self.activity_count() > 0
    }

    /// Registers a mode-change listener; the returned id feeds
    /// [`unsubscribe`](Self::unsubscribe).
    pub fn on_mode_change(
        &self,
        listener: impl Fn(bool) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        self.state.lock().listeners.insert(id, Arc::new(listener));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.state.lock().listeners.remove(&id);
    }

    pub fn status(&self) -> BackgroundStatus {
        let state = self.state.lock();
        BackgroundStatus {
            is_background: state.background,
            activity_count: state.activity_count,
            has_activity: state.activity_count > 0,
        }
    }

    /// Returns everything to foreground-idle and tells subscribers, whether
    /// or not the mode actually changed.
    pub fn reset(&self) {
        let listeners = {
            let mut state = self.state.lock();
            state.background = false;
            state.activity_count = 0;
            self.remove_persistent(&mut state);
            state.listeners.values().cloned().collect::<Vec<_>>()
        };
        notify(&listeners, false);
        tracing::debug!("background state reset");
    }

    fn create_persistent(&self, state: &mut BackgroundState) {
        self.remove_persistent(state);
        let id = self.notifications.info(
            "Archie Assistant Active",
            "Archie is running in the background and ready to assist you.",
        );
        state.persistent_notification = Some(id);
    }

    fn remove_persistent(&self, state: &mut BackgroundState) {
        if let Some(id) = state.persistent_notification.take() {
            self.notifications.dismiss(id);
        }
    }

    fn refresh_persistent(&self, state: &mut BackgroundState) {
        if state.persistent_notification.is_none() || !state.background {
            return;
        }
        self.remove_persistent(state);
        let message = if state.activity_count > 0 {
            format!(
                "Archie is processing {} background task{}.",
                state.activity_count,
                if state.activity_count > 1 { "s" } else { "" }
            )
        } else {
            "Archie is ready to assist you in the background.".to_string()
        };
        let id = self
            .notifications
            .info("Archie Assistant Active", &message);
        state.persistent_notification = Some(id);
    }
}

// Listeners run outside the state lock so one that re-enters the manager
// cannot deadlock it, and parking_lot does not poison on a listener panic.
fn notify(listeners: &[ModeListener], background: bool) {
    for listener in listeners {
        listener(background);
    }
}
