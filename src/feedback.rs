//! Single-slot store for user-facing notifications.
//!
//! Any part of the client can write a [`Feedback`] into the [`FeedbackStore`];
//! one renderer subscribes and shows it. A new notification replaces the
//! previous one outright: there is no queue. Callers that need a sequence
//! chain it through the `on_click` of the previous notification's action.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Kind of notification, which decides its styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackKind {
    None,
    Error,
    Success,
    Warning,
    Info,
}

impl FeedbackKind {
    fn default_title(self) -> &'static str {
        match self {
            FeedbackKind::Error => "Erro",
            FeedbackKind::Success => "Sucesso",
            FeedbackKind::Warning => "Atenção",
            FeedbackKind::Info => "Informação",
            FeedbackKind::None => "",
        }
    }

    fn default_action_label(self) -> &'static str {
        match self {
            FeedbackKind::Error | FeedbackKind::Warning => "Entendi",
            FeedbackKind::Success | FeedbackKind::Info | FeedbackKind::None => "OK",
        }
    }
}

/// A labelled button attached to a notification.
#[derive(Clone)]
pub struct FeedbackAction {
    pub label: String,
    pub on_click: Arc<dyn Fn() + Send + Sync>,
}

impl FeedbackAction {
    pub fn new(label: impl Into<String>, on_click: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            label: label.into(),
            on_click: Arc::new(on_click),
        }
    }

    pub fn invoke(&self) {
        (self.on_click)();
    }
}

impl fmt::Debug for FeedbackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedbackAction")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// The notification held in the slot.
#[derive(Debug, Clone)]
pub struct Feedback {
    pub id: Uuid,
    pub kind: FeedbackKind,
    pub title: Option<String>,
    pub message: String,
    pub action: Option<FeedbackAction>,
    pub secondary_action: Option<FeedbackAction>,
    /// Stays until dismissed; otherwise the renderer may clear it on its own.
    pub persistent: bool,
    pub created_at: DateTime<Utc>,
}

/// Caller-built notification for [`FeedbackStore::show_feedback`].
#[derive(Debug, Clone)]
pub struct FeedbackDraft {
    pub kind: FeedbackKind,
    pub title: Option<String>,
    pub message: String,
    pub action: Option<FeedbackAction>,
    pub secondary_action: Option<FeedbackAction>,
    /// `None` means persistent.
    pub persistent: Option<bool>,
}

impl FeedbackDraft {
    pub fn new(kind: FeedbackKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            title: None,
            message: message.into(),
            action: None,
            secondary_action: None,
            persistent: None,
        }
    }
}

type Listener = Arc<dyn Fn() + Send + Sync>;

struct StoreInner {
    slot: Mutex<Option<Arc<Feedback>>>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_listener: AtomicU64,
}

/// Cloneable handle onto one shared notification slot.
#[derive(Clone)]
pub struct FeedbackStore {
    inner: Arc<StoreInner>,
}

impl Default for FeedbackStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FeedbackStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedbackStore")
            .field("current", &self.snapshot())
            .finish_non_exhaustive()
    }
}

impl FeedbackStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                slot: Mutex::new(None),
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(0),
            }),
        }
    }

    pub fn show_error(&self, message: impl Into<String>, title: Option<&str>, action: Option<FeedbackAction>) {
        self.show_kind(FeedbackKind::Error, message.into(), title, action);
    }

    pub fn show_success(&self, message: impl Into<String>, title: Option<&str>, action: Option<FeedbackAction>) {
        self.show_kind(FeedbackKind::Success, message.into(), title, action);
    }

    pub fn show_warning(&self, message: impl Into<String>, title: Option<&str>, action: Option<FeedbackAction>) {
        self.show_kind(FeedbackKind::Warning, message.into(), title, action);
    }

    pub fn show_info(&self, message: impl Into<String>, title: Option<&str>, action: Option<FeedbackAction>) {
        self.show_kind(FeedbackKind::Info, message.into(), title, action);
    }

    /// Show a fully custom notification. Persistent unless the draft says
    /// `Some(false)`.
    pub fn show_feedback(&self, draft: FeedbackDraft) {
        self.replace(Some(Feedback {
            id: Uuid::new_v4(),
            kind: draft.kind,
            title: draft.title,
            message: draft.message,
            action: draft.action,
            secondary_action: draft.secondary_action,
            persistent: draft.persistent != Some(false),
            created_at: Utc::now(),
        }));
    }

    pub fn clear(&self) {
        self.replace(None);
    }

    /// Current notification, if any. No side effects.
    pub fn snapshot(&self) -> Option<Arc<Feedback>> {
        lock(&self.inner.slot).clone()
    }

    /// Whether a notification other than `none` is showing.
    pub fn is_modal_open(&self) -> bool {
        self.snapshot()
            .is_some_and(|fb| fb.kind != FeedbackKind::None)
    }

    /// Register `listener` to run after every mutation of the slot.
    ///
    /// Listeners run synchronously in registration order. The returned guard
    /// unsubscribes when dropped.
    #[must_use = "the listener is removed as soon as the subscription is dropped"]
    pub fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> Subscription {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        lock(&self.inner.listeners).push((id, Arc::new(listener)));
        Subscription {
            store: Arc::downgrade(&self.inner),
            id: Some(id),
        }
    }

    fn show_kind(
        &self,
        kind: FeedbackKind,
        message: String,
        title: Option<&str>,
        action: Option<FeedbackAction>,
    ) {
        let action = action.unwrap_or_else(|| self.dismiss_action(kind.default_action_label()));
        self.replace(Some(Feedback {
            id: Uuid::new_v4(),
            kind,
            title: Some(title.unwrap_or(kind.default_title()).to_string()),
            message,
            action: Some(action),
            secondary_action: None,
            persistent: true,
            created_at: Utc::now(),
        }));
    }

    /// An action that runs `then` and dismisses the notification.
    ///
    /// Holds only a weak reference to the store, since the action itself
    /// lives inside the slot.
    pub fn closing_action(
        &self,
        label: impl Into<String>,
        then: impl Fn() + Send + Sync + 'static,
    ) -> FeedbackAction {
        let weak = Arc::downgrade(&self.inner);
        FeedbackAction::new(label, move || {
            then();
            if let Some(inner) = weak.upgrade() {
                FeedbackStore { inner }.clear();
            }
        })
    }

    fn dismiss_action(&self, label: &str) -> FeedbackAction {
        self.closing_action(label, || {})
    }

    fn replace(&self, feedback: Option<Feedback>) {
        match &feedback {
            Some(fb) => tracing::debug!(kind = ?fb.kind, message = %fb.message, "feedback shown"),
            None => tracing::debug!("feedback cleared"),
        }
        *lock(&self.inner.slot) = feedback.map(Arc::new);
        self.notify();
    }

    fn notify(&self) {
        // Listeners may read or write the store, so none of its locks are held
        // while they run.
        let listeners: Vec<Listener> = lock(&self.inner.listeners)
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener();
        }
    }
}

/// Handle returned by [`FeedbackStore::subscribe`].
pub struct Subscription {
    store: Weak<StoreInner>,
    id: Option<u64>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if let (Some(id), Some(inner)) = (self.id.take(), self.store.upgrade()) {
            lock(&inner.listeners).retain(|(lid, _)| *lid != id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
