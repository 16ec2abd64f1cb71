//! Transient toast notifications.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use notify_common::NotificationContent;
use parking_lot::Mutex;

use crate::dispatcher::{NotificationDispatcher, Subscription};

/// Toasts kept on screen at once; the oldest is evicted first.
pub const DEFAULT_VISIBLE_TOASTS: usize = 5;

/// Icon shown next to a toast, chosen from the notification's type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastIcon {
    Success,
    Warning,
    Error,
    StockReserved,
    StockReservationFailed,
    Cart,
    System,
    Info,
}

impl ToastIcon {
    /// Unknown tags fall back to [`ToastIcon::Info`].
    pub fn for_kind(kind: &str) -> Self {
        match kind {
            "success" => Self::Success,
            "warning" => Self::Warning,
            "error" => Self::Error,
            "stock_reserved" => Self::StockReserved,
            "stock_reservation_failed" => Self::StockReservationFailed,
            "cart_update" => Self::Cart,
            "system_test" => Self::System,
            _ => Self::Info,
        }
    }

    pub fn glyph(self) -> &'static str {
        match self {
            Self::Success => "✔",
            Self::Warning => "⚠",
            Self::Error => "✖",
            Self::StockReserved => "📦",
            Self::StockReservationFailed => "⛔",
            Self::Cart => "🛒",
            Self::System => "⚙",
            Self::Info => "ℹ",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Toast {
    pub icon: ToastIcon,
    pub title: String,
    pub message: String,
    /// The notification's type tag, kept verbatim.
    pub kind: String,
    pub shown_at: DateTime<Utc>,
}

impl Toast {
    pub fn from_content(content: &NotificationContent) -> Self {
        Self {
            icon: ToastIcon::for_kind(&content.kind),
            title: content.title.clone(),
            message: content.message.clone(),
            kind: content.kind.clone(),
            shown_at: Utc::now(),
        }
    }
}

impl fmt::Display for Toast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.icon.glyph(), self.title, self.message)
    }
}

type ToastHook = Arc<dyn Fn(&Toast) + Send + Sync>;

/// Bounded stack of visible toasts. Clones share state.
#[derive(Clone)]
pub struct ToastSurface {
    visible: Arc<Mutex<VecDeque<Toast>>>,
    capacity: usize,
    on_show: Option<ToastHook>,
}

impl Default for ToastSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl ToastSurface {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_VISIBLE_TOASTS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            visible: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
            on_show: None,
        }
    }

    /// Run `hook` whenever a toast is shown, e.g. to render it.
    pub fn on_show<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Toast) + Send + Sync + 'static,
    {
        self.on_show = Some(Arc::new(hook));
        self
    }

    /// Subscribe this surface to `dispatcher`.
    pub fn attach(&self, dispatcher: &NotificationDispatcher) -> Subscription {
        let surface = self.clone();
        dispatcher.subscribe(move |content| {
            surface.show(content);
        })
    }

    pub fn show(&self, content: &NotificationContent) -> Toast {
        let toast = Toast::from_content(content);
        {
            let mut visible = self.visible.lock();
            if visible.len() == self.capacity {
                visible.pop_front();
            }
            visible.push_back(toast.clone());
        }
        if let Some(hook) = &self.on_show {
            hook(&toast);
        }
        toast
    }

    /// Visible toasts, oldest first.
    pub fn visible(&self) -> Vec<Toast> {
        self.visible.lock().iter().cloned().collect()
    }

    pub fn dismiss_all(&self) {
        self.visible.lock().clear();
    }
}

impl fmt::Debug for ToastSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToastSurface")
            .field("visible", &self.visible.lock().len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
