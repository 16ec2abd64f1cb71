//! Built-in notification consumers.
//!
//! Both attach to a [`NotificationDispatcher`](crate::dispatcher::NotificationDispatcher)
//! and receive every event independently of one another.

pub mod history;
pub mod toast;

pub use history::{HistoryEntry, NotificationHistory, HISTORY_LIMIT};
pub use toast::{Toast, ToastIcon, ToastSurface};
