//! The notification payload pushed to subscribed clients.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A notification as it travels over the wire.
///
/// There is no identifier: two events with the same content cannot be told
/// apart, and receivers must not try to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationContent {
    pub title: String,
    pub message: String,
    /// Open-vocabulary type tag (e.g. `success`, `stock_reserved`).
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
}

impl NotificationContent {
    pub fn new(title: impl Into<String>, message: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            kind: kind.into(),
            data: None,
        }
    }

    /// Attach an arbitrary key/value to the `data` map, creating it if needed.
    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data
            .get_or_insert_with(Map::new)
            .insert(key.into(), value);
        self
    }
}
