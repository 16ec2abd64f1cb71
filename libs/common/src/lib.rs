pub mod id;
pub mod notification;
pub mod protocol;

pub use notification::NotificationContent;
pub use protocol::{ClientMessage, ServerMessage};
