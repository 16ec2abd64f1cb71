pub mod fanout;
pub mod registry;
pub mod server;
pub mod session;
