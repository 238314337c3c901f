pub mod connection;
pub mod hub;

pub use hub::{ConnectionId, Hub};
