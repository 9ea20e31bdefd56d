//! Network transport: upgrade admission and the WebSocket listener.

pub mod upgrade;
pub mod websocket;

pub use websocket::{start_listener, AcceptedConnection, Surface};
