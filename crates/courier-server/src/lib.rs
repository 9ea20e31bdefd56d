//! courier-server: presence-aware real-time message delivery.
//!
//! Accepts authenticated WebSocket connections on a chat surface and a
//! notification surface, checks every direct message against the
//! relationship policy, persists it and fans it out to whichever
//! recipients are online. Offline recipients get a notification instead.

pub mod auth;
pub mod config;
pub mod connection;
pub mod hub;
pub mod notify;
pub mod pipeline;
pub mod policy;
pub mod server;
pub mod store;
pub mod transport;

pub use server::{CourierServer, ServerHandle};
