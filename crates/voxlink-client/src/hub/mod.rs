//! Control channel: connection lifecycle, send path and hub methods.

pub mod client;
pub mod methods;
pub mod state;

pub use client::HubClient;
pub use methods::{ContextUpdate, SendFlags};
pub use state::ConnectionState;
