//! Dispatcher module exports.
//!
//! Re-exports the event dispatcher and its subscriber types so downstream
//! consumers can depend on this module directly.

pub mod dispatcher;

pub use dispatcher::{BoxError, Dispatcher, Handler, SubscriptionHandle};
