//! voxlink client library entry.
//!
//! This crate wires the transport, dispatcher, session pinner, hub client and
//! audio sidecar into the runtime engine. It is consumed by the `voxlink`
//! binary (`main.rs`) and by integration tests.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod audio;
pub mod config;
pub mod dispatch;
pub mod hub;
pub mod session;
pub mod transport;

pub use audio::AudioClient;
pub use dispatch::{BoxError, Dispatcher, SubscriptionHandle};
pub use hub::{ConnectionState, HubClient};
pub use tokio_util::sync::CancellationToken;
pub use transport::Negotiation;
