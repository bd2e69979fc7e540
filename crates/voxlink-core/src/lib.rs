//! voxlink core: hub protocol records and the shared error type.
//!
//! - `protocol::frame`: 0x1E record framing with a chunk-invariant decoder
//! - `protocol::envelope`: hub envelopes and the handshake records
//! - `protocol::outgoing`: `$type`-tagged client messages
//! - `protocol::incoming`: inbound record classification into named events
//!
//! Nothing here touches a socket or a runtime. A bad inbound record becomes
//! `VoxlinkError::MalformedFrame` for that record only.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;

/// Shared result type.
pub use error::{ErrorCode, Result, VoxlinkError};
