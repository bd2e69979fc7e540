//! Hub protocol modules.
//!
//! - `frame`: record framing (JSON text terminated by `0x1E`).
//! - `envelope`: the hub envelope (`type`, `invocationId`, `target`, `arguments`)
//!   and the handshake records.
//! - `outgoing`: typed client messages, one variant per hub method.
//! - `incoming`: classification of inbound records into named events.
//!
//! All parsers are panic-free: malformed input is reported as `VoxlinkError`
//! instead of panicking or indexing raw buffers.

pub mod envelope;
pub mod frame;
pub mod incoming;
pub mod outgoing;
