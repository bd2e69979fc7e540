//! Audio sidecar: raw PCM frames over a second, binary-only socket.

pub mod sidecar;

pub use sidecar::{AudioClient, AudioHandler};
