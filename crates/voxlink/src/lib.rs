//! voxlink: Voxta hub client.
//!
//! One dependency for applications. `protocol` and `error` come from
//! `voxlink-core`; the engine types come from `voxlink-client`.
//!
//! ```no_run
//! use voxlink::prelude::*;
//!
//! # async fn run() -> voxlink::Result<()> {
//! let client = HubClient::new(config::load_from_file("voxlink.yaml")?)?;
//! client.on("replyChunk", |ev| async move {
//!     print!("{}", ev.payload["text"].as_str().unwrap_or(""));
//!     Ok(())
//! });
//!
//! let cancel = CancellationToken::new();
//! let negotiation = client.negotiate(&cancel).await?;
//! client.connect(&negotiation, &cancel).await?;
//! client.start_chat("character-id", Vec::new()).await?;
//! # Ok(())
//! # }
//! ```

pub use voxlink_core::{error, protocol, ErrorCode, Result, VoxlinkError};

pub use voxlink_client::{
    audio, config, dispatch, hub, session, transport, AudioClient, BoxError, CancellationToken,
    ConnectionState, Dispatcher, HubClient, Negotiation, SubscriptionHandle,
};

/// Everything a typical application touches.
pub mod prelude {
    pub use voxlink_client::config;
    pub use voxlink_client::hub::{ContextUpdate, SendFlags};
    pub use voxlink_client::{
        AudioClient, CancellationToken, ConnectionState, HubClient, Negotiation,
    };
    pub use voxlink_core::protocol::incoming::EventRecord;
    pub use voxlink_core::protocol::outgoing::ClientMessage;
    pub use voxlink_core::{Result, VoxlinkError};
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::prelude::*;

    #[test]
    fn prelude_covers_config_and_messages() {
        let cfg = config::load_from_str("version: 1\n").unwrap();
        assert_eq!(cfg.hub.hub_path, "/hub");

        let err = ClientMessage::send_text("", "hi").validate().unwrap_err();
        assert_eq!(err.code().as_str(), "MISSING_FIELD");
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }
}
