//! # wsconn - A WebSocket connection you can share between tasks
//!
//! `wsconn` wraps an RFC 6455 protocol engine in a [`Conn`] that any number
//! of tasks can read from and write to concurrently.
//!
//! ## Features
//!
//! - **One type for both sides**: [`Conn::new_client`], [`Conn::new_server`]
//!   and [`new_server_conn_with_http`] all produce the same [`Conn`]
//! - **Per-direction locking**: writes never interleave on the wire, reads
//!   never split a message, and a read and a write can run in parallel
//! - **Typed payloads**: raw bytes, text or any `serde::Serialize` value
//! - **permessage-deflate** with pluggable compressor/decompressor factories
//! - **Strict validation** of frames, masking, UTF-8 and resource limits
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use wsconn::{Conn, MessageType, Options, TextPayload};
//!
//! // `stream` has already completed the HTTP upgrade.
//! let conn = Conn::new_client(stream, &Options::new());
//! conn.write_message(MessageType::Text, TextPayload("hello")).await?;
//! let (kind, payload) = conn.read_message().await?;
//! conn.close().await?;
//! ```

pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod extensions;
pub mod message;
pub mod options;
pub mod protocol;

mod conn;
mod upgrade;

pub use config::{Config, Limits};
pub use conn::Conn;
pub use connection::{ConnectionState, Role};
pub use error::{Error, Result};
pub use message::{EncodablePayload, EncodePayload, MessageType, RawPayload, TextPayload};
pub use options::{
    ErrorHandler, Options, UpgradeOptions, default_error_response, get_request_header_option,
    get_response_header_option, set_client_headers_with_option,
};
pub use protocol::handshake::CheckOrigin;
pub use protocol::{OpCode, WS_GUID, compute_accept_key};
pub use upgrade::{PendingConn, UpgradeRejection, UpgradedConn, new_server_conn_with_http};

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::DuplexStream;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn test_public_types_are_send() {
        assert_send::<Error>();
        assert_send::<Config>();
        assert_send::<Limits>();
        assert_send::<MessageType>();
        assert_send::<Options>();
        assert_send::<UpgradeOptions>();
        assert_send::<ConnectionState>();
        assert_send::<Role>();
        assert_send::<Conn<DuplexStream>>();
        assert_send::<PendingConn>();
        assert_send::<UpgradedConn>();
    }

    #[test]
    fn test_public_types_are_sync() {
        assert_sync::<Error>();
        assert_sync::<Config>();
        assert_sync::<Limits>();
        assert_sync::<MessageType>();
        assert_sync::<Options>();
        assert_sync::<UpgradeOptions>();
        assert_sync::<ConnectionState>();
        assert_sync::<Role>();
        assert_sync::<Conn<DuplexStream>>();
        assert_sync::<UpgradedConn>();
    }
}
