//! The protocol engine beneath [`Conn`](crate::Conn).
//!
//! A [`Connection`] owns an upgraded stream and speaks RFC 6455 over it.
//! It splits into a [`MessageReader`], a [`MessageWriter`] and a
//! [`CloseHandle`] so that each direction can be driven from its own task.
//!
//! ## Connection Lifecycle
//!
//! 1. **Open** - Initial state after the upgrade
//! 2. **Closing** - Close frame sent, only reads continue
//! 3. **Closed** - Closed locally, everything in flight is aborted
//!
//! ## Example
//!
//! ```rust,ignore
//! use wsconn::connection::{Connection, Role};
//! use wsconn::{Config, OpCode};
//!
//! let stream = tokio::net::TcpStream::connect("example.com:80").await?;
//! // ... HTTP upgrade ...
//! let (mut reader, mut writer, closer) =
//!     Connection::new(stream, Role::Client, Config::new()).split();
//!
//! writer.write_message(OpCode::Text, b"Hello").await?;
//! let (opcode, payload) = reader.read_message().await?;
//! closer.close().await?;
//! ```

mod fragmenter;
mod role;
mod state;

#[allow(clippy::module_inception)]
mod connection;

pub use connection::{CloseHandle, Connection, MessageReader, MessageWriter, TransportHandle};
pub use fragmenter::MessageFragmenter;
pub use role::Role;
pub use state::ConnectionState;
