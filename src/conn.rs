//! The connection façade.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::config::Config;
use crate::connection::{
    CloseHandle, Connection, MessageReader, MessageWriter, Role, TransportHandle,
};
use crate::error::Result;
use crate::message::{EncodePayload, MessageType};
use crate::options::Options;

/// Who else can shut the stream down when the connection closes.
enum RawTransport<T> {
    /// The stream was handed to us directly.
    Owned(TransportHandle<T>),
    /// The stream came out of an HTTP upgrade and the HTTP layer owns the
    /// rest of it.
    Detached,
}

/// A WebSocket connection that any number of tasks may share.
///
/// Reads are serialized with reads and writes with writes, each call
/// holding its lock for exactly one message. A read and a write can be in
/// progress at the same time. Wrap it in an `Arc` to share it.
///
/// ## Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use wsconn::{Conn, MessageType, Options, TextPayload};
///
/// let conn = Arc::new(Conn::new_client(stream, &Options::new()));
///
/// let reader = Arc::clone(&conn);
/// tokio::spawn(async move {
///     while let Ok((kind, payload)) = reader.read_message().await {
///         println!("{kind}: {} bytes", payload.len());
///     }
/// });
///
/// conn.write_message(MessageType::Text, TextPayload("ping")).await?;
/// conn.close().await?;
/// ```
pub struct Conn<T> {
    reader: Mutex<MessageReader<T>>,
    writer: Mutex<MessageWriter<T>>,
    closer: CloseHandle<T>,
    raw: RawTransport<T>,
    subprotocol: String,
    is_server: bool,
}

impl<T: AsyncRead + AsyncWrite> Conn<T> {
    /// Client side of an already upgraded stream.
    pub fn new_client(transport: T, options: &Options) -> Self {
        Self::new(transport, Role::Client, options, true)
    }

    /// Server side of an already upgraded stream.
    pub fn new_server(transport: T, options: &Options) -> Self {
        Self::new(transport, Role::Server, options, true)
    }

    pub(crate) fn new(transport: T, role: Role, options: &Options, owned: bool) -> Self {
        let connection = Connection::new(transport, role, Config::from(options));
        let raw = if owned {
            RawTransport::Owned(connection.transport_handle())
        } else {
            RawTransport::Detached
        };
        let (reader, writer, closer) = connection.split();

        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            closer,
            raw,
            subprotocol: options.subprotocol.clone(),
            is_server: role.is_server(),
        }
    }

    /// Wait for the next complete message.
    ///
    /// Pings, pongs and close messages are returned too; the pong or close
    /// reply has already been sent when they are.
    ///
    /// # Errors
    ///
    /// Engine errors as they are. `Error::ConnectionClosed` once the
    /// connection is closed on either side.
    pub async fn read_message(&self) -> Result<(MessageType, Vec<u8>)> {
        let mut reader = self.reader.lock().await;
        let (opcode, payload) = reader.read_message().await?;
        trace!(%opcode, len = payload.len(), "message read");
        Ok((MessageType::try_from(opcode)?, payload))
    }

    /// Encode `payload` and send it as one message of type `message_type`.
    ///
    /// # Errors
    ///
    /// `Error::Encode` if the payload cannot be encoded, in which case
    /// nothing is written. Otherwise engine errors as they are.
    pub async fn write_message<P>(&self, message_type: MessageType, payload: P) -> Result<()>
    where
        P: EncodePayload,
    {
        let mut writer = self.writer.lock().await;
        let data = payload.encode()?;
        writer.write_message(message_type.into(), &data).await
    }

    /// Close the connection.
    ///
    /// Does not wait for other callers: pending reads and writes fail with
    /// `Error::ConnectionClosed`. No close frame is sent; write a
    /// [`MessageType::Close`] message first for a clean close. Later calls
    /// return `Ok(())`; an owned stream is shut down again each time, with
    /// any error from that ignored.
    ///
    /// # Errors
    ///
    /// I/O errors from shutting the stream down.
    pub async fn close(&self) -> Result<()> {
        let result = self.closer.close().await;
        if let RawTransport::Owned(transport) = &self.raw {
            let _ = transport.shutdown().await;
        }
        if let Err(err) = &result {
            debug!(error = %err, "error while closing connection");
        }
        result
    }

    #[must_use]
    pub fn is_server(&self) -> bool {
        self.is_server
    }

    /// Negotiated sub-protocol, empty for none.
    #[must_use]
    pub fn subprotocol(&self) -> &str {
        &self.subprotocol
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closer.is_closed()
    }
}

impl<T> std::fmt::Debug for Conn<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conn")
            .field("is_server", &self.is_server)
            .field("subprotocol", &self.subprotocol)
            .field("detached", &matches!(self.raw, RawTransport::Detached))
            .finish_non_exhaustive()
    }
}
