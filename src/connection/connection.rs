use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::{Mutex, watch};
use tracing::{debug, trace, warn};

use crate::codec::{FrameReader, FrameWriter};
use crate::config::{Config, Limits};
use crate::connection::fragmenter::MessageFragmenter;
use crate::connection::{ConnectionState, Role};
use crate::error::{Error, Result};
use crate::extensions::deflate::DeflateCodec;
use crate::protocol::assembler::{AssembledMessage, MessageAssembler};
use crate::protocol::frame::MAX_CONTROL_FRAME_PAYLOAD;
use crate::protocol::{Frame, OpCode};

/// A WebSocket connection over an already upgraded stream.
///
/// The stream is split on construction. Reads and writes go through
/// separate halves, so a [`MessageReader`] and a [`MessageWriter`] can make
/// progress at the same time. Every frame, including pongs and close replies
/// sent on behalf of the reader, is written under one lock and never
/// interleaves with another message.
///
/// ## Example
///
/// ```rust,ignore
/// let mut conn = Connection::new(stream, Role::Client, Config::new());
/// conn.write_message(OpCode::Text, b"hello").await?;
/// let (opcode, payload) = conn.read_message().await?;
/// conn.close().await?;
/// ```
pub struct Connection<T> {
    reader: MessageReader<T>,
    writer: MessageWriter<T>,
    closer: CloseHandle<T>,
}

/// State shared by the halves of one connection.
struct Shared<T> {
    sink: Mutex<FrameWriter<WriteHalf<T>>>,
    state: watch::Sender<ConnectionState>,
    role: Role,
}

/// Resolves once the connection is closed locally.
async fn wait_closed(state: &mut watch::Receiver<ConnectionState>) {
    // The sender lives in `Shared`, which outlives every receiver.
    let _ = state.wait_for(ConnectionState::is_closed).await.map(|_| ());
}

impl<T: AsyncWrite> Shared<T> {
    /// Write `frames` back to back and flush, unless a close frame already
    /// went out. Aborts with `ConnectionClosed` if the connection is closed
    /// while waiting for the lock or the stream.
    ///
    /// Dropping the returned future mid-write leaves a partial frame on the
    /// wire; every later send then fails with `Error::WriteInterrupted`.
    async fn send(&self, frames: &[Frame], closing: bool) -> Result<()> {
        let mut state = self.state.subscribe();
        tokio::select! {
            biased;
            () = wait_closed(&mut state) => Err(Error::ConnectionClosed(None)),
            result = self.write_locked(frames, closing) => result,
        }
    }

    async fn write_locked(&self, frames: &[Frame], closing: bool) -> Result<()> {
        let mut sink = self.sink.lock().await;
        if !self.state.borrow().can_send() {
            return Err(Error::ConnectionClosed(None));
        }
        if let Err(err) = sink.write_frames(frames).await {
            if err == Error::WriteInterrupted {
                warn!(role = %self.role, "refusing write after an interrupted message");
            }
            return Err(err);
        }
        if closing {
            self.state.send_if_modified(|s| {
                let open = s.can_send();
                if open {
                    *s = ConnectionState::Closing;
                }
                open
            });
        }
        Ok(())
    }
}

impl<T: AsyncRead + AsyncWrite> Connection<T> {
    /// Wrap an upgraded stream. No handshake is performed.
    pub fn new(io: T, role: Role, config: Config) -> Self {
        debug!(
            %role,
            compression = config.compression.is_some(),
            "websocket connection established"
        );

        let (read_half, write_half) = tokio::io::split(io);
        let (state, state_rx) = watch::channel(ConnectionState::Open);
        let shared = Arc::new(Shared {
            sink: Mutex::new(FrameWriter::new(write_half, role, &config)),
            state,
            role,
        });

        Self {
            reader: MessageReader {
                frames: FrameReader::new(read_half, role, &config),
                assembler: MessageAssembler::new(config.limits.clone()),
                compression: config.compression.clone(),
                max_message_size: config.limits.max_message_size,
                shared: Arc::clone(&shared),
                state: state_rx,
                failed: None,
            },
            writer: MessageWriter {
                shared: Arc::clone(&shared),
                compression: config.compression,
                fragment_size: config.fragment_size,
                limits: config.limits,
            },
            closer: CloseHandle { shared },
        }
    }

    /// A second handle on the underlying stream, independent of the
    /// connection's close state.
    #[must_use]
    pub fn transport_handle(&self) -> TransportHandle<T> {
        TransportHandle {
            shared: Arc::clone(&self.closer.shared),
        }
    }

    /// Separate the connection into its reading, writing and closing parts.
    #[must_use]
    pub fn split(self) -> (MessageReader<T>, MessageWriter<T>, CloseHandle<T>) {
        (self.reader, self.writer, self.closer)
    }

    /// See [`MessageReader::read_message`].
    pub async fn read_message(&mut self) -> Result<(OpCode, Vec<u8>)> {
        self.reader.read_message().await
    }

    /// See [`MessageWriter::write_message`].
    pub async fn write_message(&mut self, opcode: OpCode, payload: &[u8]) -> Result<()> {
        self.writer.write_message(opcode, payload).await
    }

    /// See [`CloseHandle::close`].
    pub async fn close(&self) -> Result<()> {
        self.closer.close().await
    }
}

/// The receiving side of a [`Connection`].
pub struct MessageReader<T> {
    frames: FrameReader<ReadHalf<T>>,
    assembler: MessageAssembler,
    compression: Option<DeflateCodec>,
    max_message_size: usize,
    shared: Arc<Shared<T>>,
    state: watch::Receiver<ConnectionState>,
    /// First fatal error; every later read returns it again.
    failed: Option<Error>,
}

impl<T: AsyncRead + AsyncWrite> MessageReader<T> {
    /// Read the next message.
    ///
    /// Data messages are returned once reassembled (and inflated when
    /// compressed). Control messages are returned as they arrive: a ping is
    /// answered with a pong first, a close frame is echoed, after which
    /// reads fail with `Error::ConnectionClosed` carrying the peer's code.
    ///
    /// # Errors
    ///
    /// Protocol, limit and I/O errors. A protocol error also sends a close
    /// frame with the matching status code. Errors are sticky.
    pub async fn read_message(&mut self) -> Result<(OpCode, Vec<u8>)> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }

        match self.next_message().await {
            Ok(message) => Ok(message),
            Err(err) => {
                if let Some(code) = err.close_code() {
                    warn!(error = %err, code, "closing connection after protocol error");
                    let reply = Frame::close(code.to_be_bytes().to_vec());
                    // Best effort: the read error is what the caller needs.
                    let _ = self.shared.send(&[reply], true).await;
                }
                self.failed = Some(err.clone());
                Err(err)
            }
        }
    }

    async fn next_message(&mut self) -> Result<(OpCode, Vec<u8>)> {
        loop {
            let frame = tokio::select! {
                biased;
                () = wait_closed(&mut self.state) => return Err(Error::ConnectionClosed(None)),
                frame = self.frames.read_frame() => frame?,
            };
            trace!(opcode = %frame.opcode, fin = frame.fin, len = frame.payload().len(), "frame received");

            if frame.opcode.is_control() {
                frame.validate_control()?;
                return self.on_control(frame).await;
            }
            if let Some(message) = self.assembler.push(frame)? {
                return self.finish(message);
            }
        }
    }

    async fn on_control(&mut self, frame: Frame) -> Result<(OpCode, Vec<u8>)> {
        match frame.opcode {
            OpCode::Ping => {
                let pong = Frame::pong(frame.payload().to_vec());
                ignore_closed(self.shared.send(&[pong], false).await)?;
            }
            OpCode::Close => {
                let code = parse_close_payload(frame.payload())?;
                debug!(?code, "close frame received");
                let echo = code.map(|c| c.to_be_bytes().to_vec()).unwrap_or_default();
                ignore_closed(self.shared.send(&[Frame::close(echo)], true).await)?;
                self.failed = Some(Error::ConnectionClosed(code));
            }
            _ => {}
        }
        Ok((frame.opcode, frame.into_payload()))
    }

    fn finish(&self, message: AssembledMessage) -> Result<(OpCode, Vec<u8>)> {
        if !message.compressed {
            return Ok((message.opcode, message.payload));
        }

        let codec = self.compression.as_ref().ok_or_else(|| {
            Error::ProtocolViolation("compressed message without negotiated extension".into())
        })?;
        let payload = codec.decompress(&message.payload, self.max_message_size)?;
        if message.opcode == OpCode::Text {
            std::str::from_utf8(&payload)?;
        }
        Ok((message.opcode, payload))
    }
}

/// Replies to control frames may race with a local close; that is not an
/// error for the reader.
fn ignore_closed(result: Result<()>) -> Result<()> {
    match result {
        Err(Error::ConnectionClosed(_)) => Ok(()),
        other => other,
    }
}

/// Status code of a received close frame (RFC 6455 Section 5.5.1).
fn parse_close_payload(payload: &[u8]) -> Result<Option<u16>> {
    match payload {
        [] => Ok(None),
        [_] => Err(Error::ProtocolViolation(
            "close frame payload of one byte".into(),
        )),
        [hi, lo, reason @ ..] => {
            let code = u16::from_be_bytes([*hi, *lo]);
            if !matches!(code, 1000..=1003 | 1007..=1011 | 3000..=4999) {
                return Err(Error::ProtocolViolation(format!(
                    "invalid close code {code}"
                )));
            }
            std::str::from_utf8(reason)?;
            Ok(Some(code))
        }
    }
}

/// The sending side of a [`Connection`].
pub struct MessageWriter<T> {
    shared: Arc<Shared<T>>,
    compression: Option<DeflateCodec>,
    fragment_size: usize,
    limits: Limits,
}

impl<T: AsyncWrite> MessageWriter<T> {
    /// Write one message.
    ///
    /// Data messages are compressed when the extension is active and split
    /// at the configured fragment size. Control messages go out as a single
    /// frame; writing a close message ends the sending side.
    ///
    /// # Errors
    ///
    /// - `Error::ControlFrameTooLarge` for control payloads over 125 bytes
    /// - `Error::MessageTooLarge` for payloads over the message limit
    /// - `Error::ConnectionClosed` after a close frame was sent or the
    ///   connection was closed
    /// - I/O errors from the underlying stream
    pub async fn write_message(&mut self, opcode: OpCode, payload: &[u8]) -> Result<()> {
        if opcode.is_control() {
            if payload.len() > MAX_CONTROL_FRAME_PAYLOAD {
                return Err(Error::ControlFrameTooLarge(payload.len()));
            }
            let frame = Frame::new(true, opcode, payload.to_vec());
            return self.shared.send(&[frame], opcode == OpCode::Close).await;
        }
        if opcode == OpCode::Continuation {
            return Err(Error::InvalidFrame(
                "continuation is not a message type".into(),
            ));
        }

        self.limits.check_message_size(payload.len())?;

        let compressed = match &self.compression {
            Some(codec) if !payload.is_empty() => Some(codec.compress(payload)?),
            _ => None,
        };
        let body = compressed.as_deref().unwrap_or(payload);
        let frames: Vec<Frame> = MessageFragmenter::new(body, opcode, self.fragment_size)
            .compressed(compressed.is_some())
            .collect();

        trace!(
            %opcode,
            len = payload.len(),
            frames = frames.len(),
            compressed = compressed.is_some(),
            "writing message"
        );
        self.shared.send(&frames, false).await
    }
}

/// Closes a [`Connection`] from any task.
pub struct CloseHandle<T> {
    shared: Arc<Shared<T>>,
}

impl<T: AsyncWrite> CloseHandle<T> {
    /// Close the connection without a close handshake.
    ///
    /// Pending and future reads and writes fail with
    /// `Error::ConnectionClosed(None)`. The write direction of the stream is
    /// flushed and shut down. Later calls return `Ok(())`.
    ///
    /// # Errors
    ///
    /// I/O errors from flushing or shutting down the stream.
    pub async fn close(&self) -> Result<()> {
        let previous = self.shared.state.send_replace(ConnectionState::Closed);
        if previous.is_closed() {
            return Ok(());
        }
        debug!(role = %self.shared.role, %previous, "closing websocket connection");

        let mut sink = self.shared.sink.lock().await;
        sink.flush().await?;
        sink.shutdown().await
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.state.borrow().is_closed()
    }
}

/// Direct handle on the stream beneath a [`Connection`].
pub struct TransportHandle<T> {
    shared: Arc<Shared<T>>,
}

impl<T: AsyncWrite> TransportHandle<T> {
    /// Shut down the write direction of the stream. Safe to repeat.
    ///
    /// # Errors
    ///
    /// I/O errors from the stream.
    pub async fn shutdown(&self) -> Result<()> {
        self.shared.sink.lock().await.shutdown().await
    }
}
