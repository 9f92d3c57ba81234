use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::Config;
use crate::connection::Role;
use crate::error::{Error, Result};
use crate::protocol::frame::{Frame, FrameHeader};
use crate::protocol::validation::FrameValidator;

/// Generate a random seed for mask generation.
/// Falls back to system time if getrandom fails.
fn random_mask_seed() -> u32 {
    let mut buf = [0u8; 4];
    if getrandom::getrandom(&mut buf).is_ok() {
        u32::from_le_bytes(buf)
    } else {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos() ^ d.as_secs() as u32)
            .unwrap_or(0x1234_5678)
    }
}

/// Reads whole frames from the receiving half of a stream.
pub struct FrameReader<R> {
    io: R,
    buf: BytesMut,
    validator: FrameValidator,
    chunk: usize,
}

impl<R> FrameReader<R> {
    #[must_use]
    pub fn new(io: R, role: Role, config: &Config) -> Self {
        let validator = FrameValidator::new(role, config.limits.clone())
            .with_rsv1(config.compression.is_some());
        Self {
            io,
            buf: BytesMut::with_capacity(config.read_buffer_size),
            validator,
            chunk: config.read_buffer_size,
        }
    }
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Read the next frame, validating its header as soon as it is buffered.
    ///
    /// Cancel safe: bytes already read stay buffered for the next call.
    ///
    /// # Errors
    ///
    /// Validation and parse errors, I/O errors, and
    /// `Error::ConnectionClosed(None)` at end of stream.
    pub async fn read_frame(&mut self) -> Result<Frame> {
        loop {
            match FrameHeader::parse(&self.buf) {
                Ok(header) => {
                    self.validator.validate(&header)?;
                    match Frame::parse(&self.buf) {
                        Ok((frame, consumed)) => {
                            self.buf.advance(consumed);
                            return Ok(frame);
                        }
                        Err(Error::IncompleteFrame { needed }) => {
                            self.buf.reserve(needed);
                        }
                        Err(e) => return Err(e),
                    }
                }
                Err(Error::IncompleteFrame { .. }) => {}
                Err(e) => return Err(e),
            }

            self.buf.reserve(self.chunk);
            if self.io.read_buf(&mut self.buf).await? == 0 {
                return Err(Error::ConnectionClosed(None));
            }
        }
    }
}

/// Writes frames to the sending half of a stream, masking them when the
/// role requires it.
pub struct FrameWriter<W> {
    io: W,
    buf: BytesMut,
    role: Role,
    mask_counter: u32,
    /// Set from the first byte of a batch until it is flushed. Stays set if
    /// the batch is abandoned halfway.
    in_flight: bool,
}

impl<W> FrameWriter<W> {
    #[must_use]
    pub fn new(io: W, role: Role, config: &Config) -> Self {
        Self {
            io,
            buf: BytesMut::with_capacity(config.write_buffer_size),
            role,
            mask_counter: random_mask_seed(),
            in_flight: false,
        }
    }

    fn generate_mask(&mut self) -> [u8; 4] {
        self.mask_counter = self.mask_counter.wrapping_add(0x9E37_79B9);
        let a = self.mask_counter;
        let b = a.wrapping_mul(0x85EB_CA6B);
        let c = b ^ (b >> 13);
        let d = c.wrapping_mul(0xC2B2_AE35);
        d.to_le_bytes()
    }
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Write `frames` back to back and flush them.
    ///
    /// If an earlier batch never completed, because its future was dropped
    /// or the stream failed, part of it may already be on the wire and
    /// anything written now would be read as its continuation.
    ///
    /// # Errors
    ///
    /// `Error::WriteInterrupted` after an incomplete batch, otherwise I/O
    /// errors from the stream.
    pub async fn write_frames(&mut self, frames: &[Frame]) -> Result<()> {
        if self.in_flight {
            return Err(Error::WriteInterrupted);
        }
        self.in_flight = true;
        for frame in frames {
            self.write_frame(frame).await?;
        }
        self.flush().await?;
        self.in_flight = false;
        Ok(())
    }

    /// Encode and write one frame. Does not flush.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let mask = self.role.must_mask().then(|| self.generate_mask());
        self.buf.clear();
        frame.encode(&mut self.buf, mask);
        self.io.write_all(&self.buf).await?;
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.io.flush().await?;
        Ok(())
    }

    /// Flush and shut down the write direction of the stream.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.io.shutdown().await?;
        Ok(())
    }
}
