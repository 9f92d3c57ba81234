//! permessage-deflate message codec (RFC 7692).
//!
//! Only the `no_context_takeover` variant is negotiated, so every message is
//! compressed and inflated independently. The compressor and decompressor
//! are pluggable factories; flate2's raw deflate streams are the default.

use std::fmt;
use std::io::{self, Cursor, Read, Write};
use std::sync::Arc;

use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;

use crate::error::{Error, Result};

/// Level used when the caller does not choose one (fastest).
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 1;

/// Sync-flush marker that ends every compressed message on the wire only
/// implicitly (RFC 7692 Section 7.2.1).
const DEFLATE_TRAILER: [u8; 4] = [0x00, 0x00, 0xff, 0xff];

/// Empty stored block with BFINAL set, appended when inflating so the
/// decoder sees a terminated stream.
const FINAL_BLOCK: [u8; 5] = [0x01, 0x00, 0x00, 0xff, 0xff];

/// A compressing sink produced by a [`CompressionWriterFactory`].
pub trait CompressWriter: Write + Send {
    /// Flush pending input to a block boundary and hand back the sink.
    ///
    /// # Errors
    ///
    /// Any I/O error of the underlying compressor.
    fn finish(self: Box<Self>) -> io::Result<Vec<u8>>;
}

impl CompressWriter for DeflateEncoder<Vec<u8>> {
    fn finish(mut self: Box<Self>) -> io::Result<Vec<u8>> {
        // flush() performs a sync flush, which ends in the 00 00 ff ff marker.
        self.flush()?;
        Ok(std::mem::take(self.get_mut()))
    }
}

/// Wraps an output sink with a compressor at the given level.
pub type CompressionWriterFactory =
    Arc<dyn Fn(Vec<u8>, u32) -> Box<dyn CompressWriter> + Send + Sync>;

/// Wraps a compressed input source with a decompressor.
pub type DecompressionReaderFactory =
    Arc<dyn Fn(Box<dyn Read + Send>) -> Box<dyn Read + Send> + Send + Sync>;

/// The default compressor: a raw flate2 deflate stream.
#[must_use]
pub fn default_compression_writer() -> CompressionWriterFactory {
    Arc::new(|sink: Vec<u8>, level: u32| -> Box<dyn CompressWriter> {
        Box::new(DeflateEncoder::new(sink, Compression::new(level.min(9))))
    })
}

/// The default decompressor: a raw flate2 inflate stream.
#[must_use]
pub fn default_decompression_reader() -> DecompressionReaderFactory {
    Arc::new(|source: Box<dyn Read + Send>| -> Box<dyn Read + Send> {
        Box::new(DeflateDecoder::new(source))
    })
}

/// Per-message compressor/decompressor pair.
#[derive(Clone)]
pub struct DeflateCodec {
    level: u32,
    writer: CompressionWriterFactory,
    reader: DecompressionReaderFactory,
}

impl Default for DeflateCodec {
    fn default() -> Self {
        Self::new(DEFAULT_COMPRESSION_LEVEL, None, None)
    }
}

impl fmt::Debug for DeflateCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeflateCodec")
            .field("level", &self.level)
            .finish_non_exhaustive()
    }
}

impl DeflateCodec {
    /// Missing factories fall back to the flate2 defaults.
    #[must_use]
    pub fn new(
        level: u32,
        writer: Option<CompressionWriterFactory>,
        reader: Option<DecompressionReaderFactory>,
    ) -> Self {
        Self {
            level,
            writer: writer.unwrap_or_else(default_compression_writer),
            reader: reader.unwrap_or_else(default_decompression_reader),
        }
    }

    #[must_use]
    pub const fn level(&self) -> u32 {
        self.level
    }

    /// Compress one message payload, without the trailing sync marker.
    /// Empty payloads stay empty and are sent uncompressed.
    ///
    /// # Errors
    ///
    /// `Error::Extension` if the compressor fails.
    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.is_empty() {
            return Ok(Vec::new());
        }

        let mut writer = (self.writer)(Vec::with_capacity(data.len() / 2 + 16), self.level);
        writer
            .write_all(data)
            .map_err(|e| Error::Extension(format!("compression failed: {e}")))?;
        let mut compressed = writer
            .finish()
            .map_err(|e| Error::Extension(format!("compression failed: {e}")))?;

        if compressed.ends_with(&DEFLATE_TRAILER) {
            compressed.truncate(compressed.len() - DEFLATE_TRAILER.len());
        }
        Ok(compressed)
    }

    /// Inflate one message payload, refusing output larger than `max_size`.
    ///
    /// # Errors
    ///
    /// `Error::Extension` for corrupt input, `Error::MessageTooLarge` when the
    /// inflated message exceeds `max_size`.
    pub fn decompress(&self, data: &[u8], max_size: usize) -> Result<Vec<u8>> {
        if data.is_empty() {
            return Ok(Vec::new());
        }

        let mut input = Vec::with_capacity(data.len() + DEFLATE_TRAILER.len() + FINAL_BLOCK.len());
        input.extend_from_slice(data);
        input.extend_from_slice(&DEFLATE_TRAILER);
        input.extend_from_slice(&FINAL_BLOCK);

        let reader = (self.reader)(Box::new(Cursor::new(input)));
        let limit = u64::try_from(max_size).unwrap_or(u64::MAX).saturating_add(1);
        let mut out = Vec::new();
        reader
            .take(limit)
            .read_to_end(&mut out)
            .map_err(|e| Error::Extension(format!("decompression failed: {e}")))?;

        if out.len() > max_size {
            return Err(Error::MessageTooLarge {
                size: out.len(),
                max: max_size,
            });
        }
        Ok(out)
    }
}
