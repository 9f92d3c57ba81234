//! Engine configuration and resource limits.
//!
//! `Config` is what the protocol engine consumes. Callers normally never
//! build one directly: the façade derives it from [`Options`](crate::Options)
//! or [`UpgradeOptions`](crate::UpgradeOptions).

use crate::extensions::deflate::DeflateCodec;

/// Default read/write buffer capacity when the caller passes 0.
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Resource limits for incoming data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum payload of a single frame.
    ///
    /// Default: 16 MB
    pub max_frame_size: usize,

    /// Maximum size of a reassembled (and decompressed) message.
    ///
    /// Default: 64 MB
    pub max_message_size: usize,

    /// Maximum number of frames in one fragmented message.
    ///
    /// Default: 128
    pub max_fragment_count: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_frame_size: 16 * 1024 * 1024,
            max_message_size: 64 * 1024 * 1024,
            max_fragment_count: 128,
        }
    }
}

impl Limits {
    #[must_use]
    pub const fn new(
        max_frame_size: usize,
        max_message_size: usize,
        max_fragment_count: usize,
    ) -> Self {
        Self {
            max_frame_size,
            max_message_size,
            max_fragment_count,
        }
    }

    /// # Errors
    ///
    /// Returns [`Error::MessageTooLarge`](crate::Error::MessageTooLarge) if `size` exceeds the configured maximum.
    pub const fn check_message_size(&self, size: usize) -> Result<(), crate::Error> {
        if size > self.max_message_size {
            Err(crate::Error::MessageTooLarge {
                size,
                max: self.max_message_size,
            })
        } else {
            Ok(())
        }
    }

    /// # Errors
    ///
    /// Returns [`Error::FrameTooLarge`](crate::Error::FrameTooLarge) if `size` exceeds the configured maximum.
    pub const fn check_frame_size(&self, size: usize) -> Result<(), crate::Error> {
        if size > self.max_frame_size {
            Err(crate::Error::FrameTooLarge {
                size,
                max: self.max_frame_size,
            })
        } else {
            Ok(())
        }
    }

    /// # Errors
    ///
    /// Returns [`Error::TooManyFragments`](crate::Error::TooManyFragments) if `count` exceeds the configured maximum.
    pub const fn check_fragment_count(&self, count: usize) -> Result<(), crate::Error> {
        if count > self.max_fragment_count {
            Err(crate::Error::TooManyFragments {
                count,
                max: self.max_fragment_count,
            })
        } else {
            Ok(())
        }
    }
}

/// WebSocket engine configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Resource limits.
    pub limits: Limits,

    /// Outgoing data messages larger than this are split into continuation frames.
    ///
    /// Default: 16 KB
    pub fragment_size: usize,

    /// Initial capacity of the read buffer.
    pub read_buffer_size: usize,

    /// Initial capacity of the write buffer.
    pub write_buffer_size: usize,

    /// permessage-deflate codec, `None` when compression is off.
    pub compression: Option<DeflateCodec>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            fragment_size: 16 * 1024,
            read_buffer_size: DEFAULT_BUFFER_SIZE,
            write_buffer_size: DEFAULT_BUFFER_SIZE,
            compression: None,
        }
    }
}

impl Config {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    #[must_use]
    pub const fn with_fragment_size(mut self, size: usize) -> Self {
        self.fragment_size = size;
        self
    }

    /// A size of 0 keeps the engine default.
    #[must_use]
    pub const fn with_read_buffer_size(mut self, size: usize) -> Self {
        if size > 0 {
            self.read_buffer_size = size;
        }
        self
    }

    /// A size of 0 keeps the engine default.
    #[must_use]
    pub const fn with_write_buffer_size(mut self, size: usize) -> Self {
        if size > 0 {
            self.write_buffer_size = size;
        }
        self
    }

    #[must_use]
    pub fn with_compression(mut self, codec: DeflateCodec) -> Self {
        self.compression = Some(codec);
        self
    }
}
