//! Error types for the connection façade and its protocol engine.
//!
//! Errors fall into three groups: handshake errors (only ever produced by the
//! HTTP upgrade path), transport/protocol errors (passed through verbatim from
//! reads, writes and close) and encoding errors (produced by the structured
//! payload fallback before anything is written).

use thiserror::Error;

/// Result type alias for WebSocket operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during WebSocket operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Invalid frame structure or header.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Protocol violation detected.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Invalid UTF-8 in text frame.
    #[error("Invalid UTF-8 in text frame")]
    InvalidUtf8,

    /// Frame size exceeds configured maximum.
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Actual frame size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Frame length does not fit the platform's address space.
    #[error("Payload too large for platform: {size} bytes (max: {max})")]
    PayloadTooLargeForPlatform {
        /// Declared payload length.
        size: u64,
        /// Largest representable length.
        max: u64,
    },

    /// Message size exceeds configured maximum.
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge {
        /// Actual message size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Too many fragments in a single message.
    #[error("Too many fragments: {count} (max: {max})")]
    TooManyFragments {
        /// Actual fragment count.
        count: usize,
        /// Maximum allowed fragments.
        max: usize,
    },

    /// Connection has been closed.
    #[error("Connection closed: {0:?}")]
    ConnectionClosed(Option<u16>),

    /// An earlier write stopped partway through a message, so the stream
    /// can no longer carry frames.
    #[error("Write interrupted: stream holds a partial message")]
    WriteInterrupted,

    /// Invalid WebSocket handshake.
    #[error("Invalid handshake: {0}")]
    InvalidHandshake(String),

    /// The `Origin` of an upgrade request was rejected.
    #[error("Origin not allowed: {origin}")]
    OriginNotAllowed {
        /// The offending origin, or `(none)`.
        origin: String,
    },

    /// A header value contains characters that would corrupt the response.
    #[error("Invalid value for header {header}: {reason}")]
    InvalidHeaderValue {
        /// Header name.
        header: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// The HTTP layer did not hand over the upgraded stream in time.
    #[error("Handshake timed out")]
    HandshakeTimeout,

    /// The HTTP layer failed to hand over the upgraded stream.
    #[error("Upgrade failed: {0}")]
    Upgrade(String),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),

    /// Extension-related error.
    #[error("Extension error: {0}")]
    Extension(String),

    /// Invalid extension configuration or negotiation.
    #[error("Invalid extension: {0}")]
    InvalidExtension(String),

    /// Structured payload could not be serialized.
    #[error("Encode error: {0}")]
    Encode(String),

    /// Reserved opcode used.
    #[error("Reserved opcode: {0:#x}")]
    ReservedOpcode(u8),

    /// Invalid opcode value.
    #[error("Invalid opcode: {0:#x}")]
    InvalidOpcode(u8),

    /// Control frame fragmented (RFC violation).
    #[error("Control frames cannot be fragmented")]
    FragmentedControlFrame,

    /// Control frame payload too large (>125 bytes).
    #[error("Control frame payload too large: {0} bytes (max: 125)")]
    ControlFrameTooLarge(usize),

    /// Unmasked client frame (security violation).
    #[error("Client frame must be masked")]
    UnmaskedClientFrame,

    /// Masked server frame (security violation).
    #[error("Server frame must not be masked")]
    MaskedServerFrame,

    /// Reserved bits set without extension.
    #[error("Reserved bits set without negotiated extension")]
    ReservedBitsSet,

    /// Incomplete frame data.
    #[error("Incomplete frame: need {needed} more bytes")]
    IncompleteFrame {
        /// Number of additional bytes needed.
        needed: usize,
    },
}

impl Error {
    /// Returns `true` for errors raised while negotiating the HTTP upgrade.
    #[must_use]
    pub const fn is_handshake(&self) -> bool {
        matches!(
            self,
            Error::InvalidHandshake(_)
                | Error::OriginNotAllowed { .. }
                | Error::InvalidHeaderValue { .. }
                | Error::HandshakeTimeout
                | Error::Upgrade(_)
        )
    }

    /// Status code to send in the close frame when this error ends a
    /// connection because of something the peer sent.
    ///
    /// `None` for errors that are not the peer's fault (I/O, closed, local).
    #[must_use]
    pub const fn close_code(&self) -> Option<u16> {
        match self {
            Error::InvalidUtf8 | Error::Extension(_) => Some(1007),
            Error::FrameTooLarge { .. }
            | Error::MessageTooLarge { .. }
            | Error::TooManyFragments { .. }
            | Error::PayloadTooLargeForPlatform { .. } => Some(1009),
            Error::InvalidFrame(_)
            | Error::ProtocolViolation(_)
            | Error::ReservedOpcode(_)
            | Error::InvalidOpcode(_)
            | Error::FragmentedControlFrame
            | Error::ControlFrameTooLarge(_)
            | Error::UnmaskedClientFrame
            | Error::MaskedServerFrame
            | Error::ReservedBitsSet => Some(1002),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(_: std::str::Utf8Error) -> Self {
        Error::InvalidUtf8
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Encode(err.to_string())
    }
}

impl From<hyper::Error> for Error {
    fn from(err: hyper::Error) -> Self {
        Error::Upgrade(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::FrameTooLarge {
            size: 20_000_000,
            max: 16_000_000,
        };
        assert_eq!(
            err.to_string(),
            "Frame too large: 20000000 bytes (max: 16000000)"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let ws_err: Error = io_err.into();
        assert!(matches!(ws_err, Error::Io(ref msg) if msg.contains("pipe broken")));
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<u32>("not a number").unwrap_err();
        let ws_err: Error = json_err.into();
        assert!(matches!(ws_err, Error::Encode(_)));
    }

    #[test]
    fn test_handshake_classification() {
        assert!(Error::InvalidHandshake("x".into()).is_handshake());
        assert!(Error::HandshakeTimeout.is_handshake());
        assert!(
            Error::OriginNotAllowed {
                origin: "(none)".into()
            }
            .is_handshake()
        );
        assert!(!Error::ConnectionClosed(None).is_handshake());
        assert!(!Error::Encode("boom".into()).is_handshake());
    }

    #[test]
    fn test_close_codes() {
        assert_eq!(Error::InvalidUtf8.close_code(), Some(1007));
        assert_eq!(Error::ReservedBitsSet.close_code(), Some(1002));
        assert_eq!(
            Error::MessageTooLarge { size: 2, max: 1 }.close_code(),
            Some(1009)
        );
        assert_eq!(Error::Io("reset".into()).close_code(), None);
        assert_eq!(Error::ConnectionClosed(Some(1000)).close_code(), None);
        assert_eq!(Error::WriteInterrupted.close_code(), None);
    }
}
