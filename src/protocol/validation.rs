//! Header-level checks for incoming frames (RFC 6455 Sections 5.1-5.2).
//!
//! Runs on the decoded [`FrameHeader`](crate::protocol::frame::FrameHeader)
//! before the payload is read, so oversized or malformed frames are rejected
//! without buffering them.

use crate::config::Limits;
use crate::connection::Role;
use crate::error::{Error, Result};
use crate::protocol::frame::FrameHeader;

/// Validator for frames received by one side of a connection.
#[derive(Debug, Clone)]
pub struct FrameValidator {
    role: Role,
    limits: Limits,
    /// RSV1 is meaningful once permessage-deflate is negotiated.
    allow_rsv1: bool,
}

impl FrameValidator {
    #[must_use]
    pub fn new(role: Role, limits: Limits) -> Self {
        Self {
            role,
            limits,
            allow_rsv1: false,
        }
    }

    /// Permit RSV1 on data frames, used when compression is enabled.
    #[must_use]
    pub fn with_rsv1(mut self, allow: bool) -> Self {
        self.allow_rsv1 = allow;
        self
    }

    /// Check masking, reserved bits and size, in that order.
    ///
    /// # Errors
    ///
    /// - `Error::UnmaskedClientFrame` - server received an unmasked frame
    /// - `Error::MaskedServerFrame` - client received a masked frame
    /// - `Error::ReservedBitsSet` - RSV bits without a negotiated extension
    /// - `Error::FrameTooLarge` - payload over `Limits::max_frame_size`
    pub fn validate(&self, header: &FrameHeader) -> Result<()> {
        self.validate_masking(header.mask.is_some())?;
        self.validate_rsv_bits(header)?;
        self.limits.check_frame_size(header.payload_len)
    }

    fn validate_masking(&self, masked: bool) -> Result<()> {
        match self.role {
            Role::Server if !masked => Err(Error::UnmaskedClientFrame),
            Role::Client if masked => Err(Error::MaskedServerFrame),
            _ => Ok(()),
        }
    }

    fn validate_rsv_bits(&self, header: &FrameHeader) -> Result<()> {
        if header.rsv2 || header.rsv3 {
            return Err(Error::ReservedBitsSet);
        }
        // Control frames are never compressed.
        if header.rsv1 && (!self.allow_rsv1 || header.opcode.is_control()) {
            return Err(Error::ReservedBitsSet);
        }
        Ok(())
    }
}
