//! Splitting outgoing data messages into frames (RFC 6455 Section 5.4).

use crate::protocol::{Frame, OpCode};

/// Iterator over the frames of one outgoing message.
///
/// The first frame carries the message opcode (and RSV1 when the payload is
/// compressed), the rest are continuations. An empty payload still yields
/// one frame.
pub struct MessageFragmenter<'a> {
    payload: &'a [u8],
    opcode: OpCode,
    compressed: bool,
    fragment_size: usize,
    offset: usize,
    is_first: bool,
}

impl<'a> MessageFragmenter<'a> {
    #[inline]
    #[must_use]
    pub fn new(payload: &'a [u8], opcode: OpCode, fragment_size: usize) -> Self {
        Self {
            payload,
            opcode,
            compressed: false,
            fragment_size: fragment_size.max(1),
            offset: 0,
            is_first: true,
        }
    }

    /// Mark the payload as deflated: RSV1 goes on the first frame.
    #[inline]
    #[must_use]
    pub fn compressed(mut self, compressed: bool) -> Self {
        self.compressed = compressed;
        self
    }

    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.payload.len().saturating_sub(self.offset)
    }
}

impl Iterator for MessageFragmenter<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.payload.len() && !(self.is_first && self.payload.is_empty()) {
            return None;
        }

        let chunk_size = self.remaining().min(self.fragment_size);
        let chunk = self.payload[self.offset..self.offset + chunk_size].to_vec();
        self.offset += chunk_size;
        let fin = self.offset >= self.payload.len();

        let opcode = if self.is_first {
            self.opcode
        } else {
            OpCode::Continuation
        };
        let mut frame = Frame::new(fin, opcode, chunk);
        frame.rsv1 = self.is_first && self.compressed;
        self.is_first = false;
        Some(frame)
    }
}
