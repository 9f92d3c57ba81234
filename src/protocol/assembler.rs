//! Reassembly of fragmented data messages (RFC 6455 Section 5.4).

use bytes::BytesMut;

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::protocol::utf8::Utf8Validator;
use crate::protocol::{Frame, OpCode};

/// Collects data frames until a frame with FIN set completes the message.
///
/// Control frames are not the assembler's business and are ignored, so they
/// may arrive between fragments. Text messages are UTF-8 checked fragment by
/// fragment unless the message is compressed, in which case the caller
/// validates after inflating.
#[derive(Debug)]
pub struct MessageAssembler {
    buffer: BytesMut,
    fragment_count: usize,
    opcode: Option<OpCode>,
    compressed: bool,
    utf8: Option<Utf8Validator>,
    limits: Limits,
}

impl MessageAssembler {
    #[must_use]
    pub fn new(limits: Limits) -> Self {
        Self {
            buffer: BytesMut::new(),
            fragment_count: 0,
            opcode: None,
            compressed: false,
            utf8: None,
            limits,
        }
    }

    /// Feed one frame. Returns the message once its final fragment arrives.
    ///
    /// # Errors
    ///
    /// Protocol violations for out-of-order continuation frames or RSV1 on a
    /// continuation, limit errors, and `Error::InvalidUtf8` for bad text.
    pub fn push(&mut self, frame: Frame) -> Result<Option<AssembledMessage>> {
        if frame.opcode.is_control() {
            return Ok(None);
        }

        match (frame.opcode, self.opcode) {
            (OpCode::Continuation, None) => {
                return Err(Error::ProtocolViolation(
                    "continuation frame without a message in progress".into(),
                ));
            }
            (OpCode::Continuation, Some(_)) => {
                if frame.rsv1 {
                    return Err(Error::ProtocolViolation(
                        "RSV1 set on a continuation frame".into(),
                    ));
                }
            }
            (_, Some(_)) => {
                return Err(Error::ProtocolViolation(
                    "new data frame while a fragmented message is in progress".into(),
                ));
            }
            (opcode, None) => {
                self.opcode = Some(opcode);
                self.compressed = frame.rsv1;
                if opcode == OpCode::Text && !frame.rsv1 {
                    self.utf8 = Some(Utf8Validator::new());
                }
            }
        }

        self.limits.check_fragment_count(self.fragment_count + 1)?;
        let new_size = self.buffer.len() + frame.payload().len();
        self.limits.check_message_size(new_size)?;

        if let Some(validator) = self.utf8.as_mut() {
            validator.feed(frame.payload(), frame.fin)?;
        }

        self.buffer.extend_from_slice(frame.payload());
        self.fragment_count += 1;

        if !frame.fin {
            return Ok(None);
        }

        let Some(opcode) = self.opcode.take() else {
            return Ok(None);
        };
        let message = AssembledMessage {
            opcode,
            payload: self.buffer.split().to_vec(),
            compressed: self.compressed,
        };
        self.reset();
        Ok(Some(message))
    }

    #[must_use]
    pub fn is_assembling(&self) -> bool {
        self.opcode.is_some()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.fragment_count = 0;
        self.opcode = None;
        self.compressed = false;
        self.utf8 = None;
    }
}

/// A complete data message as it came off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledMessage {
    /// `Text` or `Binary`.
    pub opcode: OpCode,
    pub payload: Vec<u8>,
    /// The first frame carried RSV1: the payload is still deflated.
    pub compressed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_limits() -> Limits {
        Limits::new(1024, 100, 3)
    }

    #[test]
    fn test_single_frame_message() {
        let mut assembler = MessageAssembler::new(Limits::default());
        let msg = assembler.push(Frame::text("Hello")).unwrap().unwrap();
        assert_eq!(msg.opcode, OpCode::Text);
        assert_eq!(msg.payload, b"Hello");
        assert!(!msg.compressed);
        assert!(!assembler.is_assembling());
    }

    #[test]
    fn test_fragments_with_interleaved_ping() {
        let mut assembler = MessageAssembler::new(Limits::default());

        assert!(assembler
            .push(Frame::new(false, OpCode::Binary, vec![1, 2]))
            .unwrap()
            .is_none());
        assert!(assembler.push(Frame::ping("p")).unwrap().is_none());
        assert!(assembler.is_assembling());
        assert!(assembler
            .push(Frame::new(false, OpCode::Continuation, vec![3]))
            .unwrap()
            .is_none());

        let msg = assembler
            .push(Frame::new(true, OpCode::Continuation, vec![4]))
            .unwrap()
            .unwrap();
        assert_eq!(msg.opcode, OpCode::Binary);
        assert_eq!(msg.payload, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_message_size_limit() {
        let mut assembler = MessageAssembler::new(small_limits());
        assert!(matches!(
            assembler.push(Frame::binary(vec![0u8; 150])),
            Err(Error::MessageTooLarge { size: 150, max: 100 })
        ));
    }

    #[test]
    fn test_fragment_count_limit() {
        let mut assembler = MessageAssembler::new(small_limits());
        assembler
            .push(Frame::new(false, OpCode::Binary, vec![1]))
            .unwrap();
        assembler
            .push(Frame::new(false, OpCode::Continuation, vec![2]))
            .unwrap();
        assembler
            .push(Frame::new(false, OpCode::Continuation, vec![3]))
            .unwrap();
        assert!(matches!(
            assembler.push(Frame::new(true, OpCode::Continuation, vec![4])),
            Err(Error::TooManyFragments { count: 4, max: 3 })
        ));
    }

    #[test]
    fn test_out_of_order_frames() {
        let mut assembler = MessageAssembler::new(Limits::default());
        assert!(matches!(
            assembler.push(Frame::new(true, OpCode::Continuation, b"x".to_vec())),
            Err(Error::ProtocolViolation(_))
        ));

        assembler
            .push(Frame::new(false, OpCode::Text, b"first".to_vec()))
            .unwrap();
        assert!(matches!(
            assembler.push(Frame::text("second")),
            Err(Error::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_utf8_split_across_fragments() {
        let mut assembler = MessageAssembler::new(Limits::default());
        let party = "🎉".as_bytes();
        assembler
            .push(Frame::new(false, OpCode::Text, party[..2].to_vec()))
            .unwrap();
        let msg = assembler
            .push(Frame::new(true, OpCode::Continuation, party[2..].to_vec()))
            .unwrap()
            .unwrap();
        assert_eq!(String::from_utf8(msg.payload).unwrap(), "🎉");
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let mut assembler = MessageAssembler::new(Limits::default());
        assert!(matches!(
            assembler.push(Frame::new(true, OpCode::Text, vec![0x80, 0x81])),
            Err(Error::InvalidUtf8)
        ));
    }

    #[test]
    fn test_compressed_text_skips_utf8_check() {
        let mut assembler = MessageAssembler::new(Limits::default());
        let mut first = Frame::new(false, OpCode::Text, vec![0xF2, 0x48]);
        first.rsv1 = true;
        assembler.push(first).unwrap();
        let msg = assembler
            .push(Frame::new(true, OpCode::Continuation, vec![0xCD]))
            .unwrap()
            .unwrap();
        assert!(msg.compressed);
        assert_eq!(msg.payload, vec![0xF2, 0x48, 0xCD]);
    }

    #[test]
    fn test_rsv1_on_continuation_rejected() {
        let mut assembler = MessageAssembler::new(Limits::default());
        assembler
            .push(Frame::new(false, OpCode::Binary, vec![1]))
            .unwrap();
        let mut next = Frame::new(true, OpCode::Continuation, vec![2]);
        next.rsv1 = true;
        assert!(matches!(
            assembler.push(next),
            Err(Error::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_reset() {
        let mut assembler = MessageAssembler::new(Limits::default());
        assembler
            .push(Frame::new(false, OpCode::Text, b"partial".to_vec()))
            .unwrap();
        assembler.reset();
        assert!(!assembler.is_assembling());
        assert!(assembler.push(Frame::text("fresh")).unwrap().is_some());
    }
}
