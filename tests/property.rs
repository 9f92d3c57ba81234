//! Property-based tests for header options, framing and message codecs.

use bytes::BytesMut;
use http::HeaderMap;
use http::header::{self, HeaderValue};
use proptest::prelude::*;
use wsconn::Limits;
use wsconn::connection::MessageFragmenter;
use wsconn::extensions::deflate::DeflateCodec;
use wsconn::protocol::{Frame, FrameHeader, MessageAssembler, OpCode, Utf8Validator, apply_mask};
use wsconn::{Options, get_request_header_option, get_response_header_option, set_client_headers_with_option};

fn data_opcode_strategy() -> impl Strategy<Value = OpCode> {
    prop_oneof![
        Just(OpCode::Text),
        Just(OpCode::Binary),
        Just(OpCode::Continuation),
    ]
}

/// Sub-protocol names are HTTP tokens.
fn subprotocol_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z0-9._~-]{0,24}"
}

proptest! {
    #[test]
    fn test_client_headers_round_trip(
        subprotocol in subprotocol_strategy(),
        compression in any::<bool>(),
    ) {
        let options = Options::new()
            .with_subprotocol(subprotocol.clone())
            .with_compression(compression);
        let mut headers = HeaderMap::new();
        set_client_headers_with_option(&mut headers, &options).unwrap();

        let from_response = get_response_header_option(&headers);
        prop_assert_eq!(&from_response.subprotocol, &subprotocol);
        prop_assert_eq!(from_response.enable_compression, compression);

        let from_request = get_request_header_option(&headers);
        prop_assert_eq!(&from_request.subprotocol, &subprotocol);
        prop_assert_eq!(from_request.enable_compression, compression);
    }

    #[test]
    fn test_request_reports_first_subprotocol(
        protocols in prop::collection::vec("[a-z][a-z0-9.]{0,11}", 1..5),
    ) {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::SEC_WEBSOCKET_PROTOCOL,
            HeaderValue::from_str(&protocols.join(", ")).unwrap(),
        );
        prop_assert_eq!(&get_request_header_option(&headers).subprotocol, &protocols[0]);
    }

    #[test]
    fn test_frame_round_trip(
        fin in any::<bool>(),
        opcode in data_opcode_strategy(),
        payload in prop::collection::vec(any::<u8>(), 0..70_000),
        mask in prop::option::of(any::<[u8; 4]>()),
    ) {
        let frame = Frame::new(fin, opcode, payload);
        let mut buf = BytesMut::new();
        frame.encode(&mut buf, mask);
        prop_assert_eq!(buf.len(), frame.wire_size(mask.is_some()));

        let header = FrameHeader::parse(&buf).unwrap();
        prop_assert_eq!(header.mask, mask);
        prop_assert_eq!(header.payload_len, frame.payload().len());

        let (parsed, consumed) = Frame::parse(&buf).unwrap();
        prop_assert_eq!(consumed, buf.len());
        prop_assert_eq!(parsed, frame);
    }

    #[test]
    fn test_truncated_frame_is_incomplete(
        payload in prop::collection::vec(any::<u8>(), 1..300),
        cut in any::<prop::sample::Index>(),
    ) {
        let mut buf = BytesMut::new();
        Frame::binary(payload).encode(&mut buf, Some([1, 2, 3, 4]));
        let end = cut.index(buf.len());
        let incomplete = matches!(
            Frame::parse(&buf[..end]),
            Err(wsconn::Error::IncompleteFrame { .. })
        );
        prop_assert!(incomplete);
    }

    #[test]
    fn test_mask_reversible(
        data in prop::collection::vec(any::<u8>(), 0..1000),
        mask in any::<[u8; 4]>(),
    ) {
        let mut masked = data.clone();
        apply_mask(&mut masked, mask);
        apply_mask(&mut masked, mask);
        prop_assert_eq!(masked, data);
    }

    #[test]
    fn test_fragments_reassemble(
        payload in prop::collection::vec(any::<u8>(), 0..4000),
        fragment_size in 1usize..600,
    ) {
        let mut assembler = MessageAssembler::new(Limits::new(1 << 20, 1 << 20, 10_000));
        let mut result = None;
        for frame in MessageFragmenter::new(&payload, OpCode::Binary, fragment_size) {
            prop_assert!(result.is_none());
            result = assembler.push(frame).unwrap();
        }
        let message = result.unwrap();
        prop_assert_eq!(message.opcode, OpCode::Binary);
        prop_assert_eq!(message.payload, payload);
        prop_assert!(!assembler.is_assembling());
    }

    #[test]
    fn test_deflate_round_trip(
        data in prop::collection::vec(any::<u8>(), 0..5000),
        level in 0u32..=9,
    ) {
        let codec = DeflateCodec::new(level, None, None);
        let packed = codec.compress(&data).unwrap();
        prop_assert_eq!(codec.decompress(&packed, data.len()).unwrap(), data);
    }

    #[test]
    fn test_utf8_any_split(text in "\\PC{0,64}", split in any::<prop::sample::Index>()) {
        let bytes = text.as_bytes();
        let at = split.index(bytes.len() + 1);
        let mut validator = Utf8Validator::new();
        prop_assert!(validator.feed(&bytes[..at], false).is_ok());
        prop_assert!(validator.feed(&bytes[at..], true).is_ok());
    }
}
