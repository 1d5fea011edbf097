//! # Hub Codec Integration Tests
//!
//! Verifies the public codec API end to end:
//! - Frame reassembly across arbitrary read boundaries
//! - Batch ordering through encode/decode
//! - Fail-fast encoding of in-process values
//! - Connection-fatal handling of malformed frames
//! - Bounded nesting for hostile payloads

use bytes::BytesMut;
use codec::{
    decode_messages, encode_frame, write_frame, CodecError, FrameDecoder, Message, HELLO,
    MAX_NESTING_DEPTH,
};
use proptest::prelude::*;
use types::{ComponentAddress, ControlAddress, Reference, Value};

fn addr(text: &str) -> ControlAddress {
    ControlAddress::parse(text).unwrap()
}

fn mixed_batch() -> Vec<Message> {
    vec![
        Message::hello(Value::map([
            (
                "services".to_string(),
                Value::array([Value::from("compiler"), Value::from("log")]),
            ),
            ("file-server".to_string(), Value::Int(8090)),
        ])),
        Message::Send {
            match_id: 17,
            quiet: false,
            to: addr("/video/mixer.level"),
            from: addr("/hub/script.run"),
            args: vec![
                Value::Number(0.25),
                Value::Address(addr("/audio/osc.freq")),
                Value::Component(ComponentAddress::parse("/audio/osc").unwrap()),
            ],
        },
        Message::Service {
            match_id: -4,
            quiet: true,
            service: "compiler".to_string(),
            control: "compile".to_string(),
            from: addr("/net.conn-1"),
            args: vec![Value::from(vec![1u8, 2, 3]), Value::Empty],
        },
        Message::Reply {
            match_id: 17,
            args: vec![Value::from("ok"), Value::Bool(false)],
        },
        Message::Error {
            match_id: 18,
            args: vec![Value::error("ServiceUnavailable", "no such service")],
        },
    ]
}

#[test]
fn test_frame_split_at_one_third() {
    let batch = mixed_batch();
    let frame = encode_frame(&batch).unwrap();
    let split = frame.len() / 3;

    let mut decoder = FrameDecoder::new();
    decoder.extend(&frame[..split]);
    assert_eq!(decoder.decode_next().unwrap(), None);
    decoder.extend(&frame[split..]);
    assert_eq!(decoder.decode_next().unwrap(), Some(batch));
    assert_eq!(decoder.decode_next().unwrap(), None);
}

#[test]
fn test_byte_at_a_time_delivery() {
    let batch = mixed_batch();
    let frame = encode_frame(&batch).unwrap();

    let mut decoder = FrameDecoder::new();
    let mut decoded = Vec::new();
    for byte in frame.iter() {
        decoder.extend(&[*byte]);
        if let Some(messages) = decoder.decode_next().unwrap() {
            decoded.push(messages);
        }
    }
    assert_eq!(decoded, vec![batch]);
}

#[test]
fn test_back_to_back_frames_in_one_read() {
    let first = mixed_batch();
    let second = vec![Message::Reply {
        match_id: 99,
        args: Vec::new(),
    }];
    let mut stream = BytesMut::new();
    write_frame(&first, &mut stream).unwrap();
    write_frame(&second, &mut stream).unwrap();
    write_frame(&[], &mut stream).unwrap();

    let mut decoder = FrameDecoder::new();
    decoder.extend(&stream);
    assert_eq!(decoder.decode_next().unwrap(), Some(first));
    assert_eq!(decoder.decode_next().unwrap(), Some(second));
    assert_eq!(decoder.decode_next().unwrap(), Some(Vec::new()));
    assert_eq!(decoder.decode_next().unwrap(), None);
}

#[test]
fn test_hello_carries_system_type() {
    let frame = encode_frame(&[Message::hello(Value::Empty)]).unwrap();
    let mut decoder = FrameDecoder::new();
    decoder.extend(&frame);
    match decoder.decode_next().unwrap().unwrap().as_slice() {
        [Message::System {
            match_id: 0,
            kind,
            data: Value::Empty,
        }] => assert_eq!(kind, HELLO),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_reference_value_fails_at_encode() {
    let send = Message::Reply {
        match_id: 1,
        args: vec![Value::Reference(Reference::new(String::from("buffer")))],
    };
    assert_eq!(
        encode_frame(&[send]),
        Err(CodecError::UnsupportedValue {
            type_name: "Reference"
        })
    );
}

#[test]
fn test_truncated_payload_inside_complete_frame() {
    let mut frame = encode_frame(&mixed_batch()).unwrap().to_vec();
    // Shrink the declared length so the payload ends mid-message
    let shortened = (frame.len() - 4 - 6) as u32;
    frame[..4].copy_from_slice(&shortened.to_be_bytes());
    frame.truncate(4 + shortened as usize);

    let mut decoder = FrameDecoder::new();
    decoder.extend(&frame);
    assert!(matches!(
        decoder.decode_next(),
        Err(CodecError::Truncated { .. })
    ));
}

#[test]
fn test_invalid_utf8_string() {
    // one System message whose type string is 0xFF
    let payload = [0, 0, 0, 1, 5, 0, 0, 0, 0, 0, 0, 0, 1, 0xFF, 0];
    assert!(matches!(
        decode_messages(&payload),
        Err(CodecError::InvalidUtf8 { .. })
    ));
}

/// Raw frame: one Reply whose only arg is `levels` containers deep
///
/// Built by hand so the payload can exceed what the encoder accepts.
fn nested_reply_frame(levels: usize, container: u8) -> Vec<u8> {
    let mut payload = vec![0, 0, 0, 1, 3, 0, 0, 0, 1, 0, 0, 0, 1];
    for _ in 0..levels {
        payload.push(container);
        payload.extend_from_slice(&1u32.to_be_bytes());
        if container == 7 {
            payload.extend_from_slice(&1u32.to_be_bytes());
            payload.push(b'k');
        }
    }
    payload.push(0);

    let mut frame = (payload.len() as u32).to_be_bytes().to_vec();
    frame.extend_from_slice(&payload);
    frame
}

#[test]
fn test_deeply_nested_array_is_rejected_not_overflowed() {
    let frame = nested_reply_frame(200_000, 6);
    assert!(frame.len() < codec::DEFAULT_MAX_FRAME_SIZE);

    let mut decoder = FrameDecoder::new();
    decoder.extend(&frame);
    assert_eq!(
        decoder.decode_next(),
        Err(CodecError::NestingTooDeep {
            limit: MAX_NESTING_DEPTH
        })
    );
}

#[test]
fn test_deeply_nested_map_is_rejected() {
    let mut decoder = FrameDecoder::new();
    decoder.extend(&nested_reply_frame(100_000, 7));
    assert!(matches!(
        decoder.decode_next(),
        Err(CodecError::NestingTooDeep { .. })
    ));
}

#[test]
fn test_nesting_up_to_limit_decodes() {
    let mut decoder = FrameDecoder::new();
    decoder.extend(&nested_reply_frame(MAX_NESTING_DEPTH, 6));
    let messages = decoder.decode_next().unwrap().unwrap();

    let mut value = match messages.as_slice() {
        [Message::Reply { match_id: 1, args }] => args[0].clone(),
        other => panic!("unexpected {:?}", other),
    };
    let mut levels = 0;
    while let Value::Array(inner) = value {
        levels += 1;
        value = inner[0].clone();
    }
    assert_eq!(levels, MAX_NESTING_DEPTH);
    assert_eq!(value, Value::Empty);

    let mut decoder = FrameDecoder::new();
    decoder.extend(&nested_reply_frame(MAX_NESTING_DEPTH + 1, 6));
    assert!(matches!(
        decoder.decode_next(),
        Err(CodecError::NestingTooDeep { .. })
    ));
}

proptest! {
    /// Property: any split point yields nothing until the remainder arrives
    #[test]
    fn split_anywhere_reassembles(split_ratio in 0.0f64..1.0) {
        let batch = mixed_batch();
        let frame = encode_frame(&batch).unwrap();
        let split = ((frame.len() as f64) * split_ratio) as usize;
        prop_assume!(split < frame.len());

        let mut decoder = FrameDecoder::new();
        decoder.extend(&frame[..split]);
        prop_assert_eq!(decoder.decode_next().unwrap(), None);
        decoder.extend(&frame[split..]);
        prop_assert_eq!(decoder.decode_next().unwrap(), Some(batch));
    }

    /// Property: Int, Number and Text values survive the wire unchanged
    #[test]
    fn scalar_values_preserved(i in any::<i64>(), n in -1.0e12f64..1.0e12, s in ".{0,32}") {
        let batch = vec![Message::Reply {
            match_id: 1,
            args: vec![Value::Int(i), Value::Number(n), Value::from(s)],
        }];
        let mut decoder = FrameDecoder::new();
        decoder.extend(&encode_frame(&batch).unwrap());
        prop_assert_eq!(decoder.decode_next().unwrap(), Some(batch));
    }
}
