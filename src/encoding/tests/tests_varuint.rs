//! Tests for unsigned LEB128 varint encoding used by the SSTable wire format.

use crate::encoding::*;

#[test]
fn roundtrip_zero() {
    let mut buf = Vec::new();
    encode_varuint(0, &mut buf);
    assert_eq!(buf, [0x00]);
    let (val, consumed) = decode_varuint(&buf).unwrap();
    assert_eq!(val, 0);
    assert_eq!(consumed, 1);
}

#[test]
fn roundtrip_single_byte_boundary() {
    let mut buf = Vec::new();
    encode_varuint(127, &mut buf);
    assert_eq!(buf, [0x7f]);
    let (val, consumed) = decode_varuint(&buf).unwrap();
    assert_eq!(val, 127);
    assert_eq!(consumed, 1);
}

#[test]
fn roundtrip_two_byte_boundary() {
    let mut buf = Vec::new();
    encode_varuint(128, &mut buf);
    assert_eq!(buf, [0x80, 0x01]);
    let (val, consumed) = decode_varuint(&buf).unwrap();
    assert_eq!(val, 128);
    assert_eq!(consumed, 2);
}

#[test]
fn roundtrip_u64_max() {
    let mut buf = Vec::new();
    encode_varuint(u64::MAX, &mut buf);
    assert_eq!(buf.len(), MAX_VARUINT_LEN);
    let (val, consumed) = decode_varuint(&buf).unwrap();
    assert_eq!(val, u64::MAX);
    assert_eq!(consumed, MAX_VARUINT_LEN);
}

#[test]
fn decode_consumes_only_its_own_bytes() {
    let mut buf = Vec::new();
    encode_varuint(300, &mut buf);
    buf.extend_from_slice(b"trailing");
    let (val, consumed) = decode_varuint(&buf).unwrap();
    assert_eq!(val, 300);
    assert_eq!(&buf[consumed..], b"trailing");
}

#[test]
fn decode_truncated_buffer_errors() {
    let mut buf = Vec::new();
    encode_varuint(300, &mut buf);
    buf.truncate(1);
    assert!(decode_varuint(&buf).is_err());
}

#[test]
fn decode_empty_buffer_errors() {
    assert!(decode_varuint(&[]).is_err());
}

#[test]
fn decode_overlong_encoding_errors() {
    let buf = vec![0x80u8; 11];
    assert!(decode_varuint(&buf).is_err());
}
