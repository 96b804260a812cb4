//! # TLV codec — unit tests and behaviour specification
//!
//! Three wire formats share one element model:
//!
//! - **Standard**: 1-byte tag, 1-byte length, L value bytes. Packing
//!   rejects multi-byte tags and values over 255 bytes.
//! - **EMV BER-TLV**: tags continue past the first byte when its low five
//!   bits are all set (`t0 & 0x1F == 0x1F`), with continuation bytes while
//!   the high bit is set. Lengths are short form (0..=127) or long form
//!   `0x80 | n` with 1..=4 big-endian bytes; n = 0 and n > 4 are invalid.
//!   Packing emits the shortest form.
//! - **ASCII fixed-width**: `tag_chars` tag characters, `len_chars` length
//!   characters in base 10 or 16 (zero-padded, uppercase hex), then the
//!   value. Other bases are rejected at construction.
//!
//! ## Test index (expected behaviour)
//!
//! | Test | Behaviour |
//! |------|-----------|
//! | `emv_two_byte_tag_and_one_byte_tag` | `9F33 03 600808`, `5A 08 PAN` -> two elements |
//! | `emv_long_form_length_500` | `82 01F4` decodes a 500-byte value |
//! | `emv_rejects_bad_long_form` | n = 0 and n > 4 -> `InvalidTlv` |
//! | `emv_truncated_value` | declared length past the buffer -> `InvalidTlv` |
//! | `emv_pack_minimal_length` | 127 -> 1 byte, 128 -> `81 80`, 500 -> `82 01F4` |
//! | `standard_roundtrip_and_limits` | 1/1 framing; tag != 1 byte or value > 255 rejected |
//! | `ascii_fixed_roundtrip` | `AL04DATA` <-> {tag `AL`, value `DATA`} |
//! | `ascii_base16_length` | length `0C` decodes to 12; emit is uppercase hex |
//! | `ascii_rejects_bad_base` | base outside {10, 16} rejected at construction |
//! | `find_and_filter_by_prefix` | exact-match lookup; prefix filtering on tag bytes |
//! | `map_round_trip` | hex keys for EMV, literal tag strings for ASCII |

use std::collections::BTreeMap;

use iso8583_codec::error::Error;
use iso8583_codec::tlv::{filter_by_prefix, find, Tlv, TlvParser};

// -----------------------------------------------------------------------------
// EMV BER-TLV
// -----------------------------------------------------------------------------

/// **Behaviour**: `9F 33 03 60 08 08 5A 08 41...` parses as two elements:
/// tag `9F33` (two bytes, continuation rule) and tag `5A` (one byte).
#[test]
fn emv_two_byte_tag_and_one_byte_tag() {
    let data: Vec<u8> = vec![
        0x9F, 0x33, 0x03, 0x60, 0x08, 0x08, // tag 9F33, len 3
        0x5A, 0x08, 0x41, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, // tag 5A, len 8
    ];
    let elements = TlvParser::emv().parse(&data).expect("parse");
    assert_eq!(elements.len(), 2);
    assert_eq!(elements[0].tag.as_ref(), &[0x9F, 0x33]);
    assert_eq!(elements[0].value.as_ref(), &[0x60, 0x08, 0x08]);
    assert_eq!(elements[1].tag.as_ref(), &[0x5A]);
    assert_eq!(
        elements[1].value.as_ref(),
        &[0x41, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11]
    );
}

/// **Behaviour**: Long-form length `82 01 F4` = 500 value bytes.
#[test]
fn emv_long_form_length_500() {
    let mut data: Vec<u8> = vec![0x5F, 0x2A, 0x82, 0x01, 0xF4];
    data.extend(std::iter::repeat(0xAB).take(500));
    let elements = TlvParser::emv().parse(&data).expect("parse");
    assert_eq!(elements.len(), 1);
    assert_eq!(elements[0].tag.as_ref(), &[0x5F, 0x2A]);
    assert_eq!(elements[0].len(), 500);
}

/// **Behaviour**: Long-form n must satisfy 1 <= n <= 4. `0x80` (n = 0) and
/// `0x85` (n = 5) are `InvalidTlv`.
#[test]
fn emv_rejects_bad_long_form() {
    assert!(matches!(
        TlvParser::emv().parse(&[0x5A, 0x80, 0x01]),
        Err(Error::InvalidTlv)
    ));
    let mut data = vec![0x5A, 0x85];
    data.extend_from_slice(&[0, 0, 0, 0, 1]);
    assert!(matches!(TlvParser::emv().parse(&data), Err(Error::InvalidTlv)));
}

/// **Behaviour**: A declared length reaching past the end of the buffer is
/// `InvalidTlv`; so is a tag or length cut off mid-way.
#[test]
fn emv_truncated_value() {
    // len 3 declared, 2 value bytes available
    assert!(matches!(
        TlvParser::emv().parse(&[0x5A, 0x03, 0x01, 0x02]),
        Err(Error::InvalidTlv)
    ));
    // multi-byte tag cut off after the leading byte
    assert!(matches!(TlvParser::emv().parse(&[0x9F]), Err(Error::InvalidTlv)));
    // tag present, length byte missing
    assert!(matches!(TlvParser::emv().parse(&[0x5A]), Err(Error::InvalidTlv)));
}

/// **Behaviour**: Packing emits the shortest length encoding: short form
/// through 127, then `81`, `82`... as needed.
#[test]
fn emv_pack_minimal_length() {
    let parser = TlvParser::emv();

    let short = Tlv::new(vec![0x5A], vec![0u8; 127]);
    let bytes = parser.pack_to_vec(&[short]).expect("pack");
    assert_eq!(&bytes[..2], &[0x5A, 0x7F]);
    assert_eq!(bytes.len(), 2 + 127);

    let medium = Tlv::new(vec![0x5A], vec![0u8; 128]);
    let bytes = parser.pack_to_vec(&[medium]).expect("pack");
    assert_eq!(&bytes[..3], &[0x5A, 0x81, 0x80]);

    let long = Tlv::new(vec![0x9F, 0x10], vec![0u8; 500]);
    let bytes = parser.pack_to_vec(&[long]).expect("pack");
    assert_eq!(&bytes[..5], &[0x9F, 0x10, 0x82, 0x01, 0xF4]);
}

/// **Behaviour**: EMV pack-then-parse preserves tags and values.
#[test]
fn emv_roundtrip() {
    let parser = TlvParser::emv();
    let elements = vec![
        Tlv::new(vec![0x9F, 0x33], vec![0x60, 0x08, 0x08]),
        Tlv::new(vec![0x5A], vec![0x41, 0x11, 0x11, 0x11]),
        Tlv::new(vec![0x95], vec![]),
    ];
    let bytes = parser.pack_to_vec(&elements).expect("pack");
    let decoded = parser.parse(&bytes).expect("parse");
    assert_eq!(decoded.len(), 3);
    for (original, parsed) in elements.iter().zip(&decoded) {
        assert_eq!(original.tag, parsed.tag);
        assert_eq!(original.value, parsed.value);
    }
}

// -----------------------------------------------------------------------------
// Standard 1/1
// -----------------------------------------------------------------------------

/// **Behaviour**: 1-byte tag, 1-byte length framing round-trips; packing
/// rejects a multi-byte tag and a value over 255 bytes.
#[test]
fn standard_roundtrip_and_limits() {
    let parser = TlvParser::standard();
    let elements = vec![
        Tlv::new(vec![0x01], b"hello".to_vec()),
        Tlv::new(vec![0x02], vec![]),
    ];
    let bytes = parser.pack_to_vec(&elements).expect("pack");
    assert_eq!(bytes, vec![0x01, 5, b'h', b'e', b'l', b'l', b'o', 0x02, 0]);

    let decoded = parser.parse(&bytes).expect("parse");
    assert_eq!(decoded.len(), 2);
    assert_eq!(decoded[0].value.as_ref(), b"hello");
    assert_eq!(decoded[1].len(), 0);

    let wide_tag = Tlv::new(vec![0x9F, 0x33], vec![1]);
    assert!(matches!(parser.pack_to_vec(&[wide_tag]), Err(Error::InvalidTlv)));

    let oversized = Tlv::new(vec![0x01], vec![0u8; 256]);
    assert!(matches!(parser.pack_to_vec(&[oversized]), Err(Error::InvalidTlv)));
}

/// **Behaviour**: A truncated standard element is `InvalidTlv`.
#[test]
fn standard_truncated() {
    let parser = TlvParser::standard();
    assert!(matches!(parser.parse(&[0x01]), Err(Error::InvalidTlv)));
    assert!(matches!(parser.parse(&[0x01, 3, 0xAA]), Err(Error::InvalidTlv)));
}

// -----------------------------------------------------------------------------
// ASCII fixed-width
// -----------------------------------------------------------------------------

/// **Behaviour**: With (tagChars = 2, lenChars = 2, base = 10), `AL04DATA`
/// decodes to {tag `AL`, value `DATA`} and encodes back byte-identical.
#[test]
fn ascii_fixed_roundtrip() {
    let parser = TlvParser::ascii(2, 2, 10).expect("parser");
    let elements = parser.parse(b"AL04DATA").expect("parse");
    assert_eq!(elements.len(), 1);
    assert_eq!(elements[0].tag.as_ref(), b"AL");
    assert_eq!(elements[0].value.as_ref(), b"DATA");

    let bytes = parser.pack_to_vec(&elements).expect("pack");
    assert_eq!(bytes, b"AL04DATA");
}

/// **Behaviour**: Base-16 lengths: `0C` decodes to 12 value bytes; emit is
/// zero-padded uppercase hex.
#[test]
fn ascii_base16_length() {
    let parser = TlvParser::ascii(2, 2, 16).expect("parser");
    let elements = parser.parse(b"T10C0123456789AB").expect("parse");
    assert_eq!(elements.len(), 1);
    assert_eq!(elements[0].tag.as_ref(), b"T1");
    assert_eq!(elements[0].value.as_ref(), b"0123456789AB");

    let bytes = parser.pack_to_vec(&elements).expect("pack");
    assert_eq!(bytes, b"T10C0123456789AB");
}

/// **Behaviour**: Bases other than 10 and 16 cannot construct a parser;
/// a tag of the wrong width or an oversized value cannot pack.
#[test]
fn ascii_rejects_bad_base() {
    assert!(matches!(TlvParser::ascii(2, 2, 8), Err(Error::InvalidTlv)));
    assert!(matches!(TlvParser::ascii(0, 2, 10), Err(Error::InvalidTlv)));

    let parser = TlvParser::ascii(2, 2, 10).expect("parser");
    let short_tag = Tlv::new(b"A".to_vec(), b"X".to_vec());
    assert!(matches!(parser.pack_to_vec(&[short_tag]), Err(Error::InvalidTlv)));

    // base 10, 2 length chars: 99 bytes is the ceiling
    let oversized = Tlv::new(b"AL".to_vec(), vec![b'x'; 100]);
    assert!(matches!(parser.pack_to_vec(&[oversized]), Err(Error::InvalidTlv)));
}

/// **Behaviour**: A non-digit length or a short final element is
/// `InvalidTlv`.
#[test]
fn ascii_malformed() {
    let parser = TlvParser::ascii(2, 2, 10).expect("parser");
    assert!(matches!(parser.parse(b"ALXXDATA"), Err(Error::InvalidTlv)));
    assert!(matches!(parser.parse(b"AL05DATA"), Err(Error::InvalidTlv)));
    assert!(matches!(parser.parse(b"AL0"), Err(Error::InvalidTlv)));
}

// -----------------------------------------------------------------------------
// Utilities
// -----------------------------------------------------------------------------

/// **Behaviour**: `find` matches tags byte-for-byte and returns the first
/// hit; `filter_by_prefix` keeps every element whose tag starts with the
/// prefix.
#[test]
fn find_and_filter_by_prefix() {
    let data: Vec<u8> = vec![
        0x9F, 0x33, 0x01, 0xAA, //
        0x9F, 0x10, 0x01, 0xBB, //
        0x5A, 0x01, 0xCC,
    ];
    let elements = TlvParser::emv().parse(&data).expect("parse");

    let hit = find(&elements, &[0x9F, 0x10]).expect("find");
    assert_eq!(hit.value.as_ref(), &[0xBB]);
    assert!(find(&elements, &[0x9F, 0x34]).is_none());

    let proprietary = filter_by_prefix(&elements, &[0x9F]);
    assert_eq!(proprietary.len(), 2);
    assert_eq!(proprietary[0].tag.as_ref(), &[0x9F, 0x33]);
    assert_eq!(proprietary[1].tag.as_ref(), &[0x9F, 0x10]);
}

/// **Behaviour**: Map keys are uppercase hex for EMV/standard and the
/// literal tag characters for ASCII; `from_map` inverts `to_map`.
#[test]
fn map_round_trip() {
    let emv = TlvParser::emv();
    let elements = vec![
        Tlv::new(vec![0x9F, 0x33], vec![0x60]),
        Tlv::new(vec![0x5A], vec![0x41]),
    ];
    let map = emv.to_map(&elements);
    assert_eq!(map.get("9F33").map(Vec::as_slice), Some(&[0x60][..]));
    assert_eq!(map.get("5A").map(Vec::as_slice), Some(&[0x41][..]));

    let rebuilt = emv.from_map(&map).expect("from_map");
    let rebuilt_map = emv.to_map(&rebuilt);
    assert_eq!(rebuilt_map, map);

    let ascii = TlvParser::ascii(2, 2, 10).expect("parser");
    let elements = ascii.parse(b"AL04DATA").expect("parse");
    let map = ascii.to_map(&elements);
    assert_eq!(map.get("AL").map(Vec::as_slice), Some(&b"DATA"[..]));

    let mut bad = BTreeMap::new();
    bad.insert("9F3".to_string(), vec![0x01]); // odd-length hex key
    assert!(matches!(emv.from_map(&bad), Err(Error::InvalidTlv)));
}
