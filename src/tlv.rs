//! Tag-Length-Value codec.
//!
//! Three wire formats share one element model:
//!
//! - **Standard**: 1-byte tag, 1-byte length, L value bytes.
//! - **EMV BER-TLV** (ITU-T X.690, as used for ICC data in DE 55):
//!   multi-byte tags when the low five bits of the first byte are all set,
//!   short-form lengths 0..=127 and long-form `0x80 | n` with 1..=4
//!   big-endian length bytes. Packing emits the shortest length form.
//! - **ASCII fixed-width**: `tag_chars` tag characters, `len_chars` length
//!   characters in base 10 or 16, then the value.
//!
//! A [`TlvParser`] is configured once with a mode; parsing is zero-copy
//! over the input slice.

use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::spec::{TlvKind, TlvSpec};

/// One TLV element. Parsed elements borrow the input buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tlv<'a> {
    pub tag: Cow<'a, [u8]>,
    pub value: Cow<'a, [u8]>,
}

impl<'a> Tlv<'a> {
    pub fn new(tag: Vec<u8>, value: Vec<u8>) -> Tlv<'static> {
        Tlv {
            tag: Cow::Owned(tag),
            value: Cow::Owned(value),
        }
    }

    pub fn borrowed(tag: &'a [u8], value: &'a [u8]) -> Tlv<'a> {
        Tlv {
            tag: Cow::Borrowed(tag),
            value: Cow::Borrowed(value),
        }
    }

    /// Value length in bytes.
    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn to_owned_tlv(&self) -> Tlv<'static> {
        Tlv {
            tag: Cow::Owned(self.tag.to_vec()),
            value: Cow::Owned(self.value.to_vec()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Standard,
    Emv,
    Ascii {
        tag_chars: usize,
        len_chars: usize,
        base: u32,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct TlvParser {
    mode: Mode,
}

impl TlvParser {
    /// Standard mode: 1-byte tag, 1-byte length.
    pub fn standard() -> Self {
        TlvParser { mode: Mode::Standard }
    }

    /// EMV BER-TLV mode.
    pub fn emv() -> Self {
        TlvParser { mode: Mode::Emv }
    }

    /// ASCII fixed-width mode. Only bases 10 and 16 are meaningful on the
    /// wire; anything else is rejected here so a misconfigured parser
    /// cannot exist.
    pub fn ascii(tag_chars: usize, len_chars: usize, base: u32) -> Result<Self> {
        if tag_chars == 0 || len_chars == 0 || !(base == 10 || base == 16) {
            return Err(Error::InvalidTlv);
        }
        Ok(TlvParser {
            mode: Mode::Ascii {
                tag_chars,
                len_chars,
                base,
            },
        })
    }

    /// Build a parser from a schema-level TLV configuration.
    pub fn from_spec(spec: &TlvSpec) -> Result<Self> {
        match spec.kind {
            TlvKind::Standard => Ok(Self::standard()),
            TlvKind::Emv => Ok(Self::emv()),
            TlvKind::Ascii => Self::ascii(spec.ascii_tag_len, spec.ascii_len_len, spec.ascii_len_base),
        }
    }

    /// Parse a complete buffer of TLV elements. Any truncation or
    /// malformed tag/length is [`Error::InvalidTlv`].
    pub fn parse<'a>(&self, buf: &'a [u8]) -> Result<Vec<Tlv<'a>>> {
        let mut elements = Vec::new();
        let mut pos = 0;
        while pos < buf.len() {
            let element = match self.mode {
                Mode::Standard => parse_standard(buf, &mut pos)?,
                Mode::Emv => parse_emv(buf, &mut pos)?,
                Mode::Ascii {
                    tag_chars,
                    len_chars,
                    base,
                } => parse_ascii(buf, &mut pos, tag_chars, len_chars, base)?,
            };
            elements.push(element);
        }
        Ok(elements)
    }

    /// Serialize elements into `buf`. Returns the number of bytes written.
    pub fn pack(&self, elements: &[Tlv<'_>], buf: &mut [u8]) -> Result<usize> {
        let mut pos = 0;
        for element in elements {
            match self.mode {
                Mode::Standard => pack_standard(element, buf, &mut pos)?,
                Mode::Emv => pack_emv(element, buf, &mut pos)?,
                Mode::Ascii {
                    tag_chars,
                    len_chars,
                    base,
                } => pack_ascii(element, buf, &mut pos, tag_chars, len_chars, base)?,
            }
        }
        Ok(pos)
    }

    pub fn pack_to_vec(&self, elements: &[Tlv<'_>]) -> Result<Vec<u8>> {
        let length_overhead = match self.mode {
            // Worst-case BER length is 1 + 4 bytes; standard is always 1.
            Mode::Standard | Mode::Emv => 5,
            Mode::Ascii { len_chars, .. } => len_chars,
        };
        let mut size = 0;
        for element in elements {
            size += element.tag.len() + length_overhead + element.value.len();
        }
        let mut buf = vec![0u8; size];
        let written = self.pack(elements, &mut buf)?;
        buf.truncate(written);
        Ok(buf)
    }

    /// Map keyed by tag string: the literal tag characters in ASCII mode,
    /// the uppercase-hex tag bytes otherwise. Later duplicates win.
    pub fn to_map(&self, elements: &[Tlv<'_>]) -> BTreeMap<String, Vec<u8>> {
        let mut map = BTreeMap::new();
        for element in elements {
            map.insert(self.tag_key(&element.tag), element.value.to_vec());
        }
        map
    }

    /// Inverse of [`TlvParser::to_map`]. Hex keys must have even length.
    pub fn from_map(&self, map: &BTreeMap<String, Vec<u8>>) -> Result<Vec<Tlv<'static>>> {
        let mut elements = Vec::with_capacity(map.len());
        for (key, value) in map {
            let tag = match self.mode {
                Mode::Ascii { .. } => key.as_bytes().to_vec(),
                _ => hex_to_bytes(key)?,
            };
            elements.push(Tlv::new(tag, value.clone()));
        }
        Ok(elements)
    }

    fn tag_key(&self, tag: &[u8]) -> String {
        match self.mode {
            Mode::Ascii { .. } => String::from_utf8_lossy(tag).into_owned(),
            _ => tag.iter().map(|b| format!("{:02X}", b)).collect(),
        }
    }
}

/// First element whose tag equals `tag` byte-for-byte.
pub fn find<'e, 'a>(elements: &'e [Tlv<'a>], tag: &[u8]) -> Option<&'e Tlv<'a>> {
    elements.iter().find(|e| e.tag.as_ref() == tag)
}

/// All elements whose tag begins with `prefix`.
pub fn filter_by_prefix<'e, 'a>(elements: &'e [Tlv<'a>], prefix: &[u8]) -> Vec<&'e Tlv<'a>> {
    elements.iter().filter(|e| e.tag.starts_with(prefix)).collect()
}

fn parse_standard<'a>(buf: &'a [u8], pos: &mut usize) -> Result<Tlv<'a>> {
    if *pos + 2 > buf.len() {
        return Err(Error::InvalidTlv);
    }
    let tag = &buf[*pos..*pos + 1];
    let length = buf[*pos + 1] as usize;
    *pos += 2;
    if *pos + length > buf.len() {
        return Err(Error::InvalidTlv);
    }
    let value = &buf[*pos..*pos + length];
    *pos += length;
    Ok(Tlv::borrowed(tag, value))
}

fn parse_emv<'a>(buf: &'a [u8], pos: &mut usize) -> Result<Tlv<'a>> {
    // Tag: first byte, then continuation bytes while the current byte has
    // its high bit set; the byte with a clear high bit terminates the tag.
    let tag_start = *pos;
    let t0 = buf[*pos];
    *pos += 1;
    if t0 & 0x1F == 0x1F {
        loop {
            if *pos >= buf.len() {
                return Err(Error::InvalidTlv);
            }
            let b = buf[*pos];
            *pos += 1;
            if b & 0x80 == 0 {
                break;
            }
        }
    }
    let tag = &buf[tag_start..*pos];

    // Length: short form 0..=127, or 0x80|n with n big-endian bytes, 1..=4.
    if *pos >= buf.len() {
        return Err(Error::InvalidTlv);
    }
    let l0 = buf[*pos];
    *pos += 1;
    let length = if l0 & 0x80 == 0 {
        l0 as usize
    } else {
        let n = (l0 & 0x7F) as usize;
        if n == 0 || n > 4 {
            return Err(Error::InvalidTlv);
        }
        if *pos + n > buf.len() {
            return Err(Error::InvalidTlv);
        }
        let mut length = 0usize;
        for &b in &buf[*pos..*pos + n] {
            length = (length << 8) | b as usize;
        }
        *pos += n;
        length
    };

    if *pos + length > buf.len() {
        return Err(Error::InvalidTlv);
    }
    let value = &buf[*pos..*pos + length];
    *pos += length;
    Ok(Tlv::borrowed(tag, value))
}

fn parse_ascii<'a>(
    buf: &'a [u8],
    pos: &mut usize,
    tag_chars: usize,
    len_chars: usize,
    base: u32,
) -> Result<Tlv<'a>> {
    if *pos + tag_chars + len_chars > buf.len() {
        return Err(Error::InvalidTlv);
    }
    let tag = &buf[*pos..*pos + tag_chars];
    *pos += tag_chars;

    let len_text =
        std::str::from_utf8(&buf[*pos..*pos + len_chars]).map_err(|_| Error::InvalidTlv)?;
    let length = usize::from_str_radix(len_text, base).map_err(|_| Error::InvalidTlv)?;
    *pos += len_chars;

    if *pos + length > buf.len() {
        return Err(Error::InvalidTlv);
    }
    let value = &buf[*pos..*pos + length];
    *pos += length;
    Ok(Tlv::borrowed(tag, value))
}

fn pack_standard(element: &Tlv<'_>, buf: &mut [u8], pos: &mut usize) -> Result<()> {
    if element.tag.len() != 1 || element.value.len() > 0xFF {
        return Err(Error::InvalidTlv);
    }
    if *pos + 2 + element.value.len() > buf.len() {
        return Err(Error::BufferTooSmall);
    }
    buf[*pos] = element.tag[0];
    buf[*pos + 1] = element.value.len() as u8;
    *pos += 2;
    buf[*pos..*pos + element.value.len()].copy_from_slice(&element.value);
    *pos += element.value.len();
    Ok(())
}

fn pack_emv(element: &Tlv<'_>, buf: &mut [u8], pos: &mut usize) -> Result<()> {
    if buf.len() < *pos + element.tag.len() {
        return Err(Error::BufferTooSmall);
    }
    buf[*pos..*pos + element.tag.len()].copy_from_slice(&element.tag);
    *pos += element.tag.len();

    let length = element.value.len();
    if length < 0x80 {
        if *pos >= buf.len() {
            return Err(Error::BufferTooSmall);
        }
        buf[*pos] = length as u8;
        *pos += 1;
    } else {
        // Minimal long form: fewest big-endian bytes that hold the length.
        let mut n = 1;
        while n < 8 && (length >> (8 * n)) != 0 {
            n += 1;
        }
        if n > 4 {
            return Err(Error::InvalidTlv);
        }
        if *pos + 1 + n > buf.len() {
            return Err(Error::BufferTooSmall);
        }
        buf[*pos] = 0x80 | n as u8;
        *pos += 1;
        for i in (0..n).rev() {
            buf[*pos] = (length >> (8 * i)) as u8;
            *pos += 1;
        }
    }

    if *pos + length > buf.len() {
        return Err(Error::BufferTooSmall);
    }
    buf[*pos..*pos + length].copy_from_slice(&element.value);
    *pos += length;
    Ok(())
}

fn pack_ascii(
    element: &Tlv<'_>,
    buf: &mut [u8],
    pos: &mut usize,
    tag_chars: usize,
    len_chars: usize,
    base: u32,
) -> Result<()> {
    if element.tag.len() != tag_chars {
        return Err(Error::InvalidTlv);
    }
    let length = element.value.len();
    let capacity = (base as usize).pow(len_chars as u32) - 1;
    if length > capacity {
        return Err(Error::InvalidTlv);
    }
    if *pos + tag_chars + len_chars + length > buf.len() {
        return Err(Error::BufferTooSmall);
    }

    buf[*pos..*pos + tag_chars].copy_from_slice(&element.tag);
    *pos += tag_chars;

    let len_text = if base == 16 {
        format!("{:0width$X}", length, width = len_chars)
    } else {
        format!("{:0width$}", length, width = len_chars)
    };
    buf[*pos..*pos + len_chars].copy_from_slice(len_text.as_bytes());
    *pos += len_chars;

    buf[*pos..*pos + length].copy_from_slice(&element.value);
    *pos += length;
    Ok(())
}

fn hex_to_bytes(s: &str) -> Result<Vec<u8>> {
    let bytes = s.as_bytes();
    if bytes.len() % 2 != 0 {
        return Err(Error::InvalidTlv);
    }
    fn nibble(b: u8) -> Result<u8> {
        match b {
            b'0'..=b'9' => Ok(b - b'0'),
            b'A'..=b'F' => Ok(b - b'A' + 10),
            b'a'..=b'f' => Ok(b - b'a' + 10),
            _ => Err(Error::InvalidTlv),
        }
    }
    bytes
        .chunks(2)
        .map(|pair| Ok((nibble(pair[0])? << 4) | nibble(pair[1])?))
        .collect()
}
