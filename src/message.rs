//! Message unpack/pack state machines.
//!
//! Decode walks a byte buffer left to right: optional length indicator,
//! optional opaque header, the 4-digit MTI, the primary (and, when bit 1
//! says so, secondary) bitmap, then every present data element in
//! ascending order under the packager's length and type rules. Field
//! values are zero-copy slices of the input buffer; the resulting
//! [`Message`] carries the buffer's lifetime. [`Message::deep_copy`] is
//! the explicit path out of that borrow.
//!
//! Encode is the exact reverse, into a caller-supplied buffer with
//! capacity checks at every write, the bitmap recomputed from the set of
//! populated fields and the length indicator filled in last.

use std::borrow::Cow;
use std::sync::Arc;

use tracing::debug;

use crate::bitmap::BitmapManager;
use crate::error::{Error, Result, ValidationError};
use crate::field::Field;
use crate::length;
use crate::spec::{
    CompiledPackager, FieldType, HeaderKind, LengthIndicatorKind, LengthKind,
};
use crate::tlv::{Tlv, TlvParser};
use crate::validate::ValidationLevel;

pub const MTI_AUTH_REQUEST: &str = "0200";
pub const MTI_AUTH_RESPONSE: &str = "0210";
pub const MTI_REVERSAL_REQUEST: &str = "0400";
pub const MTI_REVERSAL_RESPONSE: &str = "0410";
pub const MTI_RECONCILE_REQUEST: &str = "0500";
pub const MTI_RECONCILE_RESPONSE: &str = "0510";
pub const MTI_ADMIN_REQUEST: &str = "0600";
pub const MTI_ADMIN_RESPONSE: &str = "0610";
pub const MTI_NMM_REQUEST: &str = "0800";
pub const MTI_NMM_RESPONSE: &str = "0810";

pub const RC_APPROVED: &str = "00";
pub const RC_REFER_TO_ISSUER: &str = "01";
pub const RC_INVALID_MERCHANT: &str = "03";
pub const RC_DO_NOT_HONOR: &str = "05";
pub const RC_INVALID_TRANSACTION: &str = "12";
pub const RC_INVALID_AMOUNT: &str = "13";
pub const RC_INVALID_CARD: &str = "14";
pub const RC_FORMAT_ERROR: &str = "30";
pub const RC_SYSTEM_ERROR: &str = "96";

/// Fields echoed from a request into its response.
const ECHO_FIELDS: [u8; 13] = [2, 3, 4, 7, 11, 12, 13, 22, 32, 37, 41, 42, 49];

/// A single ISO 8583 message. The lifetime ties zero-copy field slices to
/// the buffer they were decoded from; messages built purely through the
/// owning setters are `Message<'static>`.
#[derive(Debug, Clone)]
pub struct Message<'a> {
    mti: [u8; 4],
    has_mti: bool,
    header: Option<Cow<'a, [u8]>>,
    bitmap: BitmapManager,
    fields: Vec<Field<'a>>,
    /// Presence mirror of the bitmap for O(1) lookups.
    presence: [u64; 2],
    packager: Arc<CompiledPackager>,
    /// The raw input buffer, kept for diagnostics.
    full_message: Option<&'a [u8]>,
    validation_level: ValidationLevel,
}

impl<'a> Message<'a> {
    pub fn new(packager: Arc<CompiledPackager>) -> Self {
        Message {
            mti: [0; 4],
            has_mti: false,
            header: None,
            bitmap: BitmapManager::new(),
            fields: vec![Field::default(); 129],
            presence: [0; 2],
            packager,
            full_message: None,
            validation_level: ValidationLevel::None,
        }
    }

    // --- decode ---

    /// Parse a raw message. Field values borrow `data`; keep it alive for
    /// the life of the message or call [`Message::deep_copy`].
    pub fn unpack(packager: Arc<CompiledPackager>, data: &'a [u8]) -> Result<Message<'a>> {
        Self::unpack_with_level(packager, data, ValidationLevel::None)
    }

    /// Parse with a validation level. Under
    /// [`ValidationLevel::Strict`], a variable field whose declared length
    /// exceeds the schema maximum fails the decode instead of being
    /// accepted.
    pub fn unpack_with_level(
        packager: Arc<CompiledPackager>,
        data: &'a [u8],
        level: ValidationLevel,
    ) -> Result<Message<'a>> {
        let mut msg = Message::new(packager);
        msg.validation_level = level;
        msg.full_message = Some(data);

        // Length indicator: the remaining buffer is treated as containing
        // exactly the declared number of bytes.
        let indicator = msg.packager.length_indicator();
        let body: &'a [u8] = if indicator.kind != LengthIndicatorKind::None {
            let (declared, consumed) = length::read_length(indicator.kind, indicator.width, data)?;
            if data.len() < consumed + declared {
                return Err(Error::InsufficientData);
            }
            &data[consumed..consumed + declared]
        } else {
            data
        };
        let mut pos = 0;

        // Header: opaque bytes, preserved verbatim.
        let header = msg.packager.header();
        if header.kind != HeaderKind::None && header.width > 0 {
            if body.len() < header.width {
                return Err(Error::InvalidHeader);
            }
            msg.header = Some(Cow::Borrowed(&body[..header.width]));
            pos += header.width;
        }

        // MTI: exactly 4 ASCII digits.
        if body.len() < pos + 4 {
            return Err(Error::InvalidMti);
        }
        let mti = &body[pos..pos + 4];
        if !mti.iter().all(u8::is_ascii_digit) {
            return Err(Error::InvalidMti);
        }
        msg.mti.copy_from_slice(mti);
        msg.has_mti = true;
        pos += 4;

        pos += msg.bitmap.unpack(&body[pos..], msg.packager.bitmap_encoding())?;

        // Data elements, ascending; bit 1 is never a data element. Extra
        // trailing bytes past the last field are left unconsumed.
        let strict = level == ValidationLevel::Strict;
        for field_num in 2..=128u8 {
            if !msg.bitmap.is_set(field_num) {
                continue;
            }
            pos = msg
                .unpack_field(field_num, body, pos, strict)
                .map_err(|e| e.for_field(field_num))?;
        }

        debug!(
            mti = msg.mti_str(),
            fields = msg.present_fields().len(),
            bytes = pos,
            "unpacked message"
        );
        Ok(msg)
    }

    fn unpack_field(
        &mut self,
        field_num: u8,
        data: &'a [u8],
        mut pos: usize,
        strict: bool,
    ) -> Result<usize> {
        let (field_type, length_kind, max_length) = {
            let spec = self
                .packager
                .field_spec(field_num)
                .ok_or(Error::FieldNotConfigured(field_num))?;
            (spec.field_type, spec.length_kind, spec.max_length)
        };

        let value_len = if length_kind == LengthKind::Fixed {
            max_length
        } else {
            let digits = length_kind.prefix_digits();
            if data.len() < pos + digits {
                return Err(Error::InsufficientData);
            }
            let mut declared = 0usize;
            for &b in &data[pos..pos + digits] {
                if !b.is_ascii_digit() {
                    return Err(Error::InvalidLength);
                }
                declared = declared * 10 + (b - b'0') as usize;
            }
            pos += digits;
            if strict && declared > max_length {
                return Err(Error::InvalidLength);
            }
            declared
        };

        if data.len() < pos + value_len {
            return Err(Error::InsufficientData);
        }
        self.fields[field_num as usize].set_bytes(&data[pos..pos + value_len], field_type);
        self.mark_present(field_num);
        Ok(pos + value_len)
    }

    // --- encode ---

    /// Serialize into `buf`. Returns the total bytes written, length
    /// indicator and header included. No allocation when `buf` is
    /// pre-sized (see [`Message::packed_size`]).
    pub fn pack(&self, buf: &mut [u8]) -> Result<usize> {
        let indicator = self.packager.length_indicator();
        let indicator_width = if indicator.kind == LengthIndicatorKind::None {
            0
        } else {
            indicator.width
        };
        let header = self.packager.header();
        let header_width = if header.kind == HeaderKind::None { 0 } else { header.width };

        if buf.len() < indicator_width + header_width {
            return Err(Error::BufferTooSmall);
        }
        let mut pos = indicator_width;

        // Header bytes come from the message, zero-filled when unset.
        if header_width > 0 {
            let dst = &mut buf[pos..pos + header_width];
            dst.fill(0);
            if let Some(h) = &self.header {
                let n = h.len().min(header_width);
                dst[..n].copy_from_slice(&h[..n]);
            }
            pos += header_width;
        }

        if !self.has_mti || !self.mti.iter().all(u8::is_ascii_digit) {
            return Err(Error::InvalidMti);
        }
        if buf.len() < pos + 4 {
            return Err(Error::BufferTooSmall);
        }
        buf[pos..pos + 4].copy_from_slice(&self.mti);
        pos += 4;

        // Bitmap recomputed from the populated-field set: bit 1 is forced
        // on iff any of 65..=128 is present.
        let mut bitmap = BitmapManager::new();
        for field_num in self.present_fields() {
            bitmap.set_field(field_num)?;
        }
        pos += bitmap.pack(&mut buf[pos..], self.packager.bitmap_encoding())?;

        let strict = self.validation_level == ValidationLevel::Strict;
        for field_num in 2..=128u8 {
            if !self.has_field(field_num) {
                continue;
            }
            pos = self
                .pack_field(field_num, buf, pos, strict)
                .map_err(|e| e.for_field(field_num))?;
        }

        if indicator_width > 0 {
            length::write_length(
                indicator.kind,
                indicator.width,
                pos - indicator_width,
                &mut buf[..indicator_width],
            )?;
        }

        debug!(
            mti = self.mti_str(),
            fields = self.present_fields().len(),
            bytes = pos,
            "packed message"
        );
        Ok(pos)
    }

    fn pack_field(&self, field_num: u8, buf: &mut [u8], mut pos: usize, strict: bool) -> Result<usize> {
        let (field_type, length_kind, max_length) = {
            let spec = self
                .packager
                .field_spec(field_num)
                .ok_or(Error::FieldNotConfigured(field_num))?;
            (spec.field_type, spec.length_kind, spec.max_length)
        };
        let data = self.fields[field_num as usize].bytes();

        if length_kind == LengthKind::Fixed {
            if strict && data.len() != max_length {
                return Err(Error::InvalidLength);
            }
            if buf.len() < pos + max_length {
                return Err(Error::BufferTooSmall);
            }
            let dst = &mut buf[pos..pos + max_length];
            if data.len() >= max_length {
                dst.copy_from_slice(&data[..max_length]);
            } else if field_type == FieldType::Numeric {
                let pad = max_length - data.len();
                dst[..pad].fill(b'0');
                dst[pad..].copy_from_slice(data);
            } else {
                dst[..data.len()].copy_from_slice(data);
                dst[data.len()..].fill(b' ');
            }
            Ok(pos + max_length)
        } else {
            let digits = length_kind.prefix_digits();
            if data.len() > length_kind.prefix_capacity() {
                return Err(Error::InvalidLength);
            }
            if strict && data.len() > max_length {
                return Err(Error::InvalidLength);
            }
            if buf.len() < pos + digits + data.len() {
                return Err(Error::BufferTooSmall);
            }
            let mut remaining = data.len();
            for i in (0..digits).rev() {
                buf[pos + i] = b'0' + (remaining % 10) as u8;
                remaining /= 10;
            }
            pos += digits;
            buf[pos..pos + data.len()].copy_from_slice(data);
            Ok(pos + data.len())
        }
    }

    /// Exact byte count [`Message::pack`] will produce. Unconfigured
    /// present fields count as zero here; pack itself rejects them.
    pub fn packed_size(&self) -> usize {
        let indicator = self.packager.length_indicator();
        let mut size = if indicator.kind == LengthIndicatorKind::None {
            0
        } else {
            indicator.width
        };
        let header = self.packager.header();
        if header.kind != HeaderKind::None {
            size += header.width;
        }
        size += 4;

        let has_secondary = self.present_fields().iter().any(|&n| n >= 65);
        let blocks = if has_secondary { 2 } else { 1 };
        size += match self.packager.bitmap_encoding() {
            crate::spec::BitmapEncoding::Binary => blocks * 8,
            crate::spec::BitmapEncoding::Hex => blocks * 16,
        };

        for field_num in self.present_fields() {
            if let Some(spec) = self.packager.field_spec(field_num) {
                size += if spec.length_kind == LengthKind::Fixed {
                    spec.max_length
                } else {
                    spec.length_kind.prefix_digits() + self.fields[field_num as usize].len()
                };
            }
        }
        size
    }

    /// Pack into a freshly allocated, exactly sized buffer.
    pub fn pack_to_vec(&self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.packed_size()];
        let written = self.pack(&mut buf)?;
        buf.truncate(written);
        Ok(buf)
    }

    // --- MTI ---

    pub fn set_mti(&mut self, mti: &str) -> Result<()> {
        let bytes = mti.as_bytes();
        if bytes.len() != 4 || !bytes.iter().all(u8::is_ascii_digit) {
            return Err(Error::InvalidMti);
        }
        self.mti.copy_from_slice(bytes);
        self.has_mti = true;
        Ok(())
    }

    pub fn mti_str(&self) -> &str {
        if !self.has_mti {
            return "";
        }
        std::str::from_utf8(&self.mti).unwrap_or_default()
    }

    pub fn mti_bytes(&self) -> Option<&[u8; 4]> {
        if self.has_mti {
            Some(&self.mti)
        } else {
            None
        }
    }

    /// MTI function digit says request ('0' in position 3).
    pub fn is_request(&self) -> bool {
        self.has_mti && self.mti[2] == b'0'
    }

    pub fn is_response(&self) -> bool {
        self.has_mti && self.mti[2] == b'1'
    }

    pub fn is_network_management(&self) -> bool {
        matches!(self.mti_str(), MTI_NMM_REQUEST | MTI_NMM_RESPONSE)
    }

    // --- fields ---

    fn check_range(field_num: u8) -> Result<()> {
        if (2..=128).contains(&field_num) {
            Ok(())
        } else {
            Err(Error::FieldNotFound)
        }
    }

    fn mark_present(&mut self, field_num: u8) {
        self.presence[((field_num - 1) / 64) as usize] |= 1 << ((field_num - 1) % 64);
    }

    fn clear_present(&mut self, field_num: u8) {
        self.presence[((field_num - 1) / 64) as usize] &= !(1 << ((field_num - 1) % 64));
    }

    /// Set a text value (zero-copy borrow; typed alphanumeric-special).
    pub fn set_field_str(&mut self, field_num: u8, value: &'a str) -> Result<()> {
        Self::check_range(field_num)?;
        self.fields[field_num as usize].set_str(value, FieldType::AlphaNumericSpecial);
        self.mark_present(field_num);
        self.bitmap.set_field(field_num)
    }

    /// Set a binary value (zero-copy borrow).
    pub fn set_field_bytes(&mut self, field_num: u8, value: &'a [u8]) -> Result<()> {
        Self::check_range(field_num)?;
        self.fields[field_num as usize].set_bytes(value, FieldType::Binary);
        self.mark_present(field_num);
        self.bitmap.set_field(field_num)
    }

    /// Set an owned value with an explicit type.
    pub fn set_field_owned(&mut self, field_num: u8, value: Vec<u8>, field_type: FieldType) -> Result<()> {
        Self::check_range(field_num)?;
        self.fields[field_num as usize].set_owned(value, field_type);
        self.mark_present(field_num);
        self.bitmap.set_field(field_num)
    }

    /// Set a numeric value; `width` above zero left-pads with `'0'` to
    /// exactly that many digits.
    pub fn set_field_int(&mut self, field_num: u8, value: i64, width: usize) -> Result<()> {
        Self::check_range(field_num)?;
        self.fields[field_num as usize].set_int(value, FieldType::Numeric, width);
        self.mark_present(field_num);
        self.bitmap.set_field(field_num)
    }

    pub fn remove_field(&mut self, field_num: u8) -> Result<()> {
        Self::check_range(field_num)?;
        self.fields[field_num as usize].reset();
        self.clear_present(field_num);
        self.bitmap.clear_field(field_num)
    }

    pub fn has_field(&self, field_num: u8) -> bool {
        if !(1..=128).contains(&field_num) {
            return false;
        }
        self.presence[((field_num - 1) / 64) as usize] & (1 << ((field_num - 1) % 64)) != 0
    }

    pub fn field(&self, field_num: u8) -> Option<&Field<'a>> {
        if self.has_field(field_num) {
            self.fields.get(field_num as usize)
        } else {
            None
        }
    }

    pub fn get_bytes(&self, field_num: u8) -> Result<&[u8]> {
        self.field(field_num).map(Field::bytes).ok_or(Error::FieldNotFound)
    }

    pub fn get_str(&self, field_num: u8) -> Result<&str> {
        let field = self.field(field_num).ok_or(Error::FieldNotFound)?;
        field.as_str().ok_or_else(|| {
            Error::Validation(ValidationError {
                field: field_num,
                rule: "utf8".to_string(),
                message: "field is not valid UTF-8".to_string(),
            })
        })
    }

    pub fn get_int(&self, field_num: u8) -> Result<i64> {
        let field = self.field(field_num).ok_or(Error::FieldNotFound)?;
        field.as_int().ok_or_else(|| {
            Error::Validation(ValidationError {
                field: field_num,
                rule: "numeric".to_string(),
                message: "field is not a decimal integer".to_string(),
            })
        })
    }

    /// Populated data element numbers in ascending order.
    pub fn present_fields(&self) -> Vec<u8> {
        let mut fields = Vec::new();
        for field_num in 2..=128u8 {
            if self.has_field(field_num) {
                fields.push(field_num);
            }
        }
        fields
    }

    pub fn bitmap(&self) -> &BitmapManager {
        &self.bitmap
    }

    // --- header / diagnostics ---

    pub fn set_header(&mut self, header: &'a [u8]) {
        self.header = Some(Cow::Borrowed(header));
    }

    pub fn set_header_owned(&mut self, header: Vec<u8>) {
        self.header = Some(Cow::Owned(header));
    }

    pub fn header(&self) -> Option<&[u8]> {
        self.header.as_deref()
    }

    /// The raw buffer this message was decoded from, if any.
    pub fn full_message(&self) -> Option<&[u8]> {
        self.full_message
    }

    pub fn packager(&self) -> &Arc<CompiledPackager> {
        &self.packager
    }

    // --- validation ---

    pub fn set_validation_level(&mut self, level: ValidationLevel) {
        self.validation_level = level;
    }

    pub fn validation_level(&self) -> ValidationLevel {
        self.validation_level
    }

    /// Run the packager's pre-compiled validator at this message's level.
    pub fn validate(&self) -> Result<()> {
        self.packager.validator().validate_message(self, self.validation_level)
    }

    // --- TLV bridge ---

    /// Parse a TLV-carrying data element (e.g. DE 55) with the packager's
    /// TLV configuration. The raw field bytes stay available regardless of
    /// the outcome.
    pub fn tlv_elements(&self, field_num: u8) -> Result<Vec<Tlv<'_>>> {
        let spec = self.packager.tlv();
        if !spec.enabled {
            return Err(Error::Config("TLV support not enabled in packager".to_string()));
        }
        let parser = TlvParser::from_spec(&spec)?;
        let data = self.get_bytes(field_num)?;
        parser.parse(data).map_err(|e| e.for_field(field_num))
    }

    // --- lifecycle ---

    /// Empty the message in place for reuse; the packager binding stays.
    pub fn reset(&mut self) {
        self.mti = [0; 4];
        self.has_mti = false;
        self.header = None;
        self.bitmap.reset();
        self.presence = [0; 2];
        self.full_message = None;
        self.validation_level = ValidationLevel::None;
        for field in &mut self.fields {
            field.reset();
        }
    }

    /// Deep-copy every field into owned storage, detaching the message
    /// from the buffer it was decoded from.
    pub fn deep_copy(&self) -> Message<'static> {
        Message {
            mti: self.mti,
            has_mti: self.has_mti,
            header: self.header.as_ref().map(|h| Cow::Owned(h.to_vec())),
            bitmap: self.bitmap.clone(),
            fields: self.fields.iter().map(Field::to_owned_field).collect(),
            presence: self.presence,
            packager: Arc::clone(&self.packager),
            full_message: None,
            validation_level: self.validation_level,
        }
    }

    /// Consuming variant of [`Message::deep_copy`].
    pub fn into_owned(self) -> Message<'static> {
        self.deep_copy()
    }

    // --- response helpers ---

    /// Build a response: deep copy, MTI function digit flipped to '1',
    /// DE 39 set to `response_code`.
    pub fn create_response(&self, response_code: &str) -> Result<Message<'static>> {
        if !self.is_request() {
            return Err(Error::InvalidMti);
        }
        let mut response = self.deep_copy();
        response.mti[2] = b'1';
        response.set_field_owned(
            39,
            response_code.as_bytes().to_vec(),
            FieldType::AlphaNumericSpecial,
        )?;
        Ok(response)
    }

    /// Copy the standard echo fields present in `src` into this message
    /// (owned copies).
    pub fn copy_echo_fields(&mut self, src: &Message<'_>) -> Result<()> {
        for &field_num in &ECHO_FIELDS {
            if let Some(field) = src.field(field_num) {
                self.set_field_owned(field_num, field.bytes().to_vec(), field.field_type())?;
            }
        }
        Ok(())
    }
}
