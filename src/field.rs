//! Data element value container.
//!
//! A [`Field`] holds the bytes of one data element plus its type tag and a
//! presence flag. Storage is `Cow`-backed: values decoded by
//! [`Message::unpack`](crate::message::Message::unpack) borrow the input
//! buffer (zero-copy), values installed by setters are owned. The lifetime
//! parameter is the ownership contract — a borrowed field cannot outlive
//! the buffer it points into; [`Field::to_owned_field`] is the explicit
//! deep-copy escape hatch.

use std::borrow::Cow;

use crate::spec::FieldType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field<'a> {
    data: Cow<'a, [u8]>,
    field_type: FieldType,
    present: bool,
}

impl Default for Field<'_> {
    fn default() -> Self {
        Field {
            data: Cow::Borrowed(&[]),
            field_type: FieldType::AlphaNumericSpecial,
            present: false,
        }
    }
}

impl<'a> Field<'a> {
    /// Borrow a string value (zero-copy; the string must outlive the field).
    pub fn set_str(&mut self, value: &'a str, field_type: FieldType) {
        self.data = Cow::Borrowed(value.as_bytes());
        self.field_type = field_type;
        self.present = true;
    }

    /// Borrow a byte value (zero-copy; the slice must outlive the field).
    pub fn set_bytes(&mut self, value: &'a [u8], field_type: FieldType) {
        self.data = Cow::Borrowed(value);
        self.field_type = field_type;
        self.present = true;
    }

    /// Take ownership of a byte value.
    pub fn set_owned(&mut self, value: Vec<u8>, field_type: FieldType) {
        self.data = Cow::Owned(value);
        self.field_type = field_type;
        self.present = true;
    }

    /// Format an integer value. A `width` above zero left-pads with `'0'`
    /// to exactly that many digits; zero emits the minimal representation.
    pub fn set_int(&mut self, value: i64, field_type: FieldType, width: usize) {
        let formatted = if width > 0 {
            format!("{:0width$}", value, width = width)
        } else {
            value.to_string()
        };
        self.data = Cow::Owned(formatted.into_bytes());
        self.field_type = field_type;
        self.present = true;
    }

    pub fn bytes(&self) -> &[u8] {
        if self.present {
            &self.data
        } else {
            &[]
        }
    }

    /// The value as UTF-8 text, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(self.bytes()).ok()
    }

    /// The value parsed as a decimal integer.
    pub fn as_int(&self) -> Option<i64> {
        self.as_str()?.parse().ok()
    }

    pub fn len(&self) -> usize {
        if self.present {
            self.data.len()
        } else {
            0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_present(&self) -> bool {
        self.present
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn reset(&mut self) {
        self.data = Cow::Borrowed(&[]);
        self.field_type = FieldType::AlphaNumericSpecial;
        self.present = false;
    }

    /// Deep-copy into a field that owns its bytes and has no tie to the
    /// original input buffer.
    pub fn to_owned_field(&self) -> Field<'static> {
        Field {
            data: Cow::Owned(self.data.to_vec()),
            field_type: self.field_type,
            present: self.present,
        }
    }
}
