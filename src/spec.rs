//! Schema model: per-field specifications, envelope configuration, and the
//! compiled packager used by the codec.
//!
//! A [`PackagerConfig`] is plain declarative data (typically loaded from
//! JSON). [`CompiledPackager::compile`] flattens it into an indexed lookup
//! table and pre-compiles the validation rules, producing an immutable
//! value that can be shared across any number of concurrent encoders and
//! decoders behind an `Arc`.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::validate::{CompiledValidator, ValidationRule};

/// Generates a config enum that deserializes from either its integer
/// ordinal or any of its textual names (case-insensitive), and serializes
/// as its canonical name.
macro_rules! lenient_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $variant:ident = $ord:literal => [ $($alias:literal),+ $(,)? ] ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $variant = $ord ),+
        }

        impl $name {
            pub fn from_name(s: &str) -> Option<Self> {
                match s.trim().to_ascii_uppercase().as_str() {
                    $( $($alias)|+ => Some(Self::$variant), )+
                    _ => None,
                }
            }

            pub fn from_ordinal(n: u64) -> Option<Self> {
                match n {
                    $( $ord => Some(Self::$variant), )+
                    _ => None,
                }
            }

            pub fn name(&self) -> &'static str {
                match self {
                    $( Self::$variant => lenient_enum!(@first $($alias),+), )+
                }
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
                s.serialize_str(self.name())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
                struct V;
                impl<'de> serde::de::Visitor<'de> for V {
                    type Value = $name;

                    fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                        write!(f, "an ordinal or name for {}", stringify!($name))
                    }

                    fn visit_u64<E: serde::de::Error>(self, v: u64) -> std::result::Result<$name, E> {
                        $name::from_ordinal(v)
                            .ok_or_else(|| E::custom(format!("unknown {} ordinal {}", stringify!($name), v)))
                    }

                    fn visit_i64<E: serde::de::Error>(self, v: i64) -> std::result::Result<$name, E> {
                        u64::try_from(v)
                            .ok()
                            .and_then($name::from_ordinal)
                            .ok_or_else(|| E::custom(format!("unknown {} ordinal {}", stringify!($name), v)))
                    }

                    fn visit_str<E: serde::de::Error>(self, v: &str) -> std::result::Result<$name, E> {
                        $name::from_name(v)
                            .ok_or_else(|| E::custom(format!("unknown {} name {:?}", stringify!($name), v)))
                    }
                }
                d.deserialize_any(V)
            }
        }
    };
    (@first $first:literal $(, $rest:literal)*) => { $first };
}

lenient_enum! {
    /// Content class of a data element. Drives charset validation and the
    /// padding side for fixed-width fields (numeric pads left with `'0'`,
    /// everything else pads right with `' '`).
    FieldType {
        AlphaNumericSpecial = 0 => ["ANS", "ALPHA_NUMERIC_SPECIAL"],
        AlphaNumeric = 1 => ["AN", "ALPHA_NUMERIC"],
        Numeric = 2 => ["N", "NUMERIC"],
        Binary = 3 => ["B", "BINARY"],
        Track = 4 => ["Z", "TRACK"],
        Custom = 5 => ["CUSTOM"],
    }
}

lenient_enum! {
    /// Framing of a data element: fixed width or a 2/3/4-digit
    /// ASCII-decimal length prefix.
    LengthKind {
        Fixed = 0 => ["FIXED"],
        Llvar = 1 => ["LLVAR"],
        Lllvar = 2 => ["LLLVAR"],
        Llllvar = 3 => ["LLLLVAR"],
    }
}

lenient_enum! {
    /// Wire form of the 64-bit bitmap blocks: 8 raw bytes or 16 ASCII hex
    /// characters per block.
    BitmapEncoding {
        Binary = 0 => ["BINARY"],
        Hex = 1 => ["HEX", "ASCII_HEX"],
    }
}

lenient_enum! {
    /// Frame-level message length prefix.
    LengthIndicatorKind {
        None = 0 => ["NONE"],
        BinaryBe = 1 => ["BINARY", "BINARY_BE"],
        AsciiDec = 2 => ["ASCII", "ASCII_DEC"],
        AsciiHex = 3 => ["HEX", "ASCII_HEX"],
    }
}

lenient_enum! {
    /// Message header class. Header bytes are opaque and preserved
    /// verbatim; only the width drives the codec.
    HeaderKind {
        None = 0 => ["NONE"],
        Binary = 1 => ["BINARY"],
        Ascii = 2 => ["ASCII"],
        Hex = 3 => ["HEX"],
        Custom = 4 => ["CUSTOM"],
    }
}

lenient_enum! {
    /// TLV wire format used inside TLV-carrying data elements (DE 55).
    TlvKind {
        Standard = 0 => ["STANDARD"],
        Emv = 1 => ["EMV"],
        Ascii = 2 => ["ASCII"],
    }
}

impl LengthKind {
    /// Number of ASCII-decimal digits in the length prefix (0 for fixed).
    pub fn prefix_digits(&self) -> usize {
        match self {
            LengthKind::Fixed => 0,
            LengthKind::Llvar => 2,
            LengthKind::Lllvar => 3,
            LengthKind::Llllvar => 4,
        }
    }

    /// Largest value the length prefix can express.
    pub fn prefix_capacity(&self) -> usize {
        match self {
            LengthKind::Fixed => 0,
            LengthKind::Llvar => 99,
            LengthKind::Lllvar => 999,
            LengthKind::Llllvar => 9999,
        }
    }
}

/// Specification for a single data element (2..=128).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FieldSpec {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(rename = "length")]
    pub length_kind: LengthKind,
    /// Exact length for `Fixed`, upper bound on the declared length otherwise.
    pub max_length: usize,
    /// Optional lower bound; 0 means unset.
    #[serde(default)]
    pub min_length: usize,
    #[serde(default)]
    pub mandatory: bool,
    /// Optional regex the field content must match; compiled when the
    /// packager is compiled.
    #[serde(default, rename = "format", skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

/// Frame-level length prefix configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LengthIndicatorSpec {
    #[serde(rename = "type", default = "LengthIndicatorSpec::default_kind")]
    pub kind: LengthIndicatorKind,
    #[serde(rename = "length", default)]
    pub width: usize,
}

impl LengthIndicatorSpec {
    fn default_kind() -> LengthIndicatorKind {
        LengthIndicatorKind::None
    }
}

impl Default for LengthIndicatorSpec {
    fn default() -> Self {
        LengthIndicatorSpec {
            kind: LengthIndicatorKind::None,
            width: 0,
        }
    }
}

/// Message header configuration (e.g. a TPDU).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct HeaderSpec {
    #[serde(rename = "type", default = "HeaderSpec::default_kind")]
    pub kind: HeaderKind,
    #[serde(rename = "length", default)]
    pub width: usize,
}

impl HeaderSpec {
    fn default_kind() -> HeaderKind {
        HeaderKind::None
    }
}

impl Default for HeaderSpec {
    fn default() -> Self {
        HeaderSpec {
            kind: HeaderKind::None,
            width: 0,
        }
    }
}

/// TLV handling configuration for TLV-carrying data elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TlvSpec {
    #[serde(rename = "type", default = "TlvSpec::default_kind")]
    pub kind: TlvKind,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "TlvSpec::default_max_depth")]
    pub max_depth: usize,
    /// ASCII mode: number of tag characters.
    #[serde(default = "TlvSpec::default_ascii_chars")]
    pub ascii_tag_len: usize,
    /// ASCII mode: number of length characters.
    #[serde(default = "TlvSpec::default_ascii_chars")]
    pub ascii_len_len: usize,
    /// ASCII mode: radix of the length characters; 10 or 16 only.
    #[serde(default = "TlvSpec::default_ascii_base")]
    pub ascii_len_base: u32,
}

impl TlvSpec {
    fn default_kind() -> TlvKind {
        TlvKind::Standard
    }
    fn default_max_depth() -> usize {
        3
    }
    fn default_ascii_chars() -> usize {
        2
    }
    fn default_ascii_base() -> u32 {
        10
    }
}

impl Default for TlvSpec {
    fn default() -> Self {
        TlvSpec {
            kind: TlvKind::Standard,
            enabled: false,
            max_depth: 3,
            ascii_tag_len: 2,
            ascii_len_len: 2,
            ascii_len_base: 10,
        }
    }
}

/// Declarative packager description: one [`FieldSpec`] per data element
/// plus the four envelope choices. Field 1 is reserved for the bitmap and
/// must not appear.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PackagerConfig {
    #[serde(default)]
    pub fields: BTreeMap<u8, FieldSpec>,
    #[serde(default = "PackagerConfig::default_bitmap_encoding")]
    pub bitmap_encoding: BitmapEncoding,
    #[serde(default)]
    pub length_indicator: LengthIndicatorSpec,
    #[serde(default)]
    pub header: HeaderSpec,
    #[serde(default)]
    pub tlv: TlvSpec,
}

impl PackagerConfig {
    fn default_bitmap_encoding() -> BitmapEncoding {
        BitmapEncoding::Hex
    }
}

impl Default for PackagerConfig {
    fn default() -> Self {
        PackagerConfig {
            fields: BTreeMap::new(),
            bitmap_encoding: BitmapEncoding::Hex,
            length_indicator: LengthIndicatorSpec::default(),
            header: HeaderSpec::default(),
            tlv: TlvSpec::default(),
        }
    }
}

/// A [`PackagerConfig`] flattened for O(1) field lookup, with its
/// validation rules pre-compiled. Immutable; share via `Arc`.
pub struct CompiledPackager {
    fields: [Option<FieldSpec>; 129],
    bitmap_encoding: BitmapEncoding,
    length_indicator: LengthIndicatorSpec,
    header: HeaderSpec,
    tlv: TlvSpec,
    validator: CompiledValidator,
}

impl std::fmt::Debug for CompiledPackager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledPackager")
            .field("configured_fields", &self.fields.iter().filter(|s| s.is_some()).count())
            .field("bitmap_encoding", &self.bitmap_encoding)
            .field("length_indicator", &self.length_indicator)
            .field("header", &self.header)
            .field("tlv", &self.tlv)
            .finish()
    }
}

impl CompiledPackager {
    /// Compile a declarative config. Fails on a reserved or out-of-range
    /// field number, a zero `max_length`, or a regex that does not compile.
    pub fn compile(config: &PackagerConfig) -> Result<Self> {
        Self::compile_with_rules(config, Vec::new())
    }

    /// Like [`CompiledPackager::compile`], with extra rules appended to the
    /// validator's global set (run under the `Custom` validation level).
    pub fn compile_with_rules(
        config: &PackagerConfig,
        global_rules: Vec<Box<dyn ValidationRule>>,
    ) -> Result<Self> {
        let mut fields: [Option<FieldSpec>; 129] = std::array::from_fn(|_| None);
        for (&num, spec) in &config.fields {
            if num < 2 || num > 128 {
                return Err(Error::Config(format!(
                    "field number {} out of range (field 1 is the bitmap)",
                    num
                )));
            }
            if spec.max_length == 0 {
                return Err(Error::Config(format!("field {}: max_length must be positive", num)));
            }
            if spec.min_length > spec.max_length {
                return Err(Error::Config(format!(
                    "field {}: min_length {} exceeds max_length {}",
                    num, spec.min_length, spec.max_length
                )));
            }
            fields[num as usize] = Some(spec.clone());
        }

        let mut validator = CompiledValidator::compile(config)?;
        for rule in global_rules {
            validator.add_global_rule(rule);
        }

        Ok(CompiledPackager {
            fields,
            bitmap_encoding: config.bitmap_encoding,
            length_indicator: config.length_indicator,
            header: config.header,
            tlv: config.tlv,
            validator,
        })
    }

    /// Load and compile a JSON packager description.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let config: PackagerConfig =
            serde_json::from_slice(data).map_err(|e| Error::Config(e.to_string()))?;
        Self::compile(&config)
    }

    /// Compile the built-in standard DE 2..=128 schema.
    pub fn standard() -> Result<Self> {
        Self::compile(&default_config())
    }

    pub fn field_spec(&self, field_num: u8) -> Option<&FieldSpec> {
        self.fields.get(field_num as usize).and_then(Option::as_ref)
    }

    pub fn bitmap_encoding(&self) -> BitmapEncoding {
        self.bitmap_encoding
    }

    pub fn length_indicator(&self) -> LengthIndicatorSpec {
        self.length_indicator
    }

    pub fn header(&self) -> HeaderSpec {
        self.header
    }

    pub fn tlv(&self) -> TlvSpec {
        self.tlv
    }

    pub fn validator(&self) -> &CompiledValidator {
        &self.validator
    }
}

/// The standard ISO 8583 field table: hex bitmap, no length indicator, no
/// header, TLV disabled. Mandatory flags follow common acquirer defaults.
pub fn default_config() -> PackagerConfig {
    use FieldType::{AlphaNumericSpecial as ANS, Binary as B, Numeric as N, Track as Z};
    use LengthKind::{Fixed, Llvar, Lllvar};

    fn de(t: FieldType, k: LengthKind, max: usize, mandatory: bool) -> FieldSpec {
        FieldSpec {
            field_type: t,
            length_kind: k,
            max_length: max,
            min_length: 0,
            mandatory,
            pattern: None,
        }
    }

    let mut fields = BTreeMap::new();
    fields.insert(2, de(N, Llvar, 19, false)); // Primary Account Number
    fields.insert(3, de(N, Fixed, 6, true)); // Processing Code
    fields.insert(4, de(N, Fixed, 12, true)); // Amount, Transaction
    fields.insert(5, de(N, Fixed, 12, false)); // Amount, Settlement
    fields.insert(6, de(N, Fixed, 12, false)); // Amount, Cardholder Billing
    fields.insert(7, de(N, Fixed, 10, true)); // Transmission Date & Time
    fields.insert(8, de(N, Fixed, 8, false)); // Amount, Cardholder Billing Fee
    fields.insert(9, de(N, Fixed, 8, false)); // Conversion Rate, Settlement
    fields.insert(10, de(N, Fixed, 8, false)); // Conversion Rate, Cardholder Billing
    fields.insert(11, de(N, Fixed, 6, true)); // System Trace Audit Number
    fields.insert(12, de(N, Fixed, 6, true)); // Time, Local Transaction
    fields.insert(13, de(N, Fixed, 4, true)); // Date, Local Transaction
    fields.insert(14, de(N, Fixed, 4, false)); // Date, Expiration
    fields.insert(15, de(N, Fixed, 4, false)); // Date, Settlement
    fields.insert(16, de(N, Fixed, 4, false)); // Date, Conversion
    fields.insert(17, de(N, Fixed, 4, false)); // Date, Capture
    fields.insert(18, de(N, Fixed, 4, false)); // Merchant Type
    fields.insert(19, de(N, Fixed, 4, false)); // Acquiring Institution Country Code
    fields.insert(20, de(N, Fixed, 4, false)); // PAN Extended, Country Code
    fields.insert(21, de(N, Fixed, 3, false)); // Forwarding Institution Country Code
    fields.insert(22, de(N, Fixed, 3, true)); // Point of Service Entry Mode
    fields.insert(23, de(N, Fixed, 3, false)); // Application PAN Sequence Number
    fields.insert(24, de(N, Fixed, 3, false)); // Network International Identifier
    fields.insert(25, de(N, Fixed, 2, true)); // Point of Service Condition Code
    fields.insert(26, de(N, Fixed, 2, false)); // Point of Service Capture Code
    fields.insert(27, de(N, Fixed, 3, false)); // Authorizing ID Response Length
    fields.insert(28, de(N, Fixed, 9, false)); // Amount, Transaction Fee
    fields.insert(29, de(N, Fixed, 3, false)); // Amount, Settlement Fee
    fields.insert(30, de(N, Fixed, 3, false)); // Amount, Transaction Processing Fee
    fields.insert(31, de(N, Llvar, 99, false)); // Amount, Settlement Processing Fee
    fields.insert(32, de(N, Llvar, 99, false)); // Acquiring Institution ID Code
    fields.insert(33, de(N, Llvar, 99, false)); // Forwarding Institution ID Code
    fields.insert(34, de(ANS, Llvar, 28, false)); // Primary Account Number, Extended
    fields.insert(35, de(Z, Llvar, 37, false)); // Track 2 Data
    fields.insert(36, de(Z, Llvar, 99, false)); // Track 3 Data
    fields.insert(37, de(ANS, Fixed, 12, false)); // Retrieval Reference Number
    fields.insert(38, de(ANS, Fixed, 6, false)); // Authorization ID Response
    fields.insert(39, de(ANS, Fixed, 2, false)); // Response Code
    fields.insert(40, de(ANS, Fixed, 3, false)); // Service Restriction Code
    fields.insert(41, de(ANS, Fixed, 8, false)); // Card Acceptor Terminal ID
    fields.insert(42, de(ANS, Fixed, 15, false)); // Card Acceptor ID Code
    fields.insert(43, de(ANS, Fixed, 40, false)); // Card Acceptor Name/Location
    fields.insert(44, de(ANS, Llvar, 25, false)); // Additional Response Data
    fields.insert(45, de(ANS, Llvar, 76, false)); // Track 1 Data
    fields.insert(46, de(ANS, Lllvar, 999, false)); // Additional Data - ISO
    fields.insert(47, de(ANS, Lllvar, 999, false)); // Additional Data - National
    fields.insert(48, de(ANS, Lllvar, 999, false)); // Additional Data - Private
    fields.insert(49, de(ANS, Fixed, 3, true)); // Currency Code, Transaction
    fields.insert(50, de(ANS, Fixed, 3, false)); // Currency Code, Settlement
    fields.insert(51, de(ANS, Fixed, 3, false)); // Currency Code, Cardholder Billing
    fields.insert(52, de(B, Fixed, 16, false)); // PIN Data
    fields.insert(53, de(N, Fixed, 16, false)); // Security Related Control Information
    fields.insert(54, de(ANS, Lllvar, 120, false)); // Additional Amounts
    fields.insert(55, de(B, Lllvar, 999, false)); // ICC Data (EMV)
    fields.insert(56, de(ANS, Lllvar, 999, false)); // Reserved ISO
    for n in 57..=59 {
        fields.insert(n, de(ANS, Lllvar, 999, false)); // Reserved National
    }
    for n in 60..=63 {
        fields.insert(n, de(ANS, Lllvar, 999, false)); // Reserved Private
    }
    fields.insert(64, de(B, Fixed, 8, false)); // Message Authentication Code

    fields.insert(65, de(B, Fixed, 1, false)); // Extended Bitmap
    fields.insert(66, de(N, Fixed, 1, false)); // Settlement Code
    fields.insert(67, de(N, Fixed, 2, false)); // Extended Payment Code
    fields.insert(68, de(N, Fixed, 3, false)); // Receiving Institution Country Code
    fields.insert(69, de(N, Fixed, 3, false)); // Settlement Institution Country Code
    fields.insert(70, de(N, Fixed, 3, false)); // Network Management Information Code
    fields.insert(71, de(N, Fixed, 4, false)); // Message Number
    fields.insert(72, de(N, Fixed, 4, false)); // Message Number, Last
    fields.insert(73, de(N, Fixed, 6, false)); // Date, Action
    for n in 74..=81 {
        fields.insert(n, de(N, Fixed, 10, false)); // Credits/debits/transfer counters
    }
    for n in 82..=85 {
        fields.insert(n, de(N, Fixed, 12, false)); // Processing/transaction fee amounts
    }
    for n in 86..=89 {
        fields.insert(n, de(N, Fixed, 16, false)); // Credits/debits amounts
    }
    fields.insert(90, de(N, Fixed, 42, false)); // Original Data Elements
    fields.insert(91, de(ANS, Fixed, 1, false)); // File Update Code
    fields.insert(92, de(ANS, Fixed, 2, false)); // File Security Code
    fields.insert(93, de(ANS, Fixed, 5, false)); // Response Indicator
    fields.insert(94, de(ANS, Fixed, 7, false)); // Service Indicator
    fields.insert(95, de(ANS, Fixed, 42, false)); // Replacement Amounts
    fields.insert(96, de(B, Fixed, 8, false)); // Message Security Code
    fields.insert(97, de(N, Fixed, 17, false)); // Amount, Net Settlement
    fields.insert(98, de(ANS, Fixed, 25, false)); // Payee
    fields.insert(99, de(N, Llvar, 11, false)); // Settlement Institution ID Code
    fields.insert(100, de(N, Llvar, 11, false)); // Receiving Institution ID Code
    fields.insert(101, de(ANS, Llvar, 17, false)); // File Name
    fields.insert(102, de(ANS, Llvar, 28, false)); // Account Identification 1
    fields.insert(103, de(ANS, Llvar, 28, false)); // Account Identification 2
    fields.insert(104, de(ANS, Lllvar, 100, false)); // Transaction Description
    for n in 105..=127 {
        fields.insert(n, de(ANS, Lllvar, 999, false)); // Reserved ISO/national/private
    }
    fields.insert(128, de(B, Fixed, 8, false)); // Message Authentication Code

    PackagerConfig {
        fields,
        bitmap_encoding: BitmapEncoding::Hex,
        length_indicator: LengthIndicatorSpec::default(),
        header: HeaderSpec::default(),
        tlv: TlvSpec::default(),
    }
}
