//! Field and message validation.
//!
//! Rules are compiled once from a [`PackagerConfig`]: a length rule per
//! field (exact for fixed-width fields), a charset rule selected by the
//! field type, mandatory-presence bookkeeping, and any regex patterns.
//! Regexes compile at build time — a pattern that does not compile is a
//! schema-load error, never a runtime one. The resulting
//! [`CompiledValidator`] is read-only and safe to share across threads.

use std::collections::HashMap;

use crate::error::{Error, Result, ValidationError};
use crate::field::Field;
use crate::message::Message;
use crate::spec::{FieldType, LengthKind, PackagerConfig};

/// How much validation to run against a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationLevel {
    /// No validation at all.
    #[default]
    None,
    /// Mandatory presence plus per-field compiled rules.
    Basic,
    /// Basic, with length mismatches also enforced by the codec during
    /// decode and encode.
    Strict,
    /// Basic plus the globally registered rules.
    Custom,
}

/// One validation check. Implementations return a human-readable reason on
/// failure; the validator attaches the field number and rule name.
pub trait ValidationRule: Send + Sync {
    fn name(&self) -> &str;
    fn validate(&self, field: &Field<'_>) -> std::result::Result<(), String>;
}

/// Inclusive min/max or exact length. Zero means unset, matching the
/// schema's "0 = no bound" convention.
#[derive(Debug, Default)]
pub struct LengthRule {
    pub min_length: usize,
    pub max_length: usize,
    pub exact_length: usize,
    pub allow_empty: bool,
}

impl ValidationRule for LengthRule {
    fn name(&self) -> &str {
        "length"
    }

    fn validate(&self, field: &Field<'_>) -> std::result::Result<(), String> {
        let length = field.len();
        if length == 0 && self.allow_empty {
            return Ok(());
        }
        if self.exact_length > 0 && length != self.exact_length {
            return Err(format!("expected length {}, got {}", self.exact_length, length));
        }
        if self.min_length > 0 && length < self.min_length {
            return Err(format!("length {} below minimum {}", length, self.min_length));
        }
        if self.max_length > 0 && length > self.max_length {
            return Err(format!("length {} exceeds maximum {}", length, self.max_length));
        }
        Ok(())
    }
}

/// Every byte in `'0'..='9'`. Leading zeros are rejected when disallowed,
/// except for the single-digit value "0".
#[derive(Debug, Default)]
pub struct NumericRule {
    pub allow_empty: bool,
    pub allow_leading_zeros: bool,
}

impl ValidationRule for NumericRule {
    fn name(&self) -> &str {
        "numeric"
    }

    fn validate(&self, field: &Field<'_>) -> std::result::Result<(), String> {
        let data = field.bytes();
        if data.is_empty() && self.allow_empty {
            return Ok(());
        }
        for (i, &b) in data.iter().enumerate() {
            if !b.is_ascii_digit() {
                return Err(format!("non-numeric character at position {}", i));
            }
        }
        if !self.allow_leading_zeros && data.len() > 1 && data[0] == b'0' {
            return Err("leading zeros not allowed".to_string());
        }
        Ok(())
    }
}

/// Letters, digits, and space. `allow_special_chars` widens the set to any
/// printable ASCII; `custom_charset` replaces it with an exact allow-list.
#[derive(Debug, Default)]
pub struct AlphanumericRule {
    pub allow_empty: bool,
    pub allow_special_chars: bool,
    pub custom_charset: Option<String>,
}

impl ValidationRule for AlphanumericRule {
    fn name(&self) -> &str {
        "alphanumeric"
    }

    fn validate(&self, field: &Field<'_>) -> std::result::Result<(), String> {
        let data = field.bytes();
        if data.is_empty() && self.allow_empty {
            return Ok(());
        }
        for (i, &b) in data.iter().enumerate() {
            if let Some(charset) = &self.custom_charset {
                if !charset.as_bytes().contains(&b) {
                    return Err(format!("invalid character at position {}", i));
                }
            } else if self.allow_special_chars {
                if !(32..=126).contains(&b) {
                    return Err(format!("non-printable character at position {}", i));
                }
            } else if !(b.is_ascii_alphanumeric() || b == b' ') {
                return Err(format!("special character not allowed at position {}", i));
            }
        }
        Ok(())
    }
}

/// Binary content is unrestricted; optionally require an even byte count
/// (hex-carried binary).
#[derive(Debug, Default)]
pub struct BinaryRule {
    pub allow_empty: bool,
    pub require_even_length: bool,
}

impl ValidationRule for BinaryRule {
    fn name(&self) -> &str {
        "binary"
    }

    fn validate(&self, field: &Field<'_>) -> std::result::Result<(), String> {
        let data = field.bytes();
        if data.is_empty() && self.allow_empty {
            return Ok(());
        }
        if self.require_even_length && data.len() % 2 != 0 {
            return Err("binary data must have even length".to_string());
        }
        Ok(())
    }
}

/// Matches the field content against a pre-compiled regex.
#[derive(Debug)]
pub struct RegexRule {
    pattern: String,
    regex: regex::Regex,
    pub allow_empty: bool,
    pub description: Option<String>,
}

impl RegexRule {
    /// Compile the pattern now; a bad pattern is a schema-load error.
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = regex::Regex::new(pattern)
            .map_err(|e| Error::Config(format!("invalid pattern {:?}: {}", pattern, e)))?;
        Ok(RegexRule {
            pattern: pattern.to_string(),
            regex,
            allow_empty: false,
            description: None,
        })
    }
}

impl ValidationRule for RegexRule {
    fn name(&self) -> &str {
        "regex"
    }

    fn validate(&self, field: &Field<'_>) -> std::result::Result<(), String> {
        let data = field.as_str().unwrap_or("");
        if data.is_empty() && self.allow_empty {
            return Ok(());
        }
        if !self.regex.is_match(data) {
            return Err(self
                .description
                .clone()
                .unwrap_or_else(|| format!("does not match pattern {}", self.pattern)));
        }
        Ok(())
    }
}

/// Parses the field as a decimal integer and checks the inclusive range.
#[derive(Debug)]
pub struct RangeRule {
    pub min: i64,
    pub max: i64,
    pub allow_empty: bool,
}

impl ValidationRule for RangeRule {
    fn name(&self) -> &str {
        "range"
    }

    fn validate(&self, field: &Field<'_>) -> std::result::Result<(), String> {
        if field.is_empty() && self.allow_empty {
            return Ok(());
        }
        let value = field.as_int().ok_or_else(|| "cannot parse as integer".to_string())?;
        if value < self.min {
            return Err(format!("value {} below minimum {}", value, self.min));
        }
        if value > self.max {
            return Err(format!("value {} exceeds maximum {}", value, self.max));
        }
        Ok(())
    }
}

/// Requires the field to be populated.
#[derive(Debug, Default)]
pub struct PresenceRule {
    pub required: bool,
}

impl ValidationRule for PresenceRule {
    fn name(&self) -> &str {
        "presence"
    }

    fn validate(&self, field: &Field<'_>) -> std::result::Result<(), String> {
        if self.required && !field.is_present() {
            return Err("field is required".to_string());
        }
        Ok(())
    }
}

/// Baseline sanity check for magnetic-stripe track data.
#[derive(Debug, Default)]
pub struct TrackDataRule {
    pub allow_empty: bool,
}

impl ValidationRule for TrackDataRule {
    fn name(&self) -> &str {
        "track_data"
    }

    fn validate(&self, field: &Field<'_>) -> std::result::Result<(), String> {
        let data = field.bytes();
        if data.is_empty() && self.allow_empty {
            return Ok(());
        }
        if data.len() < 10 {
            return Err("track data too short".to_string());
        }
        Ok(())
    }
}

/// Caller-supplied predicate with a name for error reporting.
pub struct CustomRule {
    name: String,
    check: Box<dyn Fn(&Field<'_>) -> std::result::Result<(), String> + Send + Sync>,
}

impl CustomRule {
    pub fn new(
        name: impl Into<String>,
        check: impl Fn(&Field<'_>) -> std::result::Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        CustomRule {
            name: name.into(),
            check: Box::new(check),
        }
    }
}

impl ValidationRule for CustomRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, field: &Field<'_>) -> std::result::Result<(), String> {
        (self.check)(field)
    }
}

/// The rule set compiled from a schema. Field rules run under `Basic` and
/// above; global rules only under `Custom`.
pub struct CompiledValidator {
    mandatory: [u64; 2],
    field_rules: HashMap<u8, Vec<Box<dyn ValidationRule>>>,
    global_rules: Vec<Box<dyn ValidationRule>>,
}

impl CompiledValidator {
    /// Build the rule set for a config: length rule, charset rule by field
    /// type, mandatory bookkeeping, and any regex patterns (compiled now).
    pub fn compile(config: &PackagerConfig) -> Result<Self> {
        let mut mandatory = [0u64; 2];
        let mut field_rules: HashMap<u8, Vec<Box<dyn ValidationRule>>> = HashMap::new();

        for (&num, spec) in &config.fields {
            if spec.mandatory {
                mandatory[((num - 1) / 64) as usize] |= 1 << ((num - 1) % 64);
            }

            let mut rules: Vec<Box<dyn ValidationRule>> = Vec::new();

            if spec.length_kind == LengthKind::Fixed {
                rules.push(Box::new(LengthRule {
                    exact_length: spec.max_length,
                    ..LengthRule::default()
                }));
            } else {
                rules.push(Box::new(LengthRule {
                    min_length: spec.min_length,
                    max_length: spec.max_length,
                    ..LengthRule::default()
                }));
            }

            match spec.field_type {
                FieldType::Numeric => rules.push(Box::new(NumericRule {
                    allow_leading_zeros: true,
                    ..NumericRule::default()
                })),
                FieldType::AlphaNumeric => rules.push(Box::new(AlphanumericRule::default())),
                FieldType::AlphaNumericSpecial => rules.push(Box::new(AlphanumericRule {
                    allow_special_chars: true,
                    ..AlphanumericRule::default()
                })),
                FieldType::Binary => rules.push(Box::new(BinaryRule::default())),
                FieldType::Track => rules.push(Box::new(TrackDataRule::default())),
                FieldType::Custom => {}
            }

            if let Some(pattern) = &spec.pattern {
                rules.push(Box::new(RegexRule::new(pattern)?));
            }

            field_rules.insert(num, rules);
        }

        Ok(CompiledValidator {
            mandatory,
            field_rules,
            global_rules: Vec::new(),
        })
    }

    /// Append a rule applied to every present field under the `Custom`
    /// validation level.
    pub fn add_global_rule(&mut self, rule: Box<dyn ValidationRule>) {
        self.global_rules.push(rule);
    }

    fn is_mandatory(&self, field_num: u8) -> bool {
        self.mandatory[((field_num - 1) / 64) as usize] & (1 << ((field_num - 1) % 64)) != 0
    }

    /// Validate a whole message under the given level. Stops at the first
    /// violation.
    pub fn validate_message(&self, msg: &Message<'_>, level: ValidationLevel) -> Result<()> {
        if level == ValidationLevel::None {
            return Ok(());
        }
        let run_global = level == ValidationLevel::Custom;

        for field_num in 2..=128u8 {
            if self.is_mandatory(field_num) && !msg.has_field(field_num) {
                return Err(Error::MissingMandatoryField(field_num));
            }
            if let Some(field) = msg.field(field_num) {
                if field.is_present() {
                    self.validate_field(field_num, field, run_global)?;
                }
            }
        }
        Ok(())
    }

    /// Run a single field through its compiled rules (and the global set
    /// when requested).
    pub fn validate_field(
        &self,
        field_num: u8,
        field: &Field<'_>,
        with_global: bool,
    ) -> Result<()> {
        if let Some(rules) = self.field_rules.get(&field_num) {
            for rule in rules {
                if let Err(message) = rule.validate(field) {
                    return Err(Error::Validation(ValidationError {
                        field: field_num,
                        rule: rule.name().to_string(),
                        message,
                    }));
                }
            }
        }
        if with_global {
            for rule in &self.global_rules {
                if let Err(message) = rule.validate(field) {
                    return Err(Error::Validation(ValidationError {
                        field: field_num,
                        rule: rule.name().to_string(),
                        message,
                    }));
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for CompiledValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledValidator")
            .field("mandatory_count", &(self.mandatory[0].count_ones() + self.mandatory[1].count_ones()))
            .field("field_rule_count", &self.field_rules.len())
            .field("global_rule_count", &self.global_rules.len())
            .finish()
    }
}
