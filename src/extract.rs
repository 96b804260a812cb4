//! Declarative extraction of typed values from parsed messages.
//!
//! A [`BitValueSpec`] names a data element and describes how to pull a
//! business value out of it: optional 1-based inclusive substring range,
//! optional padding trim, a data-type charset check, and an optional
//! date/time format check. This is the one place where decode strips
//! padding; the core codec never does.

use std::collections::BTreeMap;

use crate::message::Message;

/// Charset expected of an extracted value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Numeric,
    Alpha,
    Alphanumeric,
    AlphanumericSpecial,
    Hex,
    #[default]
    Any,
}

/// Which side of the value carries padding. `Left` means the value is
/// left-justified, so padding sits on the right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Padding {
    Left,
    Right,
    #[default]
    None,
}

/// Date/time shape checks for extracted values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ValueFormat {
    #[serde(rename = "YYYYMMDD")]
    Yyyymmdd,
    #[serde(rename = "YYYY")]
    Yyyy,
    #[serde(rename = "YYMMDD")]
    Yymmdd,
    #[serde(rename = "HHMMSS")]
    Hhmmss,
}

/// How to extract and check one value from a data element.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct BitValueSpec {
    pub bit_number: u8,
    #[serde(default)]
    pub data_type: DataType,
    /// Expected length after extraction; 0 disables the check. Not
    /// enforced when padding is trimmed.
    #[serde(default)]
    pub length: usize,
    #[serde(default)]
    pub padding: Padding,
    #[serde(default)]
    pub pad_char: Option<char>,
    #[serde(default)]
    pub format: Option<ValueFormat>,
    /// 1-based inclusive substring range; both zero disables it.
    #[serde(default)]
    pub from: usize,
    #[serde(default)]
    pub until: usize,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub trim_padding: bool,
    #[serde(default)]
    pub alias: Option<String>,
}

/// Outcome for one extraction key.
#[derive(Debug, Clone)]
pub struct ExtractResult {
    pub value: String,
    pub bit_number: u8,
    pub data_type: DataType,
    pub is_valid: bool,
    pub error: Option<String>,
}

impl ExtractResult {
    fn invalid(spec: &BitValueSpec, error: String) -> Self {
        ExtractResult {
            value: String::new(),
            bit_number: spec.bit_number,
            data_type: spec.data_type,
            is_valid: false,
            error: Some(error),
        }
    }
}

/// Run every extraction spec against a message. Absent optional fields
/// produce no entry; absent required fields and failed checks produce an
/// invalid entry with the reason.
pub fn extract_values(
    msg: &Message<'_>,
    specs: &BTreeMap<String, BitValueSpec>,
) -> BTreeMap<String, ExtractResult> {
    let mut results = BTreeMap::new();

    for (key, spec) in specs {
        let raw = match msg.get_str(spec.bit_number) {
            Ok(s) => s.to_string(),
            Err(e) => {
                if spec.required {
                    results.insert(
                        key.clone(),
                        ExtractResult::invalid(spec, format!("bit {}: required but not found: {}", spec.bit_number, e)),
                    );
                }
                continue;
            }
        };

        let extracted = if spec.from > 0 && spec.until > 0 {
            match extract_substring(&raw, spec.from, spec.until) {
                Ok(s) => s.to_string(),
                Err(e) => {
                    results.insert(key.clone(), ExtractResult::invalid(spec, format!("bit {}: {}", spec.bit_number, e)));
                    continue;
                }
            }
        } else {
            raw
        };

        let extracted = if spec.trim_padding {
            trim_padding(&extracted, spec.padding, spec.pad_char)
        } else {
            extracted
        };

        if let Some(format) = spec.format {
            if let Err(e) = check_format(&extracted, format) {
                let mut result = ExtractResult::invalid(spec, format!("bit {}: {}", spec.bit_number, e));
                result.value = extracted;
                results.insert(key.clone(), result);
                continue;
            }
        }

        if let Err(e) = check_data_type(&extracted, spec.data_type) {
            let mut result = ExtractResult::invalid(spec, format!("bit {}: {}", spec.bit_number, e));
            result.value = extracted;
            results.insert(key.clone(), result);
            continue;
        }

        if spec.length > 0 && !spec.trim_padding && extracted.len() != spec.length {
            let mut result = ExtractResult::invalid(
                spec,
                format!("bit {}: expected length {}, got {}", spec.bit_number, spec.length, extracted.len()),
            );
            result.value = extracted;
            results.insert(key.clone(), result);
            continue;
        }

        results.insert(
            key.clone(),
            ExtractResult {
                value: extracted,
                bit_number: spec.bit_number,
                data_type: spec.data_type,
                is_valid: true,
                error: None,
            },
        );
    }

    results
}

fn trim_padding(value: &str, padding: Padding, pad_char: Option<char>) -> String {
    let pad = match pad_char {
        Some(c) => c,
        None => return value.to_string(),
    };
    match padding {
        // Left-justified value: padding accumulates on the right.
        Padding::Left => value.trim_end_matches(pad).to_string(),
        // Right-justified value: padding accumulates on the left.
        Padding::Right => value.trim_start_matches(pad).to_string(),
        Padding::None => value.to_string(),
    }
}

fn extract_substring(value: &str, from: usize, until: usize) -> Result<&str, String> {
    if from < 1 || until < 1 {
        return Err(format!("invalid indices: from={}, until={} (must be >= 1)", from, until));
    }
    if from > until {
        return Err(format!("invalid range: from={} > until={}", from, until));
    }
    let start = from - 1;
    if start >= value.len() {
        return Err(format!("start index {} exceeds value length {}", from, value.len()));
    }
    if until > value.len() {
        return Err(format!("end index {} exceeds value length {}", until, value.len()));
    }
    Ok(&value[start..until])
}

fn check_format(value: &str, format: ValueFormat) -> Result<(), String> {
    match format {
        ValueFormat::Yyyymmdd => {
            if value.len() != 8 {
                return Err(format!("invalid YYYYMMDD format: expected 8 digits, got {}", value.len()));
            }
            let digits = parse_digits(value)?;
            let year = digits / 10000;
            let month = (digits / 100) % 100;
            let day = digits % 100;
            if !(1..=12).contains(&month) || day < 1 || day > days_in_month(year, month) {
                return Err(format!("invalid YYYYMMDD date: {}", value));
            }
        }
        ValueFormat::Yyyy => {
            if value.len() != 4 {
                return Err(format!("invalid YYYY format: expected 4 digits, got {}", value.len()));
            }
            let year = parse_digits(value)?;
            if !(1900..=2100).contains(&year) {
                return Err(format!("invalid year: {}", value));
            }
        }
        ValueFormat::Yymmdd => {
            if value.len() != 6 {
                return Err(format!("invalid YYMMDD format: expected 6 digits, got {}", value.len()));
            }
            parse_digits(value)?;
        }
        ValueFormat::Hhmmss => {
            if value.len() != 6 {
                return Err(format!("invalid HHMMSS format: expected 6 digits, got {}", value.len()));
            }
            let digits = parse_digits(value)?;
            let (h, m, s) = (digits / 10000, (digits / 100) % 100, digits % 100);
            if h > 23 || m > 59 || s > 59 {
                return Err(format!("invalid HHMMSS time: {}", value));
            }
        }
    }
    Ok(())
}

fn parse_digits(value: &str) -> Result<u32, String> {
    value
        .parse::<u32>()
        .map_err(|_| format!("non-numeric value: {}", value))
}

fn days_in_month(year: u32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            let leap = (year % 4 == 0 && year % 100 != 0) || year % 400 == 0;
            if leap {
                29
            } else {
                28
            }
        }
        _ => 0,
    }
}

fn check_data_type(value: &str, data_type: DataType) -> Result<(), String> {
    let check = |pred: fn(char) -> bool, what: &str| -> Result<(), String> {
        for (i, c) in value.chars().enumerate() {
            if !pred(c) {
                return Err(format!("invalid {} character '{}' at position {}", what, c, i));
            }
        }
        Ok(())
    };
    match data_type {
        DataType::Any => Ok(()),
        DataType::Numeric => check(|c| c.is_ascii_digit(), "numeric"),
        DataType::Alpha => check(|c| c.is_ascii_alphabetic(), "alpha"),
        DataType::Alphanumeric => check(|c| c.is_ascii_alphanumeric(), "alphanumeric"),
        DataType::AlphanumericSpecial => check(
            |c| c.is_ascii_alphanumeric() || " -_./@#$%&*()+=,:;!?".contains(c),
            "alphanumeric-special",
        ),
        DataType::Hex => check(|c| c.is_ascii_hexdigit(), "hex"),
    }
}
