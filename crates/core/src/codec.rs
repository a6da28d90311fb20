//! Conversion between the stored text representation and typed values.
//!
//! Every typed read, write, and comparison funnels through here. Parsing is
//! strict: the whole string must be one number, with distinct error kinds for
//! an empty string, no numeric prefix at all, trailing garbage after a valid
//! prefix, and values that do not fit the target width.

use crate::error::CoreError;
use crate::schema::FieldType;
use crate::value::FieldValue;

/// Formats a value as the text the property bag stores. Int is plain decimal;
/// Float uses the shortest representation that parses back to the identical
/// bit pattern, so encode/decode round-trips losslessly; Text passes through.
pub fn encode(value: &FieldValue) -> String {
    match value {
        FieldValue::Int(n) => n.to_string(),
        FieldValue::Float(n) => n.to_string(),
        FieldValue::Text(s) => s.clone(),
    }
}

pub fn decode(text: &str, field_type: FieldType) -> Result<FieldValue, CoreError> {
    match field_type {
        FieldType::Text => Ok(FieldValue::Text(text.to_owned())),
        FieldType::Int => decode_int(text).map(FieldValue::Int),
        FieldType::Float => decode_float(text).map(FieldValue::Float),
    }
}

fn decode_int(text: &str) -> Result<i64, CoreError> {
    if text.is_empty() {
        return Err(CoreError::EmptyValue);
    }
    let consumed = int_prefix_len(text);
    if consumed == 0 {
        return Err(CoreError::InvalidFormat(text.to_owned()));
    }
    if consumed < text.len() {
        return Err(CoreError::PartialConversion(text.to_owned()));
    }
    // full [sign]digits form; the only way this can still fail is overflow
    text.parse::<i64>()
        .map_err(|_| CoreError::OutOfRange(text.to_owned()))
}

fn decode_float(text: &str) -> Result<f64, CoreError> {
    if text.is_empty() {
        return Err(CoreError::EmptyValue);
    }
    let consumed = float_prefix_len(text);
    if consumed == 0 {
        return Err(CoreError::InvalidFormat(text.to_owned()));
    }
    if consumed < text.len() {
        return Err(CoreError::PartialConversion(text.to_owned()));
    }
    let parsed: f64 = text
        .parse()
        .map_err(|_| CoreError::InvalidFormat(text.to_owned()))?;
    // the grammar admits only finite literals, so infinity here means the
    // value overflowed f64
    if parsed.is_infinite() {
        return Err(CoreError::OutOfRange(text.to_owned()));
    }
    Ok(parsed)
}

/// Length of the longest `[+-]digits` prefix, or 0 if there is none.
fn int_prefix_len(text: &str) -> usize {
    let bytes = text.as_bytes();
    let mut i = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        i = 1;
    }
    let digits_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i == digits_start { 0 } else { i }
}

/// Length of the longest decimal/scientific float prefix, or 0 if there is
/// none. Accepts `[+-] digits [. digits] [eE [+-] digits]` and `.digits`
/// forms; the exponent marker only counts when digits follow it. The words
/// `inf` and `nan` are deliberately not part of the grammar.
fn float_prefix_len(text: &str) -> usize {
    let bytes = text.as_bytes();
    let mut i = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        i = 1;
    }
    let mut digits = 0;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
        digits += 1;
    }
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
            digits += 1;
        }
    }
    if digits == 0 {
        return 0;
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && matches!(bytes[j], b'+' | b'-') {
            j += 1;
        }
        let exp_digits_start = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_digits_start {
            i = j;
        }
    }
    i
}

/// Numeric comparison for `==`, `!=`, `>`, `>=`, `<`, `<=`. Both Int and
/// Float comparisons run through f64.
pub fn compare_numeric(lhs: f64, rhs: f64, op: &str) -> Result<bool, CoreError> {
    match op {
        "==" => Ok(lhs == rhs),
        "!=" => Ok(lhs != rhs),
        ">" => Ok(lhs > rhs),
        ">=" => Ok(lhs >= rhs),
        "<" => Ok(lhs < rhs),
        "<=" => Ok(lhs <= rhs),
        _ => Err(CoreError::UnsupportedOperator(op.to_owned())),
    }
}

/// Text comparison for `==`, `!=`, `contains`, `starts_with`, `ends_with`.
/// The operator token is matched case-insensitively; the comparison itself is
/// case-sensitive.
pub fn compare_text(lhs: &str, rhs: &str, op: &str) -> Result<bool, CoreError> {
    match op.to_ascii_lowercase().as_str() {
        "==" => Ok(lhs == rhs),
        "!=" => Ok(lhs != rhs),
        "contains" => Ok(lhs.contains(rhs)),
        "starts_with" => Ok(lhs.starts_with(rhs)),
        "ends_with" => Ok(lhs.ends_with(rhs)),
        _ => Err(CoreError::UnsupportedOperator(op.to_owned())),
    }
}
