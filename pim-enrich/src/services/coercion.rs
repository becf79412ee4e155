//! Type-directed value coercion
//!
//! Maps a raw value (usually a string or array straight out of an AI
//! response or an imported spreadsheet cell) onto an attribute's declared
//! type. Pure and total apart from unparseable numbers: enrichment quality
//! depends on tolerating messy model output, so the worst case for every
//! other type is a best-effort or identity pass-through, never an error.

use crate::models::AttributeType;
use serde_json::Value;
use thiserror::Error;

/// Coercion failure; the caller falls back to identity pass-through
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoercionFailure {
    #[error("Not a number: {0:?}")]
    NotNumeric(String),
}

/// A value conforming to an attribute's declared type
#[derive(Debug, Clone, PartialEq)]
pub enum CoercedValue {
    /// Free text (identity for the text types)
    Text(String),
    /// Parsed number
    Number(f64),
    /// Chosen option of a single_select
    Selection(String),
    /// Matched options of a multi_select (unmatched tokens dropped)
    Selections(Vec<String>),
    /// Measure: numeric value plus optional unit symbol
    Measure { value: f64, unit: Option<String> },
    /// Pass-through for values that did not fit the declared shape
    Raw(Value),
}

impl CoercedValue {
    /// JSON value and unit as persisted in a product's attribute map
    pub fn into_parts(self) -> (Value, Option<String>) {
        match self {
            CoercedValue::Text(s) | CoercedValue::Selection(s) => (Value::String(s), None),
            CoercedValue::Number(n) => (json_number(n), None),
            CoercedValue::Selections(items) => (
                Value::Array(items.into_iter().map(Value::String).collect()),
                None,
            ),
            CoercedValue::Measure { value, unit } => (json_number(value), unit),
            CoercedValue::Raw(v) => (v, None),
        }
    }
}

fn json_number(n: f64) -> Value {
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        // NaN/inf cannot be represented in JSON; keep the text form
        .unwrap_or_else(|| Value::String(n.to_string()))
}

/// Coerce a raw value onto `attr_type`
///
/// `options` is consulted only for the select types. The only failure case
/// is an unparseable `number`; everything else degrades to pass-through.
pub fn coerce(
    raw: &Value,
    attr_type: AttributeType,
    options: &[String],
) -> Result<CoercedValue, CoercionFailure> {
    match attr_type {
        AttributeType::Number => coerce_number(raw),
        AttributeType::SingleSelect => Ok(coerce_single_select(raw, options)),
        AttributeType::MultiSelect => Ok(coerce_multi_select(raw, options)),
        AttributeType::Measure => Ok(coerce_measure(raw)),
        AttributeType::ShortText | AttributeType::LongText | AttributeType::RichText => {
            Ok(match raw {
                Value::String(s) => CoercedValue::Text(s.clone()),
                other => CoercedValue::Raw(other.clone()),
            })
        }
    }
}

fn coerce_number(raw: &Value) -> Result<CoercedValue, CoercionFailure> {
    match raw {
        Value::Number(n) => n
            .as_f64()
            .map(CoercedValue::Number)
            .ok_or_else(|| CoercionFailure::NotNumeric(n.to_string())),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(CoercedValue::Number)
            .map_err(|_| CoercionFailure::NotNumeric(s.clone())),
        other => Err(CoercionFailure::NotNumeric(other.to_string())),
    }
}

/// Match one token against the options list
///
/// Order: exact (case-sensitive) → case-insensitive exact → case-insensitive
/// substring in either direction, first match in options order.
fn match_option(token: &str, options: &[String]) -> Option<String> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }

    if let Some(exact) = options.iter().find(|opt| opt.as_str() == token) {
        return Some(exact.clone());
    }

    let lower = token.to_lowercase();
    if let Some(ci) = options.iter().find(|opt| opt.to_lowercase() == lower) {
        return Some(ci.clone());
    }

    options
        .iter()
        .find(|opt| {
            let opt_lower = opt.to_lowercase();
            opt_lower.contains(&lower) || lower.contains(&opt_lower)
        })
        .cloned()
}

fn raw_as_text(raw: &Value) -> String {
    match raw {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn coerce_single_select(raw: &Value, options: &[String]) -> CoercedValue {
    let token = raw_as_text(raw);
    if options.is_empty() {
        // Nothing to constrain against; identity
        return CoercedValue::Raw(raw.clone());
    }

    match match_option(&token, options) {
        Some(matched) => CoercedValue::Selection(matched),
        // Documented lossy fallback: default to the first option
        None => CoercedValue::Selection(options[0].clone()),
    }
}

fn coerce_multi_select(raw: &Value, options: &[String]) -> CoercedValue {
    let tokens: Vec<String> = match raw {
        Value::Array(items) => items.iter().map(raw_as_text).collect(),
        other => raw_as_text(other)
            .split([',', ';'])
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
    };

    if options.is_empty() {
        return CoercedValue::Selections(tokens);
    }

    // Unmatched tokens are dropped silently
    let matched: Vec<String> = tokens
        .iter()
        .filter_map(|token| match_option(token, options))
        .collect();

    CoercedValue::Selections(matched)
}

/// Split a string like "10.5 USD" into a leading numeric literal and an
/// alphabetic unit token
fn split_measure(text: &str) -> Option<(f64, Option<String>)> {
    let trimmed = text.trim();

    // Leading numeric literal: optional sign, digits, optional fraction
    let mut end = 0;
    let bytes = trimmed.as_bytes();
    if end < bytes.len() && (bytes[end] == b'-' || bytes[end] == b'+') {
        end += 1;
    }
    let digits_start = end;
    while end < bytes.len() && (bytes[end].is_ascii_digit() || bytes[end] == b'.') {
        end += 1;
    }
    if end == digits_start {
        return None;
    }

    let value: f64 = trimmed[..end].parse().ok()?;

    let rest = trimmed[end..].trim();
    let unit: String = rest.chars().take_while(|c| c.is_ascii_alphabetic()).collect();

    Some((value, if unit.is_empty() { None } else { Some(unit) }))
}

fn coerce_measure(raw: &Value) -> CoercedValue {
    match raw {
        Value::Number(n) => match n.as_f64() {
            Some(value) => CoercedValue::Measure { value, unit: None },
            None => CoercedValue::Raw(raw.clone()),
        },
        Value::String(s) => match split_measure(s) {
            Some((value, unit)) => CoercedValue::Measure { value, unit },
            // Neither form parsed; pass the original through
            None => CoercedValue::Raw(raw.clone()),
        },
        other => CoercedValue::Raw(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn number_parses_strings_and_numbers() {
        assert_eq!(
            coerce(&json!("12.5"), AttributeType::Number, &[]),
            Ok(CoercedValue::Number(12.5))
        );
        assert_eq!(
            coerce(&json!(7), AttributeType::Number, &[]),
            Ok(CoercedValue::Number(7.0))
        );
        assert_eq!(
            coerce(&json!(" -3.25 "), AttributeType::Number, &[]),
            Ok(CoercedValue::Number(-3.25))
        );
    }

    #[test]
    fn number_failure_is_a_value_not_a_panic() {
        assert_eq!(
            coerce(&json!("abc"), AttributeType::Number, &[]),
            Err(CoercionFailure::NotNumeric("abc".to_string()))
        );
    }

    #[test]
    fn single_select_exact_match_is_case_sensitive_first() {
        let opts = options(&["Red", "red"]);
        assert_eq!(
            coerce(&json!("red"), AttributeType::SingleSelect, &opts),
            Ok(CoercedValue::Selection("red".to_string()))
        );
    }

    #[test]
    fn single_select_case_insensitive_match() {
        let opts = options(&["Red", "Green", "Blue"]);
        assert_eq!(
            coerce(&json!("red"), AttributeType::SingleSelect, &opts),
            Ok(CoercedValue::Selection("Red".to_string()))
        );
    }

    #[test]
    fn single_select_substring_match_either_direction() {
        let opts = options(&["Red", "Green", "Blue"]);
        // rawValue contains option
        assert_eq!(
            coerce(&json!("reddish"), AttributeType::SingleSelect, &opts),
            Ok(CoercedValue::Selection("Red".to_string()))
        );
        // option contains rawValue
        assert_eq!(
            coerce(&json!("ree"), AttributeType::SingleSelect, &opts),
            Ok(CoercedValue::Selection("Green".to_string()))
        );
    }

    #[test]
    fn single_select_defaults_to_first_option() {
        let opts = options(&["Red", "Green", "Blue"]);
        assert_eq!(
            coerce(&json!("Purple"), AttributeType::SingleSelect, &opts),
            Ok(CoercedValue::Selection("Red".to_string()))
        );
    }

    #[test]
    fn single_select_substring_first_match_wins_in_options_order() {
        let opts = options(&["Navy Blue", "Blue"]);
        assert_eq!(
            coerce(&json!("blue"), AttributeType::SingleSelect, &opts),
            // ci-exact pass finds "Blue" before the substring pass runs
            Ok(CoercedValue::Selection("Blue".to_string()))
        );
        assert_eq!(
            coerce(&json!("navy"), AttributeType::SingleSelect, &opts),
            Ok(CoercedValue::Selection("Navy Blue".to_string()))
        );
    }

    #[test]
    fn multi_select_splits_and_drops_unmatched() {
        let opts = options(&["A", "B", "C"]);
        assert_eq!(
            coerce(&json!("a, b, z"), AttributeType::MultiSelect, &opts),
            Ok(CoercedValue::Selections(vec!["A".to_string(), "B".to_string()]))
        );
    }

    #[test]
    fn multi_select_accepts_arrays_and_semicolons() {
        let opts = options(&["A", "B", "C"]);
        assert_eq!(
            coerce(&json!(["c", "nope"]), AttributeType::MultiSelect, &opts),
            Ok(CoercedValue::Selections(vec!["C".to_string()]))
        );
        assert_eq!(
            coerce(&json!("a;c"), AttributeType::MultiSelect, &opts),
            Ok(CoercedValue::Selections(vec!["A".to_string(), "C".to_string()]))
        );
    }

    #[test]
    fn measure_extracts_value_and_unit() {
        assert_eq!(
            coerce(&json!("10.5 USD"), AttributeType::Measure, &[]),
            Ok(CoercedValue::Measure {
                value: 10.5,
                unit: Some("USD".to_string())
            })
        );
        assert_eq!(
            coerce(&json!("250g"), AttributeType::Measure, &[]),
            Ok(CoercedValue::Measure {
                value: 250.0,
                unit: Some("g".to_string())
            })
        );
    }

    #[test]
    fn measure_plain_number_has_no_unit() {
        assert_eq!(
            coerce(&json!("42"), AttributeType::Measure, &[]),
            Ok(CoercedValue::Measure {
                value: 42.0,
                unit: None
            })
        );
        assert_eq!(
            coerce(&json!(9.5), AttributeType::Measure, &[]),
            Ok(CoercedValue::Measure {
                value: 9.5,
                unit: None
            })
        );
    }

    #[test]
    fn measure_unparseable_passes_through() {
        assert_eq!(
            coerce(&json!("about a kilo"), AttributeType::Measure, &[]),
            Ok(CoercedValue::Raw(json!("about a kilo")))
        );
    }

    #[test]
    fn text_types_are_identity() {
        for attr_type in [
            AttributeType::ShortText,
            AttributeType::LongText,
            AttributeType::RichText,
        ] {
            assert_eq!(
                coerce(&json!("as-is"), attr_type, &[]),
                Ok(CoercedValue::Text("as-is".to_string()))
            );
        }
    }

    #[test]
    fn into_parts_maps_to_persisted_shape() {
        let (value, unit) = CoercedValue::Measure {
            value: 10.5,
            unit: Some("USD".to_string()),
        }
        .into_parts();
        assert_eq!(value, json!(10.5));
        assert_eq!(unit.as_deref(), Some("USD"));

        let (value, unit) = CoercedValue::Selections(vec!["A".to_string()]).into_parts();
        assert_eq!(value, json!(["A"]));
        assert_eq!(unit, None);
    }
}
