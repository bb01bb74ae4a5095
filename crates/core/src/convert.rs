//! Payload value coercion.
//!
//! Setters receive raw JSON and must validate its shape before touching the delegate. These
//! helpers do the shape checks and report failures as [`RestError::Conversion`] naming the
//! offending property.

use crate::constants::PROPERTY_UUID;
use crate::{RestError, RestResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value;

/// Wire format of every date-time: `2011-05-01T10:15:00.000+0000`.
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%z";

const FALLBACK_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%dT%H:%M%z",
];
const FALLBACK_NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

const TRUE_VALUES: [&str; 4] = ["true", "1", "on", "yes"];
const FALSE_VALUES: [&str; 4] = ["false", "0", "off", "no"];

pub fn format_datetime(value: &DateTime<Utc>) -> String {
    value.format(DATETIME_FORMAT).to_string()
}

/// Dates render as midnight UTC in the date-time format.
pub fn format_date(value: &NaiveDate) -> String {
    format_datetime(&value.and_time(NaiveTime::MIN).and_utc())
}

/// Parses a date-time in the wire format or one of the accepted fallbacks.
///
/// Values without an offset are taken as UTC; a bare date is midnight UTC.
pub fn parse_datetime(property: &str, raw: &str) -> RestResult<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    for format in std::iter::once(&DATETIME_FORMAT).chain(FALLBACK_DATETIME_FORMATS) {
        if let Ok(parsed) = DateTime::parse_from_str(raw, format) {
            return Ok(parsed.with_timezone(&Utc));
        }
    }
    for format in FALLBACK_NAIVE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(parsed.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN).and_utc());
    }
    Err(RestError::conversion(
        property,
        format!("Error converting date - correct format (ISO8601 Long): yyyy-MM-dd'T'HH:mm:ss.SSSZ, got '{raw}'"),
    ))
}

/// A JSON `null` becomes `None`; anything else must be a string.
pub fn optional_string(property: &str, value: &Value) -> RestResult<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        _ => Err(RestError::conversion(
            property,
            format!("{property} must be a string"),
        )),
    }
}

pub fn string(property: &str, value: &Value) -> RestResult<String> {
    optional_string(property, value)?
        .ok_or_else(|| RestError::conversion(property, format!("{property} cannot be null")))
}

/// Parses a boolean from JSON `true`/`false` or one of the accepted synonyms.
///
/// `"true"`, `"1"`, `"on"` and `"yes"` are true; `"false"`, `"0"`, `"off"` and `"no"` are false,
/// compared ignoring case and surrounding whitespace.
pub fn parse_boolean(property: &str, value: &Value) -> RestResult<bool> {
    let text = match value {
        Value::Bool(b) => return Ok(*b),
        Value::Number(n) => match n.as_f64() {
            Some(x) if x == 1.0 => return Ok(true),
            Some(x) if x == 0.0 => return Ok(false),
            _ => String::new(),
        },
        Value::String(s) => s.trim().to_lowercase(),
        _ => String::new(),
    };
    if TRUE_VALUES.contains(&text.as_str()) {
        return Ok(true);
    }
    if FALSE_VALUES.contains(&text.as_str()) {
        return Ok(false);
    }
    Err(RestError::conversion(
        property,
        format!(
            "Unexpected value: {value} set as the value of boolean. {TRUE_VALUES:?}{FALSE_VALUES:?} expected"
        ),
    ))
}

pub fn optional_number(property: &str, value: &Value) -> RestResult<Option<f64>> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| RestError::conversion(property, format!("{property} is out of range"))),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s.trim().parse().map(Some).map_err(|_| {
            RestError::conversion(property, format!("{property} must be a number, got '{s}'"))
        }),
        _ => Err(RestError::conversion(
            property,
            format!("{property} must be a number"),
        )),
    }
}

pub fn optional_datetime(property: &str, value: &Value) -> RestResult<Option<DateTime<Utc>>> {
    match optional_string(property, value)? {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => parse_datetime(property, &s).map(Some),
    }
}

pub fn optional_date(property: &str, value: &Value) -> RestResult<Option<NaiveDate>> {
    Ok(optional_datetime(property, value)?.map(|dt| dt.date_naive()))
}

/// Extracts a referenced id from a string or from an object carrying `uuid`.
///
/// Clients commonly post back a fetched object as a reference, so both shapes are accepted.
pub fn reference_id(property: &str, value: &Value) -> RestResult<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.trim().to_owned())),
        Value::Object(map) => match map.get(PROPERTY_UUID) {
            Some(Value::String(s)) => Ok(Some(s.trim().to_owned())),
            _ => Err(RestError::conversion(
                property,
                format!("{property} must be a uuid or an object with a uuid"),
            )),
        },
        _ => Err(RestError::conversion(
            property,
            format!("{property} must be a uuid or an object with a uuid"),
        )),
    }
}

/// Expects a JSON array.
pub fn array<'a>(property: &str, value: &'a Value) -> RestResult<&'a Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| RestError::conversion(property, format!("{property} must be a list")))
}

/// Expects a JSON object.
pub fn object<'a>(
    property: &str,
    value: &'a Value,
) -> RestResult<&'a serde_json::Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| RestError::conversion(property, format!("{property} must be an object")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_format_datetime_matches_wire_format() {
        let dt = Utc
            .with_ymd_and_hms(2011, 5, 1, 10, 15, 0)
            .single()
            .expect("valid datetime");

        assert_eq!(format_datetime(&dt), "2011-05-01T10:15:00.000+0000");
    }

    #[test]
    fn test_parse_datetime_accepts_fallbacks() {
        let expected = Utc
            .with_ymd_and_hms(2011, 5, 1, 10, 15, 0)
            .single()
            .expect("valid datetime");

        for raw in [
            "2011-05-01T10:15:00.000+0000",
            "2011-05-01T10:15:00Z",
            "2011-05-01T12:15:00.000+0200",
            "2011-05-01T10:15:00",
            "2011-05-01 10:15:00",
        ] {
            assert_eq!(
                parse_datetime("startDate", raw).expect("should parse"),
                expected,
                "{raw}"
            );
        }
        let midnight = parse_datetime("birthdate", "2011-05-01").expect("date parses");
        assert_eq!(format_datetime(&midnight), "2011-05-01T00:00:00.000+0000");
    }

    #[test]
    fn test_parse_datetime_rejects_garbage() {
        match parse_datetime("startDate", "yesterday") {
            Err(RestError::Conversion { property, .. }) => assert_eq!(property, "startDate"),
            other => panic!("Expected Conversion error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_boolean_synonyms() {
        for raw in ["true", "1", "on", "yes", " YES "] {
            assert!(parse_boolean("value", &json!(raw)).expect("true synonym"));
        }
        for raw in ["false", "0", "off", "no"] {
            assert!(!parse_boolean("value", &json!(raw)).expect("false synonym"));
        }
        assert!(parse_boolean("value", &json!(true)).expect("json bool"));
        assert!(!parse_boolean("value", &json!(0)).expect("numeric zero"));
        assert!(parse_boolean("value", &json!("maybe")).is_err());
        assert!(parse_boolean("value", &json!(null)).is_err());
    }

    #[test]
    fn test_parse_boolean_numbers_compare_by_value() {
        assert!(parse_boolean("value", &json!(1)).expect("integer one"));
        assert!(parse_boolean("value", &json!(1.0)).expect("float one"));
        assert!(!parse_boolean("value", &json!(0.0)).expect("float zero"));
        assert!(parse_boolean("value", &json!(2)).is_err());
        assert!(parse_boolean("value", &json!(0.5)).is_err());
    }

    #[test]
    fn test_reference_id_accepts_string_or_object() {
        assert_eq!(
            reference_id("concept", &json!("abc")).expect("string"),
            Some("abc".into())
        );
        assert_eq!(
            reference_id("concept", &json!({"uuid": "abc", "display": "x"})).expect("object"),
            Some("abc".into())
        );
        assert_eq!(reference_id("concept", &json!(null)).expect("null"), None);
        assert!(reference_id("concept", &json!({"display": "x"})).is_err());
        assert!(reference_id("concept", &json!(12)).is_err());
    }

    #[test]
    fn test_optional_number() {
        assert_eq!(optional_number("dose", &json!(2.5)).expect("number"), Some(2.5));
        assert_eq!(optional_number("dose", &json!("4")).expect("string"), Some(4.0));
        assert_eq!(optional_number("dose", &json!(null)).expect("null"), None);
        assert!(optional_number("dose", &json!("lots")).is_err());
    }
}
