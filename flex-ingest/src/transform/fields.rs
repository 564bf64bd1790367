//! Lenient field accessors over raw upstream records.
//!
//! Missing keys, JSON nulls and values of the wrong shape all come back as
//! `None`; nothing here fails.

use flex_client::domain::timestamp::parse_naive;
use serde_json::Value;
use time::PrimitiveDateTime;

use crate::sources::RawRecord;

pub fn text(raw: &RawRecord, key: &str) -> Option<String> {
    match raw.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn number(raw: &RawRecord, key: &str) -> Option<f64> {
    match raw.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn timestamp(raw: &RawRecord, key: &str) -> Option<PrimitiveDateTime> {
    let value = raw.get(key)?;
    if value.is_null() {
        return None;
    }

    let parsed = value.as_str().and_then(parse_naive);
    if parsed.is_none() {
        metrics::counter!("normalize_unparseable_timestamps_total", "field" => key.to_string())
            .increment(1);
        tracing::debug!(field = key, value = %value, "unparseable timestamp coerced to null");
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::datetime;

    fn raw(v: Value) -> RawRecord {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn text_accepts_strings_and_scalars() {
        let r = raw(json!({ "a": "Zone 1", "b": 17, "c": null, "d": "  ", "e": [1] }));
        assert_eq!(text(&r, "a").as_deref(), Some("Zone 1"));
        assert_eq!(text(&r, "b").as_deref(), Some("17"));
        assert_eq!(text(&r, "c"), None);
        assert_eq!(text(&r, "d"), None);
        assert_eq!(text(&r, "e"), None);
        assert_eq!(text(&r, "missing"), None);
    }

    #[test]
    fn number_accepts_numeric_strings() {
        let r = raw(json!({ "a": 2.5, "b": "3.75", "c": "n/a", "d": 0 }));
        assert_eq!(number(&r, "a"), Some(2.5));
        assert_eq!(number(&r, "b"), Some(3.75));
        assert_eq!(number(&r, "c"), None);
        assert_eq!(number(&r, "d"), Some(0.0));
    }

    #[test]
    fn timestamp_coerces_bad_values_to_none() {
        let r = raw(json!({
            "ok": "2024-06-01T08:00:00+01:00",
            "bad": "31/02/2024",
            "num": 1717228800,
            "null": null
        }));
        assert_eq!(timestamp(&r, "ok"), Some(datetime!(2024-06-01 08:00:00)));
        assert_eq!(timestamp(&r, "bad"), None);
        assert_eq!(timestamp(&r, "num"), None);
        assert_eq!(timestamp(&r, "null"), None);
    }
}
