use std::borrow::Cow;

use time::{
    format_description::well_known::{Iso8601, Rfc3339},
    macros::format_description,
    Date, OffsetDateTime, PrimitiveDateTime,
};

/// Parse an ISO-8601 style timestamp into a timezone-naive local time.
///
/// When the input carries a UTC offset, the wall-clock date and time are kept
/// and the offset is dropped. Accepts `T` or a single space between date and
/// time, optional seconds/subseconds, and bare dates (midnight). Anything else
/// yields `None`.
pub fn parse_naive(raw: &str) -> Option<PrimitiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(ts) = OffsetDateTime::parse(s, &Rfc3339) {
        return Some(PrimitiveDateTime::new(ts.date(), ts.time()));
    }
    if let Ok(ts) = OffsetDateTime::parse(s, &Iso8601::DEFAULT) {
        return Some(PrimitiveDateTime::new(ts.date(), ts.time()));
    }

    let candidate = if s.len() > 10 && s.as_bytes()[10] == b' ' {
        Cow::Owned(format!("{}T{}", &s[..10], &s[11..]))
    } else {
        Cow::Borrowed(s)
    };

    if let Ok(ts) = PrimitiveDateTime::parse(
        &candidate,
        format_description!(
            "[year]-[month]-[day]T[hour]:[minute][optional [:[second][optional [.[subsecond]]]]]"
        ),
    ) {
        return Some(ts);
    }

    Date::parse(s, format_description!("[year]-[month]-[day]"))
        .ok()
        .map(Date::midnight)
}

/// Render a naive timestamp the way the persisted tables store it.
///
/// Whole seconds are written as `YYYY-MM-DD HH:MM:SS`; a fractional second
/// is appended with as many digits as it needs.
pub fn format_naive(ts: &PrimitiveDateTime) -> Result<String, time::error::Format> {
    if ts.nanosecond() == 0 {
        ts.format(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second]"
        ))
    } else {
        ts.format(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"
        ))
    }
}

/// Seconds from `start` to `end`, or `None` when either side is missing.
pub fn seconds_between(
    start: Option<PrimitiveDateTime>,
    end: Option<PrimitiveDateTime>,
) -> Option<f64> {
    Some((end? - start?).as_seconds_f64())
}

/// Serde adapter for optional naive timestamps in CSV tables.
///
/// Null is written as an empty field. On read, an empty or unparseable field
/// becomes `None`.
pub mod naive_ts {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::PrimitiveDateTime;

    pub fn serialize<S>(value: &Option<PrimitiveDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => {
                let text = super::format_naive(ts).map_err(<S::Error as serde::ser::Error>::custom)?;
                serializer.serialize_str(&text)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<PrimitiveDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(super::parse_naive))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn offset_timestamps_keep_wall_clock_time() {
        assert_eq!(
            parse_naive("2024-03-01T17:30:00+01:00"),
            Some(datetime!(2024-03-01 17:30:00))
        );
        assert_eq!(
            parse_naive("2024-03-01T17:30:00Z"),
            Some(datetime!(2024-03-01 17:30:00))
        );
        assert_eq!(
            parse_naive("2024-03-01T17:30:00.250+00:00"),
            Some(datetime!(2024-03-01 17:30:00.25))
        );
    }

    #[test]
    fn naive_forms_are_accepted() {
        assert_eq!(
            parse_naive("2024-03-01T17:30:00"),
            Some(datetime!(2024-03-01 17:30:00))
        );
        assert_eq!(
            parse_naive("2024-03-01 17:30:00"),
            Some(datetime!(2024-03-01 17:30:00))
        );
        assert_eq!(
            parse_naive("2024-03-01T17:30"),
            Some(datetime!(2024-03-01 17:30:00))
        );
        assert_eq!(parse_naive("2024-03-01"), Some(datetime!(2024-03-01 00:00:00)));
    }

    #[test]
    fn malformed_timestamps_become_none() {
        assert_eq!(parse_naive(""), None);
        assert_eq!(parse_naive("   "), None);
        assert_eq!(parse_naive("yesterday"), None);
        assert_eq!(parse_naive("2024-13-45T99:00:00"), None);
    }

    #[test]
    fn formatted_timestamps_parse_back() {
        let ts = datetime!(2023-11-05 06:15:00);
        let text = format_naive(&ts).unwrap();
        assert_eq!(text, "2023-11-05 06:15:00");
        assert_eq!(parse_naive(&text), Some(ts));
    }

    #[test]
    fn subseconds_survive_a_write_and_read() {
        let ts = parse_naive("2024-03-01T17:30:00.250").unwrap();
        let text = format_naive(&ts).unwrap();
        assert_eq!(text, "2024-03-01 17:30:00.25");
        assert_eq!(parse_naive(&text), Some(datetime!(2024-03-01 17:30:00.25)));
    }

    #[test]
    fn seconds_between_needs_both_ends() {
        let start = Some(datetime!(2024-01-01 10:00:00));
        let end = Some(datetime!(2024-01-01 10:15:00));
        assert_eq!(seconds_between(start, end), Some(900.0));
        assert_eq!(seconds_between(None, end), None);
        assert_eq!(seconds_between(start, None), None);
    }
}
