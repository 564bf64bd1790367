use std::fmt;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use time::Date;
use tracing::info;

use super::{http_paged::PagedSource, RawRecord};
use crate::pipeline::{EnvelopeStream, Source};

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

/// Half-open calendar range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(with = "iso_date")]
    pub start: Date,
    #[serde(with = "iso_date")]
    pub end: Date,
}

impl DateRange {
    pub fn new(start: Date, end: Date) -> Self {
        Self { start, end }
    }

    /// Server-side filter restricting `field` to this range.
    pub fn where_clause(&self, field: &str) -> String {
        format!(r#"{field} >= "{}" AND {field} < "{}""#, self.start, self.end)
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Runs one paged fetch per date range and concatenates the results in range
/// order.
///
/// Each range is fetched with its own cursor, so each is capped independently
/// by the offset ceiling of the underlying source. A failed range yields its
/// error and the next range still runs.
pub struct DateChunkedSource {
    base: PagedSource,
    date_field: String,
    ranges: Vec<DateRange>,
}

impl DateChunkedSource {
    pub fn new(base: PagedSource, date_field: impl Into<String>, ranges: Vec<DateRange>) -> Self {
        Self {
            base,
            date_field: date_field.into(),
            ranges,
        }
    }

    fn source_for(&self, range: &DateRange) -> PagedSource {
        self.base
            .clone()
            .with_param("where", range.where_clause(&self.date_field))
    }
}

#[async_trait::async_trait]
impl Source<RawRecord> for DateChunkedSource {
    async fn stream(&self) -> EnvelopeStream<RawRecord> {
        let chunks: Vec<(DateRange, PagedSource)> = self
            .ranges
            .iter()
            .map(|range| (*range, self.source_for(range)))
            .collect();
        let label = self.base.label();
        let delay = self.base.request_delay();

        let s = async_stream::stream! {
            for (i, (range, source)) in chunks.into_iter().enumerate() {
                if i > 0 {
                    tokio::time::sleep(delay).await;
                }
                info!(source = label, range = %range, "fetching date range");

                let mut inner = source.stream().await;
                let mut fetched = 0usize;
                let mut failed = false;
                while let Some(item) = inner.next().await {
                    match &item {
                        Ok(_) => fetched += 1,
                        Err(_) => failed = true,
                    }
                    yield item;
                }

                metrics::counter!("fetch_chunks_total", "source" => label).increment(1);
                info!(source = label, range = %range, fetched, failed, "date range complete");
            }
        };

        Box::pin(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::http_paged::PageStyle;
    use mockito::{Matcher, Server};
    use serde_json::{json, Value};
    use std::time::Duration;
    use time::macros::date;

    fn ods_body(total: u64, ids: &[&str]) -> String {
        let records: Vec<Value> = ids
            .iter()
            .map(|id| json!({ "record": { "fields": { "fu_id": id } } }))
            .collect();
        json!({ "total_count": total, "records": records }).to_string()
    }

    #[test]
    fn where_clause_is_half_open() {
        let r = DateRange::new(date!(2024 - 01 - 01), date!(2024 - 07 - 01));
        assert_eq!(
            r.where_clause("start_time_local"),
            r#"start_time_local >= "2024-01-01" AND start_time_local < "2024-07-01""#
        );
    }

    #[test]
    fn ranges_deserialize_from_iso_dates() {
        let r: DateRange = toml::from_str("start = \"2023-01-01\"\nend = \"2024-01-01\"\n").unwrap();
        assert_eq!(r.start, date!(2023 - 01 - 01));
        assert_eq!(r.end, date!(2024 - 01 - 01));
    }

    #[tokio::test]
    async fn chunks_are_concatenated_and_a_failed_chunk_does_not_stop_the_next() {
        let mut server = Server::new_async().await;
        let first = server
            .mock("GET", Matcher::Regex("^/records".to_string()))
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded(
                    "where".into(),
                    r#"start_time_local >= "2023-01-01" AND start_time_local < "2024-01-01""#.into(),
                ),
                Matcher::UrlEncoded("offset".into(), "0".into()),
            ]))
            .with_status(200)
            .with_body(ods_body(2, &["A", "B"]))
            .expect(1)
            .create_async()
            .await;
        let second = server
            .mock("GET", Matcher::Regex("^/records".to_string()))
            .match_query(Matcher::UrlEncoded(
                "where".into(),
                r#"start_time_local >= "2024-01-01" AND start_time_local < "2024-07-01""#.into(),
            ))
            .with_status(500)
            .expect(1)
            .create_async()
            .await;
        let third = server
            .mock("GET", Matcher::Regex("^/records".to_string()))
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded(
                    "where".into(),
                    r#"start_time_local >= "2024-07-01" AND start_time_local < "2025-01-01""#.into(),
                ),
                Matcher::UrlEncoded("offset".into(), "0".into()),
            ]))
            .with_status(200)
            .with_body(ods_body(1, &["C"]))
            .expect(1)
            .create_async()
            .await;

        let base = PagedSource::new(
            reqwest::Client::new(),
            format!("{}/records", server.url()),
            PageStyle::OffsetLimit {
                ceiling: Some(10_000),
            },
            100,
            Duration::ZERO,
            "ukpn",
        );
        let chunked = DateChunkedSource::new(
            base,
            "start_time_local",
            vec![
                DateRange::new(date!(2023 - 01 - 01), date!(2024 - 01 - 01)),
                DateRange::new(date!(2024 - 01 - 01), date!(2024 - 07 - 01)),
                DateRange::new(date!(2024 - 07 - 01), date!(2025 - 01 - 01)),
            ],
        );

        let items: Vec<_> = chunked.stream().await.collect().await;
        let ids: Vec<Value> = items
            .iter()
            .filter_map(|r| r.as_ref().ok())
            .map(|env| env.payload["fu_id"].clone())
            .collect();

        assert_eq!(ids, vec![json!("A"), json!("B"), json!("C")]);
        assert_eq!(items.iter().filter(|r| r.is_err()).count(), 1);
        first.assert_async().await;
        second.assert_async().await;
        third.assert_async().await;
    }
}
