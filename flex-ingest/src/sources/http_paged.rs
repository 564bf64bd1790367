use std::time::Duration;

use async_stream::try_stream;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use super::RawRecord;
use crate::pipeline::{Envelope, EnvelopeStream, PipelineError, Source};

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("upstream returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode page: {0}")]
    Decode(#[from] serde_json::Error),
}

/// How an upstream API walks through its result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStyle {
    /// `limit`/`offset` query with a `total_count` in every response
    /// (opendatasoft). Requests stop before `offset + limit` would exceed
    /// `ceiling`.
    OffsetLimit { ceiling: Option<usize> },
    /// `page`/`size` query with `totalPages`/`totalElements` (Spring Data).
    PageIndex,
}

#[derive(Debug, Default)]
struct Page {
    records: Vec<RawRecord>,
    /// Absent for grouped queries, which report no total.
    declared_records: Option<u64>,
    declared_pages: Option<u64>,
    skipped: usize,
}

/// Totals announced by the first response of a fetch.
#[derive(Debug, Clone, Copy)]
struct Declared {
    records: Option<u64>,
    pages: Option<u64>,
}

#[derive(Deserialize)]
struct OdsPage {
    #[serde(default)]
    total_count: Option<u64>,
    #[serde(default)]
    records: Vec<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpringPage {
    #[serde(default)]
    content: Vec<Value>,
    #[serde(default)]
    total_pages: u64,
    #[serde(default)]
    total_elements: u64,
}

/// Paginated GET source yielding one raw field mapping per upstream record.
///
/// Requests go out one at a time with `request_delay` between them. The stream
/// ends when a page comes back empty, when the total declared by the first
/// response is reached, or at the offset ceiling. A failed request yields one
/// `Err` and ends the stream; records yielded before it are kept downstream.
#[derive(Clone)]
pub struct PagedSource {
    client: reqwest::Client,
    url: String,
    params: Vec<(String, String)>,
    style: PageStyle,
    page_size: usize,
    request_delay: Duration,
    label: &'static str,
}

impl PagedSource {
    pub fn new(
        client: reqwest::Client,
        url: impl Into<String>,
        style: PageStyle,
        page_size: usize,
        request_delay: Duration,
        label: &'static str,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            params: Vec::new(),
            style,
            page_size,
            request_delay,
            label,
        }
    }

    /// Add a fixed query parameter sent with every page request.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        self.params.retain(|(k, _)| *k != key);
        self.params.push((key, value.into()));
        self
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn request_delay(&self) -> Duration {
        self.request_delay
    }

    fn cursor_params(&self, page_index: usize) -> [(&'static str, String); 2] {
        match self.style {
            PageStyle::OffsetLimit { .. } => [
                ("limit", self.limit_at(page_index).to_string()),
                ("offset", (page_index * self.page_size).to_string()),
            ],
            PageStyle::PageIndex => [
                ("page", page_index.to_string()),
                ("size", self.page_size.to_string()),
            ],
        }
    }

    /// Page size for `page_index`, shortened so the last page ends exactly at
    /// the offset ceiling.
    fn limit_at(&self, page_index: usize) -> usize {
        match self.style {
            PageStyle::OffsetLimit {
                ceiling: Some(ceiling),
            } => self
                .page_size
                .min(ceiling.saturating_sub(page_index * self.page_size)),
            _ => self.page_size,
        }
    }

    /// Whether `page_index` starts at or past the offset ceiling.
    fn beyond_ceiling(&self, page_index: usize) -> bool {
        match self.style {
            PageStyle::OffsetLimit {
                ceiling: Some(ceiling),
            } => page_index * self.page_size >= ceiling,
            _ => false,
        }
    }

    /// Whether `pages_done` pages cover everything the first response declared.
    fn exhausted(&self, pages_done: usize, first: Declared) -> bool {
        match self.style {
            PageStyle::OffsetLimit { .. } => first
                .records
                .is_some_and(|total| (pages_done * self.page_size) as u64 >= total),
            PageStyle::PageIndex => pages_done as u64 >= first.pages.unwrap_or(0),
        }
    }

    fn report_declared(&self, page: &Page, filter: Option<&str>) {
        info!(
            source = self.label,
            total = ?page.declared_records,
            pages = ?page.declared_pages,
            filter,
            "total records to fetch"
        );
        let Some(declared) = page.declared_records else {
            return;
        };
        metrics::gauge!("fetch_records_declared", "source" => self.label).set(declared as f64);

        if let PageStyle::OffsetLimit {
            ceiling: Some(ceiling),
        } = self.style
        {
            if declared > ceiling as u64 {
                metrics::counter!("fetch_truncated_total", "source" => self.label).increment(1);
                warn!(
                    source = self.label,
                    total = declared,
                    ceiling,
                    filter,
                    "declared total exceeds the offset ceiling; rows past it will not be fetched, narrow the query"
                );
            }
        }
    }

    async fn fetch_page(&self, page_index: usize) -> Result<Page, FetchError> {
        let resp = self
            .client
            .get(&self.url)
            .query(&self.params)
            .query(&self.cursor_params(page_index))
            .send()
            .await
            .map_err(|e| FetchError::Http(e.without_url()))?;

        let status = resp.status();
        if !status.is_success() {
            let body: String = resp
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(200)
                .collect();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = resp
            .text()
            .await
            .map_err(|e| FetchError::Http(e.without_url()))?;
        self.decode_page(&text)
    }

    fn decode_page(&self, text: &str) -> Result<Page, FetchError> {
        let mut page = Page::default();
        match self.style {
            PageStyle::OffsetLimit { .. } => {
                let ods: OdsPage = serde_json::from_str(text)?;
                page.declared_records = ods.total_count;
                for item in ods.records {
                    match item
                        .get("record")
                        .and_then(|r| r.get("fields"))
                        .and_then(Value::as_object)
                    {
                        Some(fields) => page.records.push(fields.clone()),
                        None => page.skipped += 1,
                    }
                }
            }
            PageStyle::PageIndex => {
                let spring: SpringPage = serde_json::from_str(text)?;
                page.declared_records = Some(spring.total_elements);
                page.declared_pages = Some(spring.total_pages);
                for item in spring.content {
                    match item {
                        Value::Object(map) => page.records.push(map),
                        _ => page.skipped += 1,
                    }
                }
            }
        }
        Ok(page)
    }
}

#[async_trait::async_trait]
impl Source<RawRecord> for PagedSource {
    async fn stream(&self) -> EnvelopeStream<RawRecord> {
        let this = self.clone();
        let label = this.label;
        let filter = this
            .params
            .iter()
            .find(|(k, _)| k == "where")
            .map(|(_, v)| v.clone());

        let s = try_stream! {
            let mut page_index = 0usize;
            let mut fetched = 0usize;
            let mut declared: Option<Declared> = None;

            loop {
                if this.beyond_ceiling(page_index) {
                    info!(source = label, fetched, filter = ?filter, "offset ceiling reached, stopping");
                    break;
                }
                if page_index > 0 {
                    tokio::time::sleep(this.request_delay).await;
                }

                metrics::counter!("fetch_requests_total", "source" => label).increment(1);
                let page = this.fetch_page(page_index).await.map_err(|e| {
                    metrics::counter!("fetch_errors_total", "source" => label).increment(1);
                    PipelineError::Source(format!(
                        "{label} request for page {page_index} failed after {fetched} records: {e}"
                    ))
                })?;

                if page.skipped > 0 {
                    warn!(source = label, skipped = page.skipped, "skipped malformed records in page");
                }

                let first = *declared.get_or_insert_with(|| {
                    this.report_declared(&page, filter.as_deref());
                    Declared {
                        records: page.declared_records,
                        pages: page.declared_pages,
                    }
                });

                if page.records.is_empty() {
                    break;
                }
                page_index += 1;

                for record in page.records {
                    fetched += 1;
                    yield Envelope::new(record);
                }

                info!(source = label, fetched, total = ?first.records, "fetch progress");
                metrics::gauge!("fetch_records_fetched", "source" => label).set(fetched as f64);

                if this.exhausted(page_index, first) {
                    break;
                }
            }

            info!(source = label, fetched, filter = ?filter, "fetch finished");
        };

        Box::pin(s)
    }
}
