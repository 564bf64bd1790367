//! Assembles and runs the per-source pipelines.
//!
//! Each source is fetched, transformed and written as one sequential
//! pipeline. The orchestrator path applies the refetch policy first and keeps
//! going when one source fails.

use std::{path::Path, sync::Arc};

use anyhow::Context;
use flex_client::{
    domain::{ClearedBucketPtu, DispatchRecord, TenderZone},
    table::{self, TableSummary},
};
use tracing::{error, info, warn};

use crate::{
    config::{AppConfig, HttpConfig},
    pipeline::{EnvelopeStream, Pipeline, Source},
    sinks::{CsvTableSink, SinkReport},
    sources::{DateChunkedSource, PageStyle, PagedSource, RawRecord},
    transform::{ClearedBucketFlattening, DispatchNormalization, TenderNormalization},
};

pub const UKPN: &str = "ukpn";
pub const UKPN_TENDERS: &str = "ukpn_tenders";
pub const GOPACS: &str = "gopacs";

/// Shared client carrying the one timeout every source uses.
pub fn http_client(cfg: &HttpConfig) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder().timeout(cfg.timeout()).build()
}

/// UKPN input: one unfiltered offset fetch, or one fetch per date range.
pub enum UkpnSource {
    Single(PagedSource),
    Chunked(DateChunkedSource),
}

#[async_trait::async_trait]
impl Source<RawRecord> for UkpnSource {
    async fn stream(&self) -> EnvelopeStream<RawRecord> {
        match self {
            Self::Single(s) => s.stream().await,
            Self::Chunked(s) => s.stream().await,
        }
    }
}

pub fn ukpn_source(cfg: &AppConfig, client: reqwest::Client, api_key: &str) -> UkpnSource {
    let base = PagedSource::new(
        client,
        cfg.ukpn.records_url(),
        PageStyle::OffsetLimit {
            ceiling: cfg.ukpn.offset_ceiling,
        },
        cfg.http.page_size,
        cfg.http.request_delay(),
        UKPN,
    )
    .with_param("apikey", api_key);

    if cfg.ukpn.date_ranges.is_empty() {
        UkpnSource::Single(base)
    } else {
        UkpnSource::Chunked(DateChunkedSource::new(
            base,
            cfg.ukpn.date_field.clone(),
            cfg.ukpn.date_ranges.clone(),
        ))
    }
}

/// Distinct (zone, pot, round) combinations. The API groups server-side, so
/// the response carries no total and paging runs until an empty page.
pub fn tenders_source(cfg: &AppConfig, client: reqwest::Client, api_key: &str) -> PagedSource {
    PagedSource::new(
        client,
        cfg.ukpn.dataset_records_url(&cfg.ukpn_tenders.dataset_id),
        PageStyle::OffsetLimit {
            ceiling: cfg.ukpn.offset_ceiling,
        },
        cfg.http.page_size,
        cfg.http.request_delay(),
        UKPN_TENDERS,
    )
    .with_param("apikey", api_key)
    .with_param("select", TenderZone::GROUP_FIELDS)
    .with_param("group_by", TenderZone::GROUP_FIELDS)
}

pub fn gopacs_source(cfg: &AppConfig, client: reqwest::Client) -> PagedSource {
    PagedSource::new(
        client,
        cfg.gopacs.base_url.clone(),
        PageStyle::PageIndex,
        cfg.http.page_size,
        cfg.http.request_delay(),
        GOPACS,
    )
}

pub async fn run_ukpn(cfg: &AppConfig, api_key: &str) -> anyhow::Result<SinkReport> {
    let client = http_client(&cfg.http).context("building HTTP client")?;
    let pipeline: Pipeline<_, RawRecord, DispatchRecord, _> = Pipeline {
        source: ukpn_source(cfg, client, api_key),
        transform: Arc::new(DispatchNormalization),
        sink: CsvTableSink::<DispatchRecord>::new(&cfg.ukpn.output_path, UKPN),
    };
    Ok(pipeline.run().await?)
}

pub async fn run_ukpn_tenders(cfg: &AppConfig, api_key: &str) -> anyhow::Result<SinkReport> {
    let client = http_client(&cfg.http).context("building HTTP client")?;
    let pipeline: Pipeline<_, RawRecord, TenderZone, _> = Pipeline {
        source: tenders_source(cfg, client, api_key),
        transform: Arc::new(TenderNormalization),
        sink: CsvTableSink::<TenderZone>::new(&cfg.ukpn_tenders.output_path, UKPN_TENDERS),
    };
    Ok(pipeline.run().await?)
}

pub async fn run_gopacs(cfg: &AppConfig) -> anyhow::Result<SinkReport> {
    let client = http_client(&cfg.http).context("building HTTP client")?;
    let pipeline: Pipeline<_, RawRecord, ClearedBucketPtu, _> = Pipeline {
        source: gopacs_source(cfg, client),
        transform: Arc::new(ClearedBucketFlattening),
        sink: CsvTableSink::<ClearedBucketPtu>::new(&cfg.gopacs.output_path, GOPACS),
    };
    Ok(pipeline.run().await?)
}

/// What happened to one source in an orchestrated run.
#[derive(Debug)]
pub enum Outcome {
    Fetched(SinkReport),
    /// Refetch policy kept the existing table. `summary` is `None` when the
    /// table is absent or unreadable.
    Skipped {
        summary: Option<TableSummary>,
    },
    Failed(anyhow::Error),
}

impl Outcome {
    /// A partial fetch counts as a failure for the exit status.
    pub fn is_failure(&self) -> bool {
        match self {
            Outcome::Fetched(report) => report.is_partial(),
            Outcome::Skipped { .. } => false,
            Outcome::Failed(_) => true,
        }
    }
}

/// Log a one-line summary of `report`.
pub fn log_report(label: &str, report: &SinkReport) {
    if !report.persisted {
        error!(
            source = label,
            path = %report.path.display(),
            upstream_errors = report.upstream_errors,
            "fetch failed, table not replaced"
        );
    } else if report.is_partial() {
        warn!(
            source = label,
            path = %report.path.display(),
            written = report.written,
            upstream_errors = report.upstream_errors,
            "fetch ended early, partial table written"
        );
    } else {
        info!(
            source = label,
            path = %report.path.display(),
            written = report.written,
            duplicates_dropped = report.duplicates_dropped,
            "fetch complete"
        );
    }
}

fn summarize_existing(
    label: &'static str,
    path: &Path,
    summarize: fn(&Path) -> anyhow::Result<TableSummary>,
) -> Option<TableSummary> {
    if !path.exists() {
        warn!(source = label, path = %path.display(), "refetch disabled and no table present");
        return None;
    }
    match summarize(path) {
        Ok(summary) => {
            info!(
                source = label,
                path = %path.display(),
                rows = summary.rows,
                earliest = ?summary.earliest,
                latest = ?summary.latest,
                "keeping existing table"
            );
            Some(summary)
        }
        Err(e) => {
            warn!(source = label, path = %path.display(), error = %e, "existing table could not be read");
            None
        }
    }
}

fn fetched(result: anyhow::Result<SinkReport>) -> Outcome {
    match result {
        Ok(report) => Outcome::Fetched(report),
        Err(e) => Outcome::Failed(e),
    }
}

/// Run every enabled source under the configured refetch policy.
///
/// A missing API key is returned as an error before any request is made.
/// Failures of individual sources are captured in their [`Outcome`].
pub async fn run_enabled(cfg: &AppConfig) -> anyhow::Result<Vec<(&'static str, Outcome)>> {
    let ukpn_path = Path::new(&cfg.ukpn.output_path);
    let tenders_path = Path::new(&cfg.ukpn_tenders.output_path);
    let gopacs_path = Path::new(&cfg.gopacs.output_path);

    let fetch_ukpn = cfg.ukpn.enabled && cfg.refetch.should_fetch(ukpn_path.exists());
    let fetch_tenders =
        cfg.ukpn_tenders.enabled && cfg.refetch.should_fetch(tenders_path.exists());
    let fetch_gopacs = cfg.gopacs.enabled && cfg.refetch.should_fetch(gopacs_path.exists());

    let api_key = if fetch_ukpn || fetch_tenders {
        cfg.ukpn.api_key()?
    } else {
        String::new()
    };

    let mut outcomes = Vec::new();

    if cfg.ukpn.enabled {
        let outcome = if fetch_ukpn {
            fetched(run_ukpn(cfg, &api_key).await)
        } else {
            Outcome::Skipped {
                summary: summarize_existing(UKPN, ukpn_path, |p| table::summarize_dispatches(p)),
            }
        };
        outcomes.push((UKPN, outcome));
    }

    if cfg.ukpn_tenders.enabled {
        let outcome = if fetch_tenders {
            fetched(run_ukpn_tenders(cfg, &api_key).await)
        } else {
            Outcome::Skipped {
                summary: summarize_existing(UKPN_TENDERS, tenders_path, |p| {
                    table::summarize_tenders(p)
                }),
            }
        };
        outcomes.push((UKPN_TENDERS, outcome));
    }

    if cfg.gopacs.enabled {
        let outcome = if fetch_gopacs {
            fetched(run_gopacs(cfg).await)
        } else {
            Outcome::Skipped {
                summary: summarize_existing(GOPACS, gopacs_path, |p| {
                    table::summarize_cleared_buckets(p)
                }),
            }
        };
        outcomes.push((GOPACS, outcome));
    }

    for (label, outcome) in &outcomes {
        match outcome {
            Outcome::Fetched(report) => log_report(label, report),
            Outcome::Skipped { .. } => {}
            Outcome::Failed(e) => error!(source = *label, error = %format!("{e:#}"), "source failed"),
        }
    }

    Ok(outcomes)
}
