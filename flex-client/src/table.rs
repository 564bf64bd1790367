use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use time::PrimitiveDateTime;

use crate::domain::{ClearedBucketPtu, DispatchRecord, TenderZone};

/// Row count and start-time span of a persisted table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSummary {
    pub rows: usize,
    pub earliest: Option<PrimitiveDateTime>,
    pub latest: Option<PrimitiveDateTime>,
}

impl TableSummary {
    fn from_starts<I>(starts: I) -> Self
    where
        I: IntoIterator<Item = Option<PrimitiveDateTime>>,
    {
        let mut summary = TableSummary {
            rows: 0,
            earliest: None,
            latest: None,
        };
        for start in starts {
            summary.rows += 1;
            if let Some(ts) = start {
                summary.earliest = Some(summary.earliest.map_or(ts, |e| e.min(ts)));
                summary.latest = Some(summary.latest.map_or(ts, |l| l.max(ts)));
            }
        }
        summary
    }
}

/// Load a persisted UKPN dispatch table.
pub fn read_dispatches(path: impl AsRef<Path>) -> Result<Vec<DispatchRecord>> {
    read_table(path.as_ref())
}

/// Load a persisted GOPACS PTU table.
pub fn read_cleared_buckets(path: impl AsRef<Path>) -> Result<Vec<ClearedBucketPtu>> {
    read_table(path.as_ref())
}

/// Load a persisted UKPN tender-zone table.
pub fn read_tenders(path: impl AsRef<Path>) -> Result<Vec<TenderZone>> {
    read_table(path.as_ref())
}

pub fn summarize_dispatches(path: impl AsRef<Path>) -> Result<TableSummary> {
    let rows = read_dispatches(path)?;
    Ok(TableSummary::from_starts(rows.iter().map(|r| r.start_time_local)))
}

pub fn summarize_cleared_buckets(path: impl AsRef<Path>) -> Result<TableSummary> {
    let rows = read_cleared_buckets(path)?;
    Ok(TableSummary::from_starts(rows.iter().map(|r| r.ptu_start_time)))
}

/// Tender rows carry no timestamps, so only `rows` is filled in.
pub fn summarize_tenders(path: impl AsRef<Path>) -> Result<TableSummary> {
    let rows = read_tenders(path)?;
    Ok(TableSummary::from_starts(rows.iter().map(|_| None)))
}

fn read_table<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open table {}", path.display()))?;

    let rows = rdr
        .deserialize()
        .collect::<Result<Vec<T>, csv::Error>>()
        .with_context(|| format!("failed to read table {}", path.display()))?;

    Ok(rows)
}
