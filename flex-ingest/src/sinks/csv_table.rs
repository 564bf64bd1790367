use std::{
    marker::PhantomData,
    path::{Path, PathBuf},
};

use futures::StreamExt;
use serde::Serialize;

use crate::pipeline::{Envelope, PipelineError, Sink};
use crate::transform::{dedupe_sorted, TableRow};

/// Outcome of one table write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkReport {
    pub path: PathBuf,
    /// Rows that reached the sink, before dedupe.
    pub received: usize,
    pub duplicates_dropped: usize,
    pub written: usize,
    /// Error items seen on the input stream. Each one ended a fetch unit early.
    pub upstream_errors: usize,
    /// False when the table at `path` was left untouched.
    pub persisted: bool,
}

impl SinkReport {
    pub fn is_partial(&self) -> bool {
        self.upstream_errors > 0
    }
}

/// Collects the whole run, dedupes and sorts it, and replaces the CSV at
/// `path` in one atomic rename.
pub struct CsvTableSink<T> {
    path: PathBuf,
    label: &'static str,
    _row: PhantomData<fn() -> T>,
}

impl<T> CsvTableSink<T> {
    pub fn new(path: impl Into<PathBuf>, label: &'static str) -> Self {
        Self {
            path: path.into(),
            label,
            _row: PhantomData,
        }
    }
}

/// Write `rows` under a header of `T::COLUMNS`, via a temp file in the
/// destination directory. Null fields are written empty.
pub fn write_table<T>(path: &Path, rows: &[T]) -> Result<(), PipelineError>
where
    T: TableRow + Serialize,
{
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)
        .map_err(|e| PipelineError::Sink(format!("create {}: {e}", dir.display())))?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir)
        .map_err(|e| PipelineError::Sink(format!("temp file in {}: {e}", dir.display())))?;

    {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(tmp.as_file_mut());
        writer
            .write_record(T::COLUMNS)
            .map_err(|e| PipelineError::Sink(e.to_string()))?;
        for row in rows {
            writer
                .serialize(row)
                .map_err(|e| PipelineError::Sink(e.to_string()))?;
        }
        writer
            .flush()
            .map_err(|e| PipelineError::Sink(e.to_string()))?;
    }

    tmp.persist(path)
        .map_err(|e| PipelineError::Sink(format!("replace {}: {}", path.display(), e.error)))?;
    Ok(())
}

#[async_trait::async_trait]
impl<T> Sink<T> for CsvTableSink<T>
where
    T: TableRow + Serialize + Send + 'static,
{
    type Output = SinkReport;

    async fn run<S>(&self, mut input: S) -> Result<SinkReport, PipelineError>
    where
        S: futures::Stream<Item = Result<Envelope<T>, PipelineError>> + Send + Unpin + 'static,
    {
        let mut rows: Vec<T> = Vec::new();
        let mut upstream_errors = 0usize;

        while let Some(item) = input.next().await {
            match item {
                Ok(env) => rows.push(env.payload),
                Err(e) => {
                    upstream_errors += 1;
                    metrics::counter!("sink_upstream_errors_total", "source" => self.label)
                        .increment(1);
                    tracing::error!(source = self.label, error = %e, "upstream fetch failed, keeping partial results");
                }
            }
        }

        let received = rows.len();
        if received == 0 && upstream_errors > 0 {
            tracing::error!(
                source = self.label,
                path = %self.path.display(),
                upstream_errors,
                "nothing fetched, leaving existing table in place"
            );
            return Ok(SinkReport {
                path: self.path.clone(),
                received,
                duplicates_dropped: 0,
                written: 0,
                upstream_errors,
                persisted: false,
            });
        }

        let (rows, duplicates_dropped) = dedupe_sorted(rows);
        metrics::counter!("dedupe_duplicates_dropped_total", "source" => self.label)
            .increment(duplicates_dropped as u64);

        if rows.is_empty() {
            tracing::warn!(source = self.label, path = %self.path.display(), "no records fetched, writing header-only table");
        }

        let path = self.path.clone();
        let written = rows.len();
        tokio::task::spawn_blocking(move || write_table(&path, &rows))
            .await
            .map_err(|e| PipelineError::Sink(format!("writer task failed: {e}")))??;

        metrics::gauge!("sink_rows_written", "source" => self.label).set(written as f64);
        tracing::info!(
            source = self.label,
            path = %self.path.display(),
            received,
            duplicates_dropped,
            written,
            upstream_errors,
            "table written"
        );

        Ok(SinkReport {
            path: self.path.clone(),
            received,
            duplicates_dropped,
            written,
            upstream_errors,
            persisted: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flex_client::domain::DispatchRecord;
    use futures::stream;
    use time::macros::datetime;

    fn dispatch(fu: &str, hour: u8, price: Option<f64>) -> DispatchRecord {
        let start = datetime!(2024-05-01 00:00:00).replace_hour(hour).unwrap();
        let mut r = DispatchRecord {
            fu_id: Some(fu.to_string()),
            zone: Some("Zone B".to_string()),
            company_name: Some("Acme, Ltd".to_string()),
            technology: None,
            product: None,
            dispatch_type: None,
            start_time_local: Some(start),
            end_time_local: Some(start + time::Duration::minutes(30)),
            availability_mw_req: None,
            utilisation_mw_req: Some(1.0),
            availability_mwh_req: Some(0.5),
            utilisation_mwh_req: Some(0.5),
            availability_price: Some(10.0),
            utilisation_price: price,
            hours_requested: Some(0.5),
            availability_cost: None,
            utilisation_cost: None,
            total_cost: None,
        };
        r.derive_costs();
        r
    }

    #[tokio::test]
    async fn writes_deduped_sorted_table_and_keeps_partial_results() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("dispatches.csv");
        let sink = CsvTableSink::<DispatchRecord>::new(&path, "ukpn");

        let items = vec![
            Ok(Envelope::new(dispatch("FU-1", 8, Some(100.0)))),
            Ok(Envelope::new(dispatch("FU-2", 12, None))),
            Ok(Envelope::new(dispatch("FU-1", 8, Some(200.0)))),
            Err(PipelineError::Source("HTTP 503".to_string())),
        ];
        let report = sink.run(stream::iter(items)).await.unwrap();

        assert_eq!(report.received, 3);
        assert_eq!(report.duplicates_dropped, 1);
        assert_eq!(report.written, 2);
        assert_eq!(report.upstream_errors, 1);
        assert!(report.is_partial());
        assert!(report.persisted);

        let back = flex_client::table::read_dispatches(&path).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back[0].fu_id.as_deref(), Some("FU-2"));
        assert_eq!(back[0].utilisation_cost, None);
        assert_eq!(back[0].company_name.as_deref(), Some("Acme, Ltd"));
        assert_eq!(back[1].utilisation_price, Some(100.0));
        assert_eq!(back[1].start_time_local, Some(datetime!(2024-05-01 08:00:00)));
    }

    #[tokio::test]
    async fn empty_input_writes_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        let sink = CsvTableSink::<DispatchRecord>::new(&path, "ukpn");

        let report = sink
            .run(stream::iter(Vec::<Result<Envelope<DispatchRecord>, PipelineError>>::new()))
            .await
            .unwrap();
        assert_eq!(report.written, 0);

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.trim_end(), DispatchRecord::COLUMNS.join(","));
    }

    #[tokio::test]
    async fn failed_fetch_with_no_rows_keeps_existing_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dispatches.csv");
        let header = DispatchRecord::COLUMNS.join(",");
        let previous = format!("{header}\nFU-7,Z,,,,,2024-01-02 03:04:05,,,,,,,,,,,\n");
        std::fs::write(&path, &previous).unwrap();

        let sink = CsvTableSink::<DispatchRecord>::new(&path, "ukpn");
        let report = sink
            .run(stream::iter(vec![Err::<Envelope<DispatchRecord>, _>(
                PipelineError::Source("connection refused".to_string()),
            )]))
            .await
            .unwrap();

        assert!(!report.persisted);
        assert!(report.is_partial());
        assert_eq!(report.written, 0);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), previous);
    }

    #[tokio::test]
    async fn rerun_replaces_previous_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dispatches.csv");
        std::fs::write(&path, "stale contents\n").unwrap();

        let sink = CsvTableSink::<DispatchRecord>::new(&path, "ukpn");
        sink.run(stream::iter(vec![Ok(Envelope::new(dispatch("FU-5", 9, Some(1.0))))]))
            .await
            .unwrap();

        let back = flex_client::table::read_dispatches(&path).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].fu_id.as_deref(), Some("FU-5"));
    }
}
