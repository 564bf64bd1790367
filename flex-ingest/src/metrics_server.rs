use std::net::SocketAddr;

use anyhow::Context;
use axum::{routing::get, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static PROM_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder and serve `/metrics` on `bind_addr` for the
/// rest of the process lifetime.
pub fn init(bind_addr: &str) -> anyhow::Result<()> {
    let addr: SocketAddr = bind_addr
        .parse()
        .with_context(|| format!("invalid metrics bind address {bind_addr:?}"))?;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus metrics recorder")?;
    let _ = PROM_HANDLE.set(handle);
    describe();

    tokio::spawn(async move {
        let app = Router::new().route("/metrics", get(metrics_handler));

        match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => {
                tracing::info!(%addr, "metrics endpoint listening");
                if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                    tracing::error!(error = %e, "metrics server error");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, %addr, "failed to bind metrics listener");
            }
        }
    });

    Ok(())
}

async fn metrics_handler() -> String {
    PROM_HANDLE.get().map(PrometheusHandle::render).unwrap_or_default()
}

fn describe() {
    metrics::describe_counter!("fetch_requests_total", "HTTP page requests issued");
    metrics::describe_counter!("fetch_errors_total", "Page requests that ended a fetch early");
    metrics::describe_counter!("fetch_truncated_total", "Fetches whose declared total exceeds the offset ceiling");
    metrics::describe_counter!("fetch_chunks_total", "Date ranges fetched");
    metrics::describe_gauge!("fetch_records_declared", "Total records announced by the upstream API");
    metrics::describe_gauge!("fetch_records_fetched", "Records fetched so far in the current unit");
    metrics::describe_counter!("normalize_unparseable_timestamps_total", "Timestamps coerced to null");
    metrics::describe_counter!("flatten_events_without_ptus_total", "Clearing events with no PTU slices");
    metrics::describe_counter!("sink_upstream_errors_total", "Fetch errors seen by the table writer");
    metrics::describe_counter!("dedupe_duplicates_dropped_total", "Rows dropped as natural-key duplicates");
    metrics::describe_gauge!("sink_rows_written", "Rows in the last written table");
}
