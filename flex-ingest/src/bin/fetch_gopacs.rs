use anyhow::Result;
use flex_ingest::{config::AppConfig, metrics_server, observability, runner};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let report = runner::run_gopacs(&cfg).await?;
    runner::log_report(runner::GOPACS, &report);
    if report.is_partial() {
        anyhow::bail!("GOPACS fetch ended early after {} rows", report.written);
    }

    Ok(())
}
