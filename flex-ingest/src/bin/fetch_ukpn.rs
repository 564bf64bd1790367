use anyhow::Result;
use flex_ingest::{config::AppConfig, metrics_server, observability, runner};

/// Fetch the UKPN dispatch table, ignoring the refetch policy.
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;
    let api_key = cfg.ukpn.api_key()?;

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let report = runner::run_ukpn(&cfg, &api_key).await?;
    runner::log_report(runner::UKPN, &report);
    if report.is_partial() {
        anyhow::bail!("UKPN fetch ended early after {} rows", report.written);
    }

    Ok(())
}
