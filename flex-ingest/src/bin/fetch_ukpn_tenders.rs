use anyhow::Result;
use flex_ingest::{config::AppConfig, metrics_server, observability, runner};

/// Fetch the distinct UKPN tender zones, ignoring the refetch policy.
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;
    let api_key = cfg.ukpn.api_key()?;

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let report = runner::run_ukpn_tenders(&cfg, &api_key).await?;
    runner::log_report(runner::UKPN_TENDERS, &report);
    if report.is_partial() {
        anyhow::bail!("UKPN tender fetch ended early after {} rows", report.written);
    }

    Ok(())
}
