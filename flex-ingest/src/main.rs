use anyhow::Result;
use flex_ingest::{config::AppConfig, metrics_server, observability, runner};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    tracing::info!(refetch = ?cfg.refetch, "starting flexibility data ingest");
    let outcomes = runner::run_enabled(&cfg).await?;

    let failed: Vec<&str> = outcomes
        .iter()
        .filter(|(_, outcome)| outcome.is_failure())
        .map(|(label, _)| *label)
        .collect();
    if !failed.is_empty() {
        anyhow::bail!("sources did not complete cleanly: {}", failed.join(", "));
    }

    Ok(())
}
