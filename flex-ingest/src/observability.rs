use tracing_subscriber::{filter::LevelFilter, EnvFilter};

/// Install the fmt subscriber. `RUST_LOG` overrides the `flex_ingest=info`
/// default.
pub fn init_tracing() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();
    let filter = if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        filter
    } else {
        filter.add_directive("flex_ingest=info".parse().unwrap_or_else(|_| LevelFilter::INFO.into()))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
