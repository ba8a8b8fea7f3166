use tracing_subscriber::{
    fmt::format::Format, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Initialize console tracing.
///
/// Compact single-line format without timestamps (the process supervisor
/// adds its own). The filter can be overridden with `RUST_LOG`.
pub fn init_telemetry() {
    let console_fmt = tracing_subscriber::fmt::layer().event_format(
        Format::default()
            .compact()
            .with_target(false)
            .without_time(),
    );

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "sharebin_api=debug,sharebin_ingest=debug,sharebin_db=debug,tower_http=debug".into()
        }))
        .with(console_fmt)
        .init();
}
