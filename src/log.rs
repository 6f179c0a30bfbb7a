use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Console logging by default, JSON lines when LOG_JSON=true. RUST_LOG overrides
/// the info-level default.
pub fn init() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    let json_logs = std::env::var("LOG_JSON").map_or(false, |value| value == "true");
    if json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
