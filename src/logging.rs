use tracing_subscriber::EnvFilter;

/// Install the stderr subscriber. `RUST_LOG` wins over the configured level.
///
/// Safe to call more than once; later calls are ignored.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(normalize_level(level)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn normalize_level(raw: &str) -> String {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" => "info".to_string(),
        lvl @ ("trace" | "debug" | "info" | "warn" | "error" | "off") => lvl.to_string(),
        other => other.to_string(),
    }
}
