use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber. `RUST_LOG` takes precedence over `default_directive`.
pub fn init_tracing(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    // A subscriber may already be installed by a test harness or the host binary.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init();
}
