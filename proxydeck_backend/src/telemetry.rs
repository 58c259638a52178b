use tracing_subscriber::EnvFilter;

/// Initializes the global tracing subscriber, honoring `RUST_LOG` when set.
/// Repeated calls are harmless no-ops so the binary and tests can share it.
pub fn init_tracing() {
    let env_filter = std::env::var("RUST_LOG")
        .map(EnvFilter::new)
        .unwrap_or_else(|_| EnvFilter::new("proxydeck_backend=info,tower_http=warn"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
