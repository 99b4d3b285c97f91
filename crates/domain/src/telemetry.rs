use tracing_subscriber::EnvFilter;

/// Initialize structured JSON tracing for a service binary.
///
/// Called once from each `main`. `RUST_LOG` overrides the default filter.
pub fn init(service: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("info,{}=debug", service.replace('-', "_")))),
        )
        .json()
        .init();
}
