//! CLI commands.

pub mod inspect_cmd;
pub mod scrape_cmd;
pub mod serve;
pub mod update_cmd;

/// Initialize tracing with the conventional default filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rate_relay=info".parse().expect("valid directive")),
        )
        .init();
}
