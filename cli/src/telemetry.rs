//! Tracing / logging initialisation.

use chainscan_core::LogConfig;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the filter directive string: `"info,chainscan_core::registry=debug"`.
pub fn directives(config: &LogConfig) -> String {
    let mut directives = config.level.clone();
    for component in &config.components {
        directives.push(',');
        directives.push_str(&component.replace('-', "_"));
    }
    directives
}

/// Initialise tracing once at startup. `RUST_LOG` wins over the config file.
pub fn init_tracing(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directives(config)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout carries command output.
    if config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
