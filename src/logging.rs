//! Diagnostic logging setup.
//!
//! All diagnostics go through `tracing` to **stderr** so stdout stays
//! reserved for build summaries and query results.
//!
//! Filter precedence: `RUST_LOG`, then `-v`/`-vv`, then `[logging].level`.
//!
//! ```bash
//! RUST_LOG=grounded_qa=debug gqa build
//! gqa -vv query "What is volatility clustering?"
//! ```

use std::sync::Once;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// Initialize the global subscriber. Only the first call takes effect.
pub fn init(config: &LoggingConfig, verbose: u8) {
    INIT.call_once(|| {
        let directive = filter_directive(config, verbose);
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directive));

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    });
}

fn filter_directive(config: &LoggingConfig, verbose: u8) -> String {
    match verbose {
        0 => config.level.clone(),
        1 => "grounded_qa=info".to_string(),
        2 => "grounded_qa=debug".to_string(),
        _ => "grounded_qa=trace".to_string(),
    }
}
