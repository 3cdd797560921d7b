mod aggregator;
mod recorder;

pub use aggregator::*;
pub use recorder::*;

/// Installs a global subscriber so `RUST_LOG` output shows up in test runs.
pub fn enable_logger() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
