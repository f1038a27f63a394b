//! Tracing subscriber setup for binaries embedding the pipeline.

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Directive applied on top of `RUST_LOG`.
pub const DEFAULT_DIRECTIVE: &str = "gradewise=info";

/// Install a formatted subscriber filtered by `RUST_LOG` plus
/// [`DEFAULT_DIRECTIVE`]. Safe to call more than once; later calls are
/// no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::from_default_env().add_directive(
        DEFAULT_DIRECTIVE
            .parse()
            .unwrap_or_else(|_| LevelFilter::INFO.into()),
    );
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
