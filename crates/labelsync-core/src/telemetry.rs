//! Log output for `labelsync` and `labelsyncd`.
//!
//! Both binaries log to stderr: the CLI prints reports on stdout and the
//! daemon runs under a supervisor that collects stderr. The filter comes
//! from `LABELSYNC_LOG`, then `RUST_LOG`, then the `--verbose` level.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter directives for labelsync only, e.g. `labelsync_core::reconcile=debug`.
pub const LOG_ENV: &str = "LABELSYNC_LOG";

fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

/// Set up the process-wide subscriber; `json` switches to one JSON object
/// per line for log shippers. A second call leaves the first in place.
pub fn init_tracing(json: bool, level: Level) {
    let registry = tracing_subscriber::registry().with(env_filter(level));
    if json {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr).json())
            .try_init()
            .ok();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
            .ok();
    }
}
