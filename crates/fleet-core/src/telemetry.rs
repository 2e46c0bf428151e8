//! [crates/fleet-core/src/telemetry.rs]
//! Structured logging bootstrap shared by the orchestrator binary and its
//! tests. `RUST_LOG` (via `tracing_subscriber::EnvFilter`) controls verbosity;
//! defaults to `info` when unset.

use tracing_subscriber::{fmt, EnvFilter};

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(true).init();
}
