//! Tracing subscriber setup.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install a global fmt subscriber filtered at `level`.
///
/// `RUST_LOG` wins over `level` when set. Returns false if a subscriber was
/// already installed (by an earlier call or by the host application).
pub fn init(level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_ansi(false))
        .try_init()
        .is_ok()
}
