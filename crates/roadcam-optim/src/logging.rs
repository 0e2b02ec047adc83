//! Process-wide logging initialisation.
//!
//! The estimator only emits records through the `log` facade. Binaries call
//! [`init_logging`] once at start-up; repeated calls are no-ops.

use std::sync::Once;

use log::LevelFilter;

static INIT: Once = Once::new();

/// Install an `env_logger` backend at `info` level unless `RUST_LOG` says otherwise.
pub fn init_logging() {
    init_logging_with_level(LevelFilter::Info);
}

/// Install an `env_logger` backend with a default level; `RUST_LOG` overrides it.
///
/// Only the first call in a process has an effect.
pub fn init_logging_with_level(level: LevelFilter) {
    INIT.call_once(|| {
        let mut builder = env_logger::Builder::new();
        builder.filter_level(level);
        if let Ok(filters) = std::env::var("RUST_LOG") {
            builder.parse_filters(&filters);
        }
        // Another logger may already be installed by the host application.
        let _ = builder.try_init();
    });
}
