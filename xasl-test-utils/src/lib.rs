//! Tracing bootstrap for test binaries.
//!
//! With the `auto-init` feature the subscriber is installed when the test
//! binary starts, so individual tests never have to call in.

use std::sync::Once;

use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;

static INIT: Once = Once::new();

/// Default filter when `RUST_LOG` is unset: compiler warnings only.
const DEFAULT_FILTER: &str = "warn,xasl_compiler=warn";

/// Install a `fmt` subscriber honoring `RUST_LOG`. Safe to call repeatedly
/// and from several tests at once.
pub fn init_tracing_for_tests() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        let installed = fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_test_writer()
            .try_init();
        if installed.is_ok() {
            tracing::debug!("test tracing initialized");
        }
    });
}

#[cfg(feature = "auto-init")]
mod auto {
    use ctor::ctor;

    #[ctor]
    fn init() {
        super::init_tracing_for_tests();
    }
}
