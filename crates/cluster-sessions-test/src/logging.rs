//! Test logging utilities
//!
//! Provides utilities for initializing logging in test environments.

use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Initialize logging for tests (call once)
///
/// Output goes through the test harness writer, so it is only shown for
/// failing tests. The level comes from `RUST_LOG` and defaults to `warn`.
///
/// # Examples
///
/// ```
/// use cluster_sessions_test::logging::init_test_logging;
///
/// init_test_logging();
/// init_test_logging(); // no-op
/// ```
pub fn init_test_logging() {
	INIT.call_once(|| {
		let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
		let _ = tracing_subscriber::fmt()
			.with_env_filter(filter)
			.with_test_writer()
			.try_init();
	});
}
