//! rstest fixtures
//!
//! ```ignore
//! use cluster_sessions_core::{InMemoryBackend, SessionManager};
//! use cluster_sessions_test::fixtures::*;
//! use rstest::*;
//!
//! #[rstest]
//! #[tokio::test]
//! async fn test_creates_session(session_manager: SessionManager<InMemoryBackend>) {
//!     let mut ctx = session_manager.on_request_start(None);
//!     assert!(session_manager.get_or_create(&mut ctx).await.is_ok());
//! }
//! ```

use crate::recording::RecordingBackend;
use cluster_sessions_core::{InMemoryBackend, SessionConfig, SessionManager};
use rstest::*;

#[cfg(feature = "testcontainers")]
pub mod testcontainers;
#[cfg(feature = "testcontainers")]
pub use self::testcontainers::{ContainerAsync, GenericImage, redis_backend, redis_container};

/// Default configuration (30 minute inactivity timeout, JSON payloads)
#[fixture]
pub fn session_config() -> SessionConfig {
	SessionConfig::default()
}

/// Empty process-local backend
#[fixture]
pub fn in_memory_backend() -> InMemoryBackend {
	InMemoryBackend::new()
}

/// Process-local backend that records every command
#[fixture]
pub fn recording_backend(in_memory_backend: InMemoryBackend) -> RecordingBackend<InMemoryBackend> {
	RecordingBackend::new(in_memory_backend)
}

/// Manager over an empty in-memory backend with the default configuration
#[fixture]
pub fn session_manager(
	in_memory_backend: InMemoryBackend,
	session_config: SessionConfig,
) -> SessionManager<InMemoryBackend> {
	crate::logging::init_test_logging();
	SessionManager::new(in_memory_backend, session_config)
}

/// Manager whose backend records every command
#[fixture]
pub fn recording_manager(
	recording_backend: RecordingBackend<InMemoryBackend>,
	session_config: SessionConfig,
) -> SessionManager<RecordingBackend<InMemoryBackend>> {
	crate::logging::init_test_logging();
	SessionManager::new(recording_backend, session_config)
}
