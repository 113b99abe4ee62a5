//! # Cluster Sessions
//!
//! Web-server sessions persisted in a shared key-value store, so every node of
//! a cluster sees the same session state.
//!
//! ## Core Principles
//!
//! - **Write only what changed**: a request that leaves its session untouched
//!   issues no store write
//! - **Race-free ids**: new ids are claimed with an atomic set-if-absent before
//!   they reach a client
//! - **Explicit request scope**: each request owns a [`RequestContext`] that is
//!   consumed when the request ends
//! - **Activity-driven expiry**: every write refreshes the key's TTL
//!
//! ## Feature Flags
//!
//! - `redis-backend` (default) - Redis store via a `deadpool-redis` pool
//! - `messagepack` - MessagePack session payloads
//! - `cbor` - CBOR session payloads
//! - `test` - rstest fixtures, recording backend, Redis container fixture
//! - `full` - All features enabled
//!
//! ## Quick Example
//!
//! ```rust
//! use cluster_sessions::prelude::*;
//!
//! # tokio_test::block_on(async {
//! let manager = SessionManager::new(InMemoryBackend::new(), SessionConfig::default());
//!
//! let mut ctx = manager.on_request_start(None);
//! manager.get_or_create(&mut ctx).await.unwrap();
//! manager.set_attribute(&mut ctx, "user", "alice").await.unwrap();
//! let outcome = manager.on_request_end(ctx).await.unwrap();
//!
//! assert!(matches!(outcome, PersistOutcome::Saved { .. }));
//! # });
//! ```

pub use cluster_sessions_core::*;

#[cfg(feature = "test")]
pub use cluster_sessions_test as test;

pub mod prelude {
	pub use cluster_sessions_core::{
		AttributeValue, InMemoryBackend, KeyValueBackend, PersistOutcome, Principal,
		RequestContext, Session, SessionConfig, SessionError, SessionManager, SessionState,
		SessionValue, TypeRegistry,
	};

	#[cfg(feature = "redis-backend")]
	pub use cluster_sessions_core::RedisBackend;
}
