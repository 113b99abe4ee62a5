//! # Cluster Sessions Core
//!
//! Web-server sessions shared across a cluster through a key-value store.
//!
//! Every node reads and writes sessions in the same store, so a client can hit
//! any node. Sessions are only written when something changed, new ids are
//! claimed atomically before use, and each write refreshes the key's TTL.
//!
//! ## Features
//!
//! - **Dirty Tracking**: attribute diffs decide whether a request writes at all
//! - **Id Reservation**: `SETNX` with a `null` sentinel keeps ids unique cluster-wide
//! - **Request Context**: per-request session binding, dropped at request end
//! - **In-Memory Backend** (always available): process-local store with lazy expiry
//! - **Redis Backend** (feature: `redis-backend`, default): pooled `deadpool-redis` client
//! - **Serialization Formats**: JSON, MessagePack (feature: `messagepack`), CBOR (feature: `cbor`)
//! - **Type Registry**: attribute types resolved explicitly when loading
//!
//! ## Quick Start
//!
//! ```rust
//! use cluster_sessions_core::backends::InMemoryBackend;
//! use cluster_sessions_core::{SessionConfig, SessionManager};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = SessionManager::new(InMemoryBackend::new(), SessionConfig::default());
//!
//! let mut ctx = manager.on_request_start(None);
//! manager.get_or_create(&mut ctx).await?;
//! manager.set_attribute(&mut ctx, "user_id", 42_i64).await?;
//! manager.on_request_end(ctx).await?;
//! # Ok(())
//! # }
//! ```

pub mod attribute;
pub mod backends;
pub mod config;
pub mod context;
pub mod error;
pub mod id;
pub mod manager;
pub mod registry;
pub mod serialization;
pub mod session;
pub mod store;

// Re-export common types
pub use attribute::{AttributeValue, Principal, SessionValue};
pub use backends::{InMemoryBackend, KeyValueBackend};
pub use config::{ManualDirtyTracking, SessionConfig};
pub use context::{RequestContext, SessionState};
pub use error::{BackendError, Result, SerializationError, SessionError};
pub use id::{SessionIdGenerator, UuidSessionIdGenerator};
pub use manager::{PersistOutcome, SessionManager};
pub use registry::TypeRegistry;
pub use serialization::{DecodedSession, SerializationFormat, SessionSerializer};
pub use session::Session;
pub use store::{NULL_SESSION, SessionStore};

#[cfg(feature = "redis-backend")]
pub use backends::RedisBackend;
