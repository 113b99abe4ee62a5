//! Key-value backends
//!
//! A [`KeyValueBackend`] exposes the handful of primitive commands the session
//! store protocol is built from. Values are raw bytes; keys are session ids.
//!
//! - [`InMemoryBackend`] (always available): process-local map with lazy
//!   expiry, useful for single-node deployments and tests.
//! - [`RedisBackend`] (feature: `redis-backend`): shared Redis server behind
//!   a `deadpool-redis` connection pool.

use crate::error::BackendError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

mod in_memory;
pub use in_memory::InMemoryBackend;

#[cfg(feature = "redis-backend")]
mod redis_backend;
#[cfg(feature = "redis-backend")]
pub use redis_backend::RedisBackend;

/// Primitive commands of a shared key-value service
#[async_trait]
pub trait KeyValueBackend: Send + Sync {
	/// GET: the raw value, or `None` when the key does not exist
	async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError>;

	/// SET: unconditional write; clears any expiry on the key
	async fn set(&self, key: &str, value: &[u8]) -> Result<(), BackendError>;

	/// SETNX: write only when absent; `true` when this call created the key
	async fn set_if_absent(&self, key: &str, value: &[u8]) -> Result<bool, BackendError>;

	/// EXPIRE: set the key's time-to-live; `false` when the key does not exist
	async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, BackendError>;

	/// DEL: idempotent delete
	async fn delete(&self, key: &str) -> Result<(), BackendError>;

	/// TTL: remaining time-to-live; `None` when the key is missing or persistent
	async fn ttl(&self, key: &str) -> Result<Option<Duration>, BackendError>;

	/// DBSIZE: number of keys
	async fn len(&self) -> Result<usize, BackendError>;

	/// SCAN: every key
	async fn keys(&self) -> Result<Vec<String>, BackendError>;

	/// FLUSHDB: drop every key
	async fn flush(&self) -> Result<(), BackendError>;

	/// SET followed by EXPIRE; `None` leaves the key without expiry
	///
	/// Backends that can issue both commands in one round trip override this.
	async fn set_with_expiry(
		&self,
		key: &str,
		value: &[u8],
		ttl: Option<Duration>,
	) -> Result<(), BackendError> {
		self.set(key, value).await?;
		if let Some(ttl) = ttl {
			self.expire(key, ttl).await?;
		}
		Ok(())
	}

	/// SETNX with an expiry on the created key; `None` leaves it persistent
	///
	/// The default issues SETNX then EXPIRE. Backends that support a single
	/// conditional write with expiry (Redis `SET NX EX`) override this.
	async fn set_if_absent_with_expiry(
		&self,
		key: &str,
		value: &[u8],
		ttl: Option<Duration>,
	) -> Result<bool, BackendError> {
		let created = self.set_if_absent(key, value).await?;
		if created && let Some(ttl) = ttl {
			self.expire(key, ttl).await?;
		}
		Ok(created)
	}
}

#[async_trait]
impl<B: KeyValueBackend + ?Sized> KeyValueBackend for Arc<B> {
	async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
		(**self).get(key).await
	}

	async fn set(&self, key: &str, value: &[u8]) -> Result<(), BackendError> {
		(**self).set(key, value).await
	}

	async fn set_if_absent(&self, key: &str, value: &[u8]) -> Result<bool, BackendError> {
		(**self).set_if_absent(key, value).await
	}

	async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, BackendError> {
		(**self).expire(key, ttl).await
	}

	async fn delete(&self, key: &str) -> Result<(), BackendError> {
		(**self).delete(key).await
	}

	async fn ttl(&self, key: &str) -> Result<Option<Duration>, BackendError> {
		(**self).ttl(key).await
	}

	async fn len(&self) -> Result<usize, BackendError> {
		(**self).len().await
	}

	async fn keys(&self) -> Result<Vec<String>, BackendError> {
		(**self).keys().await
	}

	async fn flush(&self) -> Result<(), BackendError> {
		(**self).flush().await
	}

	async fn set_with_expiry(
		&self,
		key: &str,
		value: &[u8],
		ttl: Option<Duration>,
	) -> Result<(), BackendError> {
		(**self).set_with_expiry(key, value, ttl).await
	}

	async fn set_if_absent_with_expiry(
		&self,
		key: &str,
		value: &[u8],
		ttl: Option<Duration>,
	) -> Result<bool, BackendError> {
		(**self).set_if_absent_with_expiry(key, value, ttl).await
	}
}
