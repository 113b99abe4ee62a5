//! Redis key-value backend
//!
//! Provides a Redis-backed store with connection pooling. Every command checks
//! a connection out of the pool, runs, and returns it, including on error
//! paths. When the pool is exhausted a caller waits up to the configured wait
//! bound before failing with [`BackendError::PoolTimeout`].

use super::KeyValueBackend;
use crate::config::RedisSettings;
use crate::error::BackendError;
use async_trait::async_trait;
use deadpool_redis::{Config as PoolConfig, Connection, Pool, PoolError, Runtime, Timeouts};
use redis::{AsyncCommands, RedisError};
use std::time::Duration;

/// Number of keys to scan per iteration
const SCAN_BATCH_SIZE: usize = 100;

/// Redis backend with connection pooling
///
/// The database index from the settings is part of the connection URL, so
/// every pooled connection is SELECTed into it on creation.
#[derive(Clone)]
pub struct RedisBackend {
	pool: Pool,
}

impl RedisBackend {
	/// Create a backend with default pool configuration
	///
	/// # Examples
	///
	/// ```no_run
	/// use cluster_sessions_core::backends::RedisBackend;
	///
	/// let backend = RedisBackend::new("redis://localhost:6379/0")?;
	/// # Ok::<(), cluster_sessions_core::BackendError>(())
	/// ```
	pub fn new(connection_url: impl Into<String>) -> Result<Self, BackendError> {
		Self::with_pool_config(PoolConfig::from_url(connection_url))
	}

	/// Create a backend from connection and pool settings
	///
	/// # Examples
	///
	/// ```no_run
	/// use cluster_sessions_core::SessionConfig;
	/// use cluster_sessions_core::backends::RedisBackend;
	///
	/// let config = SessionConfig::default();
	/// let backend = RedisBackend::from_settings(&config.redis)?;
	/// # Ok::<(), cluster_sessions_core::BackendError>(())
	/// ```
	pub fn from_settings(settings: &RedisSettings) -> Result<Self, BackendError> {
		let mut timeouts = Timeouts::default();
		timeouts.wait = Some(settings.pool.wait_timeout());
		timeouts.create = Some(settings.connection_timeout());
		timeouts.recycle = Some(settings.pool.recycle_timeout());

		let mut pool = deadpool_redis::PoolConfig::new(settings.pool.max_size);
		pool.timeouts = timeouts;

		let mut config = PoolConfig::from_url(settings.connection_url());
		config.pool = Some(pool);

		tracing::debug!(
			host = %settings.host,
			port = settings.port,
			database = settings.database,
			max_size = settings.pool.max_size,
			"Creating Redis session backend"
		);
		Self::with_pool_config(config)
	}

	/// Create a backend with a custom pool configuration
	pub fn with_pool_config(config: PoolConfig) -> Result<Self, BackendError> {
		let pool = config
			.create_pool(Some(Runtime::Tokio1))
			.map_err(|e| BackendError::Pool(format!("Failed to create Redis pool: {}", e)))?;
		Ok(Self { pool })
	}

	/// Get the connection pool
	pub fn pool(&self) -> &Pool {
		&self.pool
	}

	async fn connection(&self) -> Result<Connection, BackendError> {
		self.pool.get().await.map_err(pool_error)
	}
}

fn pool_error(error: PoolError) -> BackendError {
	match error {
		PoolError::Timeout(_) => BackendError::PoolTimeout,
		PoolError::Backend(e) => BackendError::Connection(e.to_string()),
		other => BackendError::Pool(other.to_string()),
	}
}

fn command_error(command: &'static str) -> impl FnOnce(RedisError) -> BackendError {
	move |e| {
		if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
		{
			BackendError::Connection(e.to_string())
		} else {
			BackendError::command(command, e.to_string())
		}
	}
}

fn expiry_seconds(ttl: Duration) -> i64 {
	i64::try_from(ttl.as_secs().max(1)).unwrap_or(i64::MAX)
}

#[async_trait]
impl KeyValueBackend for RedisBackend {
	async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
		let mut conn = self.connection().await?;
		conn.get(key).await.map_err(command_error("GET"))
	}

	async fn set(&self, key: &str, value: &[u8]) -> Result<(), BackendError> {
		let mut conn = self.connection().await?;
		conn.set(key, value).await.map_err(command_error("SET"))
	}

	async fn set_if_absent(&self, key: &str, value: &[u8]) -> Result<bool, BackendError> {
		let mut conn = self.connection().await?;
		conn.set_nx(key, value).await.map_err(command_error("SETNX"))
	}

	async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, BackendError> {
		let mut conn = self.connection().await?;
		conn.expire(key, expiry_seconds(ttl))
			.await
			.map_err(command_error("EXPIRE"))
	}

	async fn delete(&self, key: &str) -> Result<(), BackendError> {
		let mut conn = self.connection().await?;
		conn.del(key).await.map_err(command_error("DEL"))
	}

	async fn ttl(&self, key: &str) -> Result<Option<Duration>, BackendError> {
		let mut conn = self.connection().await?;
		let millis: i64 = conn.pttl(key).await.map_err(command_error("PTTL"))?;
		// -2: missing key, -1: no expiry
		Ok(u64::try_from(millis).ok().map(Duration::from_millis))
	}

	async fn len(&self) -> Result<usize, BackendError> {
		let mut conn = self.connection().await?;
		redis::cmd("DBSIZE")
			.query_async(&mut *conn)
			.await
			.map_err(command_error("DBSIZE"))
	}

	async fn keys(&self) -> Result<Vec<String>, BackendError> {
		let mut conn = self.connection().await?;
		let mut keys = Vec::new();
		let mut cursor: u64 = 0;

		loop {
			let (next_cursor, batch): (u64, Vec<String>) = redis::cmd("SCAN")
				.arg(cursor)
				.arg("COUNT")
				.arg(SCAN_BATCH_SIZE)
				.query_async(&mut *conn)
				.await
				.map_err(command_error("SCAN"))?;

			keys.extend(batch);
			cursor = next_cursor;
			if cursor == 0 {
				break;
			}
		}

		Ok(keys)
	}

	async fn flush(&self) -> Result<(), BackendError> {
		let mut conn = self.connection().await?;
		redis::cmd("FLUSHDB")
			.query_async(&mut *conn)
			.await
			.map_err(command_error("FLUSHDB"))
	}

	async fn set_with_expiry(
		&self,
		key: &str,
		value: &[u8],
		ttl: Option<Duration>,
	) -> Result<(), BackendError> {
		let mut conn = self.connection().await?;
		match ttl {
			Some(ttl) => redis::pipe()
				.atomic()
				.set(key, value)
				.ignore()
				.expire(key, expiry_seconds(ttl))
				.ignore()
				.query_async(&mut *conn)
				.await
				.map_err(command_error("SET+EXPIRE")),
			None => conn.set(key, value).await.map_err(command_error("SET")),
		}
	}

	async fn set_if_absent_with_expiry(
		&self,
		key: &str,
		value: &[u8],
		ttl: Option<Duration>,
	) -> Result<bool, BackendError> {
		let Some(ttl) = ttl else {
			return self.set_if_absent(key, value).await;
		};
		let mut conn = self.connection().await?;
		// Reply is OK when the key was created, nil otherwise
		let reply: Option<String> = redis::cmd("SET")
			.arg(key)
			.arg(value)
			.arg("NX")
			.arg("EX")
			.arg(expiry_seconds(ttl))
			.query_async(&mut *conn)
			.await
			.map_err(command_error("SET NX EX"))?;
		Ok(reply.is_some())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_expiry_seconds_rounds_up_subsecond_ttl() {
		assert_eq!(expiry_seconds(Duration::from_millis(200)), 1);
		assert_eq!(expiry_seconds(Duration::from_secs(1800)), 1800);
	}

	#[tokio::test]
	async fn test_from_settings_builds_lazy_pool() {
		let backend = RedisBackend::from_settings(&RedisSettings::default()).unwrap();

		let status = backend.pool().status();
		assert_eq!(status.max_size, 16);
		assert_eq!(status.size, 0);
	}
}
