//! Session store protocol on top of a key-value backend
//!
//! Ids are claimed before their payload exists: [`SessionStore::reserve`]
//! atomically writes the [`NULL_SESSION`] sentinel under a candidate id and
//! succeeds only for the caller that created the key. Until the first real
//! [`save`](SessionStore::save), readers see the id as "not found", never as
//! a half-initialized session. The sentinel carries the same TTL a save
//! would, so a reservation that is never written expires on its own.
//!
//! ## Example
//!
//! ```rust
//! use cluster_sessions_core::SessionStore;
//! use cluster_sessions_core::backends::InMemoryBackend;
//!
//! # tokio_test::block_on(async {
//! let store = SessionStore::new(InMemoryBackend::new());
//!
//! assert!(store.reserve("sid", 1800).await.unwrap());
//! assert!(!store.reserve("sid", 1800).await.unwrap(), "already claimed");
//! assert_eq!(store.load("sid").await.unwrap(), None, "sentinel reads as absent");
//!
//! store.save("sid", b"payload", 1800).await.unwrap();
//! assert_eq!(store.load("sid").await.unwrap(), Some(b"payload".to_vec()));
//! # });
//! ```

use crate::backends::KeyValueBackend;
use crate::config::ttl_from_interval;
use crate::error::Result;
use std::time::Duration;

/// Placeholder written by [`SessionStore::reserve`]: the bytes of `null`
pub const NULL_SESSION: &[u8] = b"null";

/// Session persistence against a shared key-value backend
#[derive(Debug, Clone)]
pub struct SessionStore<B> {
	backend: B,
}

impl<B: KeyValueBackend> SessionStore<B> {
	pub fn new(backend: B) -> Self {
		Self { backend }
	}

	pub fn backend(&self) -> &B {
		&self.backend
	}

	/// Claim `id` cluster-wide
	///
	/// Returns `true` only if this call created the key. A `false` result is a
	/// collision, not an error: the caller retries with a new candidate. The
	/// sentinel expires after `ttl_seconds`; a non-positive value leaves it
	/// without expiry.
	pub async fn reserve(&self, id: &str, ttl_seconds: i64) -> Result<bool> {
		let ttl = ttl_from_interval(ttl_seconds);
		let created = self
			.backend
			.set_if_absent_with_expiry(id, NULL_SESSION, ttl)
			.await?;
		tracing::trace!(session_id = %id, created, "Reserved session id");
		Ok(created)
	}

	/// Write `payload` and set the key's TTL
	///
	/// Overwrites a sentinel or an older payload. A non-positive `ttl_seconds`
	/// leaves the key without expiry.
	pub async fn save(&self, id: &str, payload: &[u8], ttl_seconds: i64) -> Result<()> {
		let ttl = ttl_from_interval(ttl_seconds);
		self.backend.set_with_expiry(id, payload, ttl).await?;
		tracing::trace!(
			session_id = %id,
			size_bytes = payload.len(),
			ttl_secs = ?ttl.map(|t| t.as_secs()),
			"Saved session payload"
		);
		Ok(())
	}

	/// Read the raw payload
	///
	/// Both a missing key and a reservation sentinel yield `None`.
	pub async fn load(&self, id: &str) -> Result<Option<Vec<u8>>> {
		match self.backend.get(id).await? {
			None => {
				tracing::trace!(session_id = %id, "Session not found in store");
				Ok(None)
			}
			Some(data) if data == NULL_SESSION => {
				tracing::trace!(session_id = %id, "Session reserved but not yet written");
				Ok(None)
			}
			Some(data) => Ok(Some(data)),
		}
	}

	/// Idempotent delete
	pub async fn remove(&self, id: &str) -> Result<()> {
		self.backend.delete(id).await?;
		tracing::trace!(session_id = %id, "Removed session from store");
		Ok(())
	}

	/// Refresh the TTL without touching the value
	///
	/// Returns `false` when the key does not exist or `ttl_seconds` is not
	/// positive (nothing to refresh).
	pub async fn touch_expiry(&self, id: &str, ttl_seconds: i64) -> Result<bool> {
		let Some(ttl) = ttl_from_interval(ttl_seconds) else {
			return Ok(false);
		};
		let refreshed = self.backend.expire(id, ttl).await?;
		tracing::trace!(session_id = %id, ttl_secs = ttl.as_secs(), refreshed, "Touched session expiry");
		Ok(refreshed)
	}

	/// Remaining time-to-live of a stored key
	pub async fn ttl(&self, id: &str) -> Result<Option<Duration>> {
		Ok(self.backend.ttl(id).await?)
	}

	/// Number of keys in the store (administrative, best-effort)
	pub async fn size(&self) -> Result<usize> {
		Ok(self.backend.len().await?)
	}

	/// Every key in the store (administrative, best-effort)
	pub async fn list_keys(&self) -> Result<Vec<String>> {
		Ok(self.backend.keys().await?)
	}

	/// Drop every key in the store's database (administrative)
	pub async fn clear(&self) -> Result<()> {
		self.backend.flush().await?;
		tracing::info!("Cleared session store");
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::backends::InMemoryBackend;
	use rstest::*;

	#[fixture]
	fn store() -> SessionStore<InMemoryBackend> {
		SessionStore::new(InMemoryBackend::new())
	}

	#[rstest]
	#[tokio::test]
	async fn test_reserve_writes_sentinel(store: SessionStore<InMemoryBackend>) {
		assert!(store.reserve("a", 60).await.unwrap());

		let raw = store.backend().get("a").await.unwrap();
		assert_eq!(raw.as_deref(), Some(NULL_SESSION));
	}

	#[rstest]
	#[tokio::test]
	async fn test_reservation_expires_like_a_save(store: SessionStore<InMemoryBackend>) {
		store.reserve("a", 1800).await.unwrap();
		store.reserve("b", 0).await.unwrap();

		let ttl = store.ttl("a").await.unwrap().unwrap();
		assert!(ttl <= Duration::from_secs(1800));
		assert!(ttl > Duration::from_secs(1790));
		assert_eq!(store.ttl("b").await.unwrap(), None);
	}

	#[rstest]
	#[tokio::test]
	async fn test_reserve_after_save_collides(store: SessionStore<InMemoryBackend>) {
		store.save("a", b"payload-bytes", 60).await.unwrap();

		assert!(!store.reserve("a", 60).await.unwrap());
		assert_eq!(store.load("a").await.unwrap(), Some(b"payload-bytes".to_vec()));
	}

	#[rstest]
	#[tokio::test]
	async fn test_load_missing_is_none(store: SessionStore<InMemoryBackend>) {
		assert_eq!(store.load("missing").await.unwrap(), None);
	}

	#[rstest]
	#[tokio::test]
	async fn test_save_sets_ttl(store: SessionStore<InMemoryBackend>) {
		store.save("a", b"payload-bytes", 1800).await.unwrap();

		let ttl = store.ttl("a").await.unwrap().unwrap();
		assert!(ttl <= Duration::from_secs(1800));
		assert!(ttl > Duration::from_secs(1790));
	}

	#[rstest]
	#[tokio::test]
	async fn test_save_without_interval_is_persistent(store: SessionStore<InMemoryBackend>) {
		store.save("a", b"payload-bytes", 0).await.unwrap();

		assert_eq!(store.ttl("a").await.unwrap(), None);
		assert!(store.load("a").await.unwrap().is_some());
	}

	#[rstest]
	#[tokio::test]
	async fn test_remove_is_idempotent(store: SessionStore<InMemoryBackend>) {
		store.save("a", b"payload-bytes", 60).await.unwrap();

		store.remove("a").await.unwrap();
		store.remove("a").await.unwrap();

		assert_eq!(store.size().await.unwrap(), 0);
	}

	#[rstest]
	#[tokio::test]
	async fn test_touch_expiry(store: SessionStore<InMemoryBackend>) {
		store.save("a", b"payload-bytes", 60).await.unwrap();

		assert!(store.touch_expiry("a", 600).await.unwrap());
		assert!(!store.touch_expiry("missing", 600).await.unwrap());
		assert!(!store.touch_expiry("a", 0).await.unwrap());

		let ttl = store.ttl("a").await.unwrap().unwrap();
		assert!(ttl > Duration::from_secs(590));
		assert_eq!(store.load("a").await.unwrap(), Some(b"payload-bytes".to_vec()));
	}

	#[rstest]
	#[tokio::test]
	async fn test_admin_listing_and_clear(store: SessionStore<InMemoryBackend>) {
		store.reserve("a", 60).await.unwrap();
		store.save("b", b"payload-bytes", 60).await.unwrap();

		let mut keys = store.list_keys().await.unwrap();
		keys.sort();
		assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
		assert_eq!(store.size().await.unwrap(), 2);

		store.clear().await.unwrap();
		assert_eq!(store.size().await.unwrap(), 0);
	}
}
