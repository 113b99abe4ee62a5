//! In-memory key-value backend

use super::KeyValueBackend;
use crate::error::BackendError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct Entry {
	value: Vec<u8>,
	expires_at: Option<Instant>,
}

impl Entry {
	fn is_expired(&self, now: Instant) -> bool {
		self.expires_at.is_some_and(|at| at <= now)
	}
}

/// In-memory key-value backend
///
/// Keys expire lazily: an expired key is treated as absent and dropped the
/// next time it is touched. Clones share the same underlying map, so several
/// session managers built from clones behave like nodes sharing one store.
///
/// # Examples
///
/// ```
/// use cluster_sessions_core::backends::{InMemoryBackend, KeyValueBackend};
///
/// # tokio_test::block_on(async {
/// let backend = InMemoryBackend::new();
///
/// assert!(backend.set_if_absent("sid", b"null").await.unwrap());
/// assert!(!backend.set_if_absent("sid", b"null").await.unwrap());
/// assert_eq!(backend.get("sid").await.unwrap(), Some(b"null".to_vec()));
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
	store: Arc<RwLock<HashMap<String, Entry>>>,
}

impl InMemoryBackend {
	pub fn new() -> Self {
		Self::default()
	}

	/// Drop every expired key
	pub async fn cleanup_expired(&self) {
		let now = Instant::now();
		let mut store = self.store.write().await;
		store.retain(|_, entry| !entry.is_expired(now));
	}
}

#[async_trait]
impl KeyValueBackend for InMemoryBackend {
	async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
		let now = Instant::now();
		{
			let store = self.store.read().await;
			match store.get(key) {
				None => return Ok(None),
				Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
				Some(_) => {}
			}
		}

		let mut store = self.store.write().await;
		if store.get(key).is_some_and(|entry| entry.is_expired(now)) {
			store.remove(key);
		}
		Ok(None)
	}

	async fn set(&self, key: &str, value: &[u8]) -> Result<(), BackendError> {
		let mut store = self.store.write().await;
		store.insert(
			key.to_string(),
			Entry {
				value: value.to_vec(),
				expires_at: None,
			},
		);
		Ok(())
	}

	async fn set_if_absent(&self, key: &str, value: &[u8]) -> Result<bool, BackendError> {
		self.set_if_absent_with_expiry(key, value, None).await
	}

	async fn set_if_absent_with_expiry(
		&self,
		key: &str,
		value: &[u8],
		ttl: Option<Duration>,
	) -> Result<bool, BackendError> {
		let now = Instant::now();
		let mut store = self.store.write().await;
		match store.get(key) {
			Some(entry) if !entry.is_expired(now) => Ok(false),
			_ => {
				store.insert(
					key.to_string(),
					Entry {
						value: value.to_vec(),
						expires_at: ttl.map(|ttl| now + ttl),
					},
				);
				Ok(true)
			}
		}
	}

	async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, BackendError> {
		let now = Instant::now();
		let mut store = self.store.write().await;
		match store.get_mut(key) {
			Some(entry) if !entry.is_expired(now) => {
				entry.expires_at = Some(now + ttl);
				Ok(true)
			}
			Some(_) => {
				store.remove(key);
				Ok(false)
			}
			None => Ok(false),
		}
	}

	async fn delete(&self, key: &str) -> Result<(), BackendError> {
		let mut store = self.store.write().await;
		store.remove(key);
		Ok(())
	}

	async fn ttl(&self, key: &str) -> Result<Option<Duration>, BackendError> {
		let now = Instant::now();
		let store = self.store.read().await;
		Ok(store
			.get(key)
			.filter(|entry| !entry.is_expired(now))
			.and_then(|entry| entry.expires_at)
			.map(|at| at.saturating_duration_since(now)))
	}

	async fn len(&self) -> Result<usize, BackendError> {
		let now = Instant::now();
		let store = self.store.read().await;
		Ok(store.values().filter(|entry| !entry.is_expired(now)).count())
	}

	async fn keys(&self) -> Result<Vec<String>, BackendError> {
		let now = Instant::now();
		let store = self.store.read().await;
		Ok(store
			.iter()
			.filter(|(_, entry)| !entry.is_expired(now))
			.map(|(key, _)| key.clone())
			.collect())
	}

	async fn flush(&self) -> Result<(), BackendError> {
		self.store.write().await.clear();
		Ok(())
	}
}
