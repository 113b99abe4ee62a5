//! Command-recording backend wrapper
//!
//! Wraps a [`KeyValueBackend`] and keeps a log of every command issued through
//! it, so tests can assert how many network writes a request produced.

use async_trait::async_trait;
use cluster_sessions_core::{BackendError, KeyValueBackend};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Backend command kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
	Get,
	/// SET, alone or combined with EXPIRE
	Set,
	/// SETNX, alone or combined with EXPIRE
	SetIfAbsent,
	Expire,
	Delete,
	Ttl,
	Len,
	Keys,
	Flush,
}

impl Command {
	/// Whether the command modifies stored values
	pub fn is_write(self) -> bool {
		matches!(self, Self::Set | Self::SetIfAbsent | Self::Delete | Self::Flush)
	}
}

/// Backend wrapper that records `(command, key)` pairs
///
/// Clones share the inner backend and the log.
///
/// # Examples
///
/// ```
/// use cluster_sessions_core::{InMemoryBackend, KeyValueBackend};
/// use cluster_sessions_test::{Command, RecordingBackend};
///
/// # tokio_test::block_on(async {
/// let backend = RecordingBackend::new(InMemoryBackend::new());
/// backend.set("a", b"1").await.unwrap();
/// backend.get("a").await.unwrap();
///
/// assert_eq!(backend.count_for(Command::Set, "a"), 1);
/// assert_eq!(backend.writes_for("a"), 1);
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct RecordingBackend<B> {
	inner: B,
	log: Arc<Mutex<Vec<(Command, Option<String>)>>>,
}

impl<B> RecordingBackend<B> {
	pub fn new(inner: B) -> Self {
		Self {
			inner,
			log: Arc::new(Mutex::new(Vec::new())),
		}
	}

	pub fn inner(&self) -> &B {
		&self.inner
	}

	/// Every recorded command, oldest first
	pub fn operations(&self) -> Vec<(Command, Option<String>)> {
		self.log.lock().unwrap_or_else(PoisonError::into_inner).clone()
	}

	/// Number of times `command` was issued against `key`
	pub fn count_for(&self, command: Command, key: &str) -> usize {
		self.log
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.iter()
			.filter(|(c, k)| *c == command && k.as_deref() == Some(key))
			.count()
	}

	/// Number of payload writes (SET) against `key`
	pub fn writes_for(&self, key: &str) -> usize {
		self.count_for(Command::Set, key)
	}

	/// Number of times `command` was issued, any key
	pub fn count(&self, command: Command) -> usize {
		self.log
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.iter()
			.filter(|(c, _)| *c == command)
			.count()
	}

	/// Forget everything recorded so far
	pub fn reset(&self) {
		self.log.lock().unwrap_or_else(PoisonError::into_inner).clear();
	}

	fn record(&self, command: Command, key: Option<&str>) {
		tracing::trace!(?command, key, "Recorded backend command");
		self.log
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.push((command, key.map(str::to_string)));
	}
}

#[async_trait]
impl<B: KeyValueBackend> KeyValueBackend for RecordingBackend<B> {
	async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
		self.record(Command::Get, Some(key));
		self.inner.get(key).await
	}

	async fn set(&self, key: &str, value: &[u8]) -> Result<(), BackendError> {
		self.record(Command::Set, Some(key));
		self.inner.set(key, value).await
	}

	async fn set_if_absent(&self, key: &str, value: &[u8]) -> Result<bool, BackendError> {
		self.record(Command::SetIfAbsent, Some(key));
		self.inner.set_if_absent(key, value).await
	}

	async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, BackendError> {
		self.record(Command::Expire, Some(key));
		self.inner.expire(key, ttl).await
	}

	async fn delete(&self, key: &str) -> Result<(), BackendError> {
		self.record(Command::Delete, Some(key));
		self.inner.delete(key).await
	}

	async fn ttl(&self, key: &str) -> Result<Option<Duration>, BackendError> {
		self.record(Command::Ttl, Some(key));
		self.inner.ttl(key).await
	}

	async fn len(&self) -> Result<usize, BackendError> {
		self.record(Command::Len, None);
		self.inner.len().await
	}

	async fn keys(&self) -> Result<Vec<String>, BackendError> {
		self.record(Command::Keys, None);
		self.inner.keys().await
	}

	async fn flush(&self) -> Result<(), BackendError> {
		self.record(Command::Flush, None);
		self.inner.flush().await
	}

	async fn set_with_expiry(
		&self,
		key: &str,
		value: &[u8],
		ttl: Option<Duration>,
	) -> Result<(), BackendError> {
		self.record(Command::Set, Some(key));
		if ttl.is_some() {
			self.record(Command::Expire, Some(key));
		}
		self.inner.set_with_expiry(key, value, ttl).await
	}

	async fn set_if_absent_with_expiry(
		&self,
		key: &str,
		value: &[u8],
		ttl: Option<Duration>,
	) -> Result<bool, BackendError> {
		self.record(Command::SetIfAbsent, Some(key));
		if ttl.is_some() {
			self.record(Command::Expire, Some(key));
		}
		self.inner.set_if_absent_with_expiry(key, value, ttl).await
	}
}
