//! End-to-end persistence scenarios
//!
//! Each test drives one or more requests through `SessionManager` and checks
//! what ended up in the shared store.

use async_trait::async_trait;
use cluster_sessions_core::{
	BackendError, InMemoryBackend, KeyValueBackend, PersistOutcome, SessionConfig, SessionManager,
	SessionState, TypeRegistry,
};
use cluster_sessions_test::{Command, RecordingBackend, ScriptedIdGenerator, fixtures::*};
use rstest::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// In-memory backend whose reads or writes can be switched to fail
#[derive(Clone, Default)]
struct FlakyBackend {
	inner: InMemoryBackend,
	fail_reads: Arc<AtomicBool>,
	fail_writes: Arc<AtomicBool>,
}

impl FlakyBackend {
	fn check(flag: &AtomicBool) -> Result<(), BackendError> {
		if flag.load(Ordering::SeqCst) {
			Err(BackendError::Connection("connection refused".to_string()))
		} else {
			Ok(())
		}
	}
}

#[async_trait]
impl KeyValueBackend for FlakyBackend {
	async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
		Self::check(&self.fail_reads)?;
		self.inner.get(key).await
	}

	async fn set(&self, key: &str, value: &[u8]) -> Result<(), BackendError> {
		Self::check(&self.fail_writes)?;
		self.inner.set(key, value).await
	}

	async fn set_if_absent(&self, key: &str, value: &[u8]) -> Result<bool, BackendError> {
		Self::check(&self.fail_writes)?;
		self.inner.set_if_absent(key, value).await
	}

	async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, BackendError> {
		Self::check(&self.fail_writes)?;
		self.inner.expire(key, ttl).await
	}

	async fn delete(&self, key: &str) -> Result<(), BackendError> {
		Self::check(&self.fail_writes)?;
		self.inner.delete(key).await
	}

	async fn ttl(&self, key: &str) -> Result<Option<Duration>, BackendError> {
		self.inner.ttl(key).await
	}

	async fn len(&self) -> Result<usize, BackendError> {
		self.inner.len().await
	}

	async fn keys(&self) -> Result<Vec<String>, BackendError> {
		self.inner.keys().await
	}

	async fn flush(&self) -> Result<(), BackendError> {
		self.inner.flush().await
	}
}

#[rstest]
#[tokio::test]
async fn test_new_session_with_attribute_is_saved_with_ttl(
	session_manager: SessionManager<InMemoryBackend>,
) {
	// Arrange
	let mut ctx = session_manager.on_request_start(None);
	let session = session_manager.get_or_create(&mut ctx).await.unwrap();
	let id = session.id().to_string();

	// Act
	session_manager
		.set_attribute(&mut ctx, "user", "alice")
		.await
		.unwrap();
	let outcome = session_manager.on_request_end(ctx).await.unwrap();

	// Assert
	assert_eq!(outcome, PersistOutcome::Saved { id: id.clone() });

	let payload = session_manager.store().load(&id).await.unwrap().unwrap();
	let decoded = session_manager
		.serializer()
		.deserialize(&payload, &TypeRegistry::with_builtins())
		.unwrap();
	assert_eq!(decoded.attributes.len(), 1);
	assert_eq!(
		decoded.attributes["user"].get::<String>().as_deref(),
		Some("alice")
	);

	let ttl = session_manager.store().ttl(&id).await.unwrap().unwrap();
	assert!(ttl > Duration::from_secs(1795) && ttl <= Duration::from_secs(1800));
}

#[rstest]
#[tokio::test]
async fn test_clean_loaded_session_is_not_written(
	recording_manager: SessionManager<RecordingBackend<InMemoryBackend>>,
) {
	// Arrange
	let mut ctx = recording_manager.on_request_start(None);
	recording_manager.get_or_create(&mut ctx).await.unwrap();
	recording_manager
		.set_attribute(&mut ctx, "user", "alice")
		.await
		.unwrap();
	let PersistOutcome::Saved { id } = recording_manager.on_request_end(ctx).await.unwrap() else {
		panic!("first request should save");
	};
	let backend = recording_manager.store().backend();
	assert_eq!(backend.writes_for(&id), 1);

	// Act
	let mut ctx = recording_manager.on_request_start(Some(id.clone()));
	let session = recording_manager.get_or_create(&mut ctx).await.unwrap();
	assert_eq!(session.get::<String>("user").as_deref(), Some("alice"));
	assert_eq!(ctx.state(), Some(SessionState::Clean));
	let outcome = recording_manager.on_request_end(ctx).await.unwrap();

	// Assert
	assert_eq!(outcome, PersistOutcome::Skipped { id: id.clone() });
	assert_eq!(backend.writes_for(&id), 1);
	assert_eq!(backend.count_for(Command::Get, &id), 1);
}

#[rstest]
#[tokio::test]
async fn test_unchanged_value_does_not_trigger_write(
	recording_manager: SessionManager<RecordingBackend<InMemoryBackend>>,
) {
	// Arrange
	let mut ctx = recording_manager.on_request_start(None);
	recording_manager.create_session(&mut ctx, Some("sid")).await.unwrap();
	recording_manager.set_attribute(&mut ctx, "count", 3_i64).await.unwrap();
	recording_manager.on_request_end(ctx).await.unwrap();

	// Act
	let mut ctx = recording_manager.on_request_start(Some("sid".to_string()));
	recording_manager.get_or_create(&mut ctx).await.unwrap();
	let dirty = recording_manager.set_attribute(&mut ctx, "count", 3_i64).await.unwrap();
	recording_manager.on_request_end(ctx).await.unwrap();

	// Assert
	assert!(!dirty);
	assert_eq!(recording_manager.store().backend().writes_for("sid"), 1);
}

#[rstest]
#[tokio::test]
async fn test_invalidated_session_is_removed(session_manager: SessionManager<InMemoryBackend>) {
	// Arrange
	let mut ctx = session_manager.on_request_start(None);
	session_manager.create_session(&mut ctx, Some("doomed")).await.unwrap();
	session_manager.on_request_end(ctx).await.unwrap();
	assert!(session_manager.store().load("doomed").await.unwrap().is_some());

	// Act
	let mut ctx = session_manager.on_request_start(Some("doomed".to_string()));
	session_manager.get_or_create(&mut ctx).await.unwrap();
	session_manager.invalidate(&mut ctx).unwrap();
	assert_eq!(ctx.state(), Some(SessionState::Invalid));
	let outcome = session_manager.on_request_end(ctx).await.unwrap();

	// Assert
	assert_eq!(outcome, PersistOutcome::Removed { id: "doomed".to_string() });
	assert_eq!(session_manager.store().size().await.unwrap(), 0);
}

#[rstest]
#[tokio::test]
async fn test_colliding_ids_across_nodes(in_memory_backend: InMemoryBackend) {
	// Arrange
	let node_a = SessionManager::new(in_memory_backend.clone(), SessionConfig::default())
		.with_id_generator(ScriptedIdGenerator::new(["collide"]));
	let node_b = SessionManager::new(in_memory_backend.clone(), SessionConfig::default())
		.with_id_generator(ScriptedIdGenerator::new(["collide", "retry"]));

	// Act
	let mut ctx_a = node_a.on_request_start(None);
	let id_a = node_a
		.create_session(&mut ctx_a, None)
		.await
		.unwrap()
		.id()
		.to_string();
	let mut ctx_b = node_b.on_request_start(None);
	let id_b = node_b
		.create_session(&mut ctx_b, None)
		.await
		.unwrap()
		.id()
		.to_string();

	// Assert
	assert_eq!(id_a, "collide");
	assert_eq!(id_b, "retry");

	// Before either request ends, neither id is visible as a session.
	let mut lookup = node_b.on_request_start(Some(id_a.clone()));
	assert!(node_b.find_session(&mut lookup, &id_a).await.is_none());
	assert!(node_a.load_session(&id_b).await.unwrap().is_none());

	node_a.set_attribute(&mut ctx_a, "node", "a").await.unwrap();
	node_b.set_attribute(&mut ctx_b, "node", "b").await.unwrap();
	node_a.on_request_end(ctx_a).await.unwrap();
	node_b.on_request_end(ctx_b).await.unwrap();

	let seen_by_b = node_b.load_session(&id_a).await.unwrap().unwrap();
	let seen_by_a = node_a.load_session(&id_b).await.unwrap().unwrap();
	assert_eq!(seen_by_b.get::<String>("node").as_deref(), Some("a"));
	assert_eq!(seen_by_a.get::<String>("node").as_deref(), Some("b"));
}

#[rstest]
#[tokio::test]
async fn test_abandoned_request_leaves_expiring_reservation(in_memory_backend: InMemoryBackend) {
	// Arrange
	let config = SessionConfig::default().with_max_inactive_interval(300);
	let manager = SessionManager::new(in_memory_backend.clone(), config)
		.with_id_generator(ScriptedIdGenerator::new(["abandoned"]));
	let mut ctx = manager.on_request_start(None);
	manager.create_session(&mut ctx, None).await.unwrap();

	// Act
	drop(ctx);

	// Assert
	let ttl = manager.store().ttl("abandoned").await.unwrap().unwrap();
	assert!(ttl > Duration::from_secs(295) && ttl <= Duration::from_secs(300));
	assert!(manager.load_session("abandoned").await.unwrap().is_none());
}

#[rstest]
#[tokio::test]
async fn test_found_session_replaces_unsaved_reservation(in_memory_backend: InMemoryBackend) {
	// Arrange
	let manager = SessionManager::new(in_memory_backend, SessionConfig::default())
		.with_id_generator(ScriptedIdGenerator::new(["fresh"]));
	let mut ctx = manager.on_request_start(None);
	manager.create_session(&mut ctx, Some("saved")).await.unwrap();
	manager.on_request_end(ctx).await.unwrap();

	// Act
	let mut ctx = manager.on_request_start(None);
	manager.create_session(&mut ctx, None).await.unwrap();
	let found = manager.find_session(&mut ctx, "saved").await.is_some();
	let outcome = manager.on_request_end(ctx).await.unwrap();

	// Assert
	assert!(found);
	assert_eq!(outcome, PersistOutcome::Skipped { id: "saved".to_string() });
	assert_eq!(manager.store().backend().get("fresh").await.unwrap(), None);
	assert_eq!(manager.store().list_keys().await.unwrap(), vec!["saved".to_string()]);
}

#[rstest]
#[tokio::test]
async fn test_save_failure_propagates_and_stays_dirty() {
	// Arrange
	let backend = FlakyBackend::default();
	let manager = SessionManager::new(backend.clone(), SessionConfig::default());
	let mut ctx = manager.on_request_start(None);
	manager.create_session(&mut ctx, Some("sid")).await.unwrap();
	manager.set_attribute(&mut ctx, "user", "alice").await.unwrap();
	backend.fail_writes.store(true, Ordering::SeqCst);

	// Act
	let err = manager.persist(&mut ctx).await.unwrap_err();

	// Assert
	assert!(err.is_transport());
	assert_eq!(ctx.state(), Some(SessionState::Dirty));

	backend.fail_writes.store(false, Ordering::SeqCst);
	let outcome = manager.on_request_end(ctx).await.unwrap();
	assert_eq!(outcome, PersistOutcome::Saved { id: "sid".to_string() });
}

#[rstest]
#[tokio::test]
async fn test_load_failure_fails_open() {
	// Arrange
	let backend = FlakyBackend::default();
	let manager = SessionManager::new(backend.clone(), SessionConfig::default());
	let mut ctx = manager.on_request_start(None);
	manager.create_session(&mut ctx, Some("sid")).await.unwrap();
	manager.on_request_end(ctx).await.unwrap();
	backend.fail_reads.store(true, Ordering::SeqCst);

	// Act
	let mut ctx = manager.on_request_start(Some("sid".to_string()));
	let session = manager.get_or_create(&mut ctx).await.unwrap();

	// Assert
	assert_ne!(session.id(), "sid");
	assert!(session.is_new());
	assert!(manager.load_session("sid").await.unwrap_err().is_transport());
}

#[rstest]
#[tokio::test]
async fn test_unknown_attribute_type_fails_open(in_memory_backend: InMemoryBackend) {
	// Arrange
	let writer = SessionManager::new(in_memory_backend.clone(), SessionConfig::default());
	let mut ctx = writer.on_request_start(None);
	writer.create_session(&mut ctx, Some("sid")).await.unwrap();
	ctx.session_mut()
		.unwrap()
		.set_attribute("raw", serde_json::json!({"nested": true}));
	writer.on_request_end(ctx).await.unwrap();

	let reader = SessionManager::new(in_memory_backend, SessionConfig::default())
		.with_registry(TypeRegistry::new());

	// Act
	let err = reader.load_session("sid").await.unwrap_err();
	let mut ctx = reader.on_request_start(Some("sid".to_string()));
	let found = reader.find_session(&mut ctx, "sid").await;

	// Assert
	assert!(err.is_serialization());
	assert!(found.is_none());
}

#[rstest]
#[tokio::test]
async fn test_manual_marker_forces_write(in_memory_backend: InMemoryBackend) {
	// Arrange
	let backend = RecordingBackend::new(in_memory_backend);
	let config = SessionConfig::default().with_manual_dirty_tracking("__changed__");
	let manager = SessionManager::new(backend, config);
	let mut ctx = manager.on_request_start(None);
	manager.create_session(&mut ctx, Some("sid")).await.unwrap();
	manager.on_request_end(ctx).await.unwrap();

	// Act
	let mut ctx = manager.on_request_start(Some("sid".to_string()));
	manager.get_or_create(&mut ctx).await.unwrap();
	manager.set_attribute(&mut ctx, "__changed__", true).await.unwrap();
	let outcome = manager.on_request_end(ctx).await.unwrap();

	// Assert
	assert_eq!(outcome, PersistOutcome::Saved { id: "sid".to_string() });
	assert_eq!(manager.store().backend().writes_for("sid"), 2);
	let stored = manager.load_session("sid").await.unwrap().unwrap();
	assert!(!stored.contains_attribute("__changed__"));
}

#[rstest]
#[tokio::test]
async fn test_write_through_writes_each_mutation(in_memory_backend: InMemoryBackend) {
	// Arrange
	let backend = RecordingBackend::new(in_memory_backend);
	let config = SessionConfig::default().with_write_through(true);
	let manager = SessionManager::new(backend, config);
	let mut ctx = manager.on_request_start(None);
	manager.create_session(&mut ctx, Some("sid")).await.unwrap();

	// Act
	manager.set_attribute(&mut ctx, "a", 1_i32).await.unwrap();
	manager.set_attribute(&mut ctx, "a", 1_i32).await.unwrap();
	manager.remove_attribute(&mut ctx, "a").await.unwrap();
	let outcome = manager.on_request_end(ctx).await.unwrap();

	// Assert
	assert_eq!(manager.store().backend().writes_for("sid"), 2);
	assert_eq!(outcome, PersistOutcome::Skipped { id: "sid".to_string() });
}

#[rstest]
#[tokio::test]
async fn test_session_without_expiry(in_memory_backend: InMemoryBackend) {
	// Arrange
	let config = SessionConfig::default().with_max_inactive_interval(0);
	let manager = SessionManager::new(in_memory_backend, config);
	let mut ctx = manager.on_request_start(None);
	manager.create_session(&mut ctx, Some("sid")).await.unwrap();

	// Act
	manager.on_request_end(ctx).await.unwrap();

	// Assert
	assert!(manager.store().load("sid").await.unwrap().is_some());
	assert_eq!(manager.store().ttl("sid").await.unwrap(), None);
}

#[cfg(feature = "messagepack")]
#[rstest]
#[tokio::test]
async fn test_messagepack_payloads(in_memory_backend: InMemoryBackend) {
	use cluster_sessions_core::SerializationFormat;

	// Arrange
	let config = SessionConfig::default().with_serializer(SerializationFormat::MessagePack);
	let manager = SessionManager::new(in_memory_backend, config);
	let mut ctx = manager.on_request_start(None);
	manager.create_session(&mut ctx, Some("sid")).await.unwrap();
	manager.set_attribute(&mut ctx, "user", "alice").await.unwrap();

	// Act
	manager.on_request_end(ctx).await.unwrap();

	// Assert
	let loaded = manager.load_session("sid").await.unwrap().unwrap();
	assert_eq!(loaded.get::<String>("user").as_deref(), Some("alice"));
}
