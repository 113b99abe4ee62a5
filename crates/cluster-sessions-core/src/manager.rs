//! Per-request session persistence
//!
//! [`SessionManager`] drives a session through its lifecycle:
//!
//! ```text
//! RESERVED -> NEW -> CLEAN <-> DIRTY -> INVALID
//! ```
//!
//! New ids are claimed with [`SessionStore::reserve`] before the session is
//! handed to the request. At request end the bound session is removed if it
//! was invalidated, written if it is dirty or has never been written, and
//! left alone otherwise. Every write refreshes the key's TTL.
//!
//! ## Example
//!
//! ```rust
//! use cluster_sessions_core::backends::InMemoryBackend;
//! use cluster_sessions_core::{PersistOutcome, SessionConfig, SessionManager};
//!
//! # tokio_test::block_on(async {
//! let manager = SessionManager::new(InMemoryBackend::new(), SessionConfig::default());
//!
//! // First request: no cookie, a session is created and written.
//! let mut ctx = manager.on_request_start(None);
//! let session = manager.get_or_create(&mut ctx).await.unwrap();
//! session.set_attribute("user", "alice");
//! let id = session.id().to_string();
//! let outcome = manager.on_request_end(ctx).await.unwrap();
//! assert_eq!(outcome, PersistOutcome::Saved { id: id.clone() });
//!
//! // Second request: the session is loaded and nothing changes.
//! let mut ctx = manager.on_request_start(Some(id.clone()));
//! let session = manager.get_or_create(&mut ctx).await.unwrap();
//! assert_eq!(session.get::<String>("user").as_deref(), Some("alice"));
//! let outcome = manager.on_request_end(ctx).await.unwrap();
//! assert_eq!(outcome, PersistOutcome::Skipped { id });
//! # });
//! ```

use crate::attribute::AttributeValue;
use crate::backends::KeyValueBackend;
use crate::config::SessionConfig;
use crate::context::{RequestContext, SessionState};
use crate::error::{Result, SessionError};
use crate::id::{SessionIdGenerator, UuidSessionIdGenerator, with_route};
use crate::registry::TypeRegistry;
use crate::serialization::SessionSerializer;
use crate::session::Session;
use crate::store::SessionStore;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "redis-backend")]
use crate::backends::RedisBackend;

/// What the end-of-request decision did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
	/// No session was bound to the request
	NoSession,
	/// The session was serialized and written
	Saved { id: String },
	/// The session was durable and clean; no write was issued
	Skipped { id: String },
	/// The session was invalidated and its key deleted
	Removed { id: String },
}

/// Coordinates session lookup, creation and persistence for requests
pub struct SessionManager<B> {
	store: SessionStore<B>,
	serializer: SessionSerializer,
	registry: Arc<TypeRegistry>,
	config: SessionConfig,
	id_generator: Arc<dyn SessionIdGenerator>,
}

impl<B: Clone> Clone for SessionManager<B> {
	fn clone(&self) -> Self {
		Self {
			store: self.store.clone(),
			serializer: self.serializer,
			registry: Arc::clone(&self.registry),
			config: self.config.clone(),
			id_generator: Arc::clone(&self.id_generator),
		}
	}
}

impl<B> fmt::Debug for SessionManager<B> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SessionManager")
			.field("serializer", &self.serializer.format())
			.field("registry", &self.registry)
			.field("config", &self.config)
			.finish_non_exhaustive()
	}
}

#[cfg(feature = "redis-backend")]
impl SessionManager<RedisBackend> {
	/// Build a manager backed by the Redis server described in `config.redis`
	///
	/// The pool connects lazily; an unreachable server surfaces on the first
	/// store call, not here.
	pub fn from_config(config: SessionConfig) -> Result<Self> {
		config.validate()?;
		let backend = RedisBackend::from_settings(&config.redis)?;
		Ok(Self::new(backend, config))
	}
}

impl<B: KeyValueBackend> SessionManager<B> {
	/// Create a manager over `backend`
	///
	/// Attributes are resolved against [`TypeRegistry::with_builtins`] and ids
	/// come from [`UuidSessionIdGenerator`] until replaced.
	pub fn new(backend: B, config: SessionConfig) -> Self {
		Self {
			store: SessionStore::new(backend),
			serializer: SessionSerializer::new(config.serializer),
			registry: Arc::new(TypeRegistry::with_builtins()),
			config,
			id_generator: Arc::new(UuidSessionIdGenerator),
		}
	}

	pub fn with_id_generator(mut self, generator: impl SessionIdGenerator + 'static) -> Self {
		self.id_generator = Arc::new(generator);
		self
	}

	/// Resolve attribute types against `registry` when loading
	pub fn with_registry(mut self, registry: TypeRegistry) -> Self {
		self.registry = Arc::new(registry);
		self
	}

	pub fn config(&self) -> &SessionConfig {
		&self.config
	}

	pub fn store(&self) -> &SessionStore<B> {
		&self.store
	}

	pub fn registry(&self) -> &TypeRegistry {
		&self.registry
	}

	pub fn serializer(&self) -> SessionSerializer {
		self.serializer
	}

	/// Open a context for a request that presented `requested_id`
	pub fn on_request_start(&self, requested_id: Option<String>) -> RequestContext {
		RequestContext::new(requested_id)
	}

	/// Read and decode a session without binding it to any request
	///
	/// `Ok(None)` when the id is unknown or only reserved. Decoding errors are
	/// returned as-is.
	pub async fn load_session(&self, id: &str) -> Result<Option<Session>> {
		let Some(payload) = self.store.load(id).await? else {
			return Ok(None);
		};
		let decoded = self.serializer.deserialize(&payload, &self.registry)?;
		let session = decoded.into_session(
			id,
			self.config.max_inactive_interval_secs,
			self.config.manual_dirty_tracking.clone(),
		);
		Ok(Some(session))
	}

	/// Find the session with `id`, binding it to the request
	///
	/// A session already bound under the same id is returned without a store
	/// round trip. Load failures are logged and reported as "no session" so
	/// the request can continue with a fresh one. A different session that is
	/// still bound is released first.
	pub async fn find_session<'c>(
		&self,
		ctx: &'c mut RequestContext,
		id: &str,
	) -> Option<&'c mut Session> {
		if ctx.session_id() == Some(id) {
			return ctx.session_mut();
		}

		match self.load_session(id).await {
			Ok(Some(session)) => {
				tracing::debug!(session_id = %id, "Loaded session from store");
				self.release_binding(ctx).await;
				Some(ctx.bind(session, true))
			}
			Ok(None) => None,
			Err(e) => {
				tracing::warn!(
					session_id = %id,
					error = %e,
					transport = e.is_transport(),
					"Failed to load session; continuing without it"
				);
				None
			}
		}
	}

	/// Create a session under a freshly reserved id and bind it to the request
	///
	/// A `requested_id` is reserved as given; if it is already taken, a
	/// generated id is used instead. A session that is still bound is released
	/// first.
	pub async fn create_session<'c>(
		&self,
		ctx: &'c mut RequestContext,
		requested_id: Option<&str>,
	) -> Result<&'c mut Session> {
		let id = self.reserve_id(requested_id).await?;
		self.release_binding(ctx).await;
		let session = Session::new(
			id,
			self.config.max_inactive_interval_secs,
			self.config.manual_dirty_tracking.clone(),
		);
		tracing::info!(session_id = %session.id(), "Created session");
		Ok(ctx.bind(session, false))
	}

	/// The request's session: already bound, loaded from the requested id, or
	/// newly created
	///
	/// An invalidated binding is removed from the store first and replaced.
	pub async fn get_or_create<'c>(&self, ctx: &'c mut RequestContext) -> Result<&'c mut Session> {
		match ctx.state() {
			Some(SessionState::Invalid) => {
				self.persist(ctx).await?;
				return self.create_session(ctx, None).await;
			}
			Some(_) => return ctx.session_mut().ok_or(SessionError::NoSession),
			None => {}
		}

		let found = match ctx.requested_id().map(str::to_owned) {
			Some(id) => self.find_session(ctx, &id).await.is_some(),
			None => false,
		};
		if found {
			return ctx.session_mut().ok_or(SessionError::NoSession);
		}

		self.create_session(ctx, None).await
	}

	/// Set an attribute on the bound session
	///
	/// Returns whether the session is dirty afterwards. In write-through mode
	/// a dirty session is persisted before returning.
	pub async fn set_attribute(
		&self,
		ctx: &mut RequestContext,
		key: impl Into<String>,
		value: impl Into<AttributeValue>,
	) -> Result<bool> {
		let session = ctx.session_mut().ok_or(SessionError::NoSession)?;
		let dirty = session.set_attribute(key, value);
		if dirty && self.config.write_through {
			self.persist(ctx).await?;
		}
		Ok(dirty)
	}

	/// Remove an attribute from the bound session
	///
	/// In write-through mode the removal is persisted before returning.
	pub async fn remove_attribute(
		&self,
		ctx: &mut RequestContext,
		key: &str,
	) -> Result<Option<AttributeValue>> {
		let session = ctx.session_mut().ok_or(SessionError::NoSession)?;
		let removed = session.remove_attribute(key);
		if self.config.write_through {
			self.persist(ctx).await?;
		}
		Ok(removed)
	}

	/// Invalidate the bound session; its key is deleted at request end
	pub fn invalidate(&self, ctx: &mut RequestContext) -> Result<()> {
		let session = ctx.session_mut().ok_or(SessionError::NoSession)?;
		session.invalidate();
		tracing::debug!(session_id = %session.id(), "Session invalidated");
		Ok(())
	}

	/// Move the bound session to a freshly reserved id
	///
	/// The old key is deleted immediately; the session is written under the
	/// new id at the next persist.
	pub async fn change_session_id(&self, ctx: &mut RequestContext) -> Result<String> {
		let old_id = ctx.session_id().ok_or(SessionError::NoSession)?.to_string();
		let new_id = self.reserve_id(None).await?;
		self.store.remove(&old_id).await?;

		if let Some((session, persisted)) = ctx.binding_mut() {
			session.set_id(new_id.as_str());
			*persisted = false;
		}
		tracing::info!(previous = %old_id, session_id = %new_id, "Changed session id");
		Ok(new_id)
	}

	/// Apply the end-of-request decision to the bound session now
	///
	/// Save failures propagate and leave the session dirty so a later persist
	/// retries the write.
	pub async fn persist(&self, ctx: &mut RequestContext) -> Result<PersistOutcome> {
		let Some((session, persisted)) = ctx.binding_mut() else {
			return Ok(PersistOutcome::NoSession);
		};
		let id = session.id().to_string();

		if !session.is_valid() {
			self.store.remove(&id).await?;
			ctx.unbind();
			tracing::info!(session_id = %id, "Removed invalidated session");
			return Ok(PersistOutcome::Removed { id });
		}

		if !session.is_dirty() && *persisted {
			tracing::trace!(session_id = %id, "Session clean; skipping write");
			return Ok(PersistOutcome::Skipped { id });
		}

		let was_new = !*persisted;
		session.reset_dirty_tracking();
		let written = match self.serializer.serialize(session) {
			Ok(payload) => {
				self.store
					.save(&id, &payload, session.max_inactive_interval())
					.await
			}
			Err(e) => Err(e.into()),
		};
		if let Err(e) = written {
			session.mark_dirty();
			tracing::error!(session_id = %id, error = %e, "Failed to persist session");
			return Err(e);
		}

		*persisted = true;
		session.set_new(false);
		tracing::debug!(session_id = %id, was_new, "Persisted session");
		Ok(PersistOutcome::Saved { id })
	}

	/// Finish the request: persist the bound session and drop the context
	pub async fn on_request_end(&self, mut ctx: RequestContext) -> Result<PersistOutcome> {
		self.persist(&mut ctx).await
	}

	/// Unbind the current session so another can take its place
	///
	/// An unwritten binding only holds a reservation and an invalidated one is
	/// due for removal, so both keys are deleted. A failed delete is logged and
	/// left to the key's TTL.
	async fn release_binding(&self, ctx: &mut RequestContext) {
		let discard = matches!(ctx.state(), Some(SessionState::Invalid)) || !ctx.is_persisted();
		let Some(session) = ctx.unbind() else {
			return;
		};
		if !discard {
			tracing::debug!(session_id = %session.id(), "Released session binding");
			return;
		}
		match self.store.remove(session.id()).await {
			Ok(()) => {
				tracing::debug!(session_id = %session.id(), "Discarded unwritten session binding");
			}
			Err(e) => {
				tracing::warn!(
					session_id = %session.id(),
					error = %e,
					"Failed to discard replaced session; its key expires on its own"
				);
			}
		}
	}

	async fn reserve_id(&self, requested_id: Option<&str>) -> Result<String> {
		let ttl_seconds = self.config.max_inactive_interval_secs;
		if let Some(id) = requested_id.filter(|id| !id.is_empty()) {
			if self.store.reserve(id, ttl_seconds).await? {
				return Ok(id.to_string());
			}
			tracing::warn!(session_id = %id, "Requested session id already in use; generating one");
		}

		let attempts = self.config.max_reserve_attempts;
		for attempt in 1..=attempts {
			let candidate = with_route(
				self.id_generator.generate(),
				self.config.node_route.as_deref(),
			);
			if self.store.reserve(&candidate, ttl_seconds).await? {
				return Ok(candidate);
			}
			tracing::warn!(session_id = %candidate, attempt, "Session id collision; retrying");
		}

		tracing::error!(attempts, "Exhausted session id reservation attempts");
		Err(SessionError::IdAllocationExhausted { attempts })
	}
}
