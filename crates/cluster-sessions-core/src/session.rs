//! Session entity and dirty tracking
//!
//! A [`Session`] keeps two views of its attributes: the authoritative
//! attribute map, and a diff of the attributes changed since the last
//! successful write. The diff, together with an explicit dirty flag for
//! operations the diff cannot see (removal, principal change, manual marker),
//! decides whether the session needs a network write at the end of a request.
//!
//! ## Example
//!
//! ```rust
//! use cluster_sessions_core::{ManualDirtyTracking, Session};
//!
//! let mut session = Session::new("abc", 1800, ManualDirtyTracking::default());
//! session.reset_dirty_tracking();
//!
//! session.set_attribute("user", "alice");
//! assert!(session.is_dirty());
//!
//! session.reset_dirty_tracking();
//! session.set_attribute("user", "alice");
//! assert!(!session.is_dirty(), "same value leaves the session clean");
//! ```

use crate::attribute::{AttributeValue, Principal, SessionValue};
use crate::config::ManualDirtyTracking;
use crate::error::SerializationError;
use chrono::Utc;
use std::collections::HashMap;
use std::fmt;

/// Current wall-clock time in milliseconds since the Unix epoch
pub(crate) fn now_millis() -> i64 {
	Utc::now().timestamp_millis()
}

/// Server-side state for one client, identified by an opaque id
#[derive(Clone)]
pub struct Session {
	id: String,
	creation_time: i64,
	last_accessed_time: i64,
	max_inactive_interval: i64,
	attributes: HashMap<String, AttributeValue>,
	changed_attributes: HashMap<String, AttributeValue>,
	dirty: bool,
	valid: bool,
	is_new: bool,
	principal: Option<Principal>,
	tracking: ManualDirtyTracking,
}

impl Session {
	/// Create a fresh, valid, new session stamped with the current time
	///
	/// A fresh session starts clean; it is [`is_new`](Self::is_new)
	/// until it has been durably stored.
	pub fn new(
		id: impl Into<String>,
		max_inactive_interval: i64,
		tracking: ManualDirtyTracking,
	) -> Self {
		let now = now_millis();
		Self {
			id: id.into(),
			creation_time: now,
			last_accessed_time: now,
			max_inactive_interval,
			attributes: HashMap::new(),
			changed_attributes: HashMap::new(),
			dirty: false,
			valid: true,
			is_new: true,
			principal: None,
			tracking,
		}
	}

	/// Rebuild a session from decoded store state
	///
	/// The result is valid, not new, freshly accessed, and clean.
	pub(crate) fn restore(
		id: impl Into<String>,
		creation_time: i64,
		attributes: HashMap<String, AttributeValue>,
		principal: Option<Principal>,
		max_inactive_interval: i64,
		tracking: ManualDirtyTracking,
	) -> Self {
		let mut session = Self {
			id: id.into(),
			creation_time,
			last_accessed_time: creation_time,
			max_inactive_interval,
			attributes,
			changed_attributes: HashMap::new(),
			dirty: false,
			valid: true,
			is_new: false,
			principal,
			tracking,
		};
		session.access();
		session
	}

	pub fn id(&self) -> &str {
		&self.id
	}

	/// Rename the session in memory only
	///
	/// Used right after an id has been reserved or a payload loaded. No store
	/// side effects are triggered and the dirty state is untouched.
	pub fn set_id(&mut self, id: impl Into<String>) {
		self.id = id.into();
	}

	pub fn creation_time(&self) -> i64 {
		self.creation_time
	}

	pub fn set_creation_time(&mut self, millis: i64) {
		self.creation_time = millis;
	}

	pub fn last_accessed_time(&self) -> i64 {
		self.last_accessed_time
	}

	/// Record an access at the current time
	pub fn access(&mut self) {
		self.last_accessed_time = now_millis().max(self.creation_time);
	}

	/// Inactivity timeout in seconds
	pub fn max_inactive_interval(&self) -> i64 {
		self.max_inactive_interval
	}

	pub fn set_max_inactive_interval(&mut self, seconds: i64) {
		self.max_inactive_interval = seconds;
	}

	pub fn is_valid(&self) -> bool {
		self.valid
	}

	/// Mark the session terminal; it will be removed, never written again
	pub fn invalidate(&mut self) {
		self.valid = false;
	}

	pub fn is_new(&self) -> bool {
		self.is_new
	}

	pub fn set_new(&mut self, is_new: bool) {
		self.is_new = is_new;
	}

	pub fn manual_dirty_tracking(&self) -> &ManualDirtyTracking {
		&self.tracking
	}

	/// Whether the session has changes not yet durably written
	pub fn is_dirty(&self) -> bool {
		self.dirty || !self.changed_attributes.is_empty()
	}

	/// Attributes changed since the last reset
	pub fn changed_attributes(&self) -> &HashMap<String, AttributeValue> {
		&self.changed_attributes
	}

	/// Forget every pending change
	pub fn reset_dirty_tracking(&mut self) {
		self.changed_attributes.clear();
		self.dirty = false;
	}

	/// Force the session dirty without touching attributes
	pub fn mark_dirty(&mut self) {
		self.dirty = true;
	}

	pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
		self.attributes.get(key)
	}

	/// Typed attribute access
	pub fn get<T: SessionValue>(&self, key: &str) -> Option<T> {
		self.attributes.get(key).and_then(AttributeValue::get)
	}

	pub fn attributes(&self) -> &HashMap<String, AttributeValue> {
		&self.attributes
	}

	pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
		self.attributes.keys().map(String::as_str)
	}

	pub fn contains_attribute(&self, key: &str) -> bool {
		self.attributes.contains_key(key)
	}

	/// Store an attribute, recording it in the diff when it changed
	///
	/// The value counts as changed when it was absent before, or when its
	/// type name or serialized value differs from the stored one. When the
	/// manual marker is enabled and `key` is the marker key, the session is
	/// forced dirty and nothing is stored.
	///
	/// Returns `true` when the session is dirty after the call. Nothing else is
	/// notified; `SessionManager::set_attribute` acts on this result to write
	/// through.
	pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> bool {
		let key = key.into();

		if self.tracking.is_marker(&key) {
			self.dirty = true;
			return true;
		}

		let value = value.into();
		if self.attributes.get(&key) != Some(&value) {
			self.changed_attributes.insert(key.clone(), value.clone());
		}
		self.attributes.insert(key, value);

		self.is_dirty()
	}

	/// Serialize `value` and store it via [`set_attribute`](Self::set_attribute)
	pub fn insert<T: SessionValue>(
		&mut self,
		key: impl Into<String>,
		value: &T,
	) -> Result<bool, SerializationError> {
		let value = AttributeValue::new(value)?;
		Ok(self.set_attribute(key, value))
	}

	/// Remove an attribute; always marks the session dirty
	pub fn remove_attribute(&mut self, key: &str) -> Option<AttributeValue> {
		self.dirty = true;
		self.changed_attributes.remove(key);
		self.attributes.remove(key)
	}

	pub fn principal(&self) -> Option<&Principal> {
		self.principal.as_ref()
	}

	/// Replace the principal; always marks the session dirty
	pub fn set_principal(&mut self, principal: Option<Principal>) {
		self.dirty = true;
		self.principal = principal;
	}
}

impl fmt::Debug for Session {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Session")
			.field("id", &self.id)
			.field("creation_time", &self.creation_time)
			.field("last_accessed_time", &self.last_accessed_time)
			.field("max_inactive_interval", &self.max_inactive_interval)
			.field("attributes", &self.attributes.len())
			.field("dirty", &self.is_dirty())
			.field("valid", &self.valid)
			.field("is_new", &self.is_new)
			.finish()
	}
}

impl fmt::Display for Session {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Session[{}]", self.id)
	}
}
