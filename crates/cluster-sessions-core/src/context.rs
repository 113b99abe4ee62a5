//! Per-request session binding
//!
//! A [`RequestContext`] is created by
//! [`SessionManager::on_request_start`](crate::SessionManager::on_request_start),
//! owned by the task serving that request, and consumed by
//! [`SessionManager::on_request_end`](crate::SessionManager::on_request_end).
//! Nothing in it outlives the request, whichever way the request exits.

use crate::session::Session;

/// Lifecycle state of the bound session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
	/// Reserved but never durably written
	New,
	/// Durable, no pending changes
	Clean,
	/// Changed since the last durable write
	Dirty,
	/// Terminal; the store entry is removed at request end
	Invalid,
}

#[derive(Debug)]
struct SessionBinding {
	session: Session,
	persisted: bool,
}

/// Session state owned by a single in-flight request
///
/// # Examples
///
/// ```
/// use cluster_sessions_core::RequestContext;
///
/// let ctx = RequestContext::new(Some("abc".to_string()));
/// assert_eq!(ctx.requested_id(), Some("abc"));
/// assert!(ctx.session().is_none());
/// assert!(ctx.state().is_none());
/// ```
#[derive(Debug, Default)]
pub struct RequestContext {
	requested_id: Option<String>,
	binding: Option<SessionBinding>,
}

impl RequestContext {
	/// Start a context for a request that presented `requested_id`, if any
	pub fn new(requested_id: Option<String>) -> Self {
		Self {
			requested_id: requested_id.filter(|id| !id.is_empty()),
			binding: None,
		}
	}

	/// Session id the client presented with the request
	pub fn requested_id(&self) -> Option<&str> {
		self.requested_id.as_deref()
	}

	pub fn session(&self) -> Option<&Session> {
		self.binding.as_ref().map(|b| &b.session)
	}

	/// Direct mutable access to the bound session
	///
	/// Mutations made here do not notify the manager. They are visible to any
	/// later access through this context at once, since the context owns the
	/// only copy, and are persisted at request end. Use the manager's
	/// `set_attribute`/`remove_attribute` to get write-through behavior.
	pub fn session_mut(&mut self) -> Option<&mut Session> {
		self.binding.as_mut().map(|b| &mut b.session)
	}

	/// Id of the bound session
	pub fn session_id(&self) -> Option<&str> {
		self.session().map(Session::id)
	}

	/// Whether the bound session has been durably written at least once
	pub fn is_persisted(&self) -> bool {
		self.binding.as_ref().is_some_and(|b| b.persisted)
	}

	/// Lifecycle state of the bound session, `None` when nothing is bound
	pub fn state(&self) -> Option<SessionState> {
		let binding = self.binding.as_ref()?;
		let state = if !binding.session.is_valid() {
			SessionState::Invalid
		} else if binding.session.is_dirty() {
			SessionState::Dirty
		} else if !binding.persisted {
			SessionState::New
		} else {
			SessionState::Clean
		};
		Some(state)
	}

	/// Bind `session`, replacing any current binding
	///
	/// The manager releases the previous binding's store key before calling
	/// this.
	pub(crate) fn bind(&mut self, session: Session, persisted: bool) -> &mut Session {
		&mut self
			.binding
			.insert(SessionBinding { session, persisted })
			.session
	}

	pub(crate) fn unbind(&mut self) -> Option<Session> {
		self.binding.take().map(|b| b.session)
	}

	/// Bound session together with its persisted flag
	pub(crate) fn binding_mut(&mut self) -> Option<(&mut Session, &mut bool)> {
		self.binding
			.as_mut()
			.map(|b| (&mut b.session, &mut b.persisted))
	}
}
