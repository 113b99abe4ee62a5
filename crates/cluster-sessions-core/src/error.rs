//! Error types for session persistence
//!
//! Failures fall into three families that callers need to tell apart:
//!
//! - [`BackendError`]: the key-value backend could not be reached or refused
//!   the command (connection refused, pool exhausted, network timeout).
//! - [`SerializationError`]: the backend is fine but the payload is bad
//!   (unknown attribute type, truncated or corrupt bytes).
//! - [`SessionError`]: the umbrella type returned by the store and the
//!   session manager.
//!
//! A missing key, or a key holding only the reservation sentinel, is not an
//! error. It is reported as `Ok(None)`.

use thiserror::Error;

/// Transport-level failures talking to the key-value backend
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BackendError {
	/// A connection could not be checked out of the pool
	#[error("Failed to get connection from pool: {0}")]
	Pool(String),

	/// The pool stayed exhausted for longer than the configured wait bound
	#[error("Timed out waiting for a pooled connection")]
	PoolTimeout,

	/// The connection to the backend failed or was dropped
	#[error("Backend connection error: {0}")]
	Connection(String),

	/// The backend rejected or failed to execute a command
	#[error("Backend command `{command}` failed: {message}")]
	Command {
		command: &'static str,
		message: String,
	},
}

impl BackendError {
	/// Build a command failure for the given backend command name
	pub fn command(command: &'static str, message: impl Into<String>) -> Self {
		Self::Command {
			command,
			message: message.into(),
		}
	}
}

/// Failures encoding or decoding a session payload
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SerializationError {
	/// The payload is shorter than the fixed creation-time header
	#[error("Session payload truncated: expected at least {expected} bytes, got {actual}")]
	Truncated { expected: usize, actual: usize },

	/// The attribute/principal body could not be parsed
	#[error("Corrupt session payload: {0}")]
	Corrupt(String),

	/// An attribute carries a type name the resolver does not know
	#[error("Unknown attribute type `{type_name}` for attribute `{attribute}`")]
	UnknownType {
		attribute: String,
		type_name: String,
	},

	/// The resolver knows the type but the stored value does not fit it
	#[error("Attribute `{attribute}` cannot be materialized as `{type_name}`: {reason}")]
	IncompatibleValue {
		attribute: String,
		type_name: String,
		reason: String,
	},

	/// A value could not be encoded
	#[error("Failed to encode session payload: {0}")]
	Encode(String),

	/// The requested payload format was not compiled in
	#[error("Unsupported serialization format: {0}")]
	UnsupportedFormat(String),
}

impl SerializationError {
	/// True when the bytes are structurally broken
	pub fn is_corruption(&self) -> bool {
		matches!(self, Self::Truncated { .. } | Self::Corrupt(_))
	}

	/// True when the bytes parsed but an attribute type could not be resolved
	pub fn is_resolution_failure(&self) -> bool {
		matches!(
			self,
			Self::UnknownType { .. } | Self::IncompatibleValue { .. }
		)
	}
}

/// Errors returned by the session store and the session manager
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SessionError {
	#[error(transparent)]
	Transport(#[from] BackendError),

	#[error(transparent)]
	Serialization(#[from] SerializationError),

	/// Every candidate id collided with an existing key
	#[error("Could not reserve a unique session id after {attempts} attempts")]
	IdAllocationExhausted { attempts: u32 },

	/// An operation required a bound session but the request has none
	#[error("No session is bound to the current request")]
	NoSession,

	#[error("Invalid session configuration: {0}")]
	InvalidConfig(String),
}

impl SessionError {
	pub fn is_transport(&self) -> bool {
		matches!(self, Self::Transport(_))
	}

	pub fn is_serialization(&self) -> bool {
		matches!(self, Self::Serialization(_))
	}
}

/// Result type for session operations
pub type Result<T, E = SessionError> = std::result::Result<T, E>;
