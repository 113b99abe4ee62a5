//! Session id generation
//!
//! Generators only propose candidates. Uniqueness across the cluster comes from
//! reserving each candidate in the store.

use uuid::Uuid;

/// Source of candidate session ids
pub trait SessionIdGenerator: Send + Sync {
	fn generate(&self) -> String;
}

/// Random UUIDv4 ids without hyphens
///
/// # Examples
///
/// ```
/// use cluster_sessions_core::{SessionIdGenerator, UuidSessionIdGenerator};
///
/// let id = UuidSessionIdGenerator.generate();
/// assert_eq!(id.len(), 32);
/// assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidSessionIdGenerator;

impl SessionIdGenerator for UuidSessionIdGenerator {
	fn generate(&self) -> String {
		Uuid::new_v4().simple().to_string()
	}
}

impl<F> SessionIdGenerator for F
where
	F: Fn() -> String + Send + Sync,
{
	fn generate(&self) -> String {
		self()
	}
}

/// Append the node route, if any, as `.<route>`
pub(crate) fn with_route(id: String, route: Option<&str>) -> String {
	match route {
		Some(route) if !route.is_empty() => format!("{}.{}", id, route),
		_ => id,
	}
}
