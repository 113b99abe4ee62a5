//! Deterministic session id generation

use cluster_sessions_core::{SessionIdGenerator, UuidSessionIdGenerator};
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// Hands out a fixed list of ids, then falls back to random ones
///
/// # Examples
///
/// ```
/// use cluster_sessions_core::SessionIdGenerator;
/// use cluster_sessions_test::ScriptedIdGenerator;
///
/// let generator = ScriptedIdGenerator::new(["a", "b"]);
/// assert_eq!(generator.generate(), "a");
/// assert_eq!(generator.generate(), "b");
/// assert_eq!(generator.generate().len(), 32);
/// ```
#[derive(Debug, Default)]
pub struct ScriptedIdGenerator {
	ids: Mutex<VecDeque<String>>,
}

impl ScriptedIdGenerator {
	pub fn new<I, S>(ids: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self {
			ids: Mutex::new(ids.into_iter().map(Into::into).collect()),
		}
	}

	/// Ids not yet handed out
	pub fn remaining(&self) -> usize {
		self.ids.lock().unwrap_or_else(PoisonError::into_inner).len()
	}
}

impl SessionIdGenerator for ScriptedIdGenerator {
	fn generate(&self) -> String {
		self.ids
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.pop_front()
			.unwrap_or_else(|| UuidSessionIdGenerator.generate())
	}
}
