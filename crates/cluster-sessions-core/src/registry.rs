//! Attribute type resolution
//!
//! A [`TypeRegistry`] is the application's type namespace as seen by the
//! deserializer. Every attribute read back from the store names its type; the
//! registry either materializes that type (proving the stored value fits it)
//! or reports it as unknown.
//!
//! ## Example
//!
//! ```rust
//! use cluster_sessions_core::{AttributeValue, SessionValue, TypeRegistry};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Locale(String);
//!
//! impl SessionValue for Locale {
//!     const TYPE_NAME: &'static str = "app.Locale";
//! }
//!
//! let registry = TypeRegistry::with_builtins().with::<Locale>();
//! assert!(registry.contains("app.Locale"));
//! assert!(registry.contains("string"));
//!
//! let value = AttributeValue::new(&Locale("en".to_string())).unwrap();
//! assert!(registry.resolve("locale", &value).is_ok());
//! ```

use crate::attribute::{AttributeValue, SessionValue};
use crate::error::SerializationError;
use std::collections::HashMap;
use std::fmt;

type Materializer = fn(&serde_json::Value) -> Result<(), String>;

fn materialize<T: SessionValue>(value: &serde_json::Value) -> Result<(), String> {
	serde_json::from_value::<T>(value.clone())
		.map(|_| ())
		.map_err(|e| e.to_string())
}

/// Registry of attribute types known to this node
#[derive(Clone, Default)]
pub struct TypeRegistry {
	types: HashMap<&'static str, Materializer>,
}

impl TypeRegistry {
	/// Create an empty registry that resolves nothing
	pub fn new() -> Self {
		Self::default()
	}

	/// Create a registry with every built-in [`SessionValue`] type registered
	pub fn with_builtins() -> Self {
		let mut registry = Self::new();
		registry
			.register::<String>()
			.register::<bool>()
			.register::<i32>()
			.register::<i64>()
			.register::<u32>()
			.register::<u64>()
			.register::<f64>()
			.register::<Vec<String>>()
			.register::<serde_json::Value>();
		registry
	}

	/// Register `T` under its [`SessionValue::TYPE_NAME`]
	pub fn register<T: SessionValue>(&mut self) -> &mut Self {
		self.types.insert(T::TYPE_NAME, materialize::<T>);
		self
	}

	/// Builder form of [`register`](Self::register)
	pub fn with<T: SessionValue>(mut self) -> Self {
		self.register::<T>();
		self
	}

	pub fn contains(&self, type_name: &str) -> bool {
		self.types.contains_key(type_name)
	}

	pub fn len(&self) -> usize {
		self.types.len()
	}

	pub fn is_empty(&self) -> bool {
		self.types.is_empty()
	}

	/// Check that `value`, stored under `attribute`, can be materialized
	pub fn resolve(&self, attribute: &str, value: &AttributeValue) -> Result<(), SerializationError> {
		let materializer =
			self.types
				.get(value.type_name())
				.ok_or_else(|| SerializationError::UnknownType {
					attribute: attribute.to_string(),
					type_name: value.type_name().to_string(),
				})?;

		materializer(value.raw()).map_err(|reason| SerializationError::IncompatibleValue {
			attribute: attribute.to_string(),
			type_name: value.type_name().to_string(),
			reason,
		})
	}
}

impl fmt::Debug for TypeRegistry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut names: Vec<_> = self.types.keys().collect();
		names.sort();
		f.debug_struct("TypeRegistry").field("types", &names).finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn test_empty_registry_reports_unknown_type() {
		let registry = TypeRegistry::new();
		let value = AttributeValue::from("alice");

		let err = registry.resolve("user", &value).unwrap_err();

		assert!(matches!(
			err,
			SerializationError::UnknownType { ref attribute, ref type_name }
				if attribute == "user" && type_name == "string"
		));
	}

	#[test]
	fn test_mismatched_shape_is_incompatible() {
		let registry = TypeRegistry::with_builtins();
		let value = AttributeValue::from_parts("i64", json!("not a number"));

		let err = registry.resolve("count", &value).unwrap_err();

		assert!(err.is_resolution_failure());
		assert!(matches!(err, SerializationError::IncompatibleValue { .. }));
	}

	#[test]
	fn test_builtins_resolve() {
		let registry = TypeRegistry::with_builtins();

		assert_eq!(registry.len(), 9);
		assert!(registry.resolve("n", &AttributeValue::from(7_u32)).is_ok());
		assert!(
			registry
				.resolve("tags", &AttributeValue::from(vec!["a".to_string()]))
				.is_ok()
		);
	}
}
