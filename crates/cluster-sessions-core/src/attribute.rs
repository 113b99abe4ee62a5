//! Session attribute values and the authenticated principal
//!
//! Attribute values come from the host application and can be of any type
//! that implements [`SessionValue`]. Each stored value carries the registered
//! type name next to its serialized form so that a node reading the session
//! later can check it against its own [`TypeRegistry`](crate::TypeRegistry)
//! before handing it back to application code.
//!
//! ## Example
//!
//! ```rust
//! use cluster_sessions_core::{AttributeValue, SessionValue};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! struct Cart {
//!     items: Vec<String>,
//! }
//!
//! impl SessionValue for Cart {
//!     const TYPE_NAME: &'static str = "shop.Cart";
//! }
//!
//! let cart = Cart { items: vec!["book".to_string()] };
//! let value = AttributeValue::new(&cart).unwrap();
//!
//! assert_eq!(value.type_name(), "shop.Cart");
//! assert_eq!(value.get::<Cart>(), Some(cart));
//! ```

use crate::error::SerializationError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A type that can be stored as a session attribute
///
/// `TYPE_NAME` must be stable across every node of the cluster: it is written
/// into the store and resolved again on load.
pub trait SessionValue: Serialize + DeserializeOwned + Send + Sync + 'static {
	const TYPE_NAME: &'static str;
}

macro_rules! builtin_session_values {
	($($ty:ty => $name:literal),* $(,)?) => {
		$(
			impl SessionValue for $ty {
				const TYPE_NAME: &'static str = $name;
			}
		)*
	};
}

builtin_session_values! {
	String => "string",
	bool => "bool",
	i32 => "i32",
	i64 => "i64",
	u32 => "u32",
	u64 => "u64",
	f64 => "f64",
	Vec<String> => "string_list",
	serde_json::Value => "json",
}

/// A typed, serialized attribute value
///
/// Two values are equal when both the type name and the serialized value are
/// equal, so `1_i32` and `1_i64` are different values even though their JSON
/// forms match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeValue {
	#[serde(rename = "type")]
	type_name: String,
	value: serde_json::Value,
}

impl AttributeValue {
	/// Serialize `value` under its registered type name
	pub fn new<T: SessionValue>(value: &T) -> Result<Self, SerializationError> {
		let value =
			serde_json::to_value(value).map_err(|e| SerializationError::Encode(e.to_string()))?;
		Ok(Self {
			type_name: T::TYPE_NAME.to_string(),
			value,
		})
	}

	/// Build a value from an already-serialized form
	pub fn from_parts(type_name: impl Into<String>, value: serde_json::Value) -> Self {
		Self {
			type_name: type_name.into(),
			value,
		}
	}

	/// The registered type name (the value's runtime category)
	pub fn type_name(&self) -> &str {
		&self.type_name
	}

	/// The serialized form of the value
	pub fn raw(&self) -> &serde_json::Value {
		&self.value
	}

	/// Whether this value was stored as a `T`
	pub fn is<T: SessionValue>(&self) -> bool {
		self.type_name == T::TYPE_NAME
	}

	/// Typed access; `None` when the value was stored under another type
	pub fn get<T: SessionValue>(&self) -> Option<T> {
		if !self.is::<T>() {
			return None;
		}
		serde_json::from_value(self.value.clone()).ok()
	}

	/// Decode into `T` regardless of the recorded type name
	pub fn decode<T: DeserializeOwned>(&self) -> Result<T, SerializationError> {
		serde_json::from_value(self.value.clone()).map_err(|e| {
			SerializationError::IncompatibleValue {
				attribute: String::new(),
				type_name: self.type_name.clone(),
				reason: e.to_string(),
			}
		})
	}
}

macro_rules! attribute_from {
	($($ty:ty => $name:literal),* $(,)?) => {
		$(
			impl From<$ty> for AttributeValue {
				fn from(value: $ty) -> Self {
					Self::from_parts($name, serde_json::Value::from(value))
				}
			}
		)*
	};
}

attribute_from! {
	String => "string",
	&str => "string",
	bool => "bool",
	i32 => "i32",
	i64 => "i64",
	u32 => "u32",
	u64 => "u64",
	Vec<String> => "string_list",
}

impl From<serde_json::Value> for AttributeValue {
	fn from(value: serde_json::Value) -> Self {
		Self::from_parts("json", value)
	}
}

/// The authenticated identity attached to a session
///
/// Changing the principal always marks the session dirty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
	name: String,
	#[serde(default)]
	roles: Vec<String>,
}

impl Principal {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			roles: Vec::new(),
		}
	}

	pub fn with_roles<I, S>(mut self, roles: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.roles = roles.into_iter().map(Into::into).collect();
		self
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn roles(&self) -> &[String] {
		&self.roles
	}

	pub fn has_role(&self, role: &str) -> bool {
		self.roles.iter().any(|r| r == role)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_equal_values_compare_by_value() {
		let a = AttributeValue::from("alice");
		let b = AttributeValue::new(&"alice".to_string()).unwrap();

		assert_eq!(a, b);
	}

	#[test]
	fn test_same_json_different_category_is_not_equal() {
		let narrow = AttributeValue::from(1_i32);
		let wide = AttributeValue::from(1_i64);

		assert_eq!(narrow.raw(), wide.raw());
		assert_ne!(narrow, wide);
	}

	#[test]
	fn test_typed_get_respects_type_name() {
		let value = AttributeValue::from(42_i64);

		assert_eq!(value.get::<i64>(), Some(42));
		assert_eq!(value.get::<i32>(), None);
		assert_eq!(value.decode::<i32>().unwrap(), 42);
	}

	#[test]
	fn test_principal_roles() {
		let principal = Principal::new("alice").with_roles(["admin", "staff"]);

		assert_eq!(principal.name(), "alice");
		assert!(principal.has_role("admin"));
		assert!(!principal.has_role("guest"));
	}
}
