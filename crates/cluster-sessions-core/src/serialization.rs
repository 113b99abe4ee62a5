//! Session payload serialization
//!
//! A stored session value is laid out as:
//!
//! ```text
//! [8-byte big-endian creation timestamp (ms)][body]
//! ```
//!
//! The body holds the attribute map and principal, encoded with the
//! configured [`SerializationFormat`]:
//!
//! - **JSON** (always available): human-readable, widely compatible
//! - **MessagePack** (feature: `messagepack`): compact binary format
//! - **CBOR** (feature: `cbor`): RFC 7049 compliant binary format
//!
//! Decoding resolves every attribute type against a caller-supplied
//! [`TypeRegistry`], so a node that lacks a type fails with
//! [`SerializationError::UnknownType`] rather than a corruption error.
//!
//! ## Example
//!
//! ```rust
//! use cluster_sessions_core::{
//!     ManualDirtyTracking, Session, SessionSerializer, SerializationFormat, TypeRegistry,
//! };
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut session = Session::new("abc", 1800, ManualDirtyTracking::default());
//! session.set_attribute("user", "alice");
//!
//! let serializer = SessionSerializer::new(SerializationFormat::Json);
//! let bytes = serializer.serialize(&session)?;
//! let decoded = serializer.deserialize(&bytes, &TypeRegistry::with_builtins())?;
//!
//! assert_eq!(decoded.creation_time, session.creation_time());
//! assert_eq!(decoded.attributes, *session.attributes());
//! # Ok(())
//! # }
//! ```

use crate::attribute::{AttributeValue, Principal};
use crate::config::ManualDirtyTracking;
use crate::error::SerializationError;
use crate::registry::TypeRegistry;
use crate::session::Session;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

mod json;
pub use json::JsonSerializer;

#[cfg(feature = "messagepack")]
mod messagepack;
#[cfg(feature = "messagepack")]
pub use messagepack::MessagePackSerializer;

#[cfg(feature = "cbor")]
mod cbor;
#[cfg(feature = "cbor")]
pub use cbor::CborSerializer;

/// Size of the creation timestamp header
pub const HEADER_LEN: usize = 8;

/// Serializer trait for body formats
pub trait Serializer: Send + Sync {
	/// Serialize data to bytes
	fn serialize<T: Serialize>(&self, data: &T) -> Result<Vec<u8>, SerializationError>;

	/// Deserialize bytes to data
	fn deserialize<T: for<'de> Deserialize<'de>>(
		&self,
		bytes: &[u8],
	) -> Result<T, SerializationError>;
}

/// Serialization format selection
///
/// # Example
///
/// ```rust
/// use cluster_sessions_core::SerializationFormat;
///
/// let format: SerializationFormat = "json".parse().unwrap();
/// assert_eq!(format.name(), "json");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializationFormat {
	/// JSON format (always available)
	#[default]
	Json,
	/// MessagePack format (requires "messagepack" feature)
	#[cfg(feature = "messagepack")]
	MessagePack,
	/// CBOR format (requires "cbor" feature)
	#[cfg(feature = "cbor")]
	Cbor,
}

impl SerializationFormat {
	/// Get format name as string
	pub fn name(&self) -> &'static str {
		match self {
			SerializationFormat::Json => "json",
			#[cfg(feature = "messagepack")]
			SerializationFormat::MessagePack => "messagepack",
			#[cfg(feature = "cbor")]
			SerializationFormat::Cbor => "cbor",
		}
	}

	/// Serialize data using this format
	pub fn serialize<T: Serialize>(&self, data: &T) -> Result<Vec<u8>, SerializationError> {
		match self {
			SerializationFormat::Json => JsonSerializer.serialize(data),
			#[cfg(feature = "messagepack")]
			SerializationFormat::MessagePack => MessagePackSerializer.serialize(data),
			#[cfg(feature = "cbor")]
			SerializationFormat::Cbor => CborSerializer.serialize(data),
		}
	}

	/// Deserialize data using this format
	pub fn deserialize<T: for<'de> Deserialize<'de>>(
		&self,
		bytes: &[u8],
	) -> Result<T, SerializationError> {
		match self {
			SerializationFormat::Json => JsonSerializer.deserialize(bytes),
			#[cfg(feature = "messagepack")]
			SerializationFormat::MessagePack => MessagePackSerializer.deserialize(bytes),
			#[cfg(feature = "cbor")]
			SerializationFormat::Cbor => CborSerializer.deserialize(bytes),
		}
	}
}

impl fmt::Display for SerializationFormat {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

impl FromStr for SerializationFormat {
	type Err = SerializationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"json" => Ok(Self::Json),
			#[cfg(feature = "messagepack")]
			"messagepack" | "msgpack" => Ok(Self::MessagePack),
			#[cfg(feature = "cbor")]
			"cbor" => Ok(Self::Cbor),
			other => Err(SerializationError::UnsupportedFormat(other.to_string())),
		}
	}
}

#[derive(Serialize)]
struct BodyRef<'a> {
	attributes: &'a HashMap<String, AttributeValue>,
	principal: Option<&'a Principal>,
}

#[derive(Deserialize)]
struct Body {
	#[serde(default)]
	attributes: HashMap<String, AttributeValue>,
	#[serde(default)]
	principal: Option<Principal>,
}

/// State recovered from a stored payload
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSession {
	pub creation_time: i64,
	pub attributes: HashMap<String, AttributeValue>,
	pub principal: Option<Principal>,
}

impl DecodedSession {
	/// Build a clean, valid, not-new session under `id`
	pub fn into_session(
		self,
		id: impl Into<String>,
		max_inactive_interval: i64,
		tracking: ManualDirtyTracking,
	) -> Session {
		Session::restore(
			id,
			self.creation_time,
			self.attributes,
			self.principal,
			max_inactive_interval,
			tracking,
		)
	}
}

/// Converts sessions to and from the stored wire format
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionSerializer {
	format: SerializationFormat,
}

impl SessionSerializer {
	pub fn new(format: SerializationFormat) -> Self {
		Self { format }
	}

	pub fn format(&self) -> SerializationFormat {
		self.format
	}

	/// Encode creation time, attributes and principal
	pub fn serialize(&self, session: &Session) -> Result<Vec<u8>, SerializationError> {
		let body = self.format.serialize(&BodyRef {
			attributes: session.attributes(),
			principal: session.principal(),
		})?;

		let mut bytes = Vec::with_capacity(HEADER_LEN + body.len());
		bytes.extend_from_slice(&session.creation_time().to_be_bytes());
		bytes.extend_from_slice(&body);
		Ok(bytes)
	}

	/// Decode a payload, resolving attribute types against `registry`
	pub fn deserialize(
		&self,
		bytes: &[u8],
		registry: &TypeRegistry,
	) -> Result<DecodedSession, SerializationError> {
		let (header, body) = bytes
			.split_first_chunk::<HEADER_LEN>()
			.ok_or(SerializationError::Truncated {
				expected: HEADER_LEN,
				actual: bytes.len(),
			})?;
		let creation_time = i64::from_be_bytes(*header);

		let body: Body = self.format.deserialize(body)?;
		for (name, value) in &body.attributes {
			registry.resolve(name, value)?;
		}

		Ok(DecodedSession {
			creation_time,
			attributes: body.attributes,
			principal: body.principal,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::attribute::SessionValue;
	use serde_json::json;

	#[derive(Debug, PartialEq, Serialize, Deserialize)]
	struct Cart {
		items: Vec<String>,
	}

	impl SessionValue for Cart {
		const TYPE_NAME: &'static str = "shop.Cart";
	}

	fn sample_session() -> Session {
		let mut session = Session::new("abc", 1800, ManualDirtyTracking::default());
		session.set_creation_time(1_700_000_000_123);
		session.set_attribute("user", "alice");
		session
			.insert(
				"cart",
				&Cart {
					items: vec!["book".to_string()],
				},
			)
			.unwrap();
		session.set_principal(Some(Principal::new("alice").with_roles(["staff"])));
		session
	}

	#[test]
	fn test_serialization_format_name() {
		assert_eq!(SerializationFormat::Json.name(), "json");

		#[cfg(feature = "messagepack")]
		assert_eq!(SerializationFormat::MessagePack.name(), "messagepack");

		#[cfg(feature = "cbor")]
		assert_eq!(SerializationFormat::Cbor.name(), "cbor");
	}

	#[test]
	fn test_serialization_format_default() {
		assert_eq!(SerializationFormat::default(), SerializationFormat::Json);
	}

	#[test]
	fn test_unknown_format_name_is_rejected() {
		let result = "yaml".parse::<SerializationFormat>();

		assert!(matches!(
			result,
			Err(SerializationError::UnsupportedFormat(ref name)) if name == "yaml"
		));
	}

	#[test]
	fn test_header_is_big_endian_creation_time() {
		let session = sample_session();
		let bytes = SessionSerializer::default().serialize(&session).unwrap();

		assert_eq!(&bytes[..HEADER_LEN], &1_700_000_000_123_i64.to_be_bytes());
	}

	#[test]
	fn test_round_trip_with_registered_types() {
		let session = sample_session();
		let serializer = SessionSerializer::default();
		let registry = TypeRegistry::with_builtins().with::<Cart>();

		let bytes = serializer.serialize(&session).unwrap();
		let decoded = serializer.deserialize(&bytes, &registry).unwrap();

		assert_eq!(decoded.creation_time, session.creation_time());
		assert_eq!(decoded.attributes, *session.attributes());
		assert_eq!(decoded.principal.as_ref(), session.principal());
	}

	#[test]
	fn test_unregistered_type_is_resolution_failure() {
		let session = sample_session();
		let serializer = SessionSerializer::default();
		let bytes = serializer.serialize(&session).unwrap();

		let err = serializer
			.deserialize(&bytes, &TypeRegistry::with_builtins())
			.unwrap_err();

		assert!(err.is_resolution_failure());
		assert!(matches!(
			err,
			SerializationError::UnknownType { ref type_name, .. } if type_name == "shop.Cart"
		));
	}

	#[test]
	fn test_short_payload_is_truncated() {
		let err = SessionSerializer::default()
			.deserialize(b"null", &TypeRegistry::with_builtins())
			.unwrap_err();

		assert!(matches!(
			err,
			SerializationError::Truncated {
				expected: 8,
				actual: 4
			}
		));
	}

	#[test]
	fn test_garbage_body_is_corrupt() {
		let mut bytes = 42_i64.to_be_bytes().to_vec();
		bytes.extend_from_slice(b"{not json");

		let err = SessionSerializer::default()
			.deserialize(&bytes, &TypeRegistry::with_builtins())
			.unwrap_err();

		assert!(err.is_corruption());
	}

	#[test]
	fn test_empty_body_object_decodes_to_empty_session() {
		let mut bytes = 7_i64.to_be_bytes().to_vec();
		bytes.extend_from_slice(json!({}).to_string().as_bytes());

		let decoded = SessionSerializer::default()
			.deserialize(&bytes, &TypeRegistry::new())
			.unwrap();

		assert_eq!(decoded.creation_time, 7);
		assert!(decoded.attributes.is_empty());
		assert!(decoded.principal.is_none());
	}
}
