//! CBOR body format (requires "cbor" feature)
//!
//! This module provides CBOR (Concise Binary Object Representation) serialization using `ciborium`.

use super::{SerializationError, Serializer};
use serde::{Deserialize, Serialize};

/// CBOR serializer (requires "cbor" feature)
///
/// CBOR is an RFC 7049 compliant format designed for cross-platform data
/// interchange, with smaller payloads than JSON and native binary data.
#[derive(Debug, Clone, Copy, Default)]
pub struct CborSerializer;

impl Serializer for CborSerializer {
	fn serialize<T: Serialize>(&self, data: &T) -> Result<Vec<u8>, SerializationError> {
		let mut buffer = Vec::new();
		ciborium::ser::into_writer(data, &mut buffer)
			.map_err(|e| SerializationError::Encode(e.to_string()))?;
		Ok(buffer)
	}

	fn deserialize<T: for<'de> Deserialize<'de>>(
		&self,
		bytes: &[u8],
	) -> Result<T, SerializationError> {
		ciborium::de::from_reader(bytes).map_err(|e| SerializationError::Corrupt(e.to_string()))
	}
}
