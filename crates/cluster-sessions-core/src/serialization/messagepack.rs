//! MessagePack body format (requires "messagepack" feature)
//!
//! Uses `rmp-serde` with named struct fields so payloads stay readable by
//! nodes that add optional fields later.

use super::{SerializationError, Serializer};
use serde::{Deserialize, Serialize};

/// MessagePack serializer (requires "messagepack" feature)
#[derive(Debug, Clone, Copy, Default)]
pub struct MessagePackSerializer;

impl Serializer for MessagePackSerializer {
	fn serialize<T: Serialize>(&self, data: &T) -> Result<Vec<u8>, SerializationError> {
		rmp_serde::to_vec_named(data).map_err(|e| SerializationError::Encode(e.to_string()))
	}

	fn deserialize<T: for<'de> Deserialize<'de>>(
		&self,
		bytes: &[u8],
	) -> Result<T, SerializationError> {
		rmp_serde::from_slice(bytes).map_err(|e| SerializationError::Corrupt(e.to_string()))
	}
}
