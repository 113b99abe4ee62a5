//! JSON body format

use super::{SerializationError, Serializer};
use serde::{Deserialize, Serialize};

/// JSON serializer
///
/// Human-readable and always available. This is the default body format.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
	fn serialize<T: Serialize>(&self, data: &T) -> Result<Vec<u8>, SerializationError> {
		serde_json::to_vec(data).map_err(|e| SerializationError::Encode(e.to_string()))
	}

	fn deserialize<T: for<'de> Deserialize<'de>>(
		&self,
		bytes: &[u8],
	) -> Result<T, SerializationError> {
		serde_json::from_slice(bytes).map_err(|e| SerializationError::Corrupt(e.to_string()))
	}
}
