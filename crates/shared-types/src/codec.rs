//! # Canonical Codec
//!
//! Binary encoding (bincode) for every structure that is hashed or carried
//! as an opaque request payload, plus the SHA-256 digest helper.

use crate::entities::Hash;
use crate::errors::{CodecError, CodecResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Encode a value with the canonical binary codec.
pub fn encode<T: Serialize>(value: &T) -> CodecResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Decode a value produced by [`encode`].
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    bincode::deserialize(bytes).map_err(|e| CodecError::Decode(e.to_string()))
}

/// SHA-256 over raw bytes.
pub fn digest(bytes: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Short hex form of a hash for log lines.
pub fn hash_hex(hash: &Hash) -> String {
    hex::encode(&hash[..6])
}
