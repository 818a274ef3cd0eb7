//! SHA-256 hashing and hex encode/decode.
//!
//! Hex helpers are shaped like the teacher's `hex_util` module (plain
//! encode/decode rather than jj's `z-k` "reverse hex", which Pakacage
//! Guardian has no use for since it doesn't do prefix-based revision
//! lookup).

use sha2::{Digest, Sha256};

use crate::error::HashError;

pub const DIGEST_LEN: usize = 32;

/// Hashes a single buffer in one call.
pub fn hash(bytes: &[u8]) -> [u8; DIGEST_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Streaming hasher for callers that want to feed chunks incrementally
/// (e.g. hashing a file without buffering it whole).
#[derive(Default)]
pub struct StreamingHasher {
    inner: Sha256,
}

impl StreamingHasher {
    pub fn new() -> Self {
        Self {
            inner: Sha256::new(),
        }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.inner.update(bytes);
    }

    pub fn finalize(self) -> [u8; DIGEST_LEN] {
        self.inner.finalize().into()
    }
}

pub fn to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

pub fn from_hex(s: impl AsRef<[u8]>) -> Result<Vec<u8>, HashError> {
    hex::decode(s.as_ref()).map_err(|_| HashError::InvalidHex)
}
