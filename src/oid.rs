//! The 32-byte SHA-256 object id shared by blobs, trees, and commits.
//!
//! Grounded on `lib/src/object_id.rs`'s `ObjectId` trait and its
//! `Debug`/`Display`-via-hex convention, collapsed from jj's family of
//! per-type ids (`CommitId`, `TreeId`, `FileId`, ...) down to the single
//! `Oid` type spec.md's data model calls for: one hash space shared by
//! every object kind.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::HashError;
use crate::hash;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Oid([u8; hash::DIGEST_LEN]);

impl Oid {
    pub fn from_bytes(bytes: [u8; hash::DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    pub fn of(framed_bytes: &[u8]) -> Self {
        Self(hash::hash(framed_bytes))
    }

    pub fn try_from_hex(s: impl AsRef<[u8]>) -> Result<Self, HashError> {
        let bytes = hash::from_hex(s)?;
        if bytes.len() != hash::DIGEST_LEN {
            return Err(HashError::InvalidHex);
        }
        let mut arr = [0u8; hash::DIGEST_LEN];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; hash::DIGEST_LEN] {
        &self.0
    }

    pub fn hex(&self) -> String {
        hash::to_hex(&self.0)
    }

    /// Directory fanout: `<first-2-hex>/<remaining-62-hex>`.
    pub fn fanout(&self) -> (String, String) {
        let full = self.hex();
        (full[..2].to_string(), full[2..].to_string())
    }
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Oid").field(&self.hex()).finish()
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex())
    }
}

impl FromStr for Oid {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from_hex(s)
    }
}

impl Serialize for Oid {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.hex().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Oid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::try_from_hex(&s).map_err(serde::de::Error::custom)
    }
}
