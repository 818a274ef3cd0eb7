//! Crate-wide error type.
//!
//! Mirrors the teacher's layered error style (`backend::BackendError`,
//! `file_util::PathError`): small, focused error types at the leaves
//! (`HashError`, `CompressError`, `ObjectParseError`) that convert into the
//! one boundary-facing enum via `#[from]`.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::oid::Oid;

/// An I/O error tagged with the path that caused it.
///
/// Grounded on `file_util::PathError` + `IoResultExt`.
#[derive(Debug, Error)]
#[error("cannot access {path}")]
pub struct PathError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

pub trait IoResultExt<T> {
    fn path_context(self, path: impl Into<PathBuf>) -> Result<T, PathError>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn path_context(self, path: impl Into<PathBuf>) -> Result<T, PathError> {
        self.map_err(|source| PathError {
            path: path.into(),
            source,
        })
    }
}

#[derive(Debug, Error)]
pub enum HashError {
    #[error("invalid hex string")]
    InvalidHex,
}

#[derive(Debug, Error)]
pub enum CompressError {
    #[error("corrupt compressed stream: {0}")]
    CorruptCompression(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum ObjectParseError {
    #[error("malformed object header")]
    BadHeader,
    #[error("object payload length mismatch: header said {expected}, got {actual}")]
    BadLength { expected: usize, actual: usize },
    #[error("unknown object type {0:?}")]
    UnknownType(String),
    #[error("malformed tree object: {0}")]
    BadTree(String),
    #[error("malformed commit object: {0}")]
    BadCommit(String),
}

/// The reason an object failed its integrity check on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorruptionReason {
    /// The recomputed hash of the decompressed bytes didn't match the
    /// requested `Oid`.
    HashMismatch,
    /// The decompressed bytes didn't parse as a well-formed object.
    Unparseable,
}

impl fmt::Display for CorruptionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HashMismatch => write!(f, "hash mismatch"),
            Self::Unparseable => write!(f, "unparseable object"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PgError {
    #[error(transparent)]
    Io(#[from] PathError),

    #[error("object {oid} is corrupted: {reason}")]
    Corrupted { oid: Oid, reason: CorruptionReason },

    #[error("bad format in {where_}: {detail}")]
    BadFormat { where_: String, detail: String },

    #[error("ref not found: {0}")]
    RefNotFound(String),

    #[error("ref conflict on {ref_name}: expected {expected:?}, found {actual:?}")]
    RefConflict {
        ref_name: String,
        expected: Option<Oid>,
        actual: Option<Oid>,
    },

    #[error("recovery failed for ref {0}")]
    RecoveryFailed(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl From<HashError> for PgError {
    fn from(e: HashError) -> Self {
        Self::BadFormat {
            where_: "hash".to_string(),
            detail: e.to_string(),
        }
    }
}

impl From<CompressError> for PgError {
    fn from(e: CompressError) -> Self {
        match e {
            CompressError::Io(io) => Self::Io(PathError {
                path: PathBuf::new(),
                source: io,
            }),
            other => Self::BadFormat {
                where_: "compression".to_string(),
                detail: other.to_string(),
            },
        }
    }
}

impl From<ObjectParseError> for PgError {
    fn from(e: ObjectParseError) -> Self {
        Self::BadFormat {
            where_: "object".to_string(),
            detail: e.to_string(),
        }
    }
}

pub type PgResult<T> = Result<T, PgError>;
