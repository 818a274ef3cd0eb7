//! Pakacage Guardian: a Git-inspired, content-addressed snapshot and diff
//! engine for a working tree, embedded in a host application rather than
//! run as a standalone CLI (see `repo::Repository`).
//!
//! Modules are laid out leaves-first, mirroring each component's
//! dependency order: hashing and compression at the bottom, the object
//! model and stores above that, then the ignore engine, index, snapshot
//! builder, ref database, diff engine, and stash manager, with the
//! `Repository` façade wiring all of it together.

pub mod compress;
pub mod config;
pub mod diff;
pub mod error;
pub mod hash;
pub mod host;
pub mod ignore;
pub mod index;
pub mod object;
pub mod oid;
pub mod refs;
pub mod repo;
pub mod snapshot;
pub mod stash;
pub mod store;
pub mod task;
pub mod walk;

pub use error::{PgError, PgResult};
pub use oid::Oid;
pub use repo::Repository;
