//! Blob / Tree / Commit value types and their canonical byte encoding.
//!
//! Framing and parsing are grounded on
//! `other_examples/.../lf--rgit/src-objects.rs`'s `GitObject` trait and its
//! `Tree::load`/`Commit::load` parsers (`mode SP name NUL oid` entries,
//! `tree`/`parent`/`author`/`committer` header lines), extended per
//! spec.md §3-4.3 to require a `timestamp` header, sorted/unique tree
//! entries, and a strict single-blank-line header/body split.

use std::collections::HashMap;
use std::fmt;

use smallvec::{smallvec, SmallVec};

use crate::error::ObjectParseError;
use crate::oid::Oid;

/// Mode of a tree entry. Only the two values spec.md §9 says the source
/// ever produces; executable bits are never read or preserved (Open
/// Question, resolved in DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    File,
    Dir,
}

impl Mode {
    fn as_ascii(self) -> &'static str {
        match self {
            Self::File => "100644",
            Self::Dir => "040000",
        }
    }

    fn from_ascii(s: &str) -> Option<Self> {
        match s {
            "100644" => Some(Self::File),
            "040000" => Some(Self::Dir),
            _ => None,
        }
    }

    pub fn is_dir(self) -> bool {
        matches!(self, Self::Dir)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub data: Vec<u8>,
}

impl Blob {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub name: String,
    pub mode: Mode,
    pub oid: Oid,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tree {
    entries: Vec<TreeEntry>,
}

impl Tree {
    /// Builds a tree from entries in arbitrary order, sorting and
    /// de-duplicating-by-error as it goes. Returns `BadTree` if two
    /// entries share a name.
    pub fn from_entries(mut entries: Vec<TreeEntry>) -> Result<Self, ObjectParseError> {
        entries.sort_by(|a, b| a.name.as_bytes().cmp(b.name.as_bytes()));
        for pair in entries.windows(2) {
            if pair[0].name == pair[1].name {
                return Err(ObjectParseError::BadTree(format!(
                    "duplicate entry name {:?}",
                    pair[0].name
                )));
            }
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `name -> (mode, oid)` for quick membership tests, used by the diff
    /// engine when flattening a tree for working-copy comparison.
    pub fn as_map(&self) -> HashMap<&str, (Mode, Oid)> {
        self.entries
            .iter()
            .map(|e| (e.name.as_str(), (e.mode, e.oid)))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub tree: Oid,
    /// Inline-stored up to one parent; this crate's commits are never
    /// merges (no `merge`/`rebase`), grounded on the same shape
    /// `git_backend.rs` uses for commit parents (`SmallVec<[Oid; 1]>`).
    pub parents: SmallVec<[Oid; 1]>,
    pub author: String,
    pub committer: String,
    pub timestamp: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Object {
    Blob(Blob),
    Tree(Tree),
    Commit(Commit),
}

impl Object {
    pub fn object_type(&self) -> &'static str {
        match self {
            Self::Blob(_) => "blob",
            Self::Tree(_) => "tree",
            Self::Commit(_) => "commit",
        }
    }

    fn payload(&self) -> Vec<u8> {
        match self {
            Self::Blob(b) => b.data.clone(),
            Self::Tree(t) => encode_tree(t),
            Self::Commit(c) => encode_commit(c),
        }
    }

    /// The canonical framed byte sequence: `type SP length NUL payload`.
    pub fn framed(&self) -> Vec<u8> {
        frame(self.object_type(), &self.payload())
    }

    pub fn oid(&self) -> Oid {
        Oid::of(&self.framed())
    }
}

/// Builds the canonical framed bytes for an object of the given type.
pub fn frame(object_type: &str, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(object_type.len() + 1 + 20 + 1 + payload.len());
    out.extend_from_slice(object_type.as_bytes());
    out.push(b' ');
    out.extend_from_slice(payload.len().to_string().as_bytes());
    out.push(0);
    out.extend_from_slice(payload);
    out
}

/// Parses a framed byte sequence (the decompressed on-disk form) back into
/// an [`Object`].
pub fn parse(bytes: &[u8]) -> Result<Object, ObjectParseError> {
    let nul_pos = bytes
        .iter()
        .position(|&b| b == 0)
        .ok_or(ObjectParseError::BadHeader)?;
    let header = std::str::from_utf8(&bytes[..nul_pos]).map_err(|_| ObjectParseError::BadHeader)?;
    let (object_type, len_str) = header.split_once(' ').ok_or(ObjectParseError::BadHeader)?;
    let expected_len: usize = len_str.parse().map_err(|_| ObjectParseError::BadHeader)?;
    let payload = &bytes[nul_pos + 1..];
    if payload.len() != expected_len {
        return Err(ObjectParseError::BadLength {
            expected: expected_len,
            actual: payload.len(),
        });
    }

    match object_type {
        "blob" => Ok(Object::Blob(Blob::new(payload.to_vec()))),
        "tree" => Ok(Object::Tree(parse_tree(payload)?)),
        "commit" => Ok(Object::Commit(parse_commit(payload)?)),
        other => Err(ObjectParseError::UnknownType(other.to_string())),
    }
}

fn encode_tree(tree: &Tree) -> Vec<u8> {
    let mut out = Vec::new();
    for entry in &tree.entries {
        out.extend_from_slice(entry.mode.as_ascii().as_bytes());
        out.push(b' ');
        out.extend_from_slice(entry.name.as_bytes());
        out.push(0);
        out.extend_from_slice(entry.oid.as_bytes());
    }
    out
}

fn parse_tree(payload: &[u8]) -> Result<Tree, ObjectParseError> {
    let mut rest = payload;
    let mut entries = Vec::new();
    while !rest.is_empty() {
        let space = rest
            .iter()
            .position(|&b| b == b' ')
            .ok_or_else(|| ObjectParseError::BadTree("missing mode separator".to_string()))?;
        let mode_str = std::str::from_utf8(&rest[..space])
            .map_err(|_| ObjectParseError::BadTree("mode not utf-8".to_string()))?;
        let mode = Mode::from_ascii(mode_str)
            .ok_or_else(|| ObjectParseError::BadTree(format!("unknown mode {mode_str:?}")))?;
        rest = &rest[space + 1..];

        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| ObjectParseError::BadTree("missing name terminator".to_string()))?;
        let name = std::str::from_utf8(&rest[..nul])
            .map_err(|_| ObjectParseError::BadTree("name not utf-8".to_string()))?
            .to_string();
        rest = &rest[nul + 1..];

        if rest.len() < 32 {
            return Err(ObjectParseError::BadTree("truncated oid".to_string()));
        }
        let mut oid_bytes = [0u8; 32];
        oid_bytes.copy_from_slice(&rest[..32]);
        rest = &rest[32..];

        entries.push(TreeEntry {
            name,
            mode,
            oid: Oid::from_bytes(oid_bytes),
        });
    }

    for pair in entries.windows(2) {
        if pair[0].name.as_bytes() >= pair[1].name.as_bytes() {
            return Err(ObjectParseError::BadTree(
                "entries not strictly sorted by name".to_string(),
            ));
        }
    }

    Ok(Tree { entries })
}

fn encode_commit(commit: &Commit) -> Vec<u8> {
    let mut out = String::new();
    out.push_str("tree ");
    out.push_str(&commit.tree.hex());
    out.push('\n');
    for parent in &commit.parents {
        out.push_str("parent ");
        out.push_str(&parent.hex());
        out.push('\n');
    }
    out.push_str("author ");
    out.push_str(&commit.author);
    out.push('\n');
    out.push_str("committer ");
    out.push_str(&commit.committer);
    out.push('\n');
    out.push_str("timestamp ");
    out.push_str(&commit.timestamp.to_string());
    out.push('\n');
    out.push('\n');
    out.push_str(&commit.message);
    out.into_bytes()
}

fn parse_commit(payload: &[u8]) -> Result<Commit, ObjectParseError> {
    let text = std::str::from_utf8(payload)
        .map_err(|_| ObjectParseError::BadCommit("payload not utf-8".to_string()))?;

    let header_end = text
        .find("\n\n")
        .ok_or_else(|| ObjectParseError::BadCommit("missing header/message separator".to_string()))?;
    let header = &text[..header_end];
    let message = &text[header_end + 2..];

    let mut lines = header.lines();
    let tree_line = lines
        .next()
        .ok_or_else(|| ObjectParseError::BadCommit("missing tree header".to_string()))?;
    let tree_hex = tree_line
        .strip_prefix("tree ")
        .ok_or_else(|| ObjectParseError::BadCommit("first header must be tree".to_string()))?;
    let tree = Oid::try_from_hex(tree_hex)
        .map_err(|_| ObjectParseError::BadCommit("bad tree oid".to_string()))?;

    let mut parents = SmallVec::new();
    let mut pending = lines.next();
    while let Some(line) = pending {
        if let Some(hex) = line.strip_prefix("parent ") {
            let oid = Oid::try_from_hex(hex)
                .map_err(|_| ObjectParseError::BadCommit("bad parent oid".to_string()))?;
            parents.push(oid);
            pending = lines.next();
        } else {
            break;
        }
    }

    let author_line =
        pending.ok_or_else(|| ObjectParseError::BadCommit("missing author header".to_string()))?;
    let author = author_line
        .strip_prefix("author ")
        .ok_or_else(|| ObjectParseError::BadCommit("expected author header".to_string()))?
        .to_string();

    let committer_line = lines
        .next()
        .ok_or_else(|| ObjectParseError::BadCommit("missing committer header".to_string()))?;
    let committer = committer_line
        .strip_prefix("committer ")
        .ok_or_else(|| ObjectParseError::BadCommit("expected committer header".to_string()))?
        .to_string();

    let timestamp_line = lines
        .next()
        .ok_or_else(|| ObjectParseError::BadCommit("missing timestamp header".to_string()))?;
    let timestamp: i64 = timestamp_line
        .strip_prefix("timestamp ")
        .ok_or_else(|| ObjectParseError::BadCommit("expected timestamp header".to_string()))?
        .parse()
        .map_err(|_| ObjectParseError::BadCommit("bad timestamp".to_string()))?;

    if let Some(extra) = lines.next() {
        return Err(ObjectParseError::BadCommit(format!(
            "unknown header {extra:?}"
        )));
    }

    Ok(Commit {
        tree,
        parents,
        author,
        committer,
        timestamp,
        message: message.to_string(),
    })
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_ascii())
    }
}
