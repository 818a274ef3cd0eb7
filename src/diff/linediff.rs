//! Bounded-lookahead line differ for text blobs.
//!
//! jj-lib's own `files.rs` implements a considerably more general
//! (histogram-based) line differ; spec.md §4.10 calls for something much
//! smaller and fully specified, so this is a direct implementation of
//! that algorithm rather than a port of the teacher's.

pub const DEFAULT_LOOKAHEAD: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineDiffKind {
    Context,
    Deleted,
    Added,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineDiffEntry {
    pub kind: LineDiffKind,
    pub text: String,
}

/// A blob that can't be line-diffed: non-UTF-8, or containing a NUL byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryBlob;

/// Splits blob bytes into lines for diffing, or reports that the blob is
/// binary (spec.md §4.10: "Binary detection (non-UTF-8 or presence of
/// NUL bytes) skips line diffing").
pub fn lines_of(bytes: &[u8]) -> Result<Vec<String>, BinaryBlob> {
    if bytes.contains(&0) {
        return Err(BinaryBlob);
    }
    let text = std::str::from_utf8(bytes).map_err(|_| BinaryBlob)?;
    Ok(text.lines().map(str::to_string).collect())
}

/// Diffs two line arrays with the lookahead re-sync algorithm from
/// spec.md §4.10.
pub fn diff_lines(old: &[String], new: &[String], lookahead: usize) -> Vec<LineDiffEntry> {
    let mut out = Vec::new();
    let mut i = 0;
    let mut j = 0;

    while i < old.len() && j < new.len() {
        if old[i] == new[j] {
            out.push(LineDiffEntry {
                kind: LineDiffKind::Context,
                text: old[i].clone(),
            });
            i += 1;
            j += 1;
            continue;
        }

        match find_resync(old, new, i, j, lookahead) {
            Some((skip_old, skip_new)) if skip_old > 0 && skip_new == 0 => {
                for line in &old[i..i + skip_old] {
                    out.push(LineDiffEntry {
                        kind: LineDiffKind::Deleted,
                        text: line.clone(),
                    });
                }
                i += skip_old;
            }
            Some((skip_old, skip_new)) if skip_new > 0 && skip_old == 0 => {
                for line in &new[j..j + skip_new] {
                    out.push(LineDiffEntry {
                        kind: LineDiffKind::Added,
                        text: line.clone(),
                    });
                }
                j += skip_new;
            }
            _ => {
                out.push(LineDiffEntry {
                    kind: LineDiffKind::Deleted,
                    text: old[i].clone(),
                });
                out.push(LineDiffEntry {
                    kind: LineDiffKind::Added,
                    text: new[j].clone(),
                });
                i += 1;
                j += 1;
            }
        }
    }

    for line in &old[i..] {
        out.push(LineDiffEntry {
            kind: LineDiffKind::Deleted,
            text: line.clone(),
        });
    }
    for line in &new[j..] {
        out.push(LineDiffEntry {
            kind: LineDiffKind::Added,
            text: line.clone(),
        });
    }

    out
}

/// Looks up to `lookahead` lines ahead on each side for a line matching
/// the other side's current line. Returns `(lines_to_skip_on_old,
/// lines_to_skip_on_new)` for whichever side re-syncs first; a closer
/// resync wins. Ties (equal distance) favor the deleted side, matching
/// the documented tie-break (DESIGN.md).
fn find_resync(
    old: &[String],
    new: &[String],
    i: usize,
    j: usize,
    lookahead: usize,
) -> Option<(usize, usize)> {
    // Does some old[i + d] (d >= 1) match new[j]? That's a deletion of d lines.
    let deleted_distance = (1..=lookahead)
        .find(|&d| old.get(i + d).is_some_and(|line| *line == new[j]));
    // Does some new[j + d] (d >= 1) match old[i]? That's an addition of d lines.
    let added_distance = (1..=lookahead)
        .find(|&d| new.get(j + d).is_some_and(|line| *line == old[i]));

    match (deleted_distance, added_distance) {
        (Some(d_old), Some(d_new)) if d_old <= d_new => Some((d_old, 0)),
        (Some(_), Some(d_new)) => Some((0, d_new)),
        (Some(d_old), None) => Some((d_old, 0)),
        (None, Some(d_new)) => Some((0, d_new)),
        (None, None) => None,
    }
}
