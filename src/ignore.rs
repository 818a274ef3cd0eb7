//! Path exclusion rules: built-in defaults plus a user `.pgignore` file,
//! compiled into one last-match-wins matcher.
//!
//! jj-lib leans on the `ignore` crate for this; Pakacage Guardian's rules
//! are a smaller, fully-specified grammar (glob patterns, `!`-negation,
//! last-match-wins, non-negatable built-ins) that's more direct to compile
//! straight to `regex`, itself a genuine dependency of the teacher, just
//! used here for a different job than its revset parser. Dropping the
//! `ignore` crate is noted in DESIGN.md.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::PgError;

/// Directory and file names every snapshot excludes, regardless of
/// `.pgignore` content. Not negatable: a user `!`-rule can never bring
/// these back. Covers the repository's own metadata directory, VCS
/// folders of other systems, host/editor build-and-cache directories,
/// and IDE folders (spec.md §4.6).
const BUILTIN_EXCLUDE_NAMES: &[&str] = &[
    ".pg",
    ".git",
    ".svn",
    ".hg",
    "Library",
    "Temp",
    "Obj",
    "Logs",
    "UserSettings",
    "MemoryCaptures",
    "Build",
    "Builds",
    ".vs",
    ".vscode",
    ".idea",
    "node_modules",
];

/// File-name suffixes every snapshot excludes regardless of `.pgignore`
/// content: common lock files and scratch artifacts.
const BUILTIN_EXCLUDE_SUFFIXES: &[&str] = &[".tmp", ".lock"];

static BUILTIN_EXCLUDE_NAME_SET: Lazy<HashSet<&'static str>> =
    Lazy::new(|| BUILTIN_EXCLUDE_NAMES.iter().copied().collect());

#[derive(Debug, Clone)]
struct Rule {
    regex: Regex,
    negate: bool,
    dir_only: bool,
}

/// A compiled set of ignore rules ready to test paths against.
///
/// Rules are tested in file order; the last matching rule wins, so a
/// later `!pattern` can re-include something an earlier broader pattern
/// excluded. Built-in excludes are checked first and never negated.
#[derive(Debug, Clone)]
pub struct IgnoreMatcher {
    rules: Vec<Rule>,
}

impl IgnoreMatcher {
    /// Compiles the built-in excludes with no user rules.
    pub fn builtin_only() -> Self {
        Self { rules: Vec::new() }
    }

    /// Compiles the built-in excludes plus the patterns in `pgignore_text`
    /// (one pattern per line, blank lines and `#`-comments ignored, a
    /// leading `!` negates).
    pub fn compile(pgignore_text: &str) -> Result<Self, PgError> {
        let mut rules = Vec::new();
        for raw_line in pgignore_text.lines() {
            let line = raw_line.trim_end();
            if line.is_empty() || line.trim_start().starts_with('#') {
                continue;
            }
            let (negate, pattern) = match line.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, line),
            };
            if pattern.is_empty() {
                continue;
            }
            let dir_only = pattern.ends_with('/') && pattern.len() > 1;
            let pattern = pattern.strip_suffix('/').unwrap_or(pattern);
            let regex = glob_to_regex(pattern).map_err(|detail| PgError::BadFormat {
                where_: "pgignore".to_string(),
                detail,
            })?;
            rules.push(Rule {
                regex,
                negate,
                dir_only,
            });
        }
        Ok(Self { rules })
    }

    /// Tests a slash-separated, repository-relative path (no leading
    /// slash, directories have no trailing slash) against the default and
    /// user rules. `is_dir` selects whether directory-only user patterns
    /// (those written with a trailing `/`) apply to this path.
    pub fn is_ignored(&self, relative_path: &str, is_dir: bool) -> bool {
        for component in relative_path.split('/') {
            if BUILTIN_EXCLUDE_NAME_SET.contains(component) {
                return true;
            }
        }
        if !is_dir {
            let filename = relative_path.rsplit('/').next().unwrap_or(relative_path);
            if BUILTIN_EXCLUDE_SUFFIXES.iter().any(|suffix| filename.ends_with(suffix)) {
                return true;
            }
        }

        let mut ignored = false;
        for rule in &self.rules {
            if rule.dir_only && !is_dir {
                continue;
            }
            if rule.regex.is_match(relative_path) {
                ignored = !rule.negate;
            }
        }
        ignored
    }
}

/// Translates a single gitignore-style glob line into an anchored,
/// case-insensitive regex.
///
/// Supported syntax: `*` (any run of non-`/` characters), `**` (any run
/// of characters including `/`), `?` (one non-`/` character), `[...]`
/// character classes (passed through to the regex engine nearly
/// verbatim), and a leading `/` anchoring the pattern to the root instead
/// of matching at any depth. Everything else is treated literally.
fn glob_to_regex(pattern: &str) -> Result<Regex, String> {
    let anchored_to_root = pattern.starts_with('/');
    let pattern = pattern.strip_prefix('/').unwrap_or(pattern);

    let mut out = String::from("(?is)");
    if anchored_to_root {
        out.push('^');
    } else {
        out.push_str("(^|.*/)");
    }

    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    out.push_str(".*");
                } else {
                    out.push_str("[^/]*");
                }
            }
            '?' => out.push_str("[^/]"),
            '[' => {
                out.push('[');
                for class_char in chars.by_ref() {
                    out.push(class_char);
                    if class_char == ']' {
                        break;
                    }
                }
            }
            '.' | '+' | '(' | ')' | '|' | '^' | '$' | '{' | '}' | ']' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            other => out.push(other),
        }
    }
    out.push_str("(/.*)?$");

    Regex::new(&out).map_err(|e| format!("invalid pattern {pattern:?}: {e}"))
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("*.log", "debug.log", true; "plain extension match")]
    #[test_case("*.log", "nested/dir/debug.log", true; "extension match at depth")]
    #[test_case("*.log", "debug.log.txt", false; "suffix must be exact")]
    #[test_case("*.[oa]", "lib.o", true; "character class matches o")]
    #[test_case("*.[oa]", "lib.a", true; "character class matches a")]
    #[test_case("*.[oa]", "lib.c", false; "character class rejects other chars")]
    #[test_case("/build", "build", true; "root anchored matches top level")]
    #[test_case("/build", "nested/build", false; "root anchored rejects nested")]
    #[test_case("**/target", "target", true; "double star matches top level")]
    #[test_case("**/target", "crates/foo/target", true; "double star matches nested")]
    fn glob_pattern_matches_expected_paths(pattern: &str, path: &str, expect_ignored: bool) {
        let matcher = IgnoreMatcher::compile(&format!("{pattern}\n")).unwrap();
        assert_eq!(matcher.is_ignored(path, true), expect_ignored);
    }

    #[test]
    fn builtin_excludes_metadata_dir() {
        let matcher = IgnoreMatcher::builtin_only();
        assert!(matcher.is_ignored(".pg", true));
        assert!(matcher.is_ignored(".pg/objects/ab", false));
        assert!(!matcher.is_ignored("src/main.rs", false));
    }

    #[test]
    fn simple_glob_excludes_by_extension() {
        let matcher = IgnoreMatcher::compile("*.log\n").unwrap();
        assert!(matcher.is_ignored("debug.log", false));
        assert!(matcher.is_ignored("nested/dir/debug.log", false));
        assert!(!matcher.is_ignored("debug.log.txt", false));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let matcher = IgnoreMatcher::compile("*.LOG\n").unwrap();
        assert!(matcher.is_ignored("debug.log", false));
    }

    #[test]
    fn root_anchored_pattern_only_matches_top_level() {
        let matcher = IgnoreMatcher::compile("/build\n").unwrap();
        assert!(matcher.is_ignored("build", true));
        assert!(matcher.is_ignored("build/output.bin", false));
        assert!(!matcher.is_ignored("nested/build", true));
    }

    #[test]
    fn trailing_slash_only_matches_directories() {
        let matcher = IgnoreMatcher::compile("build/\n").unwrap();
        assert!(matcher.is_ignored("build", true));
        assert!(!matcher.is_ignored("build", false));
    }

    #[test]
    fn character_class_matches_one_of_several_chars() {
        let matcher = IgnoreMatcher::compile("*.[oa]\n").unwrap();
        assert!(matcher.is_ignored("lib.o", false));
        assert!(matcher.is_ignored("lib.a", false));
        assert!(!matcher.is_ignored("lib.c", false));
    }

    #[test]
    fn later_negation_reincludes_earlier_match() {
        let matcher = IgnoreMatcher::compile("*.log\n!keep.log\n").unwrap();
        assert!(matcher.is_ignored("debug.log", false));
        assert!(!matcher.is_ignored("keep.log", false));
    }

    #[test]
    fn last_rule_wins_when_rules_conflict_repeatedly() {
        let matcher = IgnoreMatcher::compile("*.log\n!*.log\n*.log\n").unwrap();
        assert!(matcher.is_ignored("debug.log", false));
    }

    #[test]
    fn blank_lines_and_comments_are_ignored() {
        let matcher = IgnoreMatcher::compile("\n# comment\n*.tmp\n").unwrap();
        assert!(matcher.is_ignored("scratch.tmp", false));
    }

    #[test]
    fn double_star_matches_across_directories() {
        let matcher = IgnoreMatcher::compile("**/target\n").unwrap();
        assert!(matcher.is_ignored("target", true));
        assert!(matcher.is_ignored("crates/foo/target", true));
    }

    #[test]
    fn builtin_excludes_cannot_be_negated() {
        let matcher = IgnoreMatcher::compile("!.pg\n").unwrap();
        assert!(matcher.is_ignored(".pg/HEAD", false));
    }

    #[test]
    fn builtin_excludes_cache_and_ide_directories() {
        let matcher = IgnoreMatcher::builtin_only();
        assert!(matcher.is_ignored("Library", true));
        assert!(matcher.is_ignored("Library/ShaderCache/x", false));
        assert!(matcher.is_ignored(".idea", true));
        assert!(!matcher.is_ignored("Assets/Library.cs", false));
    }

    #[test]
    fn builtin_excludes_lock_file_suffix() {
        let matcher = IgnoreMatcher::builtin_only();
        assert!(matcher.is_ignored("Packages/packages-lock.lock", false));
        assert!(!matcher.is_ignored("Packages/packages-lock.lock", true));
    }
}
