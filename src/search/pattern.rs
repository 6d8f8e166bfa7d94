use std::fmt;
use std::path::Path;

use globset::{GlobBuilder, GlobMatcher};

use crate::error::SeekerError;

/// A compiled shell-glob search pattern.
///
/// `*` and `?` also match `/`, so `*/Library/foo.db` matches at any depth
/// below the container root. `**` and character classes behave as usual.
#[derive(Clone)]
pub struct Pattern {
    raw: String,
    matcher: GlobMatcher,
}

impl Pattern {
    /// Compile a glob pattern
    pub fn new(raw: &str) -> Result<Self, SeekerError> {
        let glob = GlobBuilder::new(raw)
            .literal_separator(false)
            .backslash_escape(true)
            .build()
            .map_err(|source| SeekerError::InvalidPattern {
                pattern: raw.to_string(),
                source,
            })?;

        Ok(Pattern {
            raw: raw.to_string(),
            matcher: glob.compile_matcher(),
        })
    }

    /// The pattern as written by the artifact
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Check a forward-slash normalized relative path
    pub fn is_match(&self, candidate: &str) -> bool {
        self.matcher.is_match(candidate)
    }

    /// Check a path after normalizing its separators
    pub fn matches_path(&self, path: &Path) -> bool {
        self.is_match(&normalize_path(path))
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pattern").field(&self.raw).finish()
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Normalize a path for matching (convert backslashes to forward slashes)
pub fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Normalize an archive member name: forward slashes, no `./` or `/` prefix,
/// no trailing slash.
pub fn normalize_member_name(name: &str) -> String {
    let mut name = name.replace('\\', "/");
    while let Some(stripped) = name.strip_prefix("./") {
        name = stripped.to_string();
    }
    name.trim_start_matches('/').trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_star_crosses_separators() {
        let pattern = Pattern::new("*/AggregateDictionary/ADDataStore.sqlitedb").unwrap();
        assert!(pattern.is_match(
            "private/var/mobile/Library/AggregateDictionary/ADDataStore.sqlitedb"
        ));
        assert!(!pattern.is_match("AggregateDictionary/ADDataStore.sqlitedb"));
    }

    #[test]
    fn test_double_star_matches_root_level() {
        let pattern = Pattern::new("**/AddressBook.sqlitedb").unwrap();
        assert!(pattern.is_match("AddressBook.sqlitedb"));
        assert!(pattern.is_match("a/b/AddressBook.sqlitedb"));
        assert!(!pattern.is_match("a/b/AddressBook.sqlitedb-wal"));
    }

    #[test]
    fn test_question_mark_and_class() {
        let pattern = Pattern::new("logs/app?.[lt]og").unwrap();
        assert!(pattern.is_match("logs/app1.log"));
        assert!(pattern.is_match("logs/app2.tog"));
        assert!(!pattern.is_match("logs/app10.log"));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = Pattern::new("a/[b").unwrap_err();
        assert!(matches!(err, SeekerError::InvalidPattern { .. }));
    }

    #[test]
    fn test_matches_windows_path() {
        let pattern = Pattern::new("**/mmkv/mmkv.default").unwrap();
        assert!(pattern.matches_path(Path::new("Documents\\mmkv\\mmkv.default")));
    }

    #[test]
    fn test_normalize_member_name() {
        assert_eq!(normalize_member_name("./a/b.db"), "a/b.db");
        assert_eq!(normalize_member_name("/a/b/"), "a/b");
        assert_eq!(normalize_member_name("././a"), "a");
        assert_eq!(normalize_member_name("a\\b.db"), "a/b.db");
    }

    proptest! {
        #[test]
        fn prop_double_star_matches_any_prefix(
            dirs in proptest::collection::vec("[a-z0-9]{1,8}", 0..5)
        ) {
            let pattern = Pattern::new("**/target.sqlite").unwrap();
            let mut parts = dirs.clone();
            parts.push("target.sqlite".to_string());
            prop_assert!(pattern.is_match(&parts.join("/")));
        }

        #[test]
        fn prop_literal_pattern_matches_only_itself(
            name in "[a-z]{1,10}\\.db",
            other in "[a-z]{1,10}\\.log",
        ) {
            let pattern = Pattern::new(&name).unwrap();
            prop_assert!(pattern.is_match(&name));
            prop_assert!(!pattern.is_match(&other));
        }
    }
}
