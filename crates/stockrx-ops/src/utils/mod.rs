//! crates/stockrx-ops/src/utils/mod.rs
//! Shared utility functions used across the codebase

use std::path::Path;

/// Convert a Path to an owned String, replacing invalid UTF-8 with U+FFFD.
pub fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Truncate a string to max length with ellipsis.
///
/// Cuts on a char boundary, so multi-byte names (e.g. Japanese product
/// names) never panic. The result is at most `max_len` chars plus "...".
pub fn truncate(s: &str, max_len: usize) -> String {
    match s.char_indices().nth(max_len) {
        None => s.to_string(),
        Some((idx, _)) => format!("{}...", &s[..idx]),
    }
}

/// Format a signed integer delta with an explicit sign ("+650", "-20", "0").
pub fn signed(delta: i64) -> String {
    if delta > 0 {
        format!("+{}", delta)
    } else {
        delta.to_string()
    }
}

/// Parse the usual truthy/falsy spellings ("1", "yes", "off", ...).
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_path_to_string() {
        let path = PathBuf::from("/home/user/.stockrx/stockrx.db");
        assert_eq!(path_to_string(&path), "/home/user/.stockrx/stockrx.db");
    }

    #[test]
    fn test_truncate_short_string() {
        assert_eq!(truncate("hello", 10), "hello");
    }

    #[test]
    fn test_truncate_exact_length() {
        assert_eq!(truncate("hello", 5), "hello");
    }

    #[test]
    fn test_truncate_long_string() {
        assert_eq!(truncate("hello world", 5), "hello...");
    }

    #[test]
    fn test_truncate_multibyte() {
        assert_eq!(truncate("在庫管理システム", 4), "在庫管理...");
    }

    #[test]
    fn test_signed() {
        assert_eq!(signed(650), "+650");
        assert_eq!(signed(-20), "-20");
        assert_eq!(signed(0), "0");
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("Yes"), Some(true));
        assert_eq!(parse_bool(" off "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
