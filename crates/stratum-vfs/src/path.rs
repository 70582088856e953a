//! Helpers for `/`-separated, root-relative store paths.

/// Joins two store paths, treating an empty side as "no prefix".
pub fn join(base: &str, rest: &str) -> String {
    if base.is_empty() {
        rest.to_string()
    } else if rest.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{rest}")
    }
}

/// The final path component.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Everything before the final component; empty for top-level paths.
pub fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Validates a store path: relative, `/`-separated, no `.`/`..`/empty
/// segments. The empty path denotes the filesystem root.
pub fn validate(path: &str) -> Result<(), String> {
    if path.is_empty() {
        return Ok(());
    }
    if path.starts_with('/') {
        return Err(format!("path is absolute: {path:?}"));
    }
    for seg in path.split('/') {
        if seg.is_empty() || seg == "." || seg == ".." {
            return Err(format!("invalid path segment {seg:?} in {path:?}"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_skips_empty_sides() {
        assert_eq!(join("", "a/b"), "a/b");
        assert_eq!(join("a", ""), "a");
        assert_eq!(join("a", "b/c"), "a/b/c");
    }

    #[test]
    fn parent_and_file_name() {
        assert_eq!(parent("a/b/c"), "a/b");
        assert_eq!(parent("a"), "");
        assert_eq!(file_name("a/b/c.unit"), "c.unit");
        assert_eq!(file_name("c"), "c");
    }

    #[test]
    fn validate_rejects_traversal() {
        assert!(validate("").is_ok());
        assert!(validate("a/b").is_ok());
        assert!(validate("/a").is_err());
        assert!(validate("a//b").is_err());
        assert!(validate("a/../b").is_err());
    }
}
