use crate::{Error, SvnError, codes};

use std::borrow::Cow;

fn bad_path(path: &str, why: &str) -> SvnError {
    SvnError::new(
        codes::BAD_RELATIVE_PATH,
        format!("Path '{path}' is not a valid relative path: {why}"),
    )
}

fn canonicalize_rel_path(path: &str, allow_empty: bool) -> Result<Cow<'_, str>, SvnError> {
    let trimmed = path.trim_matches('/');

    if trimmed.contains('\0') {
        return Err(bad_path(path, "embedded NUL"));
    }

    let mut parts: Vec<&str> = Vec::new();
    let mut needs_alloc = false;

    for seg in trimmed.split('/') {
        if seg.is_empty() || seg == "." {
            needs_alloc = true;
            continue;
        }
        if seg == ".." {
            return Err(bad_path(path, "contains '..'"));
        }
        parts.push(seg);
    }

    if parts.is_empty() {
        if allow_empty {
            return Ok(Cow::Borrowed(""));
        }
        return Err(bad_path(path, "empty path"));
    }

    if !needs_alloc {
        return Ok(Cow::Borrowed(trimmed));
    }

    Ok(Cow::Owned(parts.join("/")))
}

/// Canonical non-empty relative path (editor entries, file paths).
pub(crate) fn validate_rel_path(path: &str) -> Result<String, SvnError> {
    Ok(canonicalize_rel_path(path, false)?.into_owned())
}

/// Canonical relative path; the session root is `""`.
pub(crate) fn validate_rel_dir_path(path: &str) -> Result<String, SvnError> {
    Ok(canonicalize_rel_path(path, true)?.into_owned())
}

/// Rejects paths with a leading `/` before they reach operations that
/// require a strict relative path.
pub(crate) fn require_relative(path: &str) -> Result<(), Error> {
    if path.starts_with('/') {
        return Err(Error::Value(format!(
            "invalid path '{path}': relative path expected (no leading '/')"
        )));
    }
    Ok(())
}

/// Joins a canonical parent path and a child name.
pub(crate) fn join_rel(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        child.to_string()
    } else {
        format!("{parent}/{child}")
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn validate_rel_path_rejects_empty_path() {
        let err = validate_rel_path("//").unwrap_err();
        assert_eq!(err.apr_err(), codes::BAD_RELATIVE_PATH);
        assert!(validate_rel_path("/").is_err());
    }

    #[test]
    fn validate_rel_path_rejects_parent_dir() {
        assert!(validate_rel_path("../a.zip").is_err());
        assert!(validate_rel_path("a/../b.zip").is_err());
        assert!(validate_rel_dir_path("a/../b").is_err());
    }

    #[test]
    fn validate_rel_path_normalizes_slashes_and_curdir() {
        assert_eq!(validate_rel_path("/trunk/a.zip").unwrap(), "trunk/a.zip");
        assert_eq!(validate_rel_path("trunk/").unwrap(), "trunk");
        assert_eq!(validate_rel_path("//trunk//./a.zip").unwrap(), "trunk/a.zip");
    }

    #[test]
    fn validate_rel_dir_path_allows_empty_root() {
        assert_eq!(validate_rel_dir_path("").unwrap(), "");
        assert_eq!(validate_rel_dir_path("/").unwrap(), "");
    }

    #[test]
    fn require_relative_rejects_leading_slashes() {
        assert!(require_relative("bar").is_ok());
        assert!(require_relative("bar/").is_ok());
        assert!(matches!(require_relative("/bar"), Err(Error::Value(_))));
        assert!(matches!(require_relative("///bar"), Err(Error::Value(_))));
    }

    #[test]
    fn join_rel_handles_root() {
        assert_eq!(join_rel("", "foo"), "foo");
        assert_eq!(join_rel("foo", "bar"), "foo/bar");
    }
}
