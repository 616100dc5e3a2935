// SPDX-License-Identifier: MIT

//! Path utilities for volume lookups.
//!
//! Paths are `/`-separated; empty components (leading, trailing or doubled
//! slashes) are ignored, so `"/a//b/"` and `"a/b"` name the same entry.

use alloc::vec::Vec;

/// Splits a path into its non-empty components.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|part| !part.is_empty()).collect()
}

/// Splits a path into its parent components and final component.
///
/// Returns `None` for a path naming the root itself.
pub fn split_parent(path: &str) -> Option<(Vec<&str>, &str)> {
    let mut parts = split_path(path);
    let last = parts.pop()?;
    Some((parts, last))
}

/// `true` for the `.` and `..` pseudo components.
#[inline]
pub fn is_dot_component(part: &str) -> bool {
    part == "." || part == ".."
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_ignores_empty_components() {
        assert_eq!(split_path("/a//b/c/"), ["a", "b", "c"]);
        assert!(split_path("///").is_empty());
    }

    #[test]
    fn test_split_parent() {
        let (parent, name) = split_parent("dir/sub/file.txt").unwrap();
        assert_eq!(parent, ["dir", "sub"]);
        assert_eq!(name, "file.txt");
        assert!(split_parent("/").is_none());
        assert!(is_dot_component(".."));
        assert!(!is_dot_component("..."));
    }
}
