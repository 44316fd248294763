//! Path utility functions for normalization and comparison.

use std::path::{Component, Path, PathBuf};

/// Normalize a path by processing `.` and `..` components lexically.
/// This does not access the filesystem and does not follow symlinks.
pub(crate) fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !result.pop() {
                    result.push(component);
                }
            }
            _ => result.push(component),
        }
    }
    result
}

/// Check if a path is under a given directory by comparing normalized path components.
///
/// # Security
/// Both sides are normalized first, so `/root/pkg/../../etc/passwd` is NOT
/// under `/root`. The installer relies on this before deleting recorded files.
pub fn is_path_under(path: &Path, dir: &Path) -> bool {
    let normalized_path = normalize_path(path);
    let normalized_dir = normalize_path(dir);

    let path_components: Vec<_> = normalized_path.components().collect();
    let dir_components: Vec<_> = normalized_dir.components().collect();

    if path_components.len() < dir_components.len() {
        return false;
    }

    dir_components
        .iter()
        .zip(path_components.iter())
        .all(|(d, p)| d == p)
}

/// Calculate the relative path from a directory to a target path.
///
/// Used to record installed files relative to their package directory, e.g.
/// `/proj/.ghpm/packages/zlib` + `/proj/.ghpm/packages/zlib/include/zlib.h`
/// gives `include/zlib.h`.
///
/// Returns `None` if a relative path cannot be computed (e.g., different drive letters on Windows).
pub fn relative_path_from_dir(from_dir: &Path, to_path: &Path) -> Option<PathBuf> {
    let result = pathdiff::diff_paths(to_path, from_dir)?;
    if result.is_absolute() {
        return None;
    }
    Some(result)
}

/// Render a relative path with forward slashes so ledger files are portable.
pub(crate) fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_with_dot() {
        assert_eq!(
            normalize_path(Path::new("/usr/./local/./bin")),
            PathBuf::from("/usr/local/bin")
        );
    }

    #[test]
    fn test_normalize_path_with_parent_dir() {
        assert_eq!(
            normalize_path(Path::new("/usr/local/../bin")),
            PathBuf::from("/usr/bin")
        );
    }

    #[test]
    fn test_normalize_path_relative_keeps_leading_parent() {
        assert_eq!(
            normalize_path(Path::new("../a/./b")),
            PathBuf::from("../a/b")
        );
    }

    #[test]
    fn test_is_path_under_simple() {
        assert!(is_path_under(
            Path::new("/proj/.ghpm/packages/zlib/zlib.h"),
            Path::new("/proj/.ghpm/packages")
        ));
    }

    #[test]
    fn test_is_path_under_partial_component_match() {
        // "/proj/pkg-extra" must not count as under "/proj/pkg"
        assert!(!is_path_under(
            Path::new("/proj/pkg-extra/file"),
            Path::new("/proj/pkg")
        ));
    }

    #[test]
    fn test_is_path_under_directory_traversal_attack() {
        assert!(!is_path_under(
            Path::new("/proj/.ghpm/packages/zlib/../../../etc/passwd"),
            Path::new("/proj/.ghpm/packages")
        ));
    }

    #[test]
    fn test_is_path_under_path_shorter_than_dir() {
        assert!(!is_path_under(Path::new("/proj"), Path::new("/proj/.ghpm")));
    }

    #[test]
    fn test_relative_path_from_dir_nested() {
        let rel = relative_path_from_dir(
            Path::new("/proj/.ghpm/packages/zlib"),
            Path::new("/proj/.ghpm/packages/zlib/include/zlib.h"),
        );
        assert_eq!(rel, Some(PathBuf::from("include/zlib.h")));
    }

    #[test]
    fn test_to_slash_joins_components() {
        assert_eq!(to_slash(Path::new("include/sub/zlib.h")), "include/sub/zlib.h");
    }
}
