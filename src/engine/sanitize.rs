use std::io;
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Resolve a destination root to an absolute, lexically clean path.
pub fn resolve_root(root: &Path) -> io::Result<PathBuf> {
    std::path::absolute(root).map(|p| normalize_path(&p))
}

/// Join an untrusted entry name onto `root` and reject it unless the result
/// lies strictly below `root`.
///
/// `root` must come from [`resolve_root`]. The name is always treated as
/// relative, so a leading `/` stays inside the root, and `..` is resolved
/// lexically before the check. A name that resolves to the root itself is
/// rejected too.
pub fn safe_join(root: &Path, entry_name: &str) -> Result<PathBuf> {
    let mut candidate = root.to_path_buf();
    for component in Path::new(entry_name).components() {
        match component {
            Component::Normal(part) => candidate.push(part),
            Component::ParentDir => {
                candidate.pop();
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }

    if candidate != root && candidate.starts_with(root) {
        Ok(candidate)
    } else {
        Err(Error::PathTraversal {
            entry: entry_name.to_string(),
            resolved: candidate,
        })
    }
}

/// Resolve `.` and `..` without touching the filesystem.
pub(crate) fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();

    for component in path.components() {
        match component {
            Component::ParentDir => {
                result.pop();
            }
            Component::CurDir => {}
            other => result.push(other.as_os_str()),
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> &'static Path {
        if cfg!(windows) {
            Path::new("C:\\opt\\dest")
        } else {
            Path::new("/opt/dest")
        }
    }

    #[test]
    fn plain_names_land_under_root() {
        let path = safe_join(root(), "bin/tool").unwrap();
        assert_eq!(path, root().join("bin").join("tool"));
        assert!(safe_join(root(), "dir/").unwrap().ends_with("dir"));
    }

    #[test]
    fn parent_segments_that_escape_are_rejected() {
        for name in ["../evil.txt", "a/../../evil.txt", "../../../../etc/passwd"] {
            let err = safe_join(root(), name).unwrap_err();
            assert!(matches!(err, Error::PathTraversal { .. }), "{name}: {err:?}");
        }
    }

    #[test]
    fn parent_segments_that_stay_inside_are_accepted() {
        let path = safe_join(root(), "a/b/../c.txt").unwrap();
        assert_eq!(path, root().join("a").join("c.txt"));
    }

    #[test]
    fn sibling_with_shared_prefix_is_rejected() {
        // "/opt/dest-evil" shares a textual prefix with "/opt/dest"
        let err = safe_join(root(), "../dest-evil/x").unwrap_err();
        assert!(matches!(err, Error::PathTraversal { .. }));
    }

    #[test]
    fn names_aliasing_the_root_are_rejected() {
        for name in ["", ".", "./", "a/..", "/"] {
            assert!(safe_join(root(), name).is_err(), "{name:?} accepted");
        }
    }

    #[test]
    fn leading_separator_stays_inside() {
        let path = safe_join(root(), "/etc/passwd").unwrap();
        assert_eq!(path, root().join("etc").join("passwd"));
    }

    #[test]
    fn root_is_made_absolute_and_clean() {
        let resolved = resolve_root(Path::new("out/./sub/../final")).unwrap();
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("out/final"));
    }
}
