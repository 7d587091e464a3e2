//! Path helpers for project discovery and local path overrides

use crate::manifest::MANIFEST_FILE;
use std::path::{Component, Path, PathBuf};

/// Find the project root by looking for Larder.toml from `start_dir` upwards
pub fn find_project_root(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir;

    loop {
        let manifest = current.join(MANIFEST_FILE);
        if manifest.exists() {
            return Some(current.to_path_buf());
        }

        current = current.parent()?;
    }
}

/// Resolve a user-supplied path against `base`
///
/// A leading `~` expands to the home directory. Relative paths are joined
/// onto `base`; `.` and `..` components are folded without touching the
/// filesystem.
pub fn resolve_path(path: &Path, base: &Path) -> PathBuf {
    let expanded = match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    };

    let joined = if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    };

    normalize(&joined)
}

/// Fold `.` and `..` components
pub fn normalize(path: &Path) -> PathBuf {
    let mut components = Vec::new();

    for component in path.components() {
        match component {
            Component::ParentDir => {
                if matches!(components.last(), Some(Component::Normal(_))) {
                    components.pop();
                } else {
                    components.push(component);
                }
            }
            Component::CurDir => {}
            _ => components.push(component),
        }
    }

    components.iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_find_project_root() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().to_path_buf();
        fs::write(root.join(MANIFEST_FILE), "sources = []\n").unwrap();

        let nested = root.join("a").join("b").join("c");
        fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_project_root(&nested), Some(root));
    }

    #[test]
    fn test_normalize_path() {
        let path = Path::new("./foo/../bar/./baz");
        assert_eq!(normalize(path), PathBuf::from("bar/baz"));
        assert_eq!(normalize(Path::new("../x")), PathBuf::from("../x"));
    }

    #[test]
    fn test_resolve_relative() {
        let resolved = resolve_path(Path::new("../mylib"), Path::new("/work/app"));
        assert_eq!(resolved, PathBuf::from("/work/mylib"));
    }

    #[test]
    fn test_resolve_absolute() {
        let resolved = resolve_path(Path::new("/opt/lib"), Path::new("/work/app"));
        assert_eq!(resolved, PathBuf::from("/opt/lib"));
    }
}
