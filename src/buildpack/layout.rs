//! On-disk buildpack layout and hook lookup

use crate::error::{LifecycleError, LifecycleResult};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Executable hooks a buildpack may provide under `bin/`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    Detect,
    Supply,
    Compile,
    Finalize,
    Release,
}

impl Hook {
    /// File name under `bin/`
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Detect => "detect",
            Self::Supply => "supply",
            Self::Compile => "compile",
            Self::Finalize => "finalize",
            Self::Release => "release",
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.file_name())
    }
}

/// A buildpack directory known to contain `bin/`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildpackLayout {
    root: PathBuf,
}

impl BuildpackLayout {
    /// Locate the layout for `reference` starting at `root`
    ///
    /// Accepts `root` itself when it has `bin/`, or its only entry when that
    /// entry is a directory with `bin/` (archives often wrap everything in
    /// one top-level folder).
    pub fn locate(reference: &str, root: &Path) -> LifecycleResult<Self> {
        if root.join("bin").is_dir() {
            return Ok(Self {
                root: root.to_path_buf(),
            });
        }

        let malformed = || LifecycleError::MalformedLayout {
            reference: reference.to_string(),
        };

        let entries: Vec<fs::DirEntry> = match fs::read_dir(root) {
            Ok(iter) => iter.filter_map(Result::ok).collect(),
            Err(e) => {
                debug!("Cannot read buildpack dir {}: {}", root.display(), e);
                return Err(malformed());
            }
        };

        if let [only] = entries.as_slice() {
            let child = only.path();
            if child.is_dir() && child.join("bin").is_dir() {
                debug!("Using nested buildpack dir {}", child.display());
                return Ok(Self { root: child });
            }
        }

        Err(malformed())
    }

    /// Buildpack root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a hook executable
    pub fn hook_path(&self, hook: Hook) -> PathBuf {
        self.root.join("bin").join(hook.file_name())
    }

    /// Whether the hook file exists
    pub fn has_hook(&self, hook: Hook) -> bool {
        self.hook_path(hook).is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn root_with_bin() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("bin")).unwrap();
        fs::write(temp.path().join("bin/detect"), "#!/bin/sh\n").unwrap();

        let layout = BuildpackLayout::locate("bp", temp.path()).unwrap();
        assert_eq!(layout.root(), temp.path());
        assert!(layout.has_hook(Hook::Detect));
        assert!(!layout.has_hook(Hook::Finalize));
    }

    #[test]
    fn single_nested_child() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("go-buildpack-1.0");
        fs::create_dir_all(nested.join("bin")).unwrap();

        let layout = BuildpackLayout::locate("bp", temp.path()).unwrap();
        assert_eq!(layout.root(), nested.as_path());
        assert_eq!(layout.hook_path(Hook::Compile), nested.join("bin/compile"));
    }

    #[test]
    fn two_children_is_malformed() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("a/bin")).unwrap();
        fs::create_dir_all(temp.path().join("b/bin")).unwrap();

        let err = BuildpackLayout::locate("bp", temp.path()).unwrap_err();
        assert!(matches!(err, LifecycleError::MalformedLayout { .. }));
    }

    #[test]
    fn nesting_is_one_level_only() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("outer/inner/bin")).unwrap();

        assert!(BuildpackLayout::locate("bp", temp.path()).is_err());
    }

    #[test]
    fn missing_root_is_malformed() {
        let temp = TempDir::new().unwrap();
        let err = BuildpackLayout::locate("bp", &temp.path().join("nope")).unwrap_err();
        assert!(err.to_string().contains("bp"));
    }
}
