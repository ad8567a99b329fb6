//! Builder-owned directory the droplet tree is assembled in
//!
//! ```text
//! <workspace>/
//!   app/                 build directory, moved in after release
//!   deps/                supply output, handed to hooks
//!   tmp/  logs/          always empty
//!   staging_info.yml
//! ```
//!
//! The workspace is a fresh temporary directory, removed when dropped.
//! Nothing outside it is created or cleared.

use crate::error::{LifecycleError, LifecycleResult};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;
use walkdir::WalkDir;

const PREFIX: &str = "droplet-contents";

pub struct StagingWorkspace {
    dir: TempDir,
}

impl StagingWorkspace {
    /// Create an empty workspace under the system temp directory
    pub fn create() -> LifecycleResult<Self> {
        let dir = tempfile::Builder::new()
            .prefix(PREFIX)
            .tempdir()
            .map_err(|e| LifecycleError::io("creating staging workspace", e))?;
        Self::init(dir)
    }

    /// Create an empty workspace under `parent`
    pub fn create_in(parent: &Path) -> LifecycleResult<Self> {
        let dir = tempfile::Builder::new()
            .prefix(PREFIX)
            .tempdir_in(parent)
            .map_err(|e| {
                LifecycleError::io(format!("creating staging workspace in {}", parent.display()), e)
            })?;
        Self::init(dir)
    }

    fn init(dir: TempDir) -> LifecycleResult<Self> {
        let workspace = Self { dir };
        let deps = workspace.deps_dir();
        fs::create_dir(&deps)
            .map_err(|e| LifecycleError::io(format!("creating {}", deps.display()), e))?;
        debug!("Staging workspace at {}", workspace.root().display());
        Ok(workspace)
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn deps_dir(&self) -> PathBuf {
        self.root().join("deps")
    }

    pub fn app_dir(&self) -> PathBuf {
        self.root().join("app")
    }
}

/// Move `src` to `dest`, copying when they sit on different filesystems
///
/// Build directories are often mounted volumes. `src` is gone on success.
pub fn move_dir(src: &Path, dest: &Path) -> io::Result<()> {
    match fs::rename(src, dest) {
        Ok(()) => Ok(()),
        Err(err) if is_cross_device(&err) => {
            debug!("{} is on another filesystem, copying", src.display());
            copy_tree(src, dest)?;
            fs::remove_dir_all(src)
        }
        Err(err) => Err(err),
    }
}

// EXDEV
fn is_cross_device(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(18))
}

fn copy_tree(src: &Path, dest: &Path) -> io::Result<()> {
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(|e| io::Error::other(e.to_string()))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| io::Error::other(e.to_string()))?;
        let target = dest.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            // fs::copy carries the permission bits
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(link: &Path, target: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(link)?, target)
}

#[cfg(not(unix))]
fn copy_symlink(link: &Path, target: &Path) -> io::Result<()> {
    fs::copy(link, target).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_starts_with_deps_only() {
        let temp = TempDir::new().unwrap();
        let workspace = StagingWorkspace::create_in(temp.path()).unwrap();
        assert!(workspace.root().starts_with(temp.path()));
        assert!(workspace.deps_dir().is_dir());
        assert!(!workspace.app_dir().exists());
        assert_eq!(fs::read_dir(workspace.root()).unwrap().count(), 1);
    }

    #[test]
    fn workspace_is_removed_on_drop() {
        let temp = TempDir::new().unwrap();
        let root = {
            let workspace = StagingWorkspace::create_in(temp.path()).unwrap();
            workspace.root().to_path_buf()
        };
        assert!(!root.exists());
    }

    #[test]
    fn copy_tree_keeps_nested_files() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("lib/deep")).unwrap();
        fs::write(src.join("lib/deep/a.txt"), "a").unwrap();
        fs::write(src.join("top"), "t").unwrap();

        let dest = temp.path().join("dest");
        copy_tree(&src, &dest).unwrap();
        assert_eq!(fs::read_to_string(dest.join("lib/deep/a.txt")).unwrap(), "a");
        assert_eq!(fs::read_to_string(dest.join("top")).unwrap(), "t");
    }

    #[cfg(unix)]
    #[test]
    fn copy_tree_keeps_modes_and_links() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("run"), "#!/bin/sh\n").unwrap();
        fs::set_permissions(src.join("run"), fs::Permissions::from_mode(0o755)).unwrap();
        std::os::unix::fs::symlink("run", src.join("alias")).unwrap();

        let dest = temp.path().join("dest");
        copy_tree(&src, &dest).unwrap();
        let mode = fs::metadata(dest.join("run")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
        assert_eq!(fs::read_link(dest.join("alias")).unwrap(), PathBuf::from("run"));
    }

    #[test]
    fn cross_device_detection() {
        assert!(is_cross_device(&io::Error::from_raw_os_error(18)));
        assert!(!is_cross_device(&io::Error::from_raw_os_error(2)));
        assert!(!is_cross_device(&io::Error::other("x")));
    }

    #[test]
    fn move_dir_of_missing_source_fails() {
        let temp = TempDir::new().unwrap();
        assert!(move_dir(&temp.path().join("absent"), &temp.path().join("dest")).is_err());
    }

    #[test]
    fn move_dir_removes_source() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("build");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("index.html"), "hi").unwrap();

        let dest = temp.path().join("moved");
        move_dir(&src, &dest).unwrap();
        assert!(!src.exists());
        assert!(dest.join("index.html").is_file());
    }
}
