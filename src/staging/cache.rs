//! Build artifacts cache layout
//!
//! The cache root holds one directory per supply buildpack, named by the
//! buildpack's key, plus `final/` for the final buildpack. Anything else at
//! the top level is left over from an older schema and is removed before
//! any hook runs.

use crate::config::{buildpack_key, legacy_buildpack_key, BuilderConfig};
use crate::error::{LifecycleError, LifecycleResult};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Cache directory of the final buildpack
pub const FINAL_CACHE_DIR: &str = "final";

/// Compile cache of multi-buildpack runs under the legacy layout
pub const LEGACY_PRIMARY_DIR: &str = "primary";

/// Prunes and hands out cache directories
pub struct CacheManager<'a> {
    config: &'a BuilderConfig,
}

impl<'a> CacheManager<'a> {
    pub fn new(config: &'a BuilderConfig) -> Self {
        Self { config }
    }

    fn root(&self) -> &Path {
        &self.config.build_artifacts_cache_dir
    }

    fn retained_names(&self) -> HashSet<String> {
        let mut keep = HashSet::new();
        keep.insert(FINAL_CACHE_DIR.to_string());
        if self.config.legacy_cache_layout {
            keep.insert(LEGACY_PRIMARY_DIR.to_string());
        }
        for reference in &self.config.buildpack_order {
            keep.insert(buildpack_key(reference));
            keep.insert(legacy_buildpack_key(reference));
        }
        keep
    }

    /// Remove stale top-level entries, returning what was removed
    pub async fn prune(&self) -> LifecycleResult<Vec<PathBuf>> {
        let root = self.root();
        fs::create_dir_all(root)
            .await
            .map_err(|e| LifecycleError::io(format!("creating cache dir {}", root.display()), e))?;

        // In the legacy single-buildpack layout the root is the compile cache itself
        if self.config.legacy_cache_layout && !self.config.is_multi_buildpack() {
            debug!("Legacy single-buildpack cache, skipping prune");
            return Ok(Vec::new());
        }

        let keep = self.retained_names();
        let keep_files = self.config.legacy_cache_layout;
        let mut removed = Vec::new();

        let mut entries = fs::read_dir(root)
            .await
            .map_err(|e| LifecycleError::io("reading cache directory", e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| LifecycleError::io("reading cache entry", e))?
        {
            let path = entry.path();
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| LifecycleError::io(format!("inspecting {}", path.display()), e))?;

            let stale = if file_type.is_dir() {
                !keep.contains(entry.file_name().to_string_lossy().as_ref())
            } else {
                !keep_files
            };

            if !stale {
                continue;
            }

            debug!("Removing stale cache entry {}", path.display());
            let result = if file_type.is_dir() {
                fs::remove_dir_all(&path).await
            } else {
                fs::remove_file(&path).await
            };
            result.map_err(|e| LifecycleError::io(format!("removing {}", path.display()), e))?;
            removed.push(path);
        }

        if !removed.is_empty() {
            info!("Pruned {} stale cache entries", removed.len());
        }
        Ok(removed)
    }

    /// Cache directory for a supply buildpack, created if absent
    ///
    /// A directory left under the legacy MD5 name is renamed to the current key.
    pub async fn supply_cache_dir(&self, reference: &str) -> LifecycleResult<PathBuf> {
        let dir = self.root().join(buildpack_key(reference));
        if !dir.exists() {
            let legacy = self.root().join(legacy_buildpack_key(reference));
            if legacy.is_dir() {
                info!("Migrating legacy cache {} to {}", legacy.display(), dir.display());
                fs::rename(&legacy, &dir).await.map_err(|e| {
                    LifecycleError::io(format!("migrating cache {}", legacy.display()), e)
                })?;
            }
        }
        create_dir(&dir).await?;
        Ok(dir)
    }

    /// Cache directory for the compile or finalize step, created if absent
    pub async fn compile_cache_dir(&self) -> LifecycleResult<PathBuf> {
        let dir = match (self.config.legacy_cache_layout, self.config.is_multi_buildpack()) {
            (false, _) => self.root().join(FINAL_CACHE_DIR),
            (true, false) => self.root().to_path_buf(),
            (true, true) => self.root().join(LEGACY_PRIMARY_DIR),
        };
        create_dir(&dir).await?;
        Ok(dir)
    }
}

async fn create_dir(dir: &Path) -> LifecycleResult<()> {
    fs::create_dir_all(dir)
        .await
        .map_err(|e| LifecycleError::io(format!("creating {}", dir.display()), e))
}
