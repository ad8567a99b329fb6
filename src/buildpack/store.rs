//! Buildpack acquisition and lookup

use crate::buildpack::layout::BuildpackLayout;
use crate::buildpack::source::{BuildpackSource, GitSource, ZipSource};
use crate::config::{BuilderConfig, BuildpackRef, RemoteKind};
use crate::error::{LifecycleError, LifecycleResult};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Acquires remote buildpacks and locates hook scripts on disk
pub struct BuildpackStore<'a> {
    config: &'a BuilderConfig,
    zip: Box<dyn BuildpackSource>,
    git: Box<dyn BuildpackSource>,
}

impl<'a> BuildpackStore<'a> {
    /// Create a store using the HTTP and git sources
    pub fn new(config: &'a BuilderConfig) -> Self {
        Self::with_sources(
            config,
            Box::new(ZipSource::new(config.skip_cert_verify)),
            Box::new(GitSource::new(config.skip_cert_verify)),
        )
    }

    /// Create a store with explicit sources
    pub fn with_sources(
        config: &'a BuilderConfig,
        zip: Box<dyn BuildpackSource>,
        git: Box<dyn BuildpackSource>,
    ) -> Self {
        Self { config, zip, git }
    }

    /// Reset the download root; downloaded buildpacks do not outlive a run
    pub async fn prepare(&self) -> LifecycleResult<()> {
        let downloads = &self.config.buildpack_downloads_dir;
        if downloads.exists() {
            fs::remove_dir_all(downloads).await.map_err(|e| {
                LifecycleError::io(format!("clearing {}", downloads.display()), e)
            })?;
        }
        fs::create_dir_all(downloads)
            .await
            .map_err(|e| LifecycleError::io(format!("creating {}", downloads.display()), e))?;
        Ok(())
    }

    /// Ensure every buildpack in the order is present, fetching each URL once
    pub async fn ensure_all(&self) -> LifecycleResult<()> {
        let mut seen = HashSet::new();
        for reference in &self.config.buildpack_order {
            if seen.insert(reference.as_str()) {
                self.ensure(reference).await?;
            }
        }
        Ok(())
    }

    /// Fetch a remote buildpack; system names are a no-op
    pub async fn ensure(&self, reference: &str) -> LifecycleResult<()> {
        let BuildpackRef::Remote { url, kind } = BuildpackRef::parse(reference) else {
            debug!("System buildpack {}, nothing to fetch", reference);
            return Ok(());
        };

        let source = match kind {
            RemoteKind::Zip => &self.zip,
            RemoteKind::Git { .. } => &self.git,
        };

        let dest = self.config.buildpack_path(reference);
        let parent = dest.parent().unwrap_or(Path::new("."));
        fs::create_dir_all(parent)
            .await
            .map_err(|e| LifecycleError::io(format!("creating {}", parent.display()), e))?;

        let staging = parent.join(format!(".staging-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&staging)
            .await
            .map_err(|e| LifecycleError::io(format!("creating {}", staging.display()), e))?;

        info!("Fetching buildpack {} ({})", url, source.source_name());
        // git refuses to clone into a non-empty dir, so clone into a child
        let target = staging.join("bp");
        if let Err(e) = source.fetch(&url, &target).await {
            let _ = fs::remove_dir_all(&staging).await;
            return Err(match e {
                err @ LifecycleError::Acquire { .. } => err,
                other => LifecycleError::acquire(reference, other),
            });
        }

        let result = replace_dir(&target, &dest).await;
        let _ = fs::remove_dir_all(&staging).await;
        result
    }

    /// Directory a reference resolves to, honouring legacy MD5 names for system buildpacks
    pub fn root_for(&self, reference: &str) -> PathBuf {
        let current = self.config.buildpack_path(reference);
        if current.exists() || BuildpackRef::parse(reference).is_remote() {
            return current;
        }

        let legacy = self.config.legacy_buildpack_path(reference);
        if legacy.exists() {
            debug!("Using legacy buildpack dir {} for {}", legacy.display(), reference);
            return legacy;
        }
        current
    }

    /// Locate the hook layout for a reference
    pub fn locate(&self, reference: &str) -> LifecycleResult<BuildpackLayout> {
        BuildpackLayout::locate(reference, &self.root_for(reference))
    }
}

async fn replace_dir(from: &Path, to: &Path) -> LifecycleResult<()> {
    if to.exists() {
        fs::remove_dir_all(to)
            .await
            .map_err(|e| LifecycleError::io(format!("removing {}", to.display()), e))?;
    }
    fs::rename(from, to).await.map_err(|e| {
        LifecycleError::io(
            format!("moving {} to {}", from.display(), to.display()),
            e,
        )
    })
}
