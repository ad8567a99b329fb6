//! Droplet assembly and archival
//!
//! The tree is built inside a [`StagingWorkspace`]; see that module for the
//! layout.

use crate::config::BuilderConfig;
use crate::error::{LifecycleError, LifecycleResult};
use crate::staging::archive::{list_children, write_tgz};
use crate::staging::metadata::{StagingInfo, StagingResult};
use crate::staging::orchestrator::PipelineState;
use crate::staging::workspace::{move_dir, StagingWorkspace};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Members of every droplet archive, in archive order
pub const DROPLET_MEMBERS: [&str; 5] = ["app", "deps", "staging_info.yml", "tmp", "logs"];

const STAGING_INFO_FILE: &str = "staging_info.yml";

/// Builds the droplet tree and writes the output archives and metadata
pub struct DropletAssembler<'a> {
    config: &'a BuilderConfig,
    workspace: &'a StagingWorkspace,
}

impl<'a> DropletAssembler<'a> {
    pub fn new(config: &'a BuilderConfig, workspace: &'a StagingWorkspace) -> Self {
        Self { config, workspace }
    }

    /// Assemble the droplet, archive droplet and cache, write the staging result
    ///
    /// The build directory is moved to `<workspace>/app`; its original path is
    /// no longer valid afterwards.
    pub async fn assemble(&self, state: &PipelineState) -> LifecycleResult<StagingResult> {
        let contents = self.workspace.root().to_path_buf();

        let info = StagingInfo::new(&state.detected_buildpack_name, &state.process_types);
        write_file(&contents.join(STAGING_INFO_FILE), &info.to_document()?).await?;

        for dir in ["tmp", "logs"] {
            let path = contents.join(dir);
            if path.exists() {
                fs::remove_dir_all(&path).await.map_err(|e| {
                    LifecycleError::assemble(format!("removing {}", path.display()), e)
                })?;
            }
            create_dir(&path).await?;
        }
        create_dir(&self.workspace.deps_dir()).await?;

        self.move_app().await?;

        info!("Archiving droplet to {}", self.config.output_droplet.display());
        let members: Vec<String> = DROPLET_MEMBERS.iter().map(|m| m.to_string()).collect();
        archive(contents.clone(), members, self.config.output_droplet.clone()).await?;

        let cache_root = self.config.build_artifacts_cache_dir.clone();
        info!(
            "Archiving build artifacts cache to {}",
            self.config.output_build_artifacts_cache.display()
        );
        let cache_members = list_children(&cache_root)?;
        archive(
            cache_root,
            cache_members,
            self.config.output_build_artifacts_cache.clone(),
        )
        .await?;

        let result = StagingResult::new(
            state.process_types.clone(),
            &state.detected_buildpack_name,
            &state.detected_buildpack_key,
        );
        let json = serde_json::to_string(&result)?;
        write_file(&self.config.output_metadata, &json).await?;

        Ok(result)
    }

    async fn move_app(&self) -> LifecycleResult<()> {
        let build_dir = self.config.build_dir.clone();
        let app = self.workspace.app_dir();
        if app.exists() {
            fs::remove_dir_all(&app)
                .await
                .map_err(|e| LifecycleError::assemble(format!("removing {}", app.display()), e))?;
        }

        debug!("Moving {} to {}", build_dir.display(), app.display());
        let context = format!("moving {} to {}", build_dir.display(), app.display());
        tokio::task::spawn_blocking(move || move_dir(&build_dir, &app))
            .await
            .map_err(|e| LifecycleError::Internal(format!("move task failed: {}", e)))?
            .map_err(|e| LifecycleError::assemble(context, e))
    }
}

async fn archive(base: PathBuf, members: Vec<String>, output: PathBuf) -> LifecycleResult<u64> {
    tokio::task::spawn_blocking(move || write_tgz(&base, &members, &output))
        .await
        .map_err(|e| LifecycleError::Internal(format!("archive task failed: {}", e)))?
}

async fn create_dir(path: &Path) -> LifecycleResult<()> {
    fs::create_dir_all(path)
        .await
        .map_err(|e| LifecycleError::assemble(format!("creating {}", path.display()), e))?;
    set_mode(path, 0o755).await
}

async fn write_file(path: &Path, content: &str) -> LifecycleResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| LifecycleError::assemble(format!("creating {}", parent.display()), e))?;
    }
    fs::write(path, content)
        .await
        .map_err(|e| LifecycleError::assemble(format!("writing {}", path.display()), e))?;
    set_mode(path, 0o644).await
}

async fn set_mode(path: &Path, mode: u32) -> LifecycleResult<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
            .await
            .map_err(|e| LifecycleError::assemble(format!("setting mode on {}", path.display()), e))?;
    }
    #[cfg(not(unix))]
    let _ = (path, mode);
    Ok(())
}
