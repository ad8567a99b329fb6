//! Detect, supply, compile and release
//!
//! ```text
//! acquire -> prune cache -> detect | supply* -> finalize | compile -> release
//! ```
//!
//! Hooks run strictly one after another in buildpack order.

use crate::buildpack::{BuildpackLayout, BuildpackStore, Hook};
use crate::config::BuilderConfig;
use crate::error::{LifecycleError, LifecycleResult};
use crate::staging::cache::CacheManager;
use crate::staging::hooks::HookRunner;
use crate::staging::release::{
    merge_process_types, read_procfile, ProcessTypes, ReleaseInfo, WEB_PROCESS,
};
use crate::staging::workspace::StagingWorkspace;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use tokio::fs;
use tracing::{debug, info, warn};

/// Diagnostic emitted when no `web` process type survives the merge
pub const MISSING_WEB_MESSAGE: &str = "No start command specified by buildpack or via Procfile.";

/// Per-run record handed from the pipeline to droplet assembly
#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    /// Trimmed detect output, empty when detection was skipped
    pub detected_buildpack_name: String,
    /// Reference recorded as `buildpack_key` in the staging result
    pub detected_buildpack_key: String,
    pub detected_buildpack_path: PathBuf,
    pub detect_stdout: String,
    pub supply_cache_paths: Vec<PathBuf>,
    pub deps_indices: Vec<String>,
    pub release: ReleaseInfo,
    pub process_types: ProcessTypes,
}

/// Runs the staging pipeline against a buildpack store
pub struct Orchestrator<'a> {
    config: &'a BuilderConfig,
    store: &'a BuildpackStore<'a>,
    cache: CacheManager<'a>,
    hooks: HookRunner,
    deps_dir: PathBuf,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        config: &'a BuilderConfig,
        store: &'a BuildpackStore<'a>,
        workspace: &StagingWorkspace,
        hooks: HookRunner,
    ) -> Self {
        Self {
            config,
            store,
            cache: CacheManager::new(config),
            hooks,
            deps_dir: workspace.deps_dir(),
        }
    }

    /// Run every step up to and including release
    pub async fn run(&self) -> LifecycleResult<PipelineState> {
        self.store.prepare().await?;
        self.store.ensure_all().await?;
        self.cache.prune().await?;

        let mut state = PipelineState::default();

        let final_position = if self.config.skip_detect {
            self.supply_all(&mut state).await?;
            self.config.buildpack_order.len().saturating_sub(1)
        } else {
            self.detect(&mut state).await?
        };

        let reference = self
            .config
            .buildpack_order
            .get(final_position)
            .ok_or_else(|| LifecycleError::config("buildpack-order", "no buildpacks given"))?;
        state.detected_buildpack_key = reference.clone();

        let layout = self.store.locate(reference)?;
        state.detected_buildpack_path = layout.root().to_path_buf();

        self.build(&layout, final_position).await?;
        self.release(&layout, &mut state).await?;

        Ok(state)
    }

    /// Run detect for each buildpack until one matches, returning its position
    async fn detect(&self, state: &mut PipelineState) -> LifecycleResult<usize> {
        info!("Detecting");
        let args = [self.config.build_dir.clone().into_os_string()];

        for (position, reference) in self.config.buildpack_order.iter().enumerate() {
            let layout = match self.store.locate(reference) {
                Ok(layout) => layout,
                Err(e) => {
                    warn!("Skipping {} during detect: {}", reference, e);
                    continue;
                }
            };

            match self.hooks.capture(&layout, Hook::Detect, &args).await {
                Ok(output) if output.status.success() => {
                    let name = output.stdout.trim().to_string();
                    info!("Detected {} ({})", reference, name);
                    state.detect_stdout = name.clone();
                    state.detected_buildpack_name = name;
                    return Ok(position);
                }
                Ok(output) => debug!("{} did not detect: {}", reference, output.status),
                Err(e) => warn!("Detect failed for {}: {}", reference, e),
            }
        }

        Err(LifecycleError::DetectFailed)
    }

    /// Run supply for every buildpack but the last
    ///
    /// A failing buildpack is skipped; the step fails only when none succeeded.
    async fn supply_all(&self, state: &mut PipelineState) -> LifecycleResult<()> {
        let supply = self.config.supply_buildpacks();
        if supply.is_empty() {
            return Ok(());
        }

        info!("Supplying");
        let mut succeeded = 0usize;
        for (position, reference) in supply.iter().enumerate() {
            let index = self.config.deps_index(position);
            let cache_dir = self.cache.supply_cache_dir(reference).await?;
            create_dir(&self.deps_dir.join(&index)).await?;
            state.deps_indices.push(index.clone());
            state.supply_cache_paths.push(cache_dir.clone());

            let layout = match self.store.locate(reference) {
                Ok(layout) => layout,
                Err(e) => {
                    warn!("Supply skipped for {}: {}", reference, e);
                    continue;
                }
            };

            let args = self.hook_args(&cache_dir, &index);
            match self.hooks.run(&layout, Hook::Supply, &args).await {
                Ok(status) if status.success() => succeeded += 1,
                Ok(status) => warn!("Supply failed for {}: {}", reference, status),
                Err(e) => warn!("Supply failed for {}: {}", reference, e),
            }
        }

        if succeeded == 0 {
            return Err(LifecycleError::SupplyFailed);
        }
        Ok(())
    }

    /// Finalize (with optional supply) or compile the final buildpack
    async fn build(&self, layout: &BuildpackLayout, position: usize) -> LifecycleResult<()> {
        let cache_dir = self.cache.compile_cache_dir().await?;

        if !layout.has_hook(Hook::Finalize) {
            info!("Compiling");
            let args = self.hook_args(&cache_dir, "");
            let status = self
                .hooks
                .run(layout, Hook::Compile, &args)
                .await
                .map_err(|e| LifecycleError::compile_failed("compile", e.to_string()))?;
            return check_status(status, "compile");
        }

        let index = self.config.deps_index(position);
        create_dir(&self.deps_dir.join(&index)).await?;
        let args = self.hook_args(&cache_dir, &index);

        if layout.has_hook(Hook::Supply) {
            info!("Supplying");
            match self.hooks.run(layout, Hook::Supply, &args).await {
                Ok(status) if status.success() => {}
                Ok(status) => {
                    warn!("Supply failed for final buildpack: {}", status);
                    return Err(LifecycleError::SupplyFailed);
                }
                Err(e) => {
                    warn!("Supply failed for final buildpack: {}", e);
                    return Err(LifecycleError::SupplyFailed);
                }
            }
        }

        info!("Finalizing");
        let status = self
            .hooks
            .run(layout, Hook::Finalize, &args)
            .await
            .map_err(|e| LifecycleError::compile_failed("finalize", e.to_string()))?;
        check_status(status, "finalize")
    }

    async fn release(
        &self,
        layout: &BuildpackLayout,
        state: &mut PipelineState,
    ) -> LifecycleResult<()> {
        info!("Releasing");
        state.release = if layout.has_hook(Hook::Release) {
            let args = [self.config.build_dir.clone().into_os_string()];
            let output = self
                .hooks
                .capture(layout, Hook::Release, &args)
                .await
                .map_err(|e| LifecycleError::ReleaseFailed(e.to_string()))?;
            if !output.status.success() {
                return Err(LifecycleError::ReleaseFailed(output.status.to_string()));
            }
            ReleaseInfo::parse(&output.stdout)?
        } else {
            debug!("{} has no release hook", layout.root().display());
            ReleaseInfo::default()
        };

        let procfile = read_procfile(&self.config.build_dir)?;
        state.process_types = merge_process_types(&state.release, procfile);

        if !state.process_types.contains_key(WEB_PROCESS) {
            warn!("{}", MISSING_WEB_MESSAGE);
        }
        Ok(())
    }

    /// `<build-dir> <cache-dir> <deps-index> <deps-dir>`
    fn hook_args(&self, cache_dir: &Path, index: &str) -> Vec<OsString> {
        vec![
            self.config.build_dir.clone().into_os_string(),
            cache_dir.as_os_str().to_os_string(),
            OsString::from(index),
            self.deps_dir.clone().into_os_string(),
        ]
    }
}

fn check_status(status: ExitStatus, step: &str) -> LifecycleResult<()> {
    if status.success() {
        Ok(())
    } else {
        Err(LifecycleError::compile_failed(step, status.to_string()))
    }
}

async fn create_dir(path: &Path) -> LifecycleResult<()> {
    fs::create_dir_all(path)
        .await
        .map_err(|e| LifecycleError::io(format!("creating {}", path.display()), e))
}
