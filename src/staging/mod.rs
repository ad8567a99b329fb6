//! Staging: turn an application directory into a droplet
//!
//! [`stage`] drives the whole builder run. The submodules are usable on
//! their own for callers that need a single step.

pub mod archive;
pub mod cache;
pub mod droplet;
pub mod hooks;
pub mod metadata;
pub mod orchestrator;
pub mod release;
pub mod workspace;

pub use cache::CacheManager;
pub use droplet::DropletAssembler;
pub use hooks::{HookOutput, HookRunner};
pub use metadata::{StagingInfo, StagingResult};
pub use orchestrator::{Orchestrator, PipelineState, MISSING_WEB_MESSAGE};
pub use release::{ProcessTypes, ReleaseInfo};
pub use workspace::StagingWorkspace;

use crate::buildpack::BuildpackStore;
use crate::config::BuilderConfig;
use crate::error::LifecycleResult;
use tracing::info;

/// Validate, run the pipeline, and write droplet, cache and result
pub async fn stage(config: &BuilderConfig, hooks: HookRunner) -> LifecycleResult<StagingResult> {
    config.validate()?;

    let store = BuildpackStore::new(config);
    let workspace = StagingWorkspace::create()?;
    let state = Orchestrator::new(config, &store, &workspace, hooks)
        .run()
        .await?;
    let result = DropletAssembler::new(config, &workspace)
        .assemble(&state)
        .await?;

    info!(
        "Staged {} with {} process types",
        if state.detected_buildpack_name.is_empty() {
            state.detected_buildpack_key.as_str()
        } else {
            state.detected_buildpack_name.as_str()
        },
        result.process_types.len()
    );
    Ok(result)
}
