//! Launch: prepare the droplet's environment and exec the start command
//!
//! The droplet layout seen from the app directory:
//!
//! ```text
//! ../staging_info.yml   ../profile.d/   ../tmp/   ../deps/
//! ./.profile.d/         ./.profile
//! ```

pub mod database_uri;
pub mod env;
pub mod script;
pub mod secrets;

pub use env::{process_env, EnvBuilder, EnvChanges, EnvSnapshot};
pub use script::{LaunchScript, Launcher};
pub use secrets::{resolve_services, InterpolationTransport, SecretResolver, TransportError};

use crate::config::LauncherConfig;
use crate::error::{LifecycleError, LifecycleResult};
use crate::staging::metadata::StagingInfo;
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing::debug;

/// Everything needed to hand off, computed before any process change
#[derive(Debug)]
pub struct LaunchPlan {
    pub app_dir: PathBuf,
    pub start_command: String,
    pub script: String,
    pub env: EnvChanges,
}

impl LaunchPlan {
    pub fn into_launcher(self) -> Launcher {
        Launcher::new(self.app_dir, self.script, self.start_command, self.env)
    }
}

/// Start command to run: the argument if non-empty, else the recorded one
pub fn resolve_start_command(argument: &str, info: &StagingInfo) -> LifecycleResult<String> {
    if !argument.is_empty() {
        return Ok(argument.to_string());
    }
    if !info.start_command.is_empty() {
        return Ok(info.start_command.clone());
    }
    Err(LifecycleError::NoStartCommand)
}

/// Read `staging_info.yml` beside the app directory, if present
pub fn read_staging_info(app_dir: &Path) -> LifecycleResult<StagingInfo> {
    let path = app_dir
        .parent()
        .unwrap_or(Path::new("/"))
        .join("staging_info.yml");
    if !path.is_file() {
        debug!("No staging info at {}", path.display());
        return Ok(StagingInfo::default());
    }
    StagingInfo::read(&path)
}

/// Resolve secrets, environment and script for a launch
pub async fn plan(
    config: &LauncherConfig,
    env: &EnvSnapshot,
    cancel: Option<watch::Receiver<()>>,
) -> LifecycleResult<LaunchPlan> {
    let app_dir = std::fs::canonicalize(&config.app_dir).map_err(|e| {
        LifecycleError::Usage(format!(
            "app directory {} is not accessible: {}",
            config.app_dir.display(),
            e
        ))
    })?;
    debug!("Launch metadata: {}", config.metadata);

    let info = read_staging_info(&app_dir)?;
    let start_command = resolve_start_command(&config.start_command, &info)?;

    let mut resolver = SecretResolver::new(config.credhub);
    if let Some(cancel) = cancel {
        resolver = resolver.with_cancel(cancel);
    }
    let services = resolve_services(&resolver, env).await?;

    let changes = EnvBuilder::new(&app_dir)
        .with_services(services)
        .build(env)?;
    let script = LaunchScript::new(&app_dir)
        .with_entrypoint_prefix(info.entrypoint_prefix().map(str::to_string))
        .render()?;

    Ok(LaunchPlan {
        app_dir,
        start_command,
        script,
        env: changes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CredhubOptions;
    use tempfile::TempDir;

    fn config(app_dir: &Path, start: &str) -> LauncherConfig {
        LauncherConfig {
            app_dir: app_dir.to_path_buf(),
            start_command: start.to_string(),
            metadata: "{}".to_string(),
            credhub: CredhubOptions::default(),
        }
    }

    #[test]
    fn argument_beats_staging_info() {
        let info = StagingInfo {
            start_command: "recorded".into(),
            ..StagingInfo::default()
        };
        assert_eq!(resolve_start_command("given", &info).unwrap(), "given");
        assert_eq!(resolve_start_command("", &info).unwrap(), "recorded");
        assert!(matches!(
            resolve_start_command("", &StagingInfo::default()),
            Err(LifecycleError::NoStartCommand)
        ));
    }

    #[tokio::test]
    async fn plan_uses_staging_info_and_prefix() {
        let temp = TempDir::new().unwrap();
        let app = temp.path().join("app");
        std::fs::create_dir_all(&app).unwrap();
        std::fs::write(
            temp.path().join("staging_info.yml"),
            r#"{"detected_buildpack":"Go","start_command":"./server","config":{"entrypoint_prefix":"dumb-init"}}"#,
        )
        .unwrap();

        let plan = plan(&config(&app, ""), &EnvSnapshot::new(), None)
            .await
            .unwrap();
        assert_eq!(plan.start_command, "./server");
        assert!(plan.script.ends_with("exec dumb-init \"$1\"\n"));
        assert_eq!(plan.env.set["HOME"], plan.app_dir.to_string_lossy());
    }

    #[tokio::test]
    async fn plan_without_any_command_fails() {
        let temp = TempDir::new().unwrap();
        let app = temp.path().join("app");
        std::fs::create_dir_all(&app).unwrap();

        let err = plan(&config(&app, ""), &EnvSnapshot::new(), None)
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }

    #[tokio::test]
    async fn missing_app_dir_is_usage_error() {
        let temp = TempDir::new().unwrap();
        let err = plan(
            &config(&temp.path().join("nope"), "run"),
            &EnvSnapshot::new(),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LifecycleError::Usage(_)));
    }
}
