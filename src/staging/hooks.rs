//! Running buildpack hook executables
//!
//! Hooks run one at a time. stderr is always inherited; stdout is captured
//! only for hooks whose protocol defines output (detect, release).

use crate::buildpack::{BuildpackLayout, Hook};
use crate::error::{LifecycleError, LifecycleResult};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;
use tracing::debug;

/// Result of a hook whose stdout was captured
#[derive(Debug)]
pub struct HookOutput {
    pub status: ExitStatus,
    pub stdout: String,
}

/// Spawns hooks with a fixed set of environment overrides
#[derive(Debug, Clone, Default)]
pub struct HookRunner {
    env: BTreeMap<String, String>,
    env_remove: Vec<String>,
}

impl HookRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable in every hook's environment
    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.env_remove.retain(|k| k != &key);
        self.env.insert(key, value.into());
    }

    /// Remove a variable from every hook's environment
    pub fn remove_env(&mut self, key: impl Into<String>) {
        let key = key.into();
        self.env.remove(&key);
        if !self.env_remove.contains(&key) {
            self.env_remove.push(key);
        }
    }

    fn command(&self, layout: &BuildpackLayout, hook: Hook, args: &[OsString]) -> Command {
        let mut cmd = Command::new(layout.hook_path(hook));
        cmd.args(args)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        for key in &self.env_remove {
            cmd.env_remove(key);
        }
        cmd
    }

    fn describe(layout: &BuildpackLayout, hook: Hook) -> String {
        layout.hook_path(hook).display().to_string()
    }

    /// Run a hook with stdout captured
    pub async fn capture(
        &self,
        layout: &BuildpackLayout,
        hook: Hook,
        args: &[OsString],
    ) -> LifecycleResult<HookOutput> {
        debug!("Executing {} {:?}", Self::describe(layout, hook), args);

        let output = self
            .command(layout, hook, args)
            .stdout(Stdio::piped())
            .output()
            .await
            .map_err(|e| LifecycleError::command_failed(Self::describe(layout, hook), e))?;

        Ok(HookOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }

    /// Run a hook with stdout forwarded
    pub async fn run(
        &self,
        layout: &BuildpackLayout,
        hook: Hook,
        args: &[OsString],
    ) -> LifecycleResult<ExitStatus> {
        debug!("Executing {} {:?}", Self::describe(layout, hook), args);

        self.command(layout, hook, args)
            .stdout(Stdio::inherit())
            .status()
            .await
            .map_err(|e| LifecycleError::command_failed(Self::describe(layout, hook), e))
    }
}
