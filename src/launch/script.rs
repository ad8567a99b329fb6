//! Start script generation and process hand-off

use crate::error::{LifecycleError, LifecycleResult};
use crate::launch::env::EnvChanges;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Shell the start script runs under
pub const SHELL: &str = "bash";

/// `$0` of the start script
const SCRIPT_NAME: &str = "launcher";

/// Escape a string for use inside single quotes
pub fn shell_escape(s: &str) -> String {
    s.replace('\'', "'\\''")
}

fn quoted(path: &Path) -> String {
    format!("'{}'", shell_escape(&path.to_string_lossy()))
}

/// Regular files directly inside `dir`, in bytewise name order
///
/// A missing directory yields nothing.
pub fn profile_scripts(dir: &Path) -> LifecycleResult<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(LifecycleError::io(format!("reading {}", dir.display()), e)),
    };

    let mut scripts: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    scripts.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(scripts)
}

/// Shell fragment that sources profiles and execs `$1`
#[derive(Debug, Clone)]
pub struct LaunchScript {
    app_dir: PathBuf,
    entrypoint_prefix: Option<String>,
}

impl LaunchScript {
    pub fn new(app_dir: impl Into<PathBuf>) -> Self {
        Self {
            app_dir: app_dir.into(),
            entrypoint_prefix: None,
        }
    }

    /// Run the start command as the sole argument of `prefix` instead of `bash -c`
    ///
    /// The prefix is inserted verbatim so it may carry its own arguments.
    pub fn with_entrypoint_prefix(mut self, prefix: Option<String>) -> Self {
        self.entrypoint_prefix = prefix.filter(|p| !p.trim().is_empty());
        self
    }

    pub fn render(&self) -> LifecycleResult<String> {
        let mut script = String::new();
        script.push_str(&format!("cd {} || exit 1\n", quoted(&self.app_dir)));
        script.push_str("echo \"Invoking pre-start scripts.\"\n");

        let parent = self.app_dir.parent().unwrap_or(Path::new("/"));
        let mut scripts = profile_scripts(&parent.join("profile.d"))?;
        scripts.extend(profile_scripts(&self.app_dir.join(".profile.d"))?);
        for path in &scripts {
            script.push_str(&format!("source {}\n", quoted(path)));
        }

        script.push_str("if [ -f ./.profile ]; then\n  source ./.profile\nfi\n");
        script.push_str("echo \"Invoking start command.\"\n");

        match &self.entrypoint_prefix {
            Some(prefix) => script.push_str(&format!("exec {} \"$1\"\n", prefix)),
            None => script.push_str(&format!("exec {} -c \"$1\"\n", SHELL)),
        }
        Ok(script)
    }
}

/// Hands the process over to the start script
pub struct Launcher {
    app_dir: PathBuf,
    script: String,
    start_command: String,
    env: EnvChanges,
}

impl Launcher {
    pub fn new(
        app_dir: impl Into<PathBuf>,
        script: String,
        start_command: impl Into<String>,
        env: EnvChanges,
    ) -> Self {
        Self {
            app_dir: app_dir.into(),
            script,
            start_command: start_command.into(),
            env,
        }
    }

    /// Command that runs the start script
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(SHELL);
        cmd.arg("-c")
            .arg(&self.script)
            .arg(SCRIPT_NAME)
            .arg(&self.start_command)
            .current_dir(&self.app_dir);
        self.env.apply(&mut cmd);
        cmd
    }

    /// Replace this process with the start script
    ///
    /// Only returns on failure. Where exec is unavailable the script runs as
    /// a child and its exit code is returned instead.
    #[cfg(unix)]
    pub fn hand_off(self) -> LifecycleResult<u8> {
        use std::os::unix::process::CommandExt;

        debug!("Exec {} for {}", SHELL, self.start_command);
        let err = self.command().exec();
        Err(LifecycleError::Exec {
            command: self.start_command,
            source: err,
        })
    }

    #[cfg(not(unix))]
    pub fn hand_off(self) -> LifecycleResult<u8> {
        debug!("Spawning {} for {}", SHELL, self.start_command);
        let status = self
            .command()
            .status()
            .map_err(|source| LifecycleError::Exec {
                command: self.start_command.clone(),
                source,
            })?;
        Ok(status
            .code()
            .and_then(|c| u8::try_from(c).ok())
            .unwrap_or(crate::error::EXIT_UNEXPECTED))
    }
}
