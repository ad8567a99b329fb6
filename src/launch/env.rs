//! Runtime environment assembly
//!
//! [`EnvBuilder::build`] is a pure function from an environment snapshot to
//! the set of changes the start command should see. Nothing here touches
//! the process environment.

use crate::error::{LifecycleError, LifecycleResult};
use crate::launch::database_uri::database_url;
use crate::launch::secrets::{ENV_PLATFORM_OPTIONS, ENV_SERVICES};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Snapshot of environment variables
pub type EnvSnapshot = BTreeMap<String, String>;

const ENV_APPLICATION: &str = "VCAP_APPLICATION";

/// Snapshot of this process's environment, skipping non-UTF-8 entries
pub fn process_env() -> EnvSnapshot {
    std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect()
}

/// Variables to set and unset for the child
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvChanges {
    pub set: BTreeMap<String, String>,
    pub unset: Vec<String>,
}

impl EnvChanges {
    /// Apply to a command about to be spawned or exec'd
    pub fn apply(&self, command: &mut std::process::Command) {
        for key in &self.unset {
            command.env_remove(key);
        }
        command.envs(&self.set);
    }

    /// Apply to a snapshot
    pub fn apply_to(&self, env: &mut EnvSnapshot) {
        for key in &self.unset {
            env.remove(key);
        }
        env.extend(self.set.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
}

/// Computes the launch environment for one application directory
pub struct EnvBuilder {
    app_dir: PathBuf,
    services: Option<String>,
}

impl EnvBuilder {
    /// `app_dir` must already be absolute
    pub fn new(app_dir: impl Into<PathBuf>) -> Self {
        Self {
            app_dir: app_dir.into(),
            services: None,
        }
    }

    /// Replacement service bindings produced by interpolation
    pub fn with_services(mut self, services: Option<String>) -> Self {
        self.services = services;
        self
    }

    pub fn build(&self, env: &EnvSnapshot) -> LifecycleResult<EnvChanges> {
        let mut changes = EnvChanges::default();
        let parent = self.app_dir.parent().unwrap_or(Path::new("/"));

        changes.set.insert("HOME".into(), path_string(&self.app_dir));
        changes.set.insert("TMPDIR".into(), path_string(&parent.join("tmp")));
        changes.set.insert("DEPS_DIR".into(), path_string(&parent.join("deps")));
        changes
            .set
            .insert(ENV_APPLICATION.into(), application_descriptor(env)?);

        if let Some(services) = &self.services {
            changes.set.insert(ENV_SERVICES.into(), services.clone());
        }

        let services = self
            .services
            .as_deref()
            .or_else(|| env.get(ENV_SERVICES).map(String::as_str));
        if let Some(url) = services.and_then(database_url) {
            changes.set.insert("DATABASE_URL".into(), url);
        }

        changes.unset.push(ENV_PLATFORM_OPTIONS.into());
        Ok(changes)
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// `VCAP_APPLICATION` extended with the instance's runtime fields
fn application_descriptor(env: &EnvSnapshot) -> LifecycleResult<String> {
    let raw = env
        .get(ENV_APPLICATION)
        .map(String::as_str)
        .filter(|s| !s.trim().is_empty())
        .unwrap_or("{}");

    let mut descriptor: Map<String, Value> = serde_json::from_str(raw)
        .map_err(|e| LifecycleError::EnvAssembly(format!("{}: {}", ENV_APPLICATION, e)))?;

    descriptor.insert("host".into(), Value::from("0.0.0.0"));
    descriptor.insert(
        "instance_id".into(),
        Value::from(env.get("INSTANCE_GUID").cloned().unwrap_or_default()),
    );
    if let Some(port) = env.get("PORT").and_then(|p| p.trim().parse::<i64>().ok()) {
        descriptor.insert("port".into(), Value::from(port));
    }
    if let Some(index) = env
        .get("INSTANCE_INDEX")
        .and_then(|i| i.trim().parse::<i64>().ok())
    {
        descriptor.insert("instance_index".into(), Value::from(index));
    }

    Ok(serde_json::to_string(&descriptor)?)
}
