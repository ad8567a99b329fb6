//! Release documents and Procfile overrides
//!
//! The release hook prints a YAML document. Only `default_process_types` is
//! read; every other field, including values carrying tags this crate does
//! not know, is ignored.

use crate::error::{LifecycleError, LifecycleResult};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Process name to start command
pub type ProcessTypes = BTreeMap<String, String>;

/// Name of the process type used as the droplet start command
pub const WEB_PROCESS: &str = "web";

/// Parsed release hook output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseInfo {
    pub default_process_types: ProcessTypes,
}

impl ReleaseInfo {
    /// Parse release hook stdout
    pub fn parse(document: &str) -> LifecycleResult<Self> {
        if document.trim().is_empty() {
            return Ok(Self::default());
        }

        let value: Value = serde_yaml::from_str(document)
            .map_err(|e| LifecycleError::ReleaseInvalid(e.to_string()))?;

        let default_process_types = match untag(&value) {
            Value::Null => ProcessTypes::new(),
            Value::Mapping(map) => match map.get("default_process_types") {
                Some(types) => process_types(types)
                    .map_err(|e| LifecycleError::ReleaseInvalid(format!("default_process_types: {}", e)))?,
                None => ProcessTypes::new(),
            },
            _ => {
                return Err(LifecycleError::ReleaseInvalid(
                    "expected a mapping at the top level".to_string(),
                ))
            }
        };

        Ok(Self {
            default_process_types,
        })
    }
}

fn untag(value: &Value) -> &Value {
    match value {
        Value::Tagged(tagged) => untag(&tagged.value),
        other => other,
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match untag(value) {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Read a `name: command` mapping, skipping null commands
fn process_types(value: &Value) -> Result<ProcessTypes, String> {
    let map = match untag(value) {
        Value::Null => return Ok(ProcessTypes::new()),
        Value::Mapping(map) => map,
        _ => return Err("expected a mapping of process name to command".to_string()),
    };

    let mut types = ProcessTypes::new();
    for (name, command) in map {
        let name = scalar_string(name).ok_or_else(|| "process name must be a scalar".to_string())?;
        if matches!(untag(command), Value::Null) {
            continue;
        }
        let command = scalar_string(command)
            .ok_or_else(|| format!("command for '{}' must be a scalar", name))?;
        types.insert(name, command);
    }
    Ok(types)
}

/// Read `Procfile` from the build directory, if present
pub fn read_procfile(build_dir: &Path) -> LifecycleResult<Option<ProcessTypes>> {
    let path = build_dir.join("Procfile");
    if !path.is_file() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(&path)
        .map_err(|e| LifecycleError::io(format!("reading {}", path.display()), e))?;
    if content.trim().is_empty() {
        return Ok(Some(ProcessTypes::new()));
    }
    let value: Value = serde_yaml::from_str(&content)
        .map_err(|e| LifecycleError::ReleaseInvalid(format!("Procfile: {}", e)))?;
    let types = process_types(&value)
        .map_err(|e| LifecycleError::ReleaseInvalid(format!("Procfile: {}", e)))?;

    debug!("Procfile defines {} process types", types.len());
    Ok(Some(types))
}

/// Final process types: a non-empty Procfile replaces the release defaults
pub fn merge_process_types(release: &ReleaseInfo, procfile: Option<ProcessTypes>) -> ProcessTypes {
    match procfile {
        Some(types) if !types.is_empty() => types,
        _ => release.default_process_types.clone(),
    }
}
