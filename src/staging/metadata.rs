//! Documents written beside the droplet
//!
//! `staging_info.yml` travels inside the droplet and is read back by the
//! launcher. The staging result is handed to the platform.

use crate::error::{LifecycleError, LifecycleResult};
use crate::staging::release::{ProcessTypes, WEB_PROCESS};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::path::Path;

/// Value of `lifecycle_type` in every staging result
pub const LIFECYCLE_TYPE: &str = "buildpack";

/// Optional launch-time settings carried in staging info
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint_prefix: Option<String>,
}

/// Contents of `staging_info.yml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingInfo {
    pub detected_buildpack: String,
    pub start_command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<StagingConfig>,
}

impl StagingInfo {
    /// Staging info for a finished run
    pub fn new(detected_buildpack: &str, process_types: &ProcessTypes) -> Self {
        Self {
            detected_buildpack: detected_buildpack.to_string(),
            start_command: process_types.get(WEB_PROCESS).cloned().unwrap_or_default(),
            config: None,
        }
    }

    /// Entrypoint prefix, if one was recorded
    pub fn entrypoint_prefix(&self) -> Option<&str> {
        self.config
            .as_ref()
            .and_then(|c| c.entrypoint_prefix.as_deref())
            .filter(|p| !p.is_empty())
    }

    /// Serialize as JSON, which every YAML reader accepts
    pub fn to_document(&self) -> LifecycleResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse staging info, tolerating anything odd outside the essential fields
    ///
    /// Fields of the wrong type or carrying unknown tags are treated as
    /// absent. Only a document that is not YAML at all is an error.
    pub fn parse_lenient(document: &str, path: &Path) -> LifecycleResult<Self> {
        if document.trim().is_empty() {
            return Ok(Self::default());
        }

        let value: Value = serde_yaml::from_str(document).map_err(|e| LifecycleError::StagingInfo {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let text = |v: Option<&Value>| -> Option<String> {
            match v.map(untag) {
                Some(Value::String(s)) => Some(s.clone()),
                _ => None,
            }
        };

        let root = untag(&value);
        let entrypoint_prefix = text(
            root.get("config")
                .map(untag)
                .and_then(|c| c.get("entrypoint_prefix")),
        );

        Ok(Self {
            detected_buildpack: text(root.get("detected_buildpack")).unwrap_or_default(),
            start_command: text(root.get("start_command")).unwrap_or_default(),
            config: entrypoint_prefix.map(|p| StagingConfig {
                entrypoint_prefix: Some(p),
            }),
        })
    }

    /// Read and parse a staging info file
    pub fn read(path: &Path) -> LifecycleResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| LifecycleError::StagingInfo {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::parse_lenient(&content, path)
    }
}

fn untag(value: &Value) -> &Value {
    match value {
        Value::Tagged(tagged) => untag(&tagged.value),
        other => other,
    }
}

/// Buildpack identity recorded in the staging result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleMetadata {
    pub detected_buildpack: String,
    pub buildpack_key: String,
}

/// Contents of the output metadata document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingResult {
    pub process_types: ProcessTypes,
    pub lifecycle_type: String,
    pub lifecycle_metadata: LifecycleMetadata,
    pub execution_metadata: String,
}

impl StagingResult {
    pub fn new(process_types: ProcessTypes, detected_buildpack: &str, buildpack_key: &str) -> Self {
        Self {
            process_types,
            lifecycle_type: LIFECYCLE_TYPE.to_string(),
            lifecycle_metadata: LifecycleMetadata {
                detected_buildpack: detected_buildpack.to_string(),
                buildpack_key: buildpack_key.to_string(),
            },
            execution_metadata: String::new(),
        }
    }
}
