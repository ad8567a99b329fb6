//! Invocation parameters for the builder and launcher
//!
//! The CLI layer converts parsed flags into these plain values; nothing past
//! `cli/` depends on clap.

pub mod buildpack_ref;
pub mod credhub;

pub use buildpack_ref::{buildpack_key, legacy_buildpack_key, BuildpackRef, RemoteKind};
pub use credhub::CredhubOptions;

use crate::error::{LifecycleError, LifecycleResult};
use std::path::{Path, PathBuf};

/// Staging parameters
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    /// Raw application directory
    pub build_dir: PathBuf,
    /// Root holding already-present system buildpacks
    pub buildpacks_dir: PathBuf,
    /// Root holding runtime-downloaded buildpacks
    pub buildpack_downloads_dir: PathBuf,
    /// Persistent cache root, both input and output
    pub build_artifacts_cache_dir: PathBuf,
    /// Where the droplet tarball is written
    pub output_droplet: PathBuf,
    /// Where the cache tarball is written
    pub output_build_artifacts_cache: PathBuf,
    /// Where the staging result document is written
    pub output_metadata: PathBuf,
    /// Ordered buildpack references
    pub buildpack_order: Vec<String>,
    /// Run every buildpack as supply and the last as final
    pub skip_detect: bool,
    /// Disable TLS verification for buildpack downloads and clones
    pub skip_cert_verify: bool,
    /// Route the compile cache to the pre-`final/` locations
    pub legacy_cache_layout: bool,
    /// Secret store retry policy
    pub credhub: CredhubOptions,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            build_dir: PathBuf::from("/tmp/app"),
            buildpacks_dir: PathBuf::from("/tmp/buildpacks"),
            buildpack_downloads_dir: PathBuf::from("/tmp/buildpackdownloads"),
            build_artifacts_cache_dir: PathBuf::from("/tmp/cache"),
            output_droplet: PathBuf::from("/tmp/droplet"),
            output_build_artifacts_cache: PathBuf::from("/tmp/output-cache"),
            output_metadata: PathBuf::from("/tmp/result.json"),
            buildpack_order: Vec::new(),
            skip_detect: false,
            skip_cert_verify: false,
            legacy_cache_layout: false,
            credhub: CredhubOptions::default(),
        }
    }
}

impl BuilderConfig {
    /// Fail if any required option is empty
    pub fn validate(&self) -> LifecycleResult<()> {
        let required: [(&str, &Path); 7] = [
            ("build-dir", &self.build_dir),
            ("buildpacks-dir", &self.buildpacks_dir),
            ("buildpack-downloads-dir", &self.buildpack_downloads_dir),
            ("build-artifacts-cache-dir", &self.build_artifacts_cache_dir),
            ("output-droplet", &self.output_droplet),
            ("output-build-artifacts-cache", &self.output_build_artifacts_cache),
            ("output-metadata", &self.output_metadata),
        ];

        for (option, path) in required {
            if path.as_os_str().is_empty() {
                return Err(LifecycleError::config(option, "must not be empty"));
            }
        }

        if self.buildpack_order.is_empty() {
            return Err(LifecycleError::config(
                "buildpack-order",
                "at least one buildpack is required",
            ));
        }

        if let Some(pos) = self.buildpack_order.iter().position(|r| r.trim().is_empty()) {
            return Err(LifecycleError::config(
                "buildpack-order",
                format!("entry {} is empty", pos),
            ));
        }

        if self.credhub.connect_attempts == 0 {
            return Err(LifecycleError::config(
                "credhub-connect-attempts",
                "must be at least 1",
            ));
        }

        Ok(())
    }

    /// Directory for a buildpack reference
    ///
    /// System names live under `buildpacks-dir`, URLs under
    /// `buildpack-downloads-dir`; the leaf is the 64-bit key.
    pub fn buildpack_path(&self, reference: &str) -> PathBuf {
        self.buildpack_root(reference).join(buildpack_key(reference))
    }

    /// Directory for a buildpack reference under the legacy MD5 naming
    pub fn legacy_buildpack_path(&self, reference: &str) -> PathBuf {
        self.buildpack_root(reference)
            .join(legacy_buildpack_key(reference))
    }

    fn buildpack_root(&self, reference: &str) -> &Path {
        if BuildpackRef::parse(reference).is_remote() {
            &self.buildpack_downloads_dir
        } else {
            &self.buildpacks_dir
        }
    }

    /// Zero-padded positional indices, one per buildpack in the order
    pub fn deps_indices(&self) -> Vec<String> {
        deps_indices(self.buildpack_order.len())
    }

    /// Index for the buildpack at `position`
    pub fn deps_index(&self, position: usize) -> String {
        let width = index_width(self.buildpack_order.len());
        format!("{:0width$}", position, width = width)
    }

    /// Every buildpack but the last
    pub fn supply_buildpacks(&self) -> &[String] {
        match self.buildpack_order.split_last() {
            Some((_, rest)) => rest,
            None => &[],
        }
    }

    /// The last buildpack in the order
    pub fn final_buildpack(&self) -> Option<&str> {
        self.buildpack_order.last().map(String::as_str)
    }

    /// Whether more than one buildpack participates
    pub fn is_multi_buildpack(&self) -> bool {
        self.buildpack_order.len() > 1
    }
}

/// Zero-padded decimal indices `0..n`, padded to the digit count of `n`
pub fn deps_indices(n: usize) -> Vec<String> {
    let width = index_width(n);
    (0..n).map(|i| format!("{:0width$}", i, width = width)).collect()
}

fn index_width(n: usize) -> usize {
    n.max(1).to_string().len()
}

/// Launch parameters
#[derive(Debug, Clone)]
pub struct LauncherConfig {
    /// Application directory inside the droplet
    pub app_dir: PathBuf,
    /// Start command, empty to fall back to staging info
    pub start_command: String,
    /// Opaque metadata argument, accepted for compatibility
    pub metadata: String,
    /// Secret store retry policy
    pub credhub: CredhubOptions,
}
