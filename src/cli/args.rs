//! CLI argument definitions using clap derive

use crate::config::credhub::{parse_attempts, parse_duration, DEFAULT_CONNECT_ATTEMPTS};
use crate::config::{BuilderConfig, CredhubOptions, LauncherConfig};
use clap::{ArgAction, Args, Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging flags shared by both binaries
#[derive(Args, Debug, Clone)]
pub struct LogArgs {
    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Log line format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, env = "LIFECYCLE_LOG_FORMAT")]
    pub log_format: LogFormat,
}

/// Secret store client flags shared by both binaries
///
/// The environment names carry no binary prefix so one setting serves both.
#[derive(Args, Debug, Clone)]
pub struct CredhubArgs {
    /// Attempts against the secret store before giving up
    #[arg(
        long,
        default_value_t = DEFAULT_CONNECT_ATTEMPTS,
        value_parser = parse_attempts,
        env = "CREDHUB_CONNECT_ATTEMPTS"
    )]
    pub credhub_connect_attempts: u32,

    /// Delay between secret store attempts (e.g. 500ms, 1s, 2m)
    #[arg(
        long,
        default_value = "1s",
        value_parser = parse_duration,
        env = "CREDHUB_RETRY_DELAY"
    )]
    pub credhub_retry_delay: Duration,
}

impl From<CredhubArgs> for CredhubOptions {
    fn from(args: CredhubArgs) -> Self {
        Self {
            connect_attempts: args.credhub_connect_attempts,
            retry_delay: args.credhub_retry_delay,
        }
    }
}

/// Stage an application into a droplet with buildpacks
#[derive(Parser, Debug)]
#[command(name = "builder")]
#[command(author, version, about, long_about = None)]
pub struct BuilderArgs {
    /// Directory containing the application source
    #[arg(long, default_value = "/tmp/app", env = "BUILDER_BUILD_DIR")]
    pub build_dir: PathBuf,

    /// Directory containing system buildpacks
    #[arg(long, default_value = "/tmp/buildpacks", env = "BUILDER_BUILDPACKS_DIR")]
    pub buildpacks_dir: PathBuf,

    /// Directory remote buildpacks are downloaded into
    #[arg(
        long,
        default_value = "/tmp/buildpackdownloads",
        env = "BUILDER_BUILDPACK_DOWNLOADS_DIR"
    )]
    pub buildpack_downloads_dir: PathBuf,

    /// Build artifacts cache, read at start and archived at the end
    #[arg(
        long,
        default_value = "/tmp/cache",
        env = "BUILDER_BUILD_ARTIFACTS_CACHE_DIR"
    )]
    pub build_artifacts_cache_dir: PathBuf,

    /// Where to write the droplet tarball
    #[arg(long, default_value = "/tmp/droplet", env = "BUILDER_OUTPUT_DROPLET")]
    pub output_droplet: PathBuf,

    /// Where to write the build artifacts cache tarball
    #[arg(
        long,
        default_value = "/tmp/output-cache",
        env = "BUILDER_OUTPUT_BUILD_ARTIFACTS_CACHE"
    )]
    pub output_build_artifacts_cache: PathBuf,

    /// Where to write the staging result
    #[arg(long, default_value = "/tmp/result.json", env = "BUILDER_OUTPUT_METADATA")]
    pub output_metadata: PathBuf,

    /// Comma-separated buildpack names or URLs, in priority order
    #[arg(long, value_delimiter = ',', env = "BUILDER_BUILDPACK_ORDER")]
    pub buildpack_order: Vec<String>,

    /// Run every buildpack's supply and the last one's finalize or compile
    #[arg(long, env = "BUILDER_SKIP_DETECT")]
    pub skip_detect: bool,

    /// Skip TLS verification when fetching buildpacks
    #[arg(long, env = "BUILDER_SKIP_CERT_VERIFY")]
    pub skip_cert_verify: bool,

    /// Use the cache root (or primary/) for compile instead of final/
    #[arg(long, env = "BUILDER_LEGACY_CACHE_LAYOUT")]
    pub legacy_cache_layout: bool,

    #[command(flatten)]
    pub credhub: CredhubArgs,

    #[command(flatten)]
    pub log: LogArgs,
}

impl BuilderArgs {
    pub fn into_config(self) -> (BuilderConfig, LogArgs) {
        let config = BuilderConfig {
            build_dir: self.build_dir,
            buildpacks_dir: self.buildpacks_dir,
            buildpack_downloads_dir: self.buildpack_downloads_dir,
            build_artifacts_cache_dir: self.build_artifacts_cache_dir,
            output_droplet: self.output_droplet,
            output_build_artifacts_cache: self.output_build_artifacts_cache,
            output_metadata: self.output_metadata,
            buildpack_order: self
                .buildpack_order
                .into_iter()
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .collect(),
            skip_detect: self.skip_detect,
            skip_cert_verify: self.skip_cert_verify,
            legacy_cache_layout: self.legacy_cache_layout,
            credhub: self.credhub.into(),
        };
        (config, self.log)
    }
}

/// Run a staged droplet's start command
#[derive(Parser, Debug)]
#[command(name = "launcher")]
#[command(author, version, about, long_about = None)]
pub struct LauncherArgs {
    /// Application directory inside the droplet
    pub app_dir: PathBuf,

    /// Start command; empty to use the one recorded at staging
    #[arg(allow_hyphen_values = true)]
    pub start_command: String,

    /// Launch metadata (accepted for compatibility, unused)
    #[arg(allow_hyphen_values = true)]
    pub metadata: String,

    #[command(flatten)]
    pub credhub: CredhubArgs,

    #[command(flatten)]
    pub log: LogArgs,
}

impl LauncherArgs {
    pub fn into_config(self) -> (LauncherConfig, LogArgs) {
        let config = LauncherConfig {
            app_dir: self.app_dir,
            start_command: self.start_command,
            metadata: self.metadata,
            credhub: self.credhub.into(),
        };
        (config, self.log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn builder_defaults() {
        let args = BuilderArgs::try_parse_from(["builder", "--buildpack-order", "a,b"]).unwrap();
        let (config, log) = args.into_config();
        assert_eq!(config.build_dir, PathBuf::from("/tmp/app"));
        assert_eq!(config.output_metadata, PathBuf::from("/tmp/result.json"));
        assert_eq!(config.buildpack_order, vec!["a", "b"]);
        assert_eq!(config.credhub, CredhubOptions::default());
        assert!(!config.skip_detect);
        assert_eq!(log.verbose, 0);
    }

    #[test]
    fn builder_flags() {
        let args = BuilderArgs::try_parse_from([
            "builder",
            "--build-dir",
            "/stage/app",
            "--buildpack-order",
            "https://example.com/bp.zip,ruby",
            "--skip-detect",
            "--credhub-connect-attempts",
            "5",
            "--credhub-retry-delay",
            "250ms",
            "-vv",
        ])
        .unwrap();
        let (config, log) = args.into_config();
        assert_eq!(config.build_dir, PathBuf::from("/stage/app"));
        assert_eq!(config.buildpack_order.len(), 2);
        assert!(config.skip_detect);
        assert_eq!(config.credhub.connect_attempts, 5);
        assert_eq!(config.credhub.retry_delay, Duration::from_millis(250));
        assert_eq!(log.verbose, 2);
    }

    #[test]
    fn builder_rejects_zero_attempts() {
        assert!(BuilderArgs::try_parse_from([
            "builder",
            "--credhub-connect-attempts",
            "0"
        ])
        .is_err());
    }

    #[test]
    fn launcher_positionals() {
        let args = LauncherArgs::try_parse_from(["launcher", "/home/vcap/app", "", "{}"]).unwrap();
        let (config, _) = args.into_config();
        assert_eq!(config.app_dir, PathBuf::from("/home/vcap/app"));
        assert_eq!(config.start_command, "");
        assert_eq!(config.metadata, "{}");
    }

    #[test]
    #[serial]
    fn launcher_reads_unprefixed_credhub_env() {
        std::env::set_var("CREDHUB_CONNECT_ATTEMPTS", "7");
        std::env::set_var("CREDHUB_RETRY_DELAY", "2s");
        let parsed = LauncherArgs::try_parse_from(["launcher", "/app", "run", "{}"]);
        std::env::remove_var("CREDHUB_CONNECT_ATTEMPTS");
        std::env::remove_var("CREDHUB_RETRY_DELAY");

        let (config, _) = parsed.unwrap().into_config();
        assert_eq!(config.credhub.connect_attempts, 7);
        assert_eq!(config.credhub.retry_delay, Duration::from_secs(2));
    }

    #[test]
    fn launcher_requires_three_positionals() {
        assert!(LauncherArgs::try_parse_from(["launcher", "/app", "run"]).is_err());
    }
}
