//! Error types for the buildpack lifecycle
//!
//! All modules use `LifecycleResult<T>` as their return type. Each variant
//! belongs to one failure class of the staging or launch pipeline, and
//! [`LifecycleError::exit_code`] maps that class onto the process exit code
//! the platform expects.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for lifecycle operations
pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Exit code for argument and validation failures
pub const EXIT_USAGE: u8 = 1;
/// Exit code for failures that fit no other class
pub const EXIT_UNEXPECTED: u8 = 2;
/// Exit code for environment assembly failures
pub const EXIT_ENV_ASSEMBLY: u8 = 3;
/// Exit code when the launcher cannot exec the start command
pub const EXIT_EXEC: u8 = 4;
/// Exit code when no buildpack detected the application
pub const EXIT_DETECT_FAILED: u8 = 222;
/// Exit code when compile (or finalize) failed
pub const EXIT_COMPILE_FAILED: u8 = 223;
/// Exit code when release failed or produced unreadable output
pub const EXIT_RELEASE_FAILED: u8 = 224;
/// Exit code when every supply buildpack failed
pub const EXIT_SUPPLY_FAILED: u8 = 225;

/// All errors that can occur while staging or launching a droplet
#[derive(Error, Debug)]
pub enum LifecycleError {
    // Invocation errors
    #[error("Invalid configuration: {option}: {reason}")]
    Config { option: String, reason: String },

    #[error("{0}")]
    Usage(String),

    // Buildpack acquisition
    #[error("Failed to acquire buildpack {reference}: {cause}")]
    Acquire { reference: String, cause: String },

    #[error("Buildpack {reference} has no bin/ directory")]
    MalformedLayout { reference: String },

    // Pipeline steps
    #[error("None of the buildpacks detected a compatible application")]
    DetectFailed,

    #[error("Failed to run all supply scripts")]
    SupplyFailed,

    #[error("Failed to {step}: {reason}")]
    CompileFailed { step: String, reason: String },

    #[error("Failed to run release: {0}")]
    ReleaseFailed(String),

    #[error("Buildpack release output invalid: {0}")]
    ReleaseInvalid(String),

    #[error("Failed to assemble droplet: {context}")]
    Assemble {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Secret store
    #[error("Unable to configure secret store client: {0}")]
    ClientConfig(String),

    #[error("Unable to interpolate secret store references: {0}")]
    Interpolation(String),

    // Launch
    #[error("Invalid environment: {0}")]
    EnvAssembly(String),

    #[error("Invalid staging info {path}: {reason}")]
    StagingInfo { path: PathBuf, reason: String },

    #[error("no start command specified or detected in droplet")]
    NoStartCommand,

    #[error("Failed to exec {command}")]
    Exec {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LifecycleError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a droplet or cache archival error
    pub fn assemble(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Assemble {
            context: context.into(),
            source,
        }
    }

    /// Create a configuration error for a named option
    pub fn config(option: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            option: option.into(),
            reason: reason.into(),
        }
    }

    /// Create a buildpack acquisition error
    pub fn acquire(reference: impl Into<String>, cause: impl ToString) -> Self {
        Self::Acquire {
            reference: reference.into(),
            cause: cause.to_string(),
        }
    }

    /// Create a compile or finalize failure
    pub fn compile_failed(step: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CompileFailed {
            step: step.into(),
            reason: reason.into(),
        }
    }

    /// Process exit code for this error class
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config { .. } | Self::Usage(_) => EXIT_USAGE,
            Self::StagingInfo { .. } | Self::NoStartCommand => EXIT_USAGE,
            Self::DetectFailed => EXIT_DETECT_FAILED,
            Self::SupplyFailed => EXIT_SUPPLY_FAILED,
            Self::CompileFailed { .. } | Self::MalformedLayout { .. } => EXIT_COMPILE_FAILED,
            Self::ReleaseFailed(_) | Self::ReleaseInvalid(_) => EXIT_RELEASE_FAILED,
            Self::ClientConfig(_) | Self::Interpolation(_) | Self::EnvAssembly(_) => {
                EXIT_ENV_ASSEMBLY
            }
            Self::Exec { .. } => EXIT_EXEC,
            _ => EXIT_UNEXPECTED,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::DetectFailed => {
                Some("Check that one of the buildpacks in --buildpack-order supports this app")
            }
            Self::MalformedLayout { .. } => {
                Some("A buildpack must contain bin/detect, optionally nested one directory deep")
            }
            Self::ClientConfig(_) => {
                Some("Set CF_INSTANCE_CERT, CF_INSTANCE_KEY and CF_SYSTEM_CERT_PATH")
            }
            Self::NoStartCommand => Some("Pass a start command or add a web process to the Procfile"),
            _ => None,
        }
    }
}
