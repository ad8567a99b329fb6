//! Buildpack lifecycle - staging and launch for buildpack applications
//!
//! The `builder` binary turns an application directory into a droplet by
//! running buildpack hooks. The `launcher` binary prepares a droplet's
//! runtime environment and execs its start command.

pub mod buildpack;
pub mod cli;
pub mod config;
pub mod error;
pub mod launch;
pub mod staging;

pub use error::{LifecycleError, LifecycleResult};
