//! CLI command implementations

pub mod build;
pub mod launch;

pub use build::execute as build;
pub use launch::execute as launch;
