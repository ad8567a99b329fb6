//! Buildpack acquisition and on-disk layout
//!
//! System buildpacks are already unpacked under the buildpacks root. URL
//! buildpacks are downloaded (zip) or cloned (git) into the downloads root
//! at the start of every run.

pub mod layout;
pub mod source;
pub mod store;

pub use layout::{BuildpackLayout, Hook};
pub use source::{extract_zip, BuildpackSource, GitSource, ZipSource};
pub use store::BuildpackStore;
