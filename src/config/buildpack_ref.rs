//! Buildpack references and their on-disk keys
//!
//! A reference is either a system buildpack name or an absolute URL. Both
//! map to a directory name through a pure hash of the reference text, so
//! the same reference always lands in the same directory.

use md5::{Digest, Md5};
use siphasher::sip::SipHasher13;
use std::fmt;
use std::hash::Hasher;
use url::Url;

/// How a remote buildpack is fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteKind {
    /// URL path ends in `.zip`
    Zip,
    /// Anything else is treated as a git repository
    Git { branch: Option<String> },
}

/// A buildpack identifier as supplied by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildpackRef {
    /// Opaque name of a buildpack already present on disk
    System(String),
    /// Absolute URL to download or clone
    Remote { url: Url, kind: RemoteKind },
}

impl BuildpackRef {
    /// Classify a raw reference string
    pub fn parse(raw: &str) -> Self {
        match Url::parse(raw) {
            Ok(url) if url.has_host() || url.scheme() == "file" => {
                let kind = if url.path().ends_with(".zip") {
                    RemoteKind::Zip
                } else {
                    RemoteKind::Git {
                        branch: url.fragment().filter(|f| !f.is_empty()).map(str::to_string),
                    }
                };
                Self::Remote { url, kind }
            }
            _ => Self::System(raw.to_string()),
        }
    }

    /// Whether this reference must be fetched before use
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }
}

impl fmt::Display for BuildpackRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System(name) => write!(f, "{}", name),
            Self::Remote { url, .. } => write!(f, "{}", url),
        }
    }
}

/// 64-bit directory key: SipHash-1-3 with zero keys, 16 hex digits
pub fn buildpack_key(reference: &str) -> String {
    let mut hasher = SipHasher13::new();
    hasher.write(reference.as_bytes());
    format!("{:016x}", hasher.finish())
}

/// Legacy 128-bit directory key (hex MD5), kept for caches written by older builders
pub fn legacy_buildpack_key(reference: &str) -> String {
    hex::encode(Md5::digest(reference.as_bytes()))
}
