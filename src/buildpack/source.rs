//! Remote buildpack sources: zip downloads and git clones

use crate::error::{LifecycleError, LifecycleResult};
use async_trait::async_trait;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, info, warn};
use url::Url;
use zip::ZipArchive;

/// Upper bound on a single buildpack download
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Fetches a remote buildpack into an empty destination directory
#[async_trait]
pub trait BuildpackSource: Send + Sync {
    /// Populate `dest` from `url`
    async fn fetch(&self, url: &Url, dest: &Path) -> LifecycleResult<()>;

    /// Human-readable source name for logs
    fn source_name(&self) -> &'static str;
}

/// Downloads a zip archive over HTTP(S) and extracts it
pub struct ZipSource {
    skip_cert_verify: bool,
    timeout: Duration,
}

impl ZipSource {
    pub fn new(skip_cert_verify: bool) -> Self {
        Self {
            skip_cert_verify,
            timeout: DOWNLOAD_TIMEOUT,
        }
    }

    fn agent(&self) -> ureq::Agent {
        let tls = ureq::tls::TlsConfig::builder()
            .disable_verification(self.skip_cert_verify)
            .build();
        ureq::Agent::config_builder()
            .timeout_global(Some(self.timeout))
            .tls_config(tls)
            .build()
            .into()
    }

    fn download_blocking(agent: ureq::Agent, url: Url, dest: PathBuf) -> LifecycleResult<u64> {
        let scratch_dir = dest.parent().unwrap_or(Path::new("."));
        let mut archive = NamedTempFile::new_in(scratch_dir)
            .map_err(|e| LifecycleError::io("creating download temp file", e))?;

        let mut response = agent
            .get(url.as_str())
            .call()
            .map_err(|e| LifecycleError::acquire(url.as_str(), e))?;

        let downloaded = io::copy(&mut response.body_mut().as_reader(), &mut archive)
            .map_err(|e| LifecycleError::acquire(url.as_str(), e))?;
        archive
            .flush()
            .map_err(|e| LifecycleError::io("flushing download temp file", e))?;
        debug!("Downloaded {} bytes from {}", downloaded, url);

        extract_zip(archive.path(), &dest).map_err(|e| LifecycleError::acquire(url.as_str(), e))
    }
}

#[async_trait]
impl BuildpackSource for ZipSource {
    async fn fetch(&self, url: &Url, dest: &Path) -> LifecycleResult<()> {
        let agent = self.agent();
        let url_owned = url.clone();
        let dest_owned = dest.to_path_buf();

        let extracted = tokio::task::spawn_blocking(move || {
            Self::download_blocking(agent, url_owned, dest_owned)
        })
        .await
        .map_err(|e| LifecycleError::Internal(format!("download task failed: {}", e)))??;

        info!("Downloaded buildpack {} ({} bytes extracted)", url, extracted);
        Ok(())
    }

    fn source_name(&self) -> &'static str {
        "zip"
    }
}

/// Extract a zip file into `dest`, returning the number of bytes written
///
/// Entries escaping `dest` are skipped. Unix modes stored in the archive are
/// restored so hook scripts stay executable.
pub fn extract_zip(archive: &Path, dest: &Path) -> LifecycleResult<u64> {
    let file = File::open(archive)
        .map_err(|e| LifecycleError::io(format!("opening {}", archive.display()), e))?;
    let mut zip = ZipArchive::new(file)
        .map_err(|e| LifecycleError::Internal(format!("invalid zip archive: {}", e)))?;
    fs::create_dir_all(dest)
        .map_err(|e| LifecycleError::io(format!("creating {}", dest.display()), e))?;

    let mut total = 0u64;
    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .map_err(|e| LifecycleError::Internal(format!("reading zip entry {}: {}", i, e)))?;

        let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
            warn!("Skipping zip entry with unsafe path: {}", entry.name());
            continue;
        };
        let out = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out)
                .map_err(|e| LifecycleError::io(format!("creating {}", out.display()), e))?;
        } else {
            if let Some(parent) = out.parent() {
                fs::create_dir_all(parent).map_err(|e| {
                    LifecycleError::io(format!("creating {}", parent.display()), e)
                })?;
            }
            let mut target = File::create(&out)
                .map_err(|e| LifecycleError::io(format!("creating {}", out.display()), e))?;
            total += io::copy(&mut entry, &mut target)
                .map_err(|e| LifecycleError::io(format!("writing {}", out.display()), e))?;
        }

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&out, fs::Permissions::from_mode(mode & 0o7777))
                .map_err(|e| LifecycleError::io(format!("setting mode on {}", out.display()), e))?;
        }
    }

    Ok(total)
}

/// Clones a git repository, honouring a `#branch` URL fragment
pub struct GitSource {
    skip_cert_verify: bool,
}

impl GitSource {
    pub fn new(skip_cert_verify: bool) -> Self {
        Self { skip_cert_verify }
    }

    fn git(&self) -> Command {
        let mut cmd = Command::new("git");
        if self.skip_cert_verify {
            cmd.args(["-c", "http.sslVerify=false"]);
        }
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd
    }

    async fn run(&self, mut cmd: Command, what: &str) -> LifecycleResult<()> {
        debug!("Executing: {}", what);
        let output = cmd
            .output()
            .await
            .map_err(|e| LifecycleError::command_failed(what, e))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(LifecycleError::Internal(format!(
                "{} exited with {}: {}",
                what,
                output.status,
                stderr.trim()
            )))
        }
    }

    async fn shallow_clone(&self, repo: &str, branch: Option<&str>, dest: &Path) -> LifecycleResult<()> {
        let mut cmd = self.git();
        cmd.args(["clone", "--depth", "1", "--recursive"]);
        if let Some(branch) = branch {
            cmd.args(["--branch", branch]);
        }
        cmd.arg(repo).arg(dest);
        self.run(cmd, "git clone --depth 1").await
    }

    async fn full_clone(&self, repo: &str, branch: Option<&str>, dest: &Path) -> LifecycleResult<()> {
        let mut cmd = self.git();
        cmd.args(["clone", "--recursive"]).arg(repo).arg(dest);
        self.run(cmd, "git clone").await?;

        if let Some(branch) = branch {
            let mut checkout = self.git();
            checkout.arg("-C").arg(dest).args(["checkout", branch]);
            self.run(checkout, "git checkout").await?;
        }
        Ok(())
    }
}

#[async_trait]
impl BuildpackSource for GitSource {
    async fn fetch(&self, url: &Url, dest: &Path) -> LifecycleResult<()> {
        let branch = url.fragment().filter(|f| !f.is_empty()).map(str::to_string);
        let mut repo = url.clone();
        repo.set_fragment(None);

        match self
            .shallow_clone(repo.as_str(), branch.as_deref(), dest)
            .await
        {
            Ok(()) => {}
            Err(e) => {
                warn!("Shallow clone of {} failed, retrying full clone: {}", repo, e);
                if dest.exists() {
                    tokio::fs::remove_dir_all(dest).await.map_err(|e| {
                        LifecycleError::io(format!("removing {}", dest.display()), e)
                    })?;
                }
                self.full_clone(repo.as_str(), branch.as_deref(), dest)
                    .await
                    .map_err(|e| LifecycleError::acquire(url.as_str(), e))?;
            }
        }

        info!("Cloned buildpack {}", url);
        Ok(())
    }

    fn source_name(&self) -> &'static str {
        "git"
    }
}
