//! Secret store interpolation of service bindings
//!
//! Bindings that reference the secret store are POSTed to its interpolation
//! endpoint over mutual TLS and replaced by the response body. Bindings
//! without a reference never touch the network.

use crate::config::CredhubOptions;
use crate::error::{LifecycleError, LifecycleResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use ureq::tls::{parse_pem, Certificate, ClientCert, PemItem, PrivateKey, RootCerts, TlsConfig};

/// Marker whose presence in the bindings triggers interpolation
pub const CREDHUB_REF_MARKER: &str = "\"credhub-ref\"";

/// Path of the interpolation endpoint relative to the store's base URI
pub const INTERPOLATE_PATH: &str = "/api/v1/interpolate";

/// Lower bound on the per-attempt request timeout
pub const MIN_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

pub const ENV_INSTANCE_CERT: &str = "CF_INSTANCE_CERT";
pub const ENV_INSTANCE_KEY: &str = "CF_INSTANCE_KEY";
pub const ENV_SYSTEM_CERT_PATH: &str = "CF_SYSTEM_CERT_PATH";
pub const ENV_SERVICES: &str = "VCAP_SERVICES";
pub const ENV_PLATFORM_OPTIONS: &str = "VCAP_PLATFORM_OPTIONS";

/// Failure of a single interpolation request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection-level failure worth another attempt
    #[error("{0}")]
    Retryable(String),

    /// Authorization or protocol failure that retrying will not fix
    #[error("{0}")]
    Fatal(String),
}

/// Blocking client for the interpolation endpoint
pub trait InterpolationTransport: Send + Sync {
    /// POST `body` to `url`, returning the response body on HTTP 200
    fn post(&self, url: &str, body: &str) -> Result<String, TransportError>;
}

/// Client certificate material named by the instance environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub system_cert_path: PathBuf,
}

impl ClientIdentity {
    /// Read identity paths from an environment snapshot
    pub fn from_env(env: &BTreeMap<String, String>) -> LifecycleResult<Self> {
        let required = |key: &str| -> LifecycleResult<PathBuf> {
            env.get(key)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .ok_or_else(|| LifecycleError::ClientConfig(format!("{} is not set", key)))
        };

        Ok(Self {
            cert_path: required(ENV_INSTANCE_CERT)?,
            key_path: required(ENV_INSTANCE_KEY)?,
            system_cert_path: required(ENV_SYSTEM_CERT_PATH)?,
        })
    }
}

/// ureq-backed transport presenting the instance identity
pub struct MtlsTransport {
    agent: ureq::Agent,
}

impl MtlsTransport {
    /// Build a client trusting every `.crt` under the system cert path
    pub fn new(identity: &ClientIdentity, timeout: Duration) -> LifecycleResult<Self> {
        let chain = read_certificates(&identity.cert_path)?;
        if chain.is_empty() {
            return Err(LifecycleError::ClientConfig(format!(
                "no certificate found in {}",
                identity.cert_path.display()
            )));
        }

        let key_pem = std::fs::read(&identity.key_path).map_err(|e| {
            LifecycleError::ClientConfig(format!("reading {}: {}", identity.key_path.display(), e))
        })?;
        let key = PrivateKey::from_pem(&key_pem).map_err(|e| {
            LifecycleError::ClientConfig(format!("parsing {}: {}", identity.key_path.display(), e))
        })?;

        let roots = read_trust_store(&identity.system_cert_path)?;

        let tls = TlsConfig::builder()
            .client_cert(Some(ClientCert::new_with_certs(&chain, key)))
            .root_certs(RootCerts::new_with_certs(&roots))
            .build();
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .tls_config(tls)
            .build()
            .into();

        Ok(Self { agent })
    }
}

impl InterpolationTransport for MtlsTransport {
    fn post(&self, url: &str, body: &str) -> Result<String, TransportError> {
        let mut response = self
            .agent
            .post(url)
            .header("Content-Type", "application/json")
            .send(body)
            .map_err(classify)?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(TransportError::Fatal(format!("unexpected status {}", status)));
        }

        response
            .body_mut()
            .read_to_string()
            .map_err(|e| TransportError::Retryable(format!("reading response: {}", e)))
    }
}

fn classify(err: ureq::Error) -> TransportError {
    match err {
        ureq::Error::StatusCode(code) if code >= 500 => {
            TransportError::Retryable(format!("server returned status {}", code))
        }
        ureq::Error::StatusCode(code) => {
            TransportError::Fatal(format!("server returned status {}", code))
        }
        ureq::Error::Io(_)
        | ureq::Error::Timeout(_)
        | ureq::Error::HostNotFound
        | ureq::Error::ConnectionFailed => TransportError::Retryable(err.to_string()),
        other => TransportError::Fatal(other.to_string()),
    }
}

fn read_certificates(path: &Path) -> LifecycleResult<Vec<Certificate<'static>>> {
    let pem = std::fs::read(path).map_err(|e| {
        LifecycleError::ClientConfig(format!("reading {}: {}", path.display(), e))
    })?;

    let mut certs = Vec::new();
    for item in parse_pem(&pem) {
        match item {
            Ok(PemItem::Certificate(cert)) => certs.push(cert.to_owned()),
            Ok(_) => {}
            Err(e) => {
                return Err(LifecycleError::ClientConfig(format!(
                    "parsing {}: {}",
                    path.display(),
                    e
                )))
            }
        }
    }
    Ok(certs)
}

/// Concatenate every `.crt` file in `dir` into one trust store
fn read_trust_store(dir: &Path) -> LifecycleResult<Vec<Certificate<'static>>> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        LifecycleError::ClientConfig(format!("reading {}: {}", dir.display(), e))
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "crt"))
        .collect();
    files.sort();

    let mut roots = Vec::new();
    for file in &files {
        roots.extend(read_certificates(file)?);
    }

    if roots.is_empty() {
        return Err(LifecycleError::ClientConfig(format!(
            "no CA certificates in {}",
            dir.display()
        )));
    }
    debug!("Loaded {} CA certificates from {}", roots.len(), dir.display());
    Ok(roots)
}

/// Secret store URI from the platform options document, if any
pub fn platform_credhub_uri(options: &str) -> LifecycleResult<Option<String>> {
    if options.trim().is_empty() {
        return Ok(None);
    }
    let value: serde_json::Value = serde_json::from_str(options)
        .map_err(|e| LifecycleError::EnvAssembly(format!("{}: {}", ENV_PLATFORM_OPTIONS, e)))?;
    Ok(value
        .get("credhub-uri")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string))
}

/// Interpolates service bindings with bounded retries
pub struct SecretResolver {
    options: CredhubOptions,
    cancel: Option<watch::Receiver<()>>,
}

impl SecretResolver {
    pub fn new(options: CredhubOptions) -> Self {
        Self {
            options,
            cancel: None,
        }
    }

    /// Stop retrying once the sender side of `cancel` is dropped
    pub fn with_cancel(mut self, cancel: watch::Receiver<()>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Whether `bindings` references the secret store at all
    pub fn needs_interpolation(bindings: &str) -> bool {
        bindings.contains(CREDHUB_REF_MARKER)
    }

    /// Request timeout for one attempt
    pub fn attempt_timeout(&self) -> Duration {
        self.options.retry_delay.max(MIN_ATTEMPT_TIMEOUT)
    }

    /// Interpolate using the mTLS identity named in `env`
    pub async fn interpolate(
        &self,
        bindings: &str,
        base_uri: &str,
        env: &BTreeMap<String, String>,
    ) -> LifecycleResult<String> {
        if !Self::needs_interpolation(bindings) {
            debug!("No secret store references in bindings");
            return Ok(bindings.to_string());
        }

        let identity = ClientIdentity::from_env(env)?;
        let transport = MtlsTransport::new(&identity, self.attempt_timeout())?;
        self.interpolate_with(bindings, base_uri, Arc::new(transport))
            .await
    }

    /// Interpolate through an explicit transport
    pub async fn interpolate_with<T>(
        &self,
        bindings: &str,
        base_uri: &str,
        transport: Arc<T>,
    ) -> LifecycleResult<String>
    where
        T: InterpolationTransport + 'static,
    {
        if !Self::needs_interpolation(bindings) {
            return Ok(bindings.to_string());
        }

        let url = format!("{}{}", base_uri.trim_end_matches('/'), INTERPOLATE_PATH);
        let attempts = self.options.connect_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            if self.is_cancelled() {
                return Err(cancelled());
            }

            debug!("Interpolating bindings via {} (attempt {}/{})", url, attempt, attempts);
            let client = Arc::clone(&transport);
            let request_url = url.clone();
            let body = bindings.to_string();
            let result = tokio::task::spawn_blocking(move || client.post(&request_url, &body))
                .await
                .map_err(|e| LifecycleError::Internal(format!("interpolation task failed: {}", e)))?;

            match result {
                Ok(interpolated) => {
                    info!("Interpolated secret store references");
                    return Ok(interpolated);
                }
                Err(TransportError::Fatal(reason)) => {
                    return Err(LifecycleError::Interpolation(reason));
                }
                Err(TransportError::Retryable(reason)) => {
                    warn!("Secret store attempt {} of {} failed: {}", attempt, attempts, reason);
                    last_error = reason;
                }
            }

            if attempt < attempts {
                self.pause().await?;
            }
        }

        Err(LifecycleError::Interpolation(format!(
            "giving up after {} attempts: {}",
            attempts, last_error
        )))
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|rx| rx.has_changed().is_err())
    }

    async fn pause(&self) -> LifecycleResult<()> {
        let delay = self.options.retry_delay;
        let Some(cancel) = &self.cancel else {
            tokio::time::sleep(delay).await;
            return Ok(());
        };

        let mut cancel = cancel.clone();
        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            _ = cancel.changed() => Err(cancelled()),
        }
    }
}

fn cancelled() -> LifecycleError {
    LifecycleError::Interpolation("cancelled".to_string())
}

/// Interpolate `VCAP_SERVICES` from `env` when the platform names a secret store
///
/// Returns the replacement bindings, or `None` when nothing needed replacing.
pub async fn resolve_services(
    resolver: &SecretResolver,
    env: &BTreeMap<String, String>,
) -> LifecycleResult<Option<String>> {
    let Some(services) = env.get(ENV_SERVICES) else {
        return Ok(None);
    };
    if !SecretResolver::needs_interpolation(services) {
        return Ok(None);
    }

    let options = env.get(ENV_PLATFORM_OPTIONS).map(String::as_str).unwrap_or("");
    let Some(base_uri) = platform_credhub_uri(options)? else {
        debug!("Bindings reference the secret store but no credhub-uri is configured");
        return Ok(None);
    };

    resolver
        .interpolate(services, &base_uri, env)
        .await
        .map(Some)
}
