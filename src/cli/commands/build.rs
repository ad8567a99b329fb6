//! Build command - stage an application into a droplet

use crate::config::BuilderConfig;
use crate::error::LifecycleResult;
use crate::launch::secrets::{ENV_PLATFORM_OPTIONS, ENV_SERVICES};
use crate::launch::{process_env, resolve_services, SecretResolver};
use crate::staging::{self, HookRunner};
use tracing::{debug, info};

/// Execute the build command
pub async fn execute(config: BuilderConfig) -> LifecycleResult<()> {
    config.validate()?;

    let env = process_env();
    let mut hooks = HookRunner::new();

    // Hooks see interpolated bindings but never the platform options
    let resolver = SecretResolver::new(config.credhub);
    if let Some(services) = resolve_services(&resolver, &env).await? {
        debug!("Exporting interpolated {} to hooks", ENV_SERVICES);
        hooks.set_env(ENV_SERVICES, services);
    }
    hooks.remove_env(ENV_PLATFORM_OPTIONS);

    let result = staging::stage(&config, hooks).await?;

    info!(
        "Wrote droplet {} and result {}",
        config.output_droplet.display(),
        config.output_metadata.display()
    );
    debug!("Process types: {:?}", result.process_types);
    Ok(())
}
