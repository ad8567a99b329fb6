//! Launch command - hand the process over to the start command

use crate::config::LauncherConfig;
use crate::error::LifecycleResult;
use crate::launch::{self, process_env};
use tokio::sync::watch;
use tracing::debug;

/// Execute the launch command
///
/// On unix this only returns on failure; elsewhere it returns the start
/// command's exit code.
pub async fn execute(config: LauncherConfig) -> LifecycleResult<u8> {
    let env = process_env();

    // Dropping the sender cancels in-flight secret store retries
    let (cancel_tx, cancel_rx) = watch::channel(());
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                debug!("Interrupted, cancelling secret store requests");
                drop(cancel_tx);
            }
            Err(e) => {
                debug!("Cannot listen for interrupts: {}", e);
                std::future::pending::<()>().await;
            }
        }
    });

    let plan = launch::plan(&config, &env, Some(cancel_rx)).await?;
    debug!("Start command: {}", plan.start_command);
    plan.into_launcher().hand_off()
}
