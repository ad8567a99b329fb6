//! Launcher - exec a staged droplet's start command

use buildpack_lifecycle::cli::{self, LauncherArgs};
use buildpack_lifecycle::error::{LifecycleError, EXIT_USAGE};
use clap::Parser;
use console::style;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let args = match LauncherArgs::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(EXIT_USAGE)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let (config, log) = args.into_config();
    cli::init_logging(&log);

    match cli::commands::launch(config).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => report(e),
    }
}

fn report(e: LifecycleError) -> ExitCode {
    eprintln!("{} {}", style("Error:").red().bold(), e);
    if let Some(hint) = e.hint() {
        eprintln!("{} {}", style("Hint:").yellow(), hint);
    }
    ExitCode::from(e.exit_code())
}
