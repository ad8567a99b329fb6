//! Builder - stage an application into a droplet

use buildpack_lifecycle::cli::{self, BuilderArgs};
use buildpack_lifecycle::error::{LifecycleError, EXIT_USAGE};
use clap::Parser;
use console::style;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let args = match BuilderArgs::try_parse() {
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

    match cli::commands::build(config).await {
        Ok(()) => ExitCode::SUCCESS,
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
