//! `shellody` binary.

use std::process::ExitCode;

use clap::Parser;
use shellody_cli::{app, config::resolve_config, logging, Cli};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match resolve_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::from(err.exit_code());
        }
    };
    if let Err(err) = logging::init(cli.log_level.as_deref(), config.log.level.as_deref()) {
        eprintln!("error: {err}");
        return ExitCode::from(err.exit_code());
    }

    ExitCode::from(app::main_with(cli, config).await)
}
