//! `tracing` subscriber setup.
//!
//! Logs go to stderr unless `SHELLODY_LOG` names a file, which keeps the prompt clean during
//! interactive sessions.

use std::fs::OpenOptions;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{CliError, CliResult};

/// Log file path; when unset, logs go to stderr.
pub const LOG_FILE_ENV: &str = "SHELLODY_LOG";
/// Filter directive overriding the config file.
pub const LOG_LEVEL_ENV: &str = "SHELLODY_LOG_LEVEL";
/// Filter used when nothing else is configured.
pub const DEFAULT_LEVEL: &str = "warn";

/// Builds the filter. Precedence: `--log-level`, then `SHELLODY_LOG_LEVEL`, then the config
/// file, then [`DEFAULT_LEVEL`].
pub fn filter(flag: Option<&str>, configured: Option<&str>) -> CliResult<EnvFilter> {
    let directive = flag
        .map(str::to_string)
        .or_else(|| std::env::var(LOG_LEVEL_ENV).ok())
        .or_else(|| configured.map(str::to_string))
        .unwrap_or_else(|| DEFAULT_LEVEL.to_string());
    EnvFilter::try_new(&directive)
        .map_err(|err| CliError::config(format!("invalid log filter `{directive}`: {err}")))
}

/// Installs the global subscriber.
pub fn init(flag: Option<&str>, configured: Option<&str>) -> CliResult<()> {
    let filter = filter(flag, configured)?;
    let registry = tracing_subscriber::registry().with(filter);

    let result = match std::env::var_os(LOG_FILE_ENV) {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|err| {
                    CliError::startup(format!("failed to open log file: {err}"))
                        .with_path(path.as_ref())
                })?;
            registry
                .with(
                    fmt::layer()
                        .with_writer(file)
                        .with_ansi(false)
                        .with_target(true),
                )
                .try_init()
        }
        None => registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .try_init(),
    };
    result.map_err(|err| CliError::startup(format!("failed to install logger: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_wins_over_config() {
        let filter = filter(Some("debug"), Some("error")).expect("filter");
        assert_eq!(filter.to_string(), "debug");
    }

    #[test]
    fn invalid_directive_is_a_config_error() {
        let err = filter(Some("shellody=loud"), None).expect_err("invalid");
        assert!(err.to_string().contains("invalid log filter"));
    }
}
