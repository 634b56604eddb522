//! Host assembly: command-line flags, shell construction, and the session run.

use std::{fs, path::PathBuf, sync::Arc};

use clap::Parser;
use shellody::{
    InterruptHandle, Interrupts, LineReader, OutputFormat, OutputSink, PluginHandle,
    ScriptedReader, SessionExit, Shell, ShellConfig, ShellError,
};

use crate::{
    config::CliConfig,
    error::{CliError, CliResult},
    plugins,
    reader::{HistoryOptions, RustylineReader},
    sink::StdioSink,
};

/// Interactive command shell with hierarchical commands and tab completion.
#[derive(Parser, Debug, Clone, Default, PartialEq, Eq)]
#[command(name = "shellody", version, about)]
pub struct Cli {
    /// Config file; defaults to the per-user `shellody/config.toml`.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
    /// Run the lines of FILE instead of reading from the terminal.
    #[arg(long, value_name = "FILE")]
    pub script: Option<PathBuf>,
    /// Render structured results as plain text.
    #[arg(long)]
    pub plain: bool,
    /// Log filter directive, e.g. `debug` or `shellody=trace`.
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,
    /// Stop at the first failed line with exit code 1.
    #[arg(long)]
    pub fail_fast: bool,
}

impl Cli {
    /// Session settings: the config file, overridden by flags.
    pub fn shell_config(&self, config: &CliConfig) -> ShellConfig {
        let mut settings = config.shell_config();
        if self.plain {
            settings.output_format = OutputFormat::Plain;
        }
        settings.stop_on_error = self.fail_fast;
        settings
    }
}

/// A shell with the bundled plugins loaded.
pub struct Host {
    shell: Shell,
    _plugins: Vec<PluginHandle>,
}

impl Host {
    /// Builds the shell around `output`.
    pub fn new(settings: ShellConfig, output: Arc<dyn OutputSink>) -> CliResult<Self> {
        let shell = Shell::builder()
            .config(settings)
            .output(output)
            .build()
            .map_err(|err| CliError::startup(format!("failed to build shell: {err}")))?;
        let plugins = plugins::install(shell.registry())
            .map_err(|err| CliError::startup(format!("failed to load plugins: {err}")))?;
        Ok(Self {
            shell,
            _plugins: plugins,
        })
    }

    /// The session.
    pub fn shell(&self) -> &Shell {
        &self.shell
    }

    /// Runs the session to its end.
    pub async fn run(
        &self,
        reader: &mut dyn LineReader,
        interrupts: Interrupts,
    ) -> Result<SessionExit, ShellError> {
        self.shell.run(reader, interrupts).await
    }
}

/// Reader chosen by the flags: the script file, or the interactive editor.
pub fn open_reader(cli: &Cli, config: &CliConfig) -> CliResult<Box<dyn LineReader>> {
    if let Some(path) = &cli.script {
        let script = fs::read_to_string(path).map_err(|err| {
            CliError::io(format!("failed to read script: {err}")).with_path(path)
        })?;
        return Ok(Box::new(ScriptedReader::from_script(&script)));
    }
    let history = HistoryOptions {
        max_entries: config.history.max_entries,
        file: config.history.file.clone().or_else(default_history_path),
    };
    Ok(Box::new(RustylineReader::new(history)?))
}

fn default_history_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join("shellody").join("history.txt"))
}

/// Feeds Ctrl-C into the session until the process exits.
pub async fn forward_interrupts(handle: InterruptHandle) {
    loop {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "cannot listen for Ctrl-C");
            return;
        }
        tracing::debug!("Ctrl-C");
        handle.interrupt();
    }
}

/// Process exit code for a finished session; codes that do not fit a byte report failure.
pub fn exit_code(exit: SessionExit) -> u8 {
    u8::try_from(exit.code()).unwrap_or(1)
}

/// Runs the session and maps its end to a process exit code; reader failures exit 1.
pub async fn run_session(host: &Host, reader: &mut dyn LineReader, interrupts: Interrupts) -> u8 {
    match host.run(reader, interrupts).await {
        Ok(exit) => {
            tracing::info!(code = exit.code(), "session finished");
            exit_code(exit)
        }
        Err(err) => {
            tracing::error!(error = %err, "session failed");
            eprintln!("error: {err}");
            1
        }
    }
}

/// Command-line entry point; returns the process exit code.
pub async fn main_with(cli: Cli, config: CliConfig) -> u8 {
    let host = match Host::new(cli.shell_config(&config), Arc::new(StdioSink::new())) {
        Ok(host) => host,
        Err(err) => {
            eprintln!("error: {err}");
            return err.exit_code();
        }
    };
    let mut reader = match open_reader(&cli, &config) {
        Ok(reader) => reader,
        Err(err) => {
            eprintln!("error: {err}");
            return err.exit_code();
        }
    };

    let (handle, interrupts) = Interrupts::channel();
    let forwarder = tokio::spawn(forward_interrupts(handle));
    let code = run_session(&host, reader.as_mut(), interrupts).await;
    forwarder.abort();
    code
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn flags_parse() {
        let cli = Cli::try_parse_from([
            "shellody",
            "--config",
            "/tmp/shellody.toml",
            "--plain",
            "--fail-fast",
            "--log-level",
            "debug",
        ])
        .expect("parse");
        assert_eq!(
            cli,
            Cli {
                config: Some(PathBuf::from("/tmp/shellody.toml")),
                script: None,
                plain: true,
                log_level: Some("debug".to_string()),
                fail_fast: true,
            }
        );
    }

    #[test]
    fn flags_override_config() {
        let cli = Cli {
            plain: true,
            fail_fast: true,
            ..Cli::default()
        };
        let settings = cli.shell_config(&CliConfig::default());
        assert_eq!(settings.output_format, OutputFormat::Plain);
        assert!(settings.stop_on_error);
    }

    #[test]
    fn out_of_range_exit_codes_report_failure() {
        assert_eq!(exit_code(SessionExit::Exit(3)), 3);
        assert_eq!(exit_code(SessionExit::Exit(255)), 255);
        assert_eq!(exit_code(SessionExit::EndOfInput), 0);
        assert_eq!(exit_code(SessionExit::Exit(-1)), 1);
        assert_eq!(exit_code(SessionExit::Exit(300)), 1);
    }
}
