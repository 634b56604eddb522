//! Typed configuration loading.

use std::{
    fs,
    io::ErrorKind,
    marker::PhantomData,
    path::{Path, PathBuf},
};

use serde::{de::DeserializeOwned, Deserialize};
use shellody::{OutputFormat, ShellConfig, DEFAULT_PROMPT};

use crate::error::{CliError, CliResult};

/// Path of the per-user config file below the platform config directory.
pub const CONFIG_RELATIVE_PATH: &str = "shellody/config.toml";

/// Generic TOML-backed config loader.
///
/// The loader only reads and deserializes; callers validate the semantics of the loaded value.
#[derive(Clone, Debug)]
pub struct ConfigLoader<T> {
    path: PathBuf,
    _marker: PhantomData<T>,
}

impl<T> ConfigLoader<T>
where
    T: DeserializeOwned,
{
    /// Creates a loader for `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    /// Loads and deserializes the file; a missing file is an error.
    pub fn load(&self) -> CliResult<T> {
        let body = fs::read_to_string(&self.path).map_err(|err| {
            CliError::config(format!("failed to read config: {err}")).with_path(&self.path)
        })?;
        self.parse(&body)
    }

    /// Loads the file if it exists.
    pub fn load_optional(&self) -> CliResult<Option<T>> {
        match fs::read_to_string(&self.path) {
            Ok(body) => self.parse(&body).map(Some),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(
                CliError::config(format!("failed to read config: {err}")).with_path(&self.path)
            ),
        }
    }

    /// Config path on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parse(&self, body: &str) -> CliResult<T> {
        toml::from_str(body).map_err(|err| {
            CliError::config(format!("failed to parse config: {}", err.message()))
                .with_path(&self.path)
        })
    }
}

/// Contents of `config.toml`.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    /// Prompt template; `{namespace}` expands to the current namespace.
    pub prompt: Option<String>,
    /// `[output]` table.
    pub output: OutputSection,
    /// `[history]` table.
    pub history: HistorySection,
    /// `[completion]` table.
    pub completion: CompletionSection,
    /// `[log]` table.
    pub log: LogSection,
}

/// `[output]` table.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct OutputSection {
    /// Rendering of structured results.
    pub format: OutputFormat,
}

/// `[history]` table.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct HistorySection {
    /// Entries kept by the line editor.
    pub max_entries: usize,
    /// History file; defaults to the platform data directory.
    pub file: Option<PathBuf>,
}

impl Default for HistorySection {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            file: None,
        }
    }
}

/// `[completion]` table.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct CompletionSection {
    /// Budget for one argument completer call.
    pub timeout_ms: u64,
}

impl Default for CompletionSection {
    fn default() -> Self {
        Self { timeout_ms: 250 }
    }
}

/// `[log]` table.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LogSection {
    /// `tracing` filter directive, e.g. `debug` or `shellody=trace`.
    pub level: Option<String>,
}

impl CliConfig {
    /// Checks values serde cannot.
    pub fn validate(&self) -> CliResult<()> {
        if self.history.max_entries == 0 {
            return Err(CliError::config("`history.max_entries` must be at least 1"));
        }
        if self.completion.timeout_ms == 0 {
            return Err(CliError::config("`completion.timeout_ms` must be at least 1"));
        }
        Ok(())
    }

    /// Session settings derived from the file.
    pub fn shell_config(&self) -> ShellConfig {
        ShellConfig {
            prompt: self
                .prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_PROMPT.to_string()),
            output_format: self.output.format,
            completion_timeout_ms: self.completion.timeout_ms,
            stop_on_error: false,
        }
    }
}

/// Default per-user config path, when the platform has a config directory.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_RELATIVE_PATH))
}

/// Loads the config: an explicit path must exist, the default path may be absent.
pub fn resolve_config(explicit: Option<&Path>) -> CliResult<CliConfig> {
    let config = match explicit {
        Some(path) => ConfigLoader::<CliConfig>::new(path).load()?,
        None => match default_config_path() {
            Some(path) => ConfigLoader::<CliConfig>::new(path)
                .load_optional()?
                .unwrap_or_default(),
            None => CliConfig::default(),
        },
    };
    config.validate()?;
    Ok(config)
}
