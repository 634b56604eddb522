//! Host-level error type.

use std::path::Path;

use thiserror::Error;

/// Coarse failure classes for the host binary.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CliErrorCategory {
    /// Invalid or unreadable configuration.
    Config,
    /// The shell could not be assembled (plugin clash, logging, line editor).
    Startup,
    /// Filesystem failure outside configuration loading.
    Io,
}

/// Structured host error; `Display` is meant for a single stderr line.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{message}{}", render_suffix(.target, .hint))]
pub struct CliError {
    /// Failure class.
    pub category: CliErrorCategory,
    /// Human-readable message.
    pub message: String,
    /// Path the failure is about.
    pub target: Option<String>,
    /// Remediation hint.
    pub hint: Option<String>,
}

/// Convenience result type for the host.
pub type CliResult<T> = Result<T, CliError>;

impl CliError {
    /// Creates an error in `category`.
    pub fn new(category: CliErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            target: None,
            hint: None,
        }
    }

    /// Configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(CliErrorCategory::Config, message)
    }

    /// Startup error.
    pub fn startup(message: impl Into<String>) -> Self {
        Self::new(CliErrorCategory::Startup, message)
    }

    /// I/O error.
    pub fn io(message: impl Into<String>) -> Self {
        Self::new(CliErrorCategory::Io, message)
    }

    /// Attaches the path the failure is about.
    pub fn with_path(mut self, path: &Path) -> Self {
        self.target = Some(path.display().to_string());
        self
    }

    /// Attaches a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Process exit code for a host failure.
    pub fn exit_code(&self) -> u8 {
        2
    }
}

fn render_suffix(target: &Option<String>, hint: &Option<String>) -> String {
    let mut out = String::new();
    if let Some(target) = target {
        out.push_str(&format!(" [target: {target}]"));
    }
    if let Some(hint) = hint {
        out.push_str(&format!(" [hint: {hint}]"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_appends_target_and_hint() {
        let err = CliError::config("unknown key `colour`")
            .with_path(Path::new("/etc/shellody.toml"))
            .with_hint("see `shellody --help`");
        assert_eq!(
            err.to_string(),
            "unknown key `colour` [target: /etc/shellody.toml] [hint: see `shellody --help`]"
        );
        assert_eq!(err.category, CliErrorCategory::Config);
        assert_eq!(err.exit_code(), 2);
    }
}
