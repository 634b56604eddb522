use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::CommandPath;

/// Coarse error classification used for exit codes and log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShellErrorCode {
    /// Input could not be tokenized.
    Syntax,
    /// Input violated a command's usage.
    Usage,
    /// The command or registry path was not found.
    NotFound,
    /// A registration clashed with an existing one or was malformed.
    Conflict,
    /// A command handler failed.
    Handler,
    /// The session itself failed.
    Internal,
}

/// Error emitted by tokenizing, resolving, binding, registry mutation, or handlers.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ShellError {
    /// Tokenization failed.
    #[error("syntax error at column {column}: {message}")]
    Syntax {
        /// 1-based column of the offending character.
        column: usize,
        /// What went wrong.
        message: String,
    },
    /// No executable command matched the input.
    #[error("{}", unknown_command_message(.input, .longest_prefix, .suggestions))]
    UnknownCommand {
        /// Tokens the user typed, rejoined.
        input: String,
        /// Deepest registry path that did match.
        longest_prefix: CommandPath,
        /// Nearby command names.
        suggestions: Vec<String>,
    },
    /// A command already exists at the path.
    #[error("command `{path}` is already registered")]
    Conflict {
        /// Conflicting path.
        path: CommandPath,
    },
    /// Nothing is registered at the path.
    #[error("nothing is registered at `{path}`")]
    NotFound {
        /// Missing path.
        path: CommandPath,
    },
    /// A registration record failed validation.
    #[error("invalid registration for `{path}`: {reason}")]
    InvalidRegistration {
        /// Registration path.
        path: CommandPath,
        /// Validation failure.
        reason: String,
    },
    /// A required parameter was not supplied.
    #[error("missing required argument `{name}`")]
    MissingArgument {
        /// Parameter name.
        name: String,
    },
    /// An option was given without its value.
    #[error("option `--{name}` expects a value")]
    MissingValue {
        /// Option name.
        name: String,
    },
    /// An option the schema does not declare.
    #[error("unknown option `{option}`")]
    UnknownOption {
        /// The option as typed.
        option: String,
    },
    /// More positional tokens than the schema accepts.
    #[error("too many arguments: unexpected `{unexpected}`")]
    TooManyArguments {
        /// First surplus token.
        unexpected: String,
    },
    /// A value did not convert to its declared type.
    #[error("invalid value `{raw}` for `{name}`: expected {expected}")]
    Type {
        /// Parameter name.
        name: String,
        /// Raw token.
        raw: String,
        /// Expected type description.
        expected: String,
    },
    /// A handler returned an error or panicked.
    #[error("{command}: {message}")]
    Handler {
        /// Command that failed.
        command: CommandPath,
        /// Rendered handler error.
        message: String,
    },
    /// The session loop itself failed, for example the line reader broke.
    #[error("session error: {message}")]
    Session {
        /// What went wrong.
        message: String,
    },
}

impl ShellError {
    /// Creates a handler error.
    pub fn handler(command: CommandPath, message: impl Into<String>) -> Self {
        Self::Handler {
            command,
            message: message.into(),
        }
    }

    /// Creates a session error.
    pub fn session(message: impl Into<String>) -> Self {
        Self::Session {
            message: message.into(),
        }
    }

    /// Returns the error category.
    pub fn code(&self) -> ShellErrorCode {
        match self {
            Self::Syntax { .. } => ShellErrorCode::Syntax,
            Self::UnknownCommand { .. } | Self::NotFound { .. } => ShellErrorCode::NotFound,
            Self::Conflict { .. } | Self::InvalidRegistration { .. } => ShellErrorCode::Conflict,
            Self::MissingArgument { .. }
            | Self::MissingValue { .. }
            | Self::UnknownOption { .. }
            | Self::TooManyArguments { .. }
            | Self::Type { .. } => ShellErrorCode::Usage,
            Self::Handler { .. } => ShellErrorCode::Handler,
            Self::Session { .. } => ShellErrorCode::Internal,
        }
    }

    /// Converts the error into a conventional exit code.
    pub fn exit_code(&self) -> i32 {
        match self.code() {
            ShellErrorCode::Handler => 1,
            ShellErrorCode::Syntax | ShellErrorCode::Usage => 2,
            ShellErrorCode::NotFound => 3,
            ShellErrorCode::Conflict => 4,
            ShellErrorCode::Internal => 5,
        }
    }

    /// Returns whether the error came from argument binding.
    pub fn is_binding_error(&self) -> bool {
        self.code() == ShellErrorCode::Usage
    }
}

fn unknown_command_message(
    input: &str,
    longest_prefix: &CommandPath,
    suggestions: &[String],
) -> String {
    let mut message = format!("unknown command `{input}`");
    if !longest_prefix.is_root() {
        message.push_str(&format!(" (`{longest_prefix}` is a namespace)"));
    }
    match suggestions {
        [] => {}
        [one] => message.push_str(&format!("; did you mean `{one}`?")),
        many => message.push_str(&format!("; did you mean one of: {}?", many.join(", "))),
    }
    message
}
