//! Shared shell contracts used by the command engine, host integrations, and plugins.
//!
//! This crate is intentionally runtime-agnostic. It defines argument schemas, bound values,
//! command paths, execution states, and the error taxonomy without depending on an async
//! runtime, a line editor, or the registry internals.

#![warn(missing_docs, rustdoc::broken_intra_doc_links)]

use std::fmt;

use serde::{Deserialize, Serialize};

mod error;
mod schema;
mod value;

pub use error::{ShellError, ShellErrorCode};
pub use schema::{ArgumentSchema, ParamKind, ParamSpec, SchemaError};
pub use value::{ArgValue, ValueType};

/// Stable command path such as `db query`, stored as ordered segments.
///
/// The empty path addresses the registry root.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CommandPath(Vec<String>);

impl CommandPath {
    /// Parses a whitespace-separated path such as `db query`.
    pub fn new(raw: &str) -> Self {
        Self(raw.split_whitespace().map(str::to_string).collect())
    }

    /// Returns the root path.
    pub fn root() -> Self {
        Self::default()
    }

    /// Builds a path from already-split segments.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Returns the path segments.
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Returns whether this is the root path.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether the path has no segments.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the last segment, if any.
    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Returns the parent path, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    /// Returns a new path with `segment` appended.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    /// Returns whether `self` starts with every segment of `prefix`.
    pub fn starts_with(&self, prefix: &CommandPath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Renders the path the way a user would type it.
    pub fn display(&self) -> String {
        self.0.join(" ")
    }
}

impl fmt::Display for CommandPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        f.write_str(&self.0.join(" "))
    }
}

impl From<&str> for CommandPath {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<Vec<String>> for CommandPath {
    fn from(segments: Vec<String>) -> Self {
        Self(segments)
    }
}

/// Execution identifier for one command invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExecutionId(pub u64);

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of one invocation.
///
/// `Pending → Running → {Completed, Failed, Cancelled}`; terminal states never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionState {
    /// Arguments are bound, the handler has not started.
    Pending,
    /// The handler future is being driven.
    Running,
    /// The handler returned successfully.
    Completed,
    /// The handler returned an error or panicked.
    Failed,
    /// The handler observed a cancellation request.
    Cancelled,
}

impl ExecutionState {
    /// Returns whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns whether `self → next` is a legal transition.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
                | (Self::Running, Self::Cancelled)
        )
    }
}

/// How an invocation is scheduled relative to the prompt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionMode {
    /// The prompt waits for a terminal state.
    #[default]
    Foreground,
    /// The handler is detached onto its own task and the prompt returns immediately.
    Background,
}

/// Completion request payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Full input line.
    pub line: String,
    /// Cursor byte offset within `line`.
    pub cursor: usize,
}

impl CompletionRequest {
    /// Creates a request, clamping `cursor` to the nearest preceding char boundary.
    pub fn new(line: impl Into<String>, cursor: usize) -> Self {
        let line = line.into();
        let mut cursor = cursor.min(line.len());
        while !line.is_char_boundary(cursor) {
            cursor -= 1;
        }
        Self { line, cursor }
    }

    /// Input text before the cursor.
    pub fn before_cursor(&self) -> &str {
        &self.line[..self.cursor]
    }
}

/// Why a session loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "code", rename_all = "kebab-case")]
pub enum SessionExit {
    /// The `exit` command was run with the given code.
    Exit(i32),
    /// The line reader reported end of input.
    EndOfInput,
}

impl SessionExit {
    /// Process exit code for this termination.
    pub fn code(self) -> i32 {
        match self {
            Self::Exit(code) => code,
            Self::EndOfInput => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_path_parses_whitespace_segments() {
        let path = CommandPath::new("  db   query ");
        assert_eq!(path.segments(), ["db", "query"]);
        assert_eq!(path.display(), "db query");
        assert_eq!(path.parent(), Some(CommandPath::new("db")));
        assert_eq!(CommandPath::root().to_string(), "/");
    }

    #[test]
    fn execution_state_only_allows_forward_transitions() {
        use ExecutionState::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Running.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Running));
        assert!(Failed.is_terminal());
        assert!(!Running.is_terminal());
    }

    #[test]
    fn completion_request_clamps_cursor_to_char_boundary() {
        let request = CompletionRequest::new("héllo", 2);
        assert_eq!(request.cursor, 1);
        assert_eq!(request.before_cursor(), "h");
        let request = CompletionRequest::new("abc", 99);
        assert_eq!(request.cursor, 3);
    }

    #[test]
    fn session_exit_codes() {
        assert_eq!(SessionExit::Exit(3).code(), 3);
        assert_eq!(SessionExit::EndOfInput.code(), 0);
    }
}
