use std::{collections::VecDeque, sync::Arc};

use async_trait::async_trait;
use shellody_contract::ShellError;

/// Synchronous completion hook handed to line readers: `(line, cursor) -> candidates`.
pub type CompletionCallback = Arc<dyn Fn(&str, usize) -> Vec<String> + Send + Sync>;

/// What one prompt produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A submitted line.
    Line(String),
    /// The user interrupted the prompt (Ctrl-C at an empty prompt).
    Interrupted,
    /// Input is exhausted (Ctrl-D or end of script).
    EndOfInput,
}

/// Source of input lines.
#[async_trait]
pub trait LineReader: Send {
    /// Shows `prompt` and waits for the next line.
    async fn read_line(
        &mut self,
        prompt: &str,
        completion: CompletionCallback,
    ) -> Result<ReadOutcome, ShellError>;
}

/// Reader that replays a fixed script; used for `--script` runs and tests.
#[derive(Debug, Clone, Default)]
pub struct ScriptedReader {
    pending: VecDeque<ReadOutcome>,
    prompts: Vec<String>,
}

impl ScriptedReader {
    /// Replays `lines` in order.
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pending: lines
                .into_iter()
                .map(|line| ReadOutcome::Line(line.into()))
                .collect(),
            prompts: Vec::new(),
        }
    }

    /// Replays a script file, skipping blank lines and `#` comments.
    pub fn from_script(script: &str) -> Self {
        Self::new(
            script
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#')),
        )
    }

    /// Queues an interrupt after the lines queued so far.
    pub fn interrupt(mut self) -> Self {
        self.pending.push_back(ReadOutcome::Interrupted);
        self
    }

    /// Queues one more line.
    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.pending.push_back(ReadOutcome::Line(line.into()));
        self
    }

    /// Prompts shown so far.
    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }
}

#[async_trait]
impl LineReader for ScriptedReader {
    async fn read_line(
        &mut self,
        prompt: &str,
        _completion: CompletionCallback,
    ) -> Result<ReadOutcome, ShellError> {
        self.prompts.push(prompt.to_string());
        Ok(self.pending.pop_front().unwrap_or(ReadOutcome::EndOfInput))
    }
}
