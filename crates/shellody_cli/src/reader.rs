//! Interactive line reader backed by `rustyline`.
//!
//! `rustyline::Editor` blocks while it owns the terminal, so it lives on a dedicated thread.
//! Each [`LineReader::read_line`] call sends a request over a channel and awaits the reply;
//! tab completion calls back into the session's completion engine from that thread.

use std::{
    path::PathBuf,
    sync::mpsc,
    thread::{self, JoinHandle},
};

use async_trait::async_trait;
use rustyline::{
    completion::{Completer, Pair},
    error::ReadlineError,
    highlight::Highlighter,
    hint::Hinter,
    history::DefaultHistory,
    validate::Validator,
    Context, Editor, Helper,
};
use shellody::{CompletionCallback, LineReader, ReadOutcome, ShellError};
use shellody_lexer::{quote_token, tokenize_partial};
use tokio::sync::oneshot;

use crate::error::{CliError, CliResult};

/// History settings for the editor thread.
#[derive(Debug, Clone)]
pub struct HistoryOptions {
    /// Entries kept in memory and on disk.
    pub max_entries: usize,
    /// File loaded at startup and saved on shutdown.
    pub file: Option<PathBuf>,
}

struct ReadRequest {
    prompt: String,
    completion: CompletionCallback,
    reply: oneshot::Sender<Result<ReadOutcome, ShellError>>,
}

/// [`LineReader`] driving a `rustyline` editor on its own thread.
pub struct RustylineReader {
    requests: Option<mpsc::Sender<ReadRequest>>,
    worker: Option<JoinHandle<()>>,
}

impl RustylineReader {
    /// Starts the editor thread; fails when the terminal cannot be set up.
    pub fn new(history: HistoryOptions) -> CliResult<Self> {
        let (requests, inbox) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let worker = thread::Builder::new()
            .name("shellody-readline".to_string())
            .spawn(move || editor_thread(history, inbox, ready_tx))
            .map_err(|err| CliError::startup(format!("failed to start line editor: {err}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                requests: Some(requests),
                worker: Some(worker),
            }),
            Ok(Err(message)) => Err(CliError::startup(message)
                .with_hint("use `--script <file>` when stdin is not a terminal")),
            Err(_) => Err(CliError::startup("line editor thread exited during startup")),
        }
    }
}

#[async_trait]
impl LineReader for RustylineReader {
    async fn read_line(
        &mut self,
        prompt: &str,
        completion: CompletionCallback,
    ) -> Result<ReadOutcome, ShellError> {
        let (reply, response) = oneshot::channel();
        let request = ReadRequest {
            prompt: prompt.to_string(),
            completion,
            reply,
        };
        self.requests
            .as_ref()
            .and_then(|requests| requests.send(request).ok())
            .ok_or_else(|| ShellError::session("line editor is not running"))?;
        response
            .await
            .map_err(|_| ShellError::session("line editor stopped unexpectedly"))?
    }
}

impl Drop for RustylineReader {
    fn drop(&mut self) {
        // Closing the channel ends the editor loop, which saves history before exiting.
        self.requests.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn editor_thread(
    history: HistoryOptions,
    inbox: mpsc::Receiver<ReadRequest>,
    ready: mpsc::SyncSender<Result<(), String>>,
) {
    let mut editor = match build_editor(&history) {
        Ok(editor) => editor,
        Err(message) => {
            let _ = ready.send(Err(message));
            return;
        }
    };
    if let Some(file) = &history.file {
        if let Err(err) = editor.load_history(file) {
            tracing::debug!(path = %file.display(), error = %err, "no history loaded");
        }
    }
    if ready.send(Ok(())).is_err() {
        return;
    }

    while let Ok(request) = inbox.recv() {
        if let Some(helper) = editor.helper_mut() {
            helper.completion = Some(request.completion);
        }
        let outcome = match editor.readline(&request.prompt) {
            Ok(line) => Ok(ReadOutcome::Line(line)),
            Err(ReadlineError::Interrupted) => Ok(ReadOutcome::Interrupted),
            Err(ReadlineError::Eof) => Ok(ReadOutcome::EndOfInput),
            Err(err) => Err(ShellError::session(format!("failed to read input: {err}"))),
        };
        if let Some(helper) = editor.helper_mut() {
            helper.completion = None;
        }
        if request.reply.send(outcome).is_err() {
            break;
        }
    }

    if let Some(file) = &history.file {
        if let Some(parent) = file.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(err) = editor.save_history(file) {
            tracing::warn!(path = %file.display(), error = %err, "failed to save history");
        }
    }
}

fn build_editor(history: &HistoryOptions) -> Result<Editor<ShellHelper, DefaultHistory>, String> {
    let config = rustyline::Config::builder()
        .max_history_size(history.max_entries)
        .map_err(|err| format!("invalid history size: {err}"))?
        .auto_add_history(true)
        .build();
    let mut editor = Editor::with_config(config)
        .map_err(|err| format!("failed to initialize line editor: {err}"))?;
    editor.set_helper(Some(ShellHelper::default()));
    Ok(editor)
}

/// Completion glue between `rustyline` and the session's completion callback.
#[derive(Default)]
struct ShellHelper {
    completion: Option<CompletionCallback>,
}

impl ShellHelper {
    fn candidates(&self, line: &str, pos: usize) -> (usize, Vec<Pair>) {
        let Some(completion) = &self.completion else {
            return (pos, Vec::new());
        };
        let start = tokenize_partial(&line[..pos]).replace_from();
        let pairs = completion(line, pos)
            .into_iter()
            .map(|candidate| Pair {
                replacement: quote_token(&candidate).into_owned(),
                display: candidate,
            })
            .collect();
        (start, pairs)
    }
}

impl Helper for ShellHelper {}

impl Highlighter for ShellHelper {}

impl Hinter for ShellHelper {
    type Hint = String;

    fn hint(&self, _line: &str, _pos: usize, _ctx: &Context<'_>) -> Option<String> {
        None
    }
}

impl Validator for ShellHelper {}

impl Completer for ShellHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        Ok(self.candidates(line, pos))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn candidates_are_quoted_and_anchored_at_the_word() {
        let helper = ShellHelper {
            completion: Some(Arc::new(|_: &str, _: usize| {
                vec!["Ada".to_string(), "New York".to_string()]
            })),
        };
        let (start, pairs) = helper.candidates("greet A", 7);
        assert_eq!(start, 6);
        let replacements = pairs
            .iter()
            .map(|pair| pair.replacement.as_str())
            .collect::<Vec<_>>();
        assert_eq!(replacements, vec!["Ada", "\"New York\""]);
        assert_eq!(pairs[1].display, "New York");
    }

    #[test]
    fn no_callback_means_no_candidates() {
        let helper = ShellHelper::default();
        assert_eq!(helper.candidates("gr", 2).1.len(), 0);
    }
}
