//! Interactive session loop.
//!
//! A [`Shell`] owns the registry, session state, execution engine, and completion engine for one
//! session. [`Shell::run`] drives prompt → read → tokenize → resolve → bind → execute until an
//! `exit` command or the end of input.

use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use shellody_contract::{ExecutionId, ExecutionMode, SessionExit, ShellError};
use shellody_lexer::split;
use tokio::sync::mpsc;

use crate::{
    binder::bind,
    builtins::Builtins,
    completion::CompletionEngine,
    context::SharedSession,
    execution::{report, Execution, ExecutionEngine, ExecutionEnv, ExecutionOutcome},
    help::command_help,
    output::{OutputFormat, OutputSink},
    reader::{LineReader, ReadOutcome},
    registry::{PluginHandle, Registry},
    resolve::resolve,
};

/// Default prompt template; `{namespace}` expands to `:<namespace>` outside the root.
pub const DEFAULT_PROMPT: &str = "shellody{namespace}> ";

/// Session behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Prompt template.
    pub prompt: String,
    /// Rendering of structured results.
    pub output_format: OutputFormat,
    /// Budget for one argument completer call.
    pub completion_timeout_ms: u64,
    /// End the session with exit code 1 after the first failed line.
    pub stop_on_error: bool,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_PROMPT.to_string(),
            output_format: OutputFormat::default(),
            completion_timeout_ms: 250,
            stop_on_error: false,
        }
    }
}

/// Sending half of the interrupt channel; the host feeds Ctrl-C into it.
#[derive(Debug, Clone)]
pub struct InterruptHandle {
    tx: mpsc::UnboundedSender<()>,
}

impl InterruptHandle {
    /// Signals one interrupt. Ignored once the session has ended.
    pub fn interrupt(&self) {
        let _ = self.tx.send(());
    }
}

/// Receiving half of the interrupt channel, consumed by [`Shell::run`].
#[derive(Debug)]
pub struct Interrupts {
    rx: mpsc::UnboundedReceiver<()>,
}

impl Interrupts {
    /// Creates a connected handle and receiver.
    pub fn channel() -> (InterruptHandle, Interrupts) {
        let (tx, rx) = mpsc::unbounded_channel();
        (InterruptHandle { tx }, Interrupts { rx })
    }

    /// Receiver that never fires.
    pub fn none() -> Interrupts {
        Self::channel().1
    }

    /// Drops interrupts that arrived while no command was running.
    fn drain(&mut self) {
        while self.rx.try_recv().is_ok() {}
    }

    /// Waits for the next interrupt; pends forever once every handle is gone.
    async fn next(&mut self) {
        if self.rx.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }
}

/// Result of preparing one input line.
#[derive(Debug)]
pub enum Prepared {
    /// `--help` was requested; the rendered usage.
    Help(String),
    /// A bound invocation ready to run.
    Invocation(Execution),
}

/// What happened to one submitted line.
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    /// Nothing but whitespace.
    Blank,
    /// Usage was printed instead of running the command.
    Help,
    /// Tokenizing, resolution, or binding failed.
    Rejected(ShellError),
    /// A foreground command reached a terminal state.
    Finished(ExecutionOutcome),
    /// A background command was started.
    Detached(ExecutionId),
    /// A command asked the session to end.
    Exit(i32),
}

impl LineOutcome {
    /// Whether the line failed before or during execution.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::Rejected(_) | Self::Finished(ExecutionOutcome::Failed(_))
        )
    }
}

/// Builder for [`Shell`].
pub struct ShellBuilder {
    registry: Registry,
    config: ShellConfig,
    output: Option<Arc<dyn OutputSink>>,
    builtins: bool,
}

impl ShellBuilder {
    /// Uses an existing registry instead of a fresh one.
    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    /// Session behavior.
    pub fn config(mut self, config: ShellConfig) -> Self {
        self.config = config;
        self
    }

    /// Where results and errors go.
    pub fn output(mut self, output: Arc<dyn OutputSink>) -> Self {
        self.output = Some(output);
        self
    }

    /// Skips loading `help`, `exit`, and the other built-in commands.
    pub fn without_builtins(mut self) -> Self {
        self.builtins = false;
        self
    }

    /// Builds the shell; fails when the built-ins clash with commands already registered.
    pub fn build(self) -> Result<Shell, ShellError> {
        let output = self.output.ok_or_else(|| ShellError::session("no output sink configured"))?;
        let session = SharedSession::new();
        let builtins = if self.builtins {
            Some(
                self.registry
                    .load_plugin(&Builtins::new(self.registry.clone(), session.clone()))?,
            )
        } else {
            None
        };
        let completion = CompletionEngine::new(
            self.registry.clone(),
            session.clone(),
            Duration::from_millis(self.config.completion_timeout_ms),
        );
        Ok(Shell {
            env: ExecutionEnv {
                registry: self.registry,
                session,
                output,
                format: self.config.output_format,
            },
            engine: ExecutionEngine::new(),
            completion,
            config: self.config,
            _builtins: builtins,
        })
    }
}

/// One interactive session.
pub struct Shell {
    env: ExecutionEnv,
    engine: ExecutionEngine,
    completion: CompletionEngine,
    config: ShellConfig,
    _builtins: Option<PluginHandle>,
}

impl Shell {
    /// Starts a builder with an empty registry and default config.
    pub fn builder() -> ShellBuilder {
        ShellBuilder {
            registry: Registry::new(),
            config: ShellConfig::default(),
            output: None,
            builtins: true,
        }
    }

    /// Command registry; plugins may be loaded while the session runs.
    pub fn registry(&self) -> &Registry {
        &self.env.registry
    }

    /// Session state.
    pub fn session(&self) -> &SharedSession {
        &self.env.session
    }

    /// Execution engine, for inspecting background jobs.
    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    /// Completion engine bound to this session.
    pub fn completion(&self) -> &CompletionEngine {
        &self.completion
    }

    /// Session behavior.
    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    /// Prompt rendered for the current namespace.
    pub fn prompt(&self) -> String {
        let namespace = self.env.session.namespace();
        let label = if namespace.is_root() {
            String::new()
        } else {
            format!(":{}", namespace.display())
        };
        self.config.prompt.replace("{namespace}", &label)
    }

    /// Tokenizes, resolves, and binds one line; `None` for blank input.
    pub fn prepare(&self, line: &str) -> Result<Option<Prepared>, ShellError> {
        let tokens = split(line).map_err(|err| ShellError::Syntax {
            column: err.column,
            message: err.message,
        })?;
        if tokens.is_empty() {
            return Ok(None);
        }
        let resolution = resolve(
            &self.env.registry.snapshot(),
            &self.env.session.namespace(),
            &tokens,
        )?;
        if resolution.wants_help() {
            return Ok(Some(Prepared::Help(command_help(&resolution.command))));
        }
        let args = bind(resolution.command.schema(), &resolution.args)?;
        tracing::debug!(command = %resolution.command.path(), "bound arguments");
        Ok(Some(Prepared::Invocation(
            self.engine.prepare(resolution.command, args),
        )))
    }

    /// Runs one line to completion without interrupt handling.
    pub async fn execute_line(&self, line: &str) -> LineOutcome {
        self.execute(line, None).await
    }

    async fn execute(&self, line: &str, interrupts: Option<&mut Interrupts>) -> LineOutcome {
        let execution = match self.prepare(line) {
            Ok(None) => return LineOutcome::Blank,
            Ok(Some(Prepared::Help(text))) => {
                self.env.session.advance_history();
                self.env.output.write(&text);
                return LineOutcome::Help;
            }
            Ok(Some(Prepared::Invocation(execution))) => execution,
            Err(err) => {
                self.env.session.advance_history();
                tracing::debug!(error = %err, "line rejected");
                self.env.output.write_error(&err);
                return LineOutcome::Rejected(err);
            }
        };
        self.env.session.advance_history();

        if execution.mode() == ExecutionMode::Background {
            let path = execution.path().clone();
            let id = self.engine.spawn_background(execution, self.env.clone());
            self.env
                .output
                .write(&format!("[{id}] `{}` started", path.display()));
            return LineOutcome::Detached(id);
        }

        if let Some(stale) = self.env.session.take_exit_request() {
            tracing::debug!(code = stale, "dropping exit request made outside a foreground command");
        }
        let outcome = match interrupts {
            Some(interrupts) => self.run_interruptible(execution, interrupts).await,
            None => self.engine.run(execution, &self.env).await,
        };
        report(&outcome, &self.env);
        match self.env.session.take_exit_request() {
            Some(code) => LineOutcome::Exit(code),
            None => LineOutcome::Finished(outcome),
        }
    }

    async fn run_interruptible(
        &self,
        execution: Execution,
        interrupts: &mut Interrupts,
    ) -> ExecutionOutcome {
        let token = execution.cancellation();
        let id = execution.id();
        interrupts.drain();
        let run = self.engine.run(execution, &self.env);
        tokio::pin!(run);
        loop {
            tokio::select! {
                outcome = &mut run => return outcome,
                () = interrupts.next() => {
                    tracing::info!(id = %id, "interrupt: cancelling foreground command");
                    token.cancel();
                }
            }
        }
    }

    /// Runs the session until `exit` or the end of input.
    ///
    /// Resolution, binding, and handler failures are written to the sink and the loop goes on;
    /// only reader failures end the session with an error. Background jobs still running when
    /// the session ends are cancelled.
    pub async fn run(
        &self,
        reader: &mut dyn LineReader,
        mut interrupts: Interrupts,
    ) -> Result<SessionExit, ShellError> {
        let completion = self.completion.callback(tokio::runtime::Handle::current());
        let result = loop {
            let read = match reader.read_line(&self.prompt(), completion.clone()).await {
                Ok(read) => read,
                Err(err) => break Err(err),
            };
            match read {
                ReadOutcome::Line(line) => {
                    match self.execute(&line, Some(&mut interrupts)).await {
                        LineOutcome::Exit(code) => break Ok(SessionExit::Exit(code)),
                        outcome if outcome.is_failure() && self.config.stop_on_error => {
                            tracing::info!("stopping after failed line");
                            break Ok(SessionExit::Exit(1));
                        }
                        _ => {}
                    }
                }
                ReadOutcome::Interrupted => tracing::debug!("prompt interrupted"),
                ReadOutcome::EndOfInput => break Ok(SessionExit::EndOfInput),
            }
        };
        self.engine.cancel_all();
        tracing::debug!(exit = ?result, "session ended");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::MemorySink;
    use pretty_assertions::assert_eq;
    use shellody_contract::CommandPath;

    fn shell(sink: &MemorySink) -> Shell {
        Shell::builder()
            .output(Arc::new(sink.clone()))
            .build()
            .expect("shell")
    }

    #[test]
    fn prompt_renders_namespace() {
        let sink = MemorySink::new();
        let shell = shell(&sink);
        assert_eq!(shell.prompt(), "shellody> ");
        shell.session().set_namespace(CommandPath::new("db"));
        assert_eq!(shell.prompt(), "shellody:db> ");
    }

    #[test]
    fn blank_lines_prepare_to_nothing() {
        let sink = MemorySink::new();
        let shell = shell(&sink);
        assert!(shell.prepare("   ").expect("blank").is_none());
    }

    #[test]
    fn syntax_errors_carry_the_column() {
        let sink = MemorySink::new();
        let shell = shell(&sink);
        let err = shell.prepare("set x \"open").expect_err("unterminated");
        assert!(matches!(err, ShellError::Syntax { column: 7, .. }));
    }

    #[test]
    fn builder_requires_an_output() {
        assert!(Shell::builder().build().is_err());
    }

    #[tokio::test]
    async fn exit_request_ends_the_line() {
        let sink = MemorySink::new();
        let shell = shell(&sink);
        assert_eq!(shell.execute_line("exit 3").await, LineOutcome::Exit(3));
        assert_eq!(shell.execute_line("  ").await, LineOutcome::Blank);
    }
}
