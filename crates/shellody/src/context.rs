use std::{collections::BTreeMap, fmt, sync::Arc};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use shellody_contract::{CommandPath, ExecutionId, ExecutionMode, ShellError};

use crate::{
    cancel::{CancellationToken, Cancelled},
    execution::{ExecutionEngine, ExecutionEnv, JobInfo},
    output::render_value,
    registry::Registry,
};

/// Per-session mutable state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionState {
    /// Namespace relative paths resolve against first.
    pub namespace: CommandPath,
    /// Session variables set with `set`.
    pub variables: BTreeMap<String, String>,
    /// Number of lines submitted so far.
    pub history_index: u64,
    /// Exit code requested by a command, consumed by the session loop.
    pub exit_request: Option<i32>,
}

/// Session state shared between the loop, the completion engine, and handlers.
#[derive(Debug, Clone, Default)]
pub struct SharedSession {
    state: Arc<Mutex<SessionState>>,
}

impl SharedSession {
    /// Creates a session at the root namespace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> SessionState {
        self.state.lock().clone()
    }

    /// Runs `update` with the state locked.
    pub fn with<R>(&self, update: impl FnOnce(&mut SessionState) -> R) -> R {
        update(&mut self.state.lock())
    }

    /// Current namespace.
    pub fn namespace(&self) -> CommandPath {
        self.state.lock().namespace.clone()
    }

    /// Sets the current namespace.
    pub fn set_namespace(&self, namespace: CommandPath) {
        self.state.lock().namespace = namespace;
    }

    /// Value of one variable.
    pub fn variable(&self, name: &str) -> Option<String> {
        self.state.lock().variables.get(name).cloned()
    }

    /// Sets one variable, returning the previous value.
    pub fn set_variable(&self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.state.lock().variables.insert(name.into(), value.into())
    }

    /// Removes one variable, returning its value.
    pub fn remove_variable(&self, name: &str) -> Option<String> {
        self.state.lock().variables.remove(name)
    }

    /// Every variable.
    pub fn variables(&self) -> BTreeMap<String, String> {
        self.state.lock().variables.clone()
    }

    /// Records that the session should stop with `code`.
    pub fn request_exit(&self, code: i32) {
        self.state.lock().exit_request = Some(code);
    }

    /// Takes a pending exit request.
    pub fn take_exit_request(&self) -> Option<i32> {
        self.state.lock().exit_request.take()
    }

    /// Counts one submitted line and returns the new index.
    pub fn advance_history(&self) -> u64 {
        let mut state = self.state.lock();
        state.history_index += 1;
        state.history_index
    }
}

/// Everything a handler may touch while it runs.
#[derive(Clone)]
pub struct CommandContext {
    execution_id: ExecutionId,
    command: CommandPath,
    mode: ExecutionMode,
    env: ExecutionEnv,
    engine: ExecutionEngine,
    cancel: CancellationToken,
}

impl CommandContext {
    pub(crate) fn new(
        execution_id: ExecutionId,
        command: CommandPath,
        mode: ExecutionMode,
        env: ExecutionEnv,
        engine: ExecutionEngine,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            execution_id,
            command,
            mode,
            env,
            engine,
            cancel,
        }
    }

    /// Identifier of this invocation.
    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    /// Path of the running command.
    pub fn command(&self) -> &CommandPath {
        &self.command
    }

    /// Writes one block of text.
    pub fn write(&self, text: impl AsRef<str>) {
        self.env.output.write(text.as_ref());
    }

    /// Renders and writes a structured value in the session's output format.
    pub fn write_value(&self, value: &Value) {
        self.env.output.write(&render_value(value, self.env.format));
    }

    /// Session state handle.
    pub fn session(&self) -> &SharedSession {
        &self.env.session
    }

    /// Session variable.
    pub fn var(&self, name: &str) -> Option<String> {
        self.env.session.variable(name)
    }

    /// Current namespace.
    pub fn namespace(&self) -> CommandPath {
        self.env.session.namespace()
    }

    /// Switches the session namespace; the path must name an existing node.
    pub fn set_namespace(&self, path: CommandPath) -> Result<(), ShellError> {
        if !self.env.registry.contains(&path) {
            return Err(ShellError::NotFound { path });
        }
        tracing::debug!(namespace = %path, "namespace changed");
        self.env.session.set_namespace(path);
        Ok(())
    }

    /// Foreground or background scheduling of this invocation.
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Asks the session loop to stop with `code` once this command finishes.
    ///
    /// Only foreground commands can end the session; a background job's request is dropped
    /// and `false` is returned.
    pub fn request_exit(&self, code: i32) -> bool {
        if self.mode == ExecutionMode::Background {
            tracing::warn!(id = %self.execution_id, command = %self.command, code, "background job cannot end the session");
            return false;
        }
        self.env.session.request_exit(code);
        true
    }

    /// Command registry.
    pub fn registry(&self) -> &Registry {
        &self.env.registry
    }

    /// Background jobs known to the session.
    pub fn jobs(&self) -> Vec<JobInfo> {
        self.engine.jobs()
    }

    /// Requests cancellation of a background job.
    pub fn cancel_job(&self, id: ExecutionId) -> bool {
        self.engine.cancel(id)
    }

    /// Whether cancellation was requested; a `true` answer counts as observing it.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// `Err(Cancelled)` once cancellation was requested.
    pub fn check_cancelled(&self) -> Result<(), Cancelled> {
        self.cancel.check()
    }

    /// Resolves once cancellation is requested.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    /// Token for handing cancellation to spawned sub-tasks.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandContext")
            .field("execution_id", &self.execution_id)
            .field("command", &self.command)
            .field("mode", &self.mode)
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}
