use std::{
    any::Any,
    collections::BTreeMap,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use shellody_contract::{CommandPath, ExecutionId, ExecutionMode, ExecutionState, ShellError};

use crate::{
    binder::BoundArguments,
    cancel::{CancellationToken, Cancelled},
    command::{HandlerResult, RegisteredCommand},
    context::{CommandContext, SharedSession},
    output::{render_value, OutputFormat, OutputSink},
    registry::Registry,
};

/// Session-side resources handed to every invocation.
#[derive(Clone)]
pub struct ExecutionEnv {
    /// Registry visible to handlers.
    pub registry: Registry,
    /// Session state.
    pub session: SharedSession,
    /// Where results and errors go.
    pub output: Arc<dyn OutputSink>,
    /// How structured results are rendered.
    pub format: OutputFormat,
}

impl fmt::Debug for ExecutionEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionEnv")
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

/// One bound invocation and its lifecycle state.
pub struct Execution {
    id: ExecutionId,
    command: Arc<RegisteredCommand>,
    args: BoundArguments,
    state: ExecutionState,
    cancel: CancellationToken,
}

impl Execution {
    /// Invocation identifier.
    pub fn id(&self) -> ExecutionId {
        self.id
    }

    /// Resolved command.
    pub fn command(&self) -> &Arc<RegisteredCommand> {
        &self.command
    }

    /// Path of the resolved command.
    pub fn path(&self) -> &CommandPath {
        self.command.path()
    }

    /// Bound arguments; empty once the handler has started.
    pub fn args(&self) -> &BoundArguments {
        &self.args
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ExecutionState {
        self.state
    }

    /// Foreground or background scheduling, fixed at registration.
    pub fn mode(&self) -> ExecutionMode {
        self.command.mode()
    }

    /// Token the session uses to request cancellation.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn transition(&mut self, next: ExecutionState) {
        if !self.state.can_transition_to(next) {
            tracing::warn!(id = %self.id, from = ?self.state, to = ?next, "ignored illegal state transition");
            return;
        }
        tracing::trace!(id = %self.id, from = ?self.state, to = ?next, "execution state");
        self.state = next;
    }
}

impl fmt::Debug for Execution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Execution")
            .field("id", &self.id)
            .field("path", self.command.path())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Terminal result of one invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// The handler returned; the value, if any, is rendered to the sink.
    Completed(Option<Value>),
    /// The handler returned an error or panicked.
    Failed(ShellError),
    /// The handler observed a cancellation request.
    Cancelled,
}

impl ExecutionOutcome {
    /// Terminal state matching the outcome.
    pub fn state(&self) -> ExecutionState {
        match self {
            Self::Completed(_) => ExecutionState::Completed,
            Self::Failed(_) => ExecutionState::Failed,
            Self::Cancelled => ExecutionState::Cancelled,
        }
    }

    /// Error carried by a failed outcome.
    pub fn error(&self) -> Option<&ShellError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// Background job row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobInfo {
    /// Invocation identifier.
    pub id: ExecutionId,
    /// Command path.
    pub command: CommandPath,
    /// Whether cancellation was requested.
    pub cancel_requested: bool,
}

struct Job {
    command: CommandPath,
    cancel: CancellationToken,
}

#[derive(Default)]
struct EngineState {
    next_id: AtomicU64,
    jobs: Mutex<BTreeMap<ExecutionId, Job>>,
}

/// Drives handlers through their lifecycle and tracks background jobs.
#[derive(Clone, Default)]
pub struct ExecutionEngine {
    inner: Arc<EngineState>,
}

impl ExecutionEngine {
    /// Creates an engine with no jobs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a `Pending` execution with a fresh identifier.
    pub fn prepare(&self, command: Arc<RegisteredCommand>, args: BoundArguments) -> Execution {
        let id = ExecutionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        Execution {
            id,
            command,
            args,
            state: ExecutionState::Pending,
            cancel: CancellationToken::new(),
        }
    }

    /// Runs the handler to a terminal state.
    ///
    /// Handler errors, panics, and observed cancellation become the matching outcome; this
    /// never fails itself.
    pub async fn run(&self, mut execution: Execution, env: &ExecutionEnv) -> ExecutionOutcome {
        execution.transition(ExecutionState::Running);
        let path = execution.command.path().clone();
        let ctx = CommandContext::new(
            execution.id,
            path.clone(),
            execution.command.mode(),
            env.clone(),
            self.clone(),
            execution.cancel.clone(),
        );
        let args = std::mem::take(&mut execution.args);
        let handler = Arc::clone(execution.command.handler());

        let result = match panic::catch_unwind(AssertUnwindSafe(|| handler.invoke(args, ctx))) {
            Ok(invocation) => AssertUnwindSafe(invocation).catch_unwind().await,
            Err(panic) => Err(panic),
        };
        let outcome = settle(&path, &execution.cancel, result);
        execution.transition(outcome.state());
        tracing::debug!(id = %execution.id, command = %path, state = ?execution.state, "execution finished");
        outcome
    }

    /// Detaches the handler onto its own task and returns immediately.
    ///
    /// The outcome is reported to the environment's sink when the job ends.
    pub fn spawn_background(&self, execution: Execution, env: ExecutionEnv) -> ExecutionId {
        let id = execution.id;
        let command = execution.path().clone();
        self.inner.jobs.lock().insert(
            id,
            Job {
                command: command.clone(),
                cancel: execution.cancellation(),
            },
        );
        tracing::info!(id = %id, command = %command, "background job started");

        let engine = self.clone();
        tokio::spawn(async move {
            let outcome = engine.run(execution, &env).await;
            engine.inner.jobs.lock().remove(&id);
            tracing::info!(id = %id, command = %command, state = ?outcome.state(), "background job finished");
            report_background(id, &command, &outcome, &env);
        });
        id
    }

    /// Running background jobs in id order; finished jobs are removed once reported.
    pub fn jobs(&self) -> Vec<JobInfo> {
        self.inner
            .jobs
            .lock()
            .iter()
            .map(|(id, job)| JobInfo {
                id: *id,
                command: job.command.clone(),
                cancel_requested: job.cancel.is_requested(),
            })
            .collect()
    }

    /// Requests cancellation of a running background job; `false` when no such job runs.
    pub fn cancel(&self, id: ExecutionId) -> bool {
        let Some(job) = self.inner.jobs.lock().get(&id).map(|job| job.cancel.clone()) else {
            return false;
        };
        job.cancel();
        tracing::info!(id = %id, "cancellation requested");
        true
    }

    /// Requests cancellation of every running background job.
    pub fn cancel_all(&self) {
        for job in self.inner.jobs.lock().values() {
            job.cancel.cancel();
        }
    }
}

impl fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("jobs", &self.jobs())
            .finish()
    }
}

fn settle(
    path: &CommandPath,
    cancel: &CancellationToken,
    result: Result<HandlerResult, Box<dyn Any + Send>>,
) -> ExecutionOutcome {
    match result {
        Ok(Ok(_)) if cancel.was_observed() => ExecutionOutcome::Cancelled,
        Ok(Ok(value)) => ExecutionOutcome::Completed(value),
        Ok(Err(err)) if err.is::<Cancelled>() || cancel.was_observed() => {
            ExecutionOutcome::Cancelled
        }
        Ok(Err(err)) => ExecutionOutcome::Failed(match err.downcast::<ShellError>() {
            Ok(shell_error) => shell_error,
            Err(err) => ShellError::handler(path.clone(), format!("{err:#}")),
        }),
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            tracing::warn!(command = %path, panic = %message, "handler panicked");
            ExecutionOutcome::Failed(ShellError::handler(
                path.clone(),
                format!("handler panicked: {message}"),
            ))
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

/// Writes a foreground outcome to the sink.
pub fn report(outcome: &ExecutionOutcome, env: &ExecutionEnv) {
    match outcome {
        ExecutionOutcome::Completed(Some(value)) => {
            env.output.write(&render_value(value, env.format));
        }
        ExecutionOutcome::Completed(None) => {}
        ExecutionOutcome::Failed(err) => env.output.write_error(err),
        ExecutionOutcome::Cancelled => env.output.write("cancelled"),
    }
}

fn report_background(
    id: ExecutionId,
    command: &CommandPath,
    outcome: &ExecutionOutcome,
    env: &ExecutionEnv,
) {
    match outcome {
        ExecutionOutcome::Completed(value) => {
            env.output.write(&format!("[{id}] `{}` finished", command.display()));
            if let Some(value) = value {
                env.output.write(&render_value(value, env.format));
            }
        }
        ExecutionOutcome::Failed(err) => env.output.write_error(err),
        ExecutionOutcome::Cancelled => {
            env.output
                .write(&format!("[{id}] `{}` cancelled", command.display()));
        }
    }
}
