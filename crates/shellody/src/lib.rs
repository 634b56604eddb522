//! Command resolution and execution engine for interactive shells.
//!
//! Commands live in a hierarchical [`Registry`] keyed by path segments (`db migrate status`).
//! A [`Shell`] reads lines through a [`LineReader`], tokenizes them with `shellody_lexer`,
//! resolves the longest executable prefix, binds the remaining tokens against the command's
//! [`ArgumentSchema`], and runs the handler through the [`ExecutionEngine`]. Completion for
//! partial lines is served by the [`CompletionEngine`].
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use shellody::{
//!     BoundArguments, CommandContext, CommandRegistration, Interrupts, MemorySink, ParamSpec,
//!     ScriptedReader, Shell, ValueType,
//! };
//!
//! # async fn demo() -> Result<(), shellody::ShellError> {
//! let shell = Shell::builder().output(Arc::new(MemorySink::new())).build()?;
//! shell.registry().register(
//!     CommandRegistration::new("greet", |args: BoundArguments, _ctx: CommandContext| async move {
//!         Ok(Some(format!("hello {}", args.str("name").unwrap_or_default()).into()))
//!     })
//!     .param(ParamSpec::positional("name", ValueType::String)),
//! )?;
//! let mut reader = ScriptedReader::new(["greet Ada", "exit"]);
//! shell.run(&mut reader, Interrupts::none()).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs, rustdoc::broken_intra_doc_links)]

pub mod binder;
pub mod builtins;
pub mod cancel;
pub mod command;
pub mod completion;
pub mod context;
pub mod execution;
pub mod help;
pub mod output;
pub mod reader;
pub mod registry;
pub mod resolve;
pub mod session;

pub use binder::{bind, completion_target, BoundArguments, CompletionTarget};
pub use builtins::Builtins;
pub use cancel::{CancellationToken, Cancelled};
pub use command::{
    words, ArgumentCompleter, CommandHandler, CommandRegistration, HandlerResult,
    RegisteredCommand, WordCompleter,
};
pub use completion::{CompletionContext, CompletionEngine, Completions};
pub use context::{CommandContext, SessionState, SharedSession};
pub use execution::{
    report, Execution, ExecutionEngine, ExecutionEnv, ExecutionOutcome, JobInfo,
};
pub use help::{command_help, namespace_help};
pub use output::{render_value, MemorySink, OutputEvent, OutputFormat, OutputSink};
pub use reader::{CompletionCallback, LineReader, ReadOutcome, ScriptedReader};
pub use registry::{CommandNode, Plugin, PluginHandle, PrefixMatch, Registry};
pub use resolve::{resolve, suggest, Resolution};
pub use session::{
    InterruptHandle, Interrupts, LineOutcome, Prepared, Shell, ShellBuilder, ShellConfig,
    DEFAULT_PROMPT,
};
pub use shellody_contract::{
    ArgValue, ArgumentSchema, CommandPath, CompletionRequest, ExecutionId, ExecutionMode,
    ExecutionState, ParamKind, ParamSpec, SchemaError, SessionExit, ShellError, ShellErrorCode,
    ValueType,
};
