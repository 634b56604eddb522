use std::{
    panic::AssertUnwindSafe,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use futures::FutureExt;
use parking_lot::Mutex;
use shellody_contract::{CommandPath, CompletionRequest};
use shellody_lexer::{tokenize_partial, PartialLine};
use tokio::runtime::{Handle, RuntimeFlavor};

use crate::{
    binder::{completion_target, CompletionTarget},
    cancel::CancellationToken,
    command::RegisteredCommand,
    context::SharedSession,
    reader::CompletionCallback,
    registry::Registry,
};

/// Input handed to an [`ArgumentCompleter`](crate::ArgumentCompleter).
#[derive(Debug, Clone)]
pub struct CompletionContext {
    /// The original request.
    pub request: CompletionRequest,
    /// Command whose argument is being completed.
    pub command: CommandPath,
    /// Parameter being completed.
    pub param: String,
    /// Text typed so far for the word under the cursor.
    pub prefix: String,
    /// Argument tokens before the word under the cursor.
    pub args: Vec<String>,
    /// Cancelled when the request is superseded or times out.
    pub cancel: CancellationToken,
}

/// Candidates and the byte offset where they replace the input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completions {
    /// Byte offset of the word being replaced.
    pub start: usize,
    /// Candidates in presentation order.
    pub candidates: Vec<String>,
}

struct InFlight {
    generation: AtomicU64,
    token: Mutex<Option<CancellationToken>>,
}

/// Completion for partial input lines.
///
/// Each request supersedes the previous one: the older request's completer is cancelled and
/// it returns no candidates. Completers that exceed the timeout are abandoned.
#[derive(Clone)]
pub struct CompletionEngine {
    registry: Registry,
    session: SharedSession,
    timeout: Duration,
    in_flight: Arc<InFlight>,
}

impl CompletionEngine {
    /// Creates an engine reading the registry and the session namespace.
    pub fn new(registry: Registry, session: SharedSession, timeout: Duration) -> Self {
        Self {
            registry,
            session,
            timeout,
            in_flight: Arc::new(InFlight {
                generation: AtomicU64::new(0),
                token: Mutex::new(None),
            }),
        }
    }

    /// Candidates for the word under `cursor`.
    pub async fn complete(&self, line: &str, cursor: usize) -> Vec<String> {
        self.complete_span(line, cursor).await.candidates
    }

    /// Candidates plus the replacement offset.
    pub async fn complete_span(&self, line: &str, cursor: usize) -> Completions {
        let request = CompletionRequest::new(line, cursor);
        let generation = self.in_flight.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let token = CancellationToken::new();
        if let Some(previous) = self.in_flight.token.lock().replace(token.clone()) {
            previous.cancel();
        }

        let partial = tokenize_partial(request.before_cursor());
        let start = partial.replace_from();
        let candidates = self.candidates(&request, &partial, &token).await;

        if self.in_flight.generation.load(Ordering::Acquire) != generation {
            tracing::trace!(generation, "completion superseded");
            return Completions {
                start,
                candidates: Vec::new(),
            };
        }
        Completions { start, candidates }
    }

    /// Synchronous adapter for line editors that call completion from a blocking thread.
    ///
    /// Outside any runtime the callback blocks on `runtime`. On a multi-thread runtime worker
    /// it blocks in place; on a current-thread runtime it cannot block and yields nothing.
    pub fn callback(&self, runtime: Handle) -> CompletionCallback {
        let engine = self.clone();
        Arc::new(move |line: &str, cursor: usize| {
            let completion = engine.complete(line, cursor);
            match Handle::try_current() {
                Err(_) => runtime.block_on(completion),
                Ok(current) if current.runtime_flavor() == RuntimeFlavor::MultiThread => {
                    tokio::task::block_in_place(|| runtime.block_on(completion))
                }
                Ok(_) => {
                    tracing::warn!("completion called on a current-thread runtime; skipped");
                    Vec::new()
                }
            }
        })
    }

    async fn candidates(
        &self,
        request: &CompletionRequest,
        partial: &PartialLine,
        token: &CancellationToken,
    ) -> Vec<String> {
        let root = self.registry.snapshot();
        let namespace = self.session.namespace();
        let words = partial.words();
        let prefix = partial.prefix();

        let mut bases = vec![CommandPath::root()];
        if !namespace.is_root() {
            bases.insert(0, namespace);
        }

        let mut out = Vec::new();
        let mut argument: Option<(Arc<RegisteredCommand>, Vec<String>)> = None;
        for base in &bases {
            let mut full = base.segments().to_vec();
            full.extend(words.iter().cloned());
            let found = root.lookup_prefix(&full);
            if found.consumed < base.len() {
                continue;
            }
            if found.consumed == full.len() {
                for child in found.node.child_names() {
                    if child.starts_with(prefix) && !out.contains(&child) {
                        out.push(child);
                    }
                }
            }
            if argument.is_none() && found.consumed > base.len() {
                argument = (base.len() + 1..=found.consumed).rev().find_map(|depth| {
                    let command = root.descend(&full[..depth])?.command()?.clone();
                    Some((command, full[depth..].to_vec()))
                });
            }
        }

        if let Some((command, args)) = argument {
            for candidate in self.argument_candidates(request, &command, args, prefix, token).await {
                if !out.contains(&candidate) {
                    out.push(candidate);
                }
            }
        }
        out
    }

    async fn argument_candidates(
        &self,
        request: &CompletionRequest,
        command: &RegisteredCommand,
        args: Vec<String>,
        prefix: &str,
        token: &CancellationToken,
    ) -> Vec<String> {
        let param = match completion_target(command.schema(), &args, prefix) {
            CompletionTarget::OptionName => {
                return command
                    .schema()
                    .named()
                    .map(|param| format!("--{}", param.name))
                    .filter(|name| name.starts_with(prefix))
                    .collect();
            }
            CompletionTarget::OptionValue(param) | CompletionTarget::Positional(param) => param,
            CompletionTarget::Nothing => return Vec::new(),
        };
        let Some(completer) = command.completer(&param.name) else {
            return Vec::new();
        };

        let ctx = CompletionContext {
            request: request.clone(),
            command: command.path().clone(),
            param: param.name.clone(),
            prefix: prefix.to_string(),
            args,
            cancel: token.clone(),
        };
        let completion = AssertUnwindSafe(completer.complete(ctx)).catch_unwind();
        let result = tokio::select! {
            result = tokio::time::timeout(self.timeout, completion) => result,
            () = token.cancelled() => return Vec::new(),
        };
        let mut candidates = match result {
            Ok(Ok(candidates)) => candidates,
            Ok(Err(_)) => {
                tracing::warn!(command = %command.path(), param = %param.name, "completer panicked");
                return Vec::new();
            }
            Err(_) => {
                tracing::warn!(
                    command = %command.path(),
                    param = %param.name,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "completer timed out"
                );
                token.cancel();
                return Vec::new();
            }
        };
        candidates.retain(|candidate| candidate.starts_with(prefix));
        candidates.sort();
        candidates.dedup();
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        binder::BoundArguments,
        command::{words, CommandRegistration, HandlerResult},
        context::CommandContext,
    };
    use pretty_assertions::assert_eq;
    use shellody_contract::{ParamSpec, ValueType};

    async fn noop(_args: BoundArguments, _ctx: CommandContext) -> HandlerResult {
        Ok(None)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn callback_blocks_in_place_on_a_worker() {
        let (engine, _session) = engine();
        let callback = engine.callback(Handle::current());
        assert_eq!(callback("gr", 2), vec!["greet"]);
    }

    #[tokio::test]
    async fn callback_on_a_current_thread_runtime_yields_nothing() {
        let (engine, _session) = engine();
        let callback = engine.callback(Handle::current());
        assert!(callback("gr", 2).is_empty());
    }

    #[test]
    fn callback_blocks_on_the_runtime_from_a_plain_thread() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .expect("runtime");
        let (engine, _session) = engine();
        let callback = engine.callback(runtime.handle().clone());
        let candidates = std::thread::spawn(move || callback("db ", 3))
            .join()
            .expect("completion thread");
        assert_eq!(candidates, vec!["migrate", "query"]);
    }

    fn engine() -> (CompletionEngine, SharedSession) {
        let registry = Registry::new();
        registry
            .register(
                CommandRegistration::new("greet", noop)
                    .param(ParamSpec::positional("name", ValueType::String))
                    .param(ParamSpec::flag("loud").short('l'))
                    .completer("name", words(["Ada", "Alan", "Grace"])),
            )
            .expect("greet");
        registry
            .register(CommandRegistration::new("db query", noop))
            .expect("query");
        registry
            .register(
                CommandRegistration::new("db migrate", noop).param(ParamSpec::option(
                    "format",
                    ValueType::Choice(vec!["json".to_string(), "plain".to_string()]),
                )),
            )
            .expect("migrate");
        let session = SharedSession::new();
        let engine = CompletionEngine::new(registry, session.clone(), Duration::from_millis(200));
        (engine, session)
    }

    #[tokio::test]
    async fn completes_command_paths() {
        let (engine, _) = engine();
        assert_eq!(engine.complete("gre", 3).await, vec!["greet"]);
        assert_eq!(engine.complete("db ", 3).await, vec!["migrate", "query"]);
        assert_eq!(engine.complete("", 0).await, vec!["db", "greet"]);
    }

    #[tokio::test]
    async fn completes_arguments_through_completers() {
        let (engine, _) = engine();
        assert_eq!(engine.complete("greet A", 7).await, vec!["Ada", "Alan"]);
        assert_eq!(engine.complete("greet --", 8).await, vec!["--loud"]);
        assert_eq!(
            engine.complete("db migrate --format ", 20).await,
            vec!["json", "plain"]
        );
        assert!(engine.complete("greet Ada ", 10).await.is_empty());
    }

    #[tokio::test]
    async fn replacement_starts_at_current_word() {
        let (engine, _) = engine();
        let completions = engine.complete_span("greet \"Al", 9).await;
        assert_eq!(completions.start, 6);
        assert_eq!(completions.candidates, vec!["Alan"]);
    }

    #[tokio::test]
    async fn namespace_children_are_offered_first() {
        let (engine, session) = engine();
        session.set_namespace(CommandPath::new("db"));
        assert_eq!(engine.complete("", 0).await, vec!["migrate", "query", "db", "greet"]);
        assert_eq!(engine.complete("q", 1).await, vec!["query"]);
    }

    #[tokio::test]
    async fn unknown_input_yields_nothing() {
        let (engine, _) = engine();
        assert!(engine.complete("nope ", 5).await.is_empty());
        assert!(engine.complete("greet \"unterminated \\", 21).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_completers_time_out() {
        let registry = Registry::new();
        registry
            .register(
                CommandRegistration::new("slow", noop)
                    .param(ParamSpec::positional("item", ValueType::String))
                    .completer("item", |_ctx: CompletionContext| async {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        vec!["late".to_string()]
                    }),
            )
            .expect("register");
        let engine =
            CompletionEngine::new(registry, SharedSession::new(), Duration::from_millis(50));
        assert!(engine.complete("slow ", 5).await.is_empty());
    }

    #[tokio::test]
    async fn superseded_requests_return_nothing() {
        let registry = Registry::new();
        registry
            .register(
                CommandRegistration::new("wait", noop)
                    .param(ParamSpec::positional("item", ValueType::String))
                    .completer("item", |ctx: CompletionContext| async move {
                        ctx.cancel.cancelled().await;
                        vec!["never".to_string()]
                    }),
            )
            .expect("register");
        let engine =
            CompletionEngine::new(registry, SharedSession::new(), Duration::from_secs(5));
        let first = engine.complete("wait ", 5);
        let second = async {
            tokio::task::yield_now().await;
            engine.complete("wa", 2).await
        };
        let (first, second) = tokio::join!(first, second);
        assert!(first.is_empty());
        assert_eq!(second, vec!["wait"]);
    }
}
