use std::{collections::BTreeMap, fmt, future::Future, sync::Arc};

use futures::future::BoxFuture;
use serde_json::Value;
use shellody_contract::{
    ArgumentSchema, CommandPath, ExecutionMode, ParamSpec, ShellError, ValueType,
};

use crate::{binder::BoundArguments, completion::CompletionContext, context::CommandContext};

/// Result a handler resolves to: an optional structured value to render.
pub type HandlerResult = anyhow::Result<Option<Value>>;

/// Executable behavior attached to a command node.
///
/// Any `Fn(BoundArguments, CommandContext) -> impl Future<Output = HandlerResult>` closure
/// implements this trait.
pub trait CommandHandler: Send + Sync {
    /// Starts one invocation.
    fn invoke(&self, args: BoundArguments, ctx: CommandContext) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut> CommandHandler for F
where
    F: Fn(BoundArguments, CommandContext) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn invoke(&self, args: BoundArguments, ctx: CommandContext) -> BoxFuture<'static, HandlerResult> {
        Box::pin(self(args, ctx))
    }
}

/// Produces candidate values for one parameter.
///
/// The completion engine filters candidates by the typed prefix, so completers may return
/// their full vocabulary.
pub trait ArgumentCompleter: Send + Sync {
    /// Returns candidates for the parameter described by `ctx`.
    fn complete(&self, ctx: CompletionContext) -> BoxFuture<'static, Vec<String>>;
}

impl<F, Fut> ArgumentCompleter for F
where
    F: Fn(CompletionContext) -> Fut + Send + Sync,
    Fut: Future<Output = Vec<String>> + Send + 'static,
{
    fn complete(&self, ctx: CompletionContext) -> BoxFuture<'static, Vec<String>> {
        Box::pin(self(ctx))
    }
}

/// Completer with a fixed vocabulary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WordCompleter {
    words: Vec<String>,
}

impl ArgumentCompleter for WordCompleter {
    fn complete(&self, _ctx: CompletionContext) -> BoxFuture<'static, Vec<String>> {
        let words = self.words.clone();
        Box::pin(async move { words })
    }
}

/// Creates a completer that always offers `words`.
pub fn words<I, S>(words: I) -> WordCompleter
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    WordCompleter {
        words: words.into_iter().map(Into::into).collect(),
    }
}

/// Registration record for one executable command.
#[derive(Clone)]
pub struct CommandRegistration {
    path: CommandPath,
    summary: String,
    description: Option<String>,
    schema: ArgumentSchema,
    mode: ExecutionMode,
    handler: Arc<dyn CommandHandler>,
    completers: BTreeMap<String, Arc<dyn ArgumentCompleter>>,
}

impl CommandRegistration {
    /// Starts a registration for `path` with the given handler and an empty schema.
    pub fn new(path: impl Into<CommandPath>, handler: impl CommandHandler + 'static) -> Self {
        Self {
            path: path.into(),
            summary: String::new(),
            description: None,
            schema: ArgumentSchema::new(),
            mode: ExecutionMode::Foreground,
            handler: Arc::new(handler),
            completers: BTreeMap::new(),
        }
    }

    /// Sets the one-line help summary.
    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    /// Sets the long help text.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Appends one parameter to the schema.
    pub fn param(mut self, param: ParamSpec) -> Self {
        self.schema = self.schema.param(param);
        self
    }

    /// Replaces the whole schema.
    pub fn schema(mut self, schema: ArgumentSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Runs the handler detached from the prompt.
    pub fn background(mut self) -> Self {
        self.mode = ExecutionMode::Background;
        self
    }

    /// Attaches a completer to the parameter called `param`.
    pub fn completer(
        mut self,
        param: impl Into<String>,
        completer: impl ArgumentCompleter + 'static,
    ) -> Self {
        self.completers.insert(param.into(), Arc::new(completer));
        self
    }

    /// Registration path.
    pub fn path(&self) -> &CommandPath {
        &self.path
    }

    /// Validates the record and freezes it into a trie payload.
    pub(crate) fn into_command(self) -> Result<RegisteredCommand, ShellError> {
        let invalid = |reason: String| ShellError::InvalidRegistration {
            path: self.path.clone(),
            reason,
        };
        if self.path.is_root() {
            return Err(invalid("the root cannot hold a command".to_string()));
        }
        if let Some(segment) = self.path.segments().iter().find(|segment| !valid_segment(segment)) {
            return Err(invalid(format!("invalid path segment `{segment}`")));
        }
        self.schema
            .validate()
            .map_err(|err| invalid(err.to_string()))?;
        if let Some(name) = self
            .completers
            .keys()
            .find(|name| self.schema.get(name).is_none())
        {
            return Err(invalid(format!("completer for undeclared parameter `{name}`")));
        }

        let mut completers = self.completers;
        for param in self.schema.params() {
            if let ValueType::Choice(choices) = &param.value_type {
                completers
                    .entry(param.name.clone())
                    .or_insert_with(|| Arc::new(words(choices.iter().cloned())));
            }
        }

        Ok(RegisteredCommand {
            path: self.path,
            summary: self.summary,
            description: self.description,
            schema: self.schema,
            mode: self.mode,
            handler: self.handler,
            completers,
        })
    }
}

impl fmt::Debug for CommandRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRegistration")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

/// Path segments are non-empty, contain no whitespace, and never look like an option.
pub(crate) fn valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && !segment.starts_with('-')
        && !segment.chars().any(|ch| ch.is_whitespace() || ch.is_control())
}

/// Validated command stored in the registry trie.
#[derive(Clone)]
pub struct RegisteredCommand {
    path: CommandPath,
    summary: String,
    description: Option<String>,
    schema: ArgumentSchema,
    mode: ExecutionMode,
    handler: Arc<dyn CommandHandler>,
    completers: BTreeMap<String, Arc<dyn ArgumentCompleter>>,
}

impl RegisteredCommand {
    /// Full command path.
    pub fn path(&self) -> &CommandPath {
        &self.path
    }

    /// One-line summary.
    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// Long help text.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Argument schema.
    pub fn schema(&self) -> &ArgumentSchema {
        &self.schema
    }

    /// Foreground or background scheduling.
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Handler capability.
    pub fn handler(&self) -> &Arc<dyn CommandHandler> {
        &self.handler
    }

    /// Completer for the named parameter.
    pub fn completer(&self, param: &str) -> Option<&Arc<dyn ArgumentCompleter>> {
        self.completers.get(param)
    }

    /// Whether the schema declares `--help` or `-h` itself.
    pub fn declares_help(&self) -> bool {
        self.schema.find_long("help").is_some() || self.schema.find_short('h').is_some()
    }
}

impl fmt::Debug for RegisteredCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredCommand")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("completers", &self.completers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn noop(_args: BoundArguments, _ctx: CommandContext) -> HandlerResult {
        Ok(None)
    }

    #[test]
    fn choice_parameters_get_an_implicit_completer() {
        let command = CommandRegistration::new("out", noop)
            .param(ParamSpec::option(
                "format",
                ValueType::Choice(vec!["json".to_string(), "plain".to_string()]),
            ))
            .into_command()
            .expect("valid registration");
        assert!(command.completer("format").is_some());
    }

    #[test]
    fn rejects_completer_for_unknown_parameter() {
        let err = CommandRegistration::new("greet", noop)
            .completer("who", words(["Ada"]))
            .into_command()
            .expect_err("unknown parameter");
        assert!(matches!(err, ShellError::InvalidRegistration { .. }));
    }

    #[test]
    fn rejects_option_like_segments_and_root() {
        let err = CommandRegistration::new(CommandPath::from_segments(["db", "--all"]), noop)
            .into_command()
            .expect_err("bad segment");
        assert!(err.to_string().contains("--all"));
        assert!(CommandRegistration::new(CommandPath::root(), noop)
            .into_command()
            .is_err());
    }

    #[test]
    fn rejects_invalid_schema() {
        let err = CommandRegistration::new("greet", noop)
            .param(ParamSpec::flag("loud").short('l'))
            .param(ParamSpec::flag("long").short('l'))
            .into_command()
            .expect_err("duplicate short");
        assert_eq!(
            err,
            ShellError::InvalidRegistration {
                path: CommandPath::new("greet"),
                reason: "duplicate short option `-l`".to_string(),
            }
        );
    }
}
