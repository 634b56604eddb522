//! Commands every shell session carries: help, exit, variables, namespaces, and jobs.

use std::future;

use anyhow::{anyhow, Context};
use serde_json::{json, Value};
use shellody_contract::{CommandPath, ExecutionId, ParamSpec, ShellError, ValueType};

use crate::{
    binder::BoundArguments,
    command::{CommandRegistration, HandlerResult},
    completion::CompletionContext,
    context::{CommandContext, SharedSession},
    help::{command_help, namespace_help},
    registry::{CommandNode, Plugin, Registry},
};

/// Built-in command set, loaded like any other plugin.
pub struct Builtins {
    registry: Registry,
    session: SharedSession,
}

impl Builtins {
    /// Creates the built-ins for one session; completers read `registry` and `session`.
    pub fn new(registry: Registry, session: SharedSession) -> Self {
        Self { registry, session }
    }

    fn path_completer(
        &self,
        namespaces_only: bool,
    ) -> impl Fn(CompletionContext) -> future::Ready<Vec<String>> + Send + Sync + 'static {
        let registry = self.registry.clone();
        let session = self.session.clone();
        move |ctx: CompletionContext| {
            future::ready(path_candidates(
                &registry.snapshot(),
                &session.namespace(),
                &ctx.args,
                namespaces_only,
            ))
        }
    }
}

impl Plugin for Builtins {
    fn name(&self) -> &str {
        "builtins"
    }

    fn commands(&self) -> Vec<CommandRegistration> {
        vec![
            CommandRegistration::new("help", help)
                .summary("Show commands, or the usage of one command.")
                .param(
                    ParamSpec::positional("command", ValueType::String)
                        .optional()
                        .variadic()
                        .summary("Command or namespace path."),
                )
                .completer("command", self.path_completer(false)),
            CommandRegistration::new("exit", exit)
                .summary("Leave the shell.")
                .param(
                    ParamSpec::positional("code", ValueType::Integer)
                        .with_default(0)
                        .summary("Exit code, 0 to 255."),
                ),
            CommandRegistration::new("set", set)
                .summary("Set a session variable.")
                .param(ParamSpec::positional("name", ValueType::String))
                .param(ParamSpec::positional("value", ValueType::String).variadic()),
            CommandRegistration::new("get", get)
                .summary("Print a session variable.")
                .param(ParamSpec::positional("name", ValueType::String))
                .completer("name", self.variable_completer()),
            CommandRegistration::new("unset", unset)
                .summary("Remove a session variable.")
                .param(ParamSpec::positional("name", ValueType::String))
                .completer("name", self.variable_completer()),
            CommandRegistration::new("vars", vars).summary("List session variables."),
            CommandRegistration::new("use", use_namespace)
                .summary("Change the current namespace (`..` goes up, `/` goes to the root).")
                .param(
                    ParamSpec::positional("path", ValueType::String)
                        .optional()
                        .variadic()
                        .summary("Namespace path."),
                )
                .completer("path", self.path_completer(true)),
            CommandRegistration::new("jobs", jobs).summary("List running background jobs."),
            CommandRegistration::new("cancel", cancel)
                .summary("Request cancellation of a background job.")
                .param(ParamSpec::positional("id", ValueType::Integer).summary("Job id.")),
        ]
    }
}

impl Builtins {
    fn variable_completer(
        &self,
    ) -> impl Fn(CompletionContext) -> future::Ready<Vec<String>> + Send + Sync + 'static {
        let session = self.session.clone();
        move |_ctx: CompletionContext| future::ready(session.variables().into_keys().collect())
    }
}

/// Children of the node the typed segments lead to, from the namespace and the root.
fn path_candidates(
    root: &CommandNode,
    namespace: &CommandPath,
    typed: &[String],
    namespaces_only: bool,
) -> Vec<String> {
    let mut bases = vec![root];
    if let Some(scoped) = root.descend(namespace.segments()).filter(|_| !namespace.is_root()) {
        bases.insert(0, scoped);
    }
    let mut out = Vec::new();
    for base in bases {
        let Some(node) = base.descend(typed) else {
            continue;
        };
        for child in node.children() {
            let name = child.segment().to_string();
            if (!namespaces_only || child.is_namespace()) && !out.contains(&name) {
                out.push(name);
            }
        }
    }
    if namespaces_only && typed.is_empty() {
        out.extend(["..".to_string(), "/".to_string()]);
    }
    out
}

async fn help(args: BoundArguments, ctx: CommandContext) -> HandlerResult {
    let root = ctx.registry().snapshot();
    let namespace = ctx.namespace();
    let segments = args.strings("command");

    if segments.is_empty() {
        let mut sections = Vec::new();
        if let Some(node) = root.descend(namespace.segments()).filter(|_| !namespace.is_root()) {
            sections.push(namespace_help(node, &namespace));
        }
        sections.push(namespace_help(&root, &CommandPath::root()));
        sections.push("Run `help <command>` for details, or `<command> --help`.".to_string());
        ctx.write(sections.join("\n\n"));
        return Ok(None);
    }

    let scoped = CommandPath::from_segments(
        namespace
            .segments()
            .iter()
            .chain(segments.iter())
            .cloned(),
    );
    let absolute = CommandPath::from_segments(segments);
    let (path, node) = [scoped, absolute]
        .into_iter()
        .filter(|path| !path.is_root())
        .find_map(|path| {
            let node = root.descend(path.segments())?.clone();
            Some((path, node))
        })
        .ok_or_else(|| ShellError::NotFound {
            path: CommandPath::from_segments(args.strings("command")),
        })?;

    let mut sections = Vec::new();
    if let Some(command) = node.command() {
        sections.push(command_help(command));
    }
    if node.is_namespace() {
        sections.push(namespace_help(&node, &path));
    }
    ctx.write(sections.join("\n\n"));
    Ok(None)
}

async fn exit(args: BoundArguments, ctx: CommandContext) -> HandlerResult {
    let code = args.i64("code").unwrap_or(0);
    let code = u8::try_from(code)
        .with_context(|| format!("exit code {code} is out of range 0..=255"))?;
    if !ctx.request_exit(i32::from(code)) {
        anyhow::bail!("`exit` only ends the session from the foreground");
    }
    Ok(None)
}

async fn set(args: BoundArguments, ctx: CommandContext) -> HandlerResult {
    let name = args.str("name").unwrap_or_default();
    let value = args.strings("value").join(" ");
    ctx.session().set_variable(name, value);
    Ok(None)
}

async fn get(args: BoundArguments, ctx: CommandContext) -> HandlerResult {
    let name = args.str("name").unwrap_or_default();
    let value = ctx
        .var(name)
        .ok_or_else(|| anyhow!("variable `{name}` is not set"))?;
    Ok(Some(Value::String(value)))
}

async fn unset(args: BoundArguments, ctx: CommandContext) -> HandlerResult {
    let name = args.str("name").unwrap_or_default();
    ctx.session()
        .remove_variable(name)
        .ok_or_else(|| anyhow!("variable `{name}` is not set"))?;
    Ok(None)
}

async fn vars(_args: BoundArguments, ctx: CommandContext) -> HandlerResult {
    let variables = ctx.session().variables();
    Ok(Some(json!(variables)))
}

async fn use_namespace(args: BoundArguments, ctx: CommandContext) -> HandlerResult {
    let segments = args.strings("path");
    let current = ctx.namespace();
    if segments.is_empty() {
        return Ok(Some(Value::String(current.to_string())));
    }

    let root = ctx.registry().snapshot();
    let relative = navigate(&current, &segments);
    let target = if root.descend(relative.segments()).is_some() {
        relative
    } else {
        navigate(&CommandPath::root(), &segments)
    };
    let node = root
        .descend(target.segments())
        .ok_or_else(|| ShellError::NotFound {
            path: target.clone(),
        })?;
    if !target.is_root() && !node.is_namespace() {
        return Err(anyhow!("`{}` is not a namespace", target.display()));
    }
    ctx.set_namespace(target)?;
    Ok(None)
}

fn navigate(from: &CommandPath, segments: &[String]) -> CommandPath {
    segments
        .iter()
        .fold(from.clone(), |path, segment| match segment.as_str() {
            "/" => CommandPath::root(),
            ".." => path.parent().unwrap_or_default(),
            name => path.child(name),
        })
}

async fn jobs(_args: BoundArguments, ctx: CommandContext) -> HandlerResult {
    let jobs = ctx.jobs();
    if jobs.is_empty() {
        ctx.write("no background jobs");
        return Ok(None);
    }
    Ok(Some(Value::Array(
        jobs.into_iter()
            .map(|job| {
                json!({
                    "id": job.id.0,
                    "command": job.command.display(),
                    "cancel_requested": job.cancel_requested,
                })
            })
            .collect(),
    )))
}

async fn cancel(args: BoundArguments, ctx: CommandContext) -> HandlerResult {
    let id = args.i64("id").unwrap_or_default();
    let id = u64::try_from(id).map(ExecutionId).context("job ids are positive")?;
    if !ctx.cancel_job(id) {
        return Err(anyhow!("no running job {id}"));
    }
    ctx.write(format!("cancellation requested for job {id}"));
    Ok(None)
}
