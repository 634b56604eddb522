//! Command sets shipped with the `shellody` binary.

use std::time::Duration;

use serde_json::json;
use shellody::{
    words, BoundArguments, Cancelled, CommandContext, CommandRegistration, HandlerResult,
    ParamSpec, Plugin, PluginHandle, Registry, ShellError, ValueType,
};

/// `greet` and `echo`.
pub struct Greeter;

impl Plugin for Greeter {
    fn name(&self) -> &str {
        "greeter"
    }

    fn commands(&self) -> Vec<CommandRegistration> {
        vec![
            CommandRegistration::new("greet", greet)
                .summary("Greet someone by name.")
                .param(ParamSpec::positional("name", ValueType::String).summary("Who to greet."))
                .param(ParamSpec::flag("loud").short('l').summary("Shout the greeting."))
                .completer("name", words(["Ada", "Alan", "Grace", "Linus"])),
            CommandRegistration::new("echo", echo)
                .summary("Print the arguments back.")
                .param(
                    ParamSpec::positional("words", ValueType::String)
                        .optional()
                        .variadic(),
                ),
        ]
    }
}

async fn greet(args: BoundArguments, _ctx: CommandContext) -> HandlerResult {
    let name = args.str("name").unwrap_or_default();
    let greeting = format!("hello {name}");
    if args.flag("loud") {
        return Ok(Some(json!(greeting.to_uppercase())));
    }
    Ok(Some(json!(greeting)))
}

async fn echo(args: BoundArguments, _ctx: CommandContext) -> HandlerResult {
    Ok(Some(json!(args.strings("words").join(" "))))
}

/// `db query` and `db migrate`, a stand-in for a real backend.
pub struct Database;

const TABLES: [&str; 3] = ["orders", "products", "users"];
const MIGRATIONS: [&str; 3] = ["0001_initial", "0002_orders", "0003_indexes"];

impl Plugin for Database {
    fn name(&self) -> &str {
        "database"
    }

    fn commands(&self) -> Vec<CommandRegistration> {
        vec![
            CommandRegistration::new("db query", query)
                .summary("Read rows from a table.")
                .param(ParamSpec::positional("table", ValueType::String))
                .param(
                    ParamSpec::option("limit", ValueType::Integer)
                        .short('n')
                        .with_default(10)
                        .summary("Maximum rows."),
                )
                .param(
                    ParamSpec::option(
                        "format",
                        ValueType::Choice(vec!["table".to_string(), "json".to_string()]),
                    )
                    .summary("Row layout; `table` prints aligned text, `json` (default) the records."),
                )
                .completer("table", words(TABLES)),
            CommandRegistration::new("db migrate", migrate)
                .summary("Apply migrations up to a target.")
                .description("Without a target every pending migration is applied.")
                .param(ParamSpec::positional("target", ValueType::String).optional())
                .param(ParamSpec::flag("dry-run").summary("Only list what would run."))
                .completer("target", words(MIGRATIONS)),
        ]
    }
}

async fn query(args: BoundArguments, ctx: CommandContext) -> HandlerResult {
    let table = args.str("table").unwrap_or_default();
    if !TABLES.contains(&table) {
        return Err(ShellError::NotFound {
            path: ctx.command().child(table),
        }
        .into());
    }
    let limit = args.i64("limit").unwrap_or(10).max(0);
    let ids = 1..=limit.min(3);
    if args.str("format") == Some("table") {
        let lines = std::iter::once("id  table".to_string())
            .chain(ids.map(|id| format!("{id:<3} {table}")))
            .collect::<Vec<_>>();
        return Ok(Some(json!(lines.join("\n"))));
    }
    let rows = ids
        .map(|id| json!({ "id": id, "table": table }))
        .collect::<Vec<_>>();
    Ok(Some(json!({ "table": table, "limit": limit, "rows": rows })))
}

async fn migrate(args: BoundArguments, ctx: CommandContext) -> HandlerResult {
    let target = args.str("target").unwrap_or(MIGRATIONS[MIGRATIONS.len() - 1]);
    let Some(position) = MIGRATIONS.iter().position(|name| *name == target) else {
        anyhow::bail!("unknown migration `{target}`");
    };
    let pending = &MIGRATIONS[..=position];
    if args.flag("dry-run") {
        return Ok(Some(json!({ "would_apply": pending })));
    }
    for name in pending {
        ctx.check_cancelled()?;
        ctx.write(format!("applying {name}"));
    }
    Ok(Some(json!({ "applied": pending.len() })))
}

/// `sleep` and `tick`: long-running commands for exercising cancellation and jobs.
pub struct Timers;

impl Plugin for Timers {
    fn name(&self) -> &str {
        "timers"
    }

    fn commands(&self) -> Vec<CommandRegistration> {
        vec![
            CommandRegistration::new("sleep", sleep)
                .summary("Wait in the foreground; Ctrl-C cancels.")
                .param(ParamSpec::positional("ms", ValueType::Integer)),
            CommandRegistration::new("tick", tick)
                .summary("Print a tick periodically in the background.")
                .param(
                    ParamSpec::option("every", ValueType::Integer)
                        .with_default(1000)
                        .summary("Interval in milliseconds."),
                )
                .param(
                    ParamSpec::option("count", ValueType::Integer)
                        .short('c')
                        .summary("Stop after this many ticks."),
                )
                .background(),
        ]
    }
}

fn millis(args: &BoundArguments, name: &str) -> anyhow::Result<Duration> {
    let ms = args.i64(name).unwrap_or_default();
    let ms = u64::try_from(ms).map_err(|_| anyhow::anyhow!("`{name}` must not be negative"))?;
    Ok(Duration::from_millis(ms))
}

async fn sleep(args: BoundArguments, ctx: CommandContext) -> HandlerResult {
    let duration = millis(&args, "ms")?;
    tokio::select! {
        () = tokio::time::sleep(duration) => {
            Ok(Some(json!({ "slept_ms": duration.as_millis() as u64 })))
        }
        () = ctx.cancelled() => Err(Cancelled.into()),
    }
}

async fn tick(args: BoundArguments, ctx: CommandContext) -> HandlerResult {
    let every = millis(&args, "every")?;
    let count = args.i64("count");
    let mut ticks = 0_i64;
    while count.map_or(true, |count| ticks < count) {
        tokio::select! {
            () = tokio::time::sleep(every) => {}
            () = ctx.cancelled() => return Err(Cancelled.into()),
        }
        ticks += 1;
        ctx.write(format!("[{}] tick {ticks}", ctx.execution_id()));
    }
    Ok(Some(json!({ "ticks": ticks })))
}

/// Loads every bundled plugin; the handles keep them registered.
pub fn install(registry: &Registry) -> Result<Vec<PluginHandle>, ShellError> {
    registry.register_namespace("db", "Database tools.")?;
    let plugins: [&dyn Plugin; 3] = [&Greeter, &Database, &Timers];
    plugins
        .into_iter()
        .map(|plugin| registry.load_plugin(plugin))
        .collect()
}
