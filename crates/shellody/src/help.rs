use shellody_contract::{CommandPath, ParamSpec};

use crate::{command::RegisteredCommand, registry::CommandNode};

/// Full help for one command: usage, description, parameters.
pub fn command_help(command: &RegisteredCommand) -> String {
    let mut lines = Vec::new();
    let usage = command.schema().usage();
    if usage.is_empty() {
        lines.push(format!("Usage: {}", command.path().display()));
    } else {
        lines.push(format!("Usage: {} {usage}", command.path().display()));
    }
    if !command.summary().is_empty() {
        lines.push(String::new());
        lines.push(command.summary().to_string());
    }
    if let Some(description) = command.description() {
        lines.push(String::new());
        lines.push(description.to_string());
    }

    let positionals = command.schema().positionals().collect::<Vec<_>>();
    if !positionals.is_empty() {
        lines.push(String::new());
        lines.push("Arguments:".to_string());
        lines.extend(positionals.into_iter().map(|param| row(&param.usage(), &describe(param))));
    }
    let named = command.schema().named().collect::<Vec<_>>();
    if !named.is_empty() {
        lines.push(String::new());
        lines.push("Options:".to_string());
        lines.extend(named.into_iter().map(|param| {
            let mut label = match param.short {
                Some(short) => format!("-{short}, --{}", param.name),
                None => format!("    --{}", param.name),
            };
            if param.takes_value() {
                label.push_str(&format!(" <{}>", param.value_type.describe()));
            }
            row(&label, &describe(param))
        }));
    }
    lines.join("\n")
}

/// Listing of the children of the node at `path`.
pub fn namespace_help(node: &CommandNode, path: &CommandPath) -> String {
    let mut lines = Vec::new();
    if path.is_root() {
        lines.push("Commands:".to_string());
    } else {
        lines.push(format!("Commands in `{}`:", path.display()));
        if let Some(help) = node.help() {
            lines.insert(0, help.to_string());
            lines.insert(1, String::new());
        }
    }
    for child in node.children() {
        let mut label = child.segment().to_string();
        if child.is_namespace() {
            label.push_str(" ...");
        }
        lines.push(row(&label, child.help().unwrap_or("")));
    }
    lines.join("\n")
}

fn describe(param: &ParamSpec) -> String {
    let mut text = param.summary.clone();
    if let Some(default) = &param.default {
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(&format!("[default: {default}]"));
    }
    text
}

fn row(label: &str, text: &str) -> String {
    if text.is_empty() {
        return format!("  {label}");
    }
    format!("  {label:<24} {text}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        binder::BoundArguments,
        command::{CommandRegistration, HandlerResult},
        context::CommandContext,
        registry::Registry,
    };
    use pretty_assertions::assert_eq;
    use shellody_contract::ValueType;

    async fn noop(_args: BoundArguments, _ctx: CommandContext) -> HandlerResult {
        Ok(None)
    }

    #[test]
    fn command_help_lists_arguments_and_options() {
        let registry = Registry::new();
        registry
            .register(
                CommandRegistration::new("db query", noop)
                    .summary("Run a query.")
                    .param(ParamSpec::positional("sql", ValueType::String).summary("Statement."))
                    .param(
                        ParamSpec::option("limit", ValueType::Integer)
                            .short('n')
                            .with_default(100),
                    ),
            )
            .expect("register");
        let command = registry.command(&CommandPath::new("db query")).expect("command");
        assert_eq!(
            command_help(&command),
            [
                "Usage: db query [--limit <integer>] <sql>",
                "",
                "Run a query.",
                "",
                "Arguments:",
                "  <sql>                    Statement.",
                "",
                "Options:",
                "  -n, --limit <integer>    [default: 100]",
            ]
            .join("\n")
        );
    }

    #[test]
    fn namespace_help_marks_nested_namespaces() {
        let registry = Registry::new();
        registry.register_namespace("db", "Database tools.").expect("namespace");
        registry
            .register(CommandRegistration::new("db query", noop).summary("Run a query."))
            .expect("register");
        registry
            .register(CommandRegistration::new("db migrate up", noop))
            .expect("register");
        let root = registry.snapshot();
        let db = root.child("db").expect("db");
        assert_eq!(
            namespace_help(db, &CommandPath::new("db")),
            [
                "Database tools.",
                "",
                "Commands in `db`:",
                "  migrate ...",
                "  query                    Run a query.",
            ]
            .join("\n")
        );
    }
}
