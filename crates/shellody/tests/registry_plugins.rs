use std::{sync::Arc, thread};

use pretty_assertions::assert_eq;
use serde_json::json;
use shellody::{
    bind, resolve, BoundArguments, CommandContext, CommandPath, CommandRegistration, HandlerResult,
    Plugin, Registry, ShellError,
};

async fn noop(_args: BoundArguments, _ctx: CommandContext) -> HandlerResult {
    Ok(None)
}

struct Single {
    name: &'static str,
    path: &'static str,
}

impl Plugin for Single {
    fn name(&self) -> &str {
        self.name
    }

    fn commands(&self) -> Vec<CommandRegistration> {
        vec![CommandRegistration::new(self.path, noop)]
    }
}

fn tokens(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

#[test]
fn unloading_keeps_a_command_replaced_after_load() {
    let registry = Registry::new();
    let handle = registry
        .load_plugin(&Single {
            name: "first",
            path: "greet",
        })
        .expect("load first");
    let _companion = registry
        .load_plugin(&Single {
            name: "companion",
            path: "wave",
        })
        .expect("load companion");
    registry
        .replace(CommandRegistration::new("greet", noop).summary("from the second owner"))
        .expect("replace");

    handle.unload();

    let greet = registry
        .command(&CommandPath::new("greet"))
        .expect("replacement survives unload");
    assert_eq!(greet.summary(), "from the second owner");
    assert!(registry.command(&CommandPath::new("wave")).is_some());
}

#[test]
fn dropping_a_handle_removes_only_its_own_commands() {
    let registry = Registry::new();
    let handle = registry
        .load_plugin(&Single {
            name: "migrate",
            path: "db migrate",
        })
        .expect("load");
    registry
        .register(CommandRegistration::new("db query", noop))
        .expect("register");

    drop(handle);

    assert!(registry.command(&CommandPath::new("db migrate")).is_none());
    assert!(registry.command(&CommandPath::new("db query")).is_some());
}

#[test]
fn two_plugins_share_a_namespace() {
    let registry = Registry::new();
    let _query = registry
        .load_plugin(&Single {
            name: "query",
            path: "db query",
        })
        .expect("load query");
    let migrate = registry
        .load_plugin(&Single {
            name: "migrate",
            path: "db migrate",
        })
        .expect("load migrate");

    let found = registry.lookup_prefix(&tokens("db"));
    assert_eq!(found.consumed, 1);
    assert_eq!(found.node.child_names(), vec!["migrate", "query"]);

    migrate.unload();
    assert_eq!(
        registry.list_children(&CommandPath::new("db")).expect("db"),
        vec!["query"]
    );
}

#[test]
fn conflicting_plugin_loads_nothing() {
    let registry = Registry::new();
    let _first = registry
        .load_plugin(&Single {
            name: "first",
            path: "db query",
        })
        .expect("load first");

    struct Pair;
    impl Plugin for Pair {
        fn name(&self) -> &str {
            "pair"
        }

        fn commands(&self) -> Vec<CommandRegistration> {
            vec![
                CommandRegistration::new("db export", noop),
                CommandRegistration::new("db query", noop),
            ]
        }
    }

    let err = registry.load_plugin(&Pair).expect_err("conflict");
    assert_eq!(
        err,
        ShellError::Conflict {
            path: CommandPath::new("db query")
        }
    );
    assert!(!registry.contains(&CommandPath::new("db export")));
}

#[test]
fn unregister_restores_unknown_command() {
    let registry = Registry::new();
    let root = CommandPath::root();
    let before = resolve(&registry.snapshot(), &root, &tokens("deploy prod")).expect_err("empty");

    registry
        .register(CommandRegistration::new("deploy", noop))
        .expect("register");
    assert!(resolve(&registry.snapshot(), &root, &tokens("deploy prod")).is_ok());

    registry
        .unregister(&CommandPath::new("deploy"))
        .expect("unregister");
    let after = resolve(&registry.snapshot(), &root, &tokens("deploy prod")).expect_err("gone");
    assert_eq!(before, after);
}

#[test]
fn register_resolve_bind_round_trip() {
    use shellody::{ParamSpec, ValueType};

    let registry = Registry::new();
    registry
        .register(
            CommandRegistration::new("db query", noop)
                .param(ParamSpec::positional("sql", ValueType::String))
                .param(ParamSpec::option("limit", ValueType::Integer).short('n'))
                .param(ParamSpec::flag("explain")),
        )
        .expect("register");

    let resolution = resolve(
        &registry.snapshot(),
        &CommandPath::root(),
        &tokens("db query users -n 5 --explain"),
    )
    .expect("resolve");
    let args = bind(resolution.command.schema(), &resolution.args).expect("bind");
    assert_eq!(
        args.to_json(),
        json!({ "sql": "users", "limit": 5, "explain": true })
    );
}

#[test]
fn concurrent_registration_never_exposes_half_attached_nodes() {
    let registry = Registry::new();
    registry
        .register(CommandRegistration::new("stable", noop))
        .expect("register");

    let writers = (0..4)
        .map(|writer| {
            let registry = registry.clone();
            thread::spawn(move || {
                for round in 0..50 {
                    let path = format!("ns{writer} sub{round} leaf");
                    registry
                        .register(CommandRegistration::new(path.as_str(), noop))
                        .expect("register");
                }
            })
        })
        .collect::<Vec<_>>();

    let reader = {
        let registry = registry.clone();
        thread::spawn(move || {
            for _ in 0..500 {
                let root = registry.snapshot();
                assert!(resolve(&root, &CommandPath::root(), &tokens("stable")).is_ok());
                for command in root.commands() {
                    let node = root
                        .descend(command.path().segments())
                        .expect("every listed command is reachable");
                    assert!(node.is_executable());
                }
                for namespace in root.children() {
                    for sub in namespace.children() {
                        assert!(sub.child("leaf").is_some_and(|leaf| leaf.is_executable()));
                    }
                }
            }
        })
    };

    for writer in writers {
        writer.join().expect("writer");
    }
    reader.join().expect("reader");
    assert_eq!(registry.commands().len(), 1 + 4 * 50);
}

#[test]
fn snapshots_are_isolated_from_later_writes() {
    let registry = Registry::new();
    let before = registry.snapshot();
    registry
        .register(CommandRegistration::new("later", noop))
        .expect("register");
    assert!(before.child("later").is_none());
    assert!(Arc::ptr_eq(&registry.snapshot(), &registry.snapshot()));
}
