use std::time::Duration;

use proptest::prelude::*;
use shellody::{
    bind, ArgumentSchema, BoundArguments, CommandContext, CommandPath, CommandRegistration,
    CompletionEngine, HandlerResult, ParamSpec, Registry, SharedSession, ValueType,
};

async fn noop(_args: BoundArguments, _ctx: CommandContext) -> HandlerResult {
    Ok(None)
}

const VOCABULARY: &[&str] = &["db", "query", "migrate", "status", "greet", "git", "push", "x"];

fn registry() -> Registry {
    let registry = Registry::new();
    for path in ["db query", "db migrate", "db migrate status", "greet", "git push", "git pull"] {
        registry
            .register(CommandRegistration::new(path, noop))
            .expect("register");
    }
    registry
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("runtime")
}

fn schema() -> ArgumentSchema {
    ArgumentSchema::new()
        .param(ParamSpec::positional("target", ValueType::String))
        .param(ParamSpec::positional("rest", ValueType::Integer).optional().variadic())
        .param(ParamSpec::flag("force").short('f'))
        .param(ParamSpec::option("limit", ValueType::Integer).short('n'))
}

proptest! {
    #[test]
    fn path_candidates_are_children_of_the_typed_path(
        words in proptest::collection::vec(proptest::sample::select(VOCABULARY), 0..4),
        prefix in "[a-z]{0,2}",
    ) {
        let registry = registry();
        let engine = CompletionEngine::new(
            registry.clone(),
            SharedSession::new(),
            Duration::from_millis(100),
        );
        let mut line = words.join(" ");
        if !words.is_empty() {
            line.push(' ');
        }
        line.push_str(&prefix);

        let candidates = runtime().block_on(engine.complete(&line, line.len()));
        let children = registry
            .list_children(&CommandPath::from_segments(words.iter().copied()))
            .unwrap_or_default();
        for candidate in &candidates {
            prop_assert!(candidate.starts_with(prefix.as_str()));
            prop_assert!(children.contains(candidate), "{candidate} not a child of {words:?}");
        }
    }

    #[test]
    fn completion_never_panics_on_arbitrary_input(line in "\\PC{0,40}", cursor in 0usize..48) {
        let engine = CompletionEngine::new(registry(), SharedSession::new(), Duration::from_millis(50));
        let _ = runtime().block_on(engine.complete_span(&line, cursor));
    }

    #[test]
    fn binding_is_deterministic(
        tokens in proptest::collection::vec("(-{0,2}[a-z0-9=]{0,4}|--)", 0..6),
    ) {
        let schema = schema();
        prop_assert_eq!(bind(&schema, &tokens), bind(&schema, &tokens));
    }
}
