//! Hierarchical command registry.
//!
//! The trie is persistent: every mutation builds a new root that shares untouched subtrees
//! with the previous one, then swaps it in under a short write lock. Readers clone the root
//! `Arc` and keep a consistent snapshot for as long as they need it.

use std::{
    collections::BTreeMap,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use parking_lot::RwLock;
use shellody_contract::{CommandPath, ShellError};

use crate::command::{valid_segment, CommandRegistration, RegisteredCommand};

/// One trie node: a namespace, an executable command, or both.
#[derive(Clone, Default)]
pub struct CommandNode {
    segment: String,
    help: Option<String>,
    command: Option<Arc<RegisteredCommand>>,
    children: BTreeMap<String, Arc<CommandNode>>,
}

impl CommandNode {
    fn named(segment: &str) -> Self {
        Self {
            segment: segment.to_string(),
            ..Self::default()
        }
    }

    /// Segment this node is keyed by; empty for the root.
    pub fn segment(&self) -> &str {
        &self.segment
    }

    /// Help text: the namespace help, else the command summary.
    pub fn help(&self) -> Option<&str> {
        self.help.as_deref().or_else(|| {
            self.command
                .as_ref()
                .map(|command| command.summary())
                .filter(|summary| !summary.is_empty())
        })
    }

    /// Executable payload.
    pub fn command(&self) -> Option<&Arc<RegisteredCommand>> {
        self.command.as_ref()
    }

    /// Whether the node can be executed.
    pub fn is_executable(&self) -> bool {
        self.command.is_some()
    }

    /// Whether the node has children.
    pub fn is_namespace(&self) -> bool {
        !self.children.is_empty()
    }

    /// Child keyed by `segment`.
    pub fn child(&self, segment: &str) -> Option<&Arc<CommandNode>> {
        self.children.get(segment)
    }

    /// Children in segment order.
    pub fn children(&self) -> impl Iterator<Item = &Arc<CommandNode>> {
        self.children.values()
    }

    /// Child segments in order.
    pub fn child_names(&self) -> Vec<String> {
        self.children.keys().cloned().collect()
    }

    /// Node at `path` relative to this one.
    pub fn descend(&self, path: &[String]) -> Option<&CommandNode> {
        path.iter()
            .try_fold(self, |node, segment| node.child(segment).map(Arc::as_ref))
    }

    /// Every command at or below this node, depth-first in segment order.
    pub fn commands(&self) -> Vec<Arc<RegisteredCommand>> {
        let mut out = Vec::new();
        self.collect_commands(&mut out);
        out
    }

    fn collect_commands(&self, out: &mut Vec<Arc<RegisteredCommand>>) {
        if let Some(command) = &self.command {
            out.push(command.clone());
        }
        for child in self.children.values() {
            child.collect_commands(out);
        }
    }

    fn is_vacant(&self) -> bool {
        self.command.is_none() && self.help.is_none() && self.children.is_empty()
    }

    /// Walks `tokens` from this node as far as the trie allows.
    pub fn lookup_prefix(self: &Arc<Self>, tokens: &[String]) -> PrefixMatch {
        let mut node = Arc::clone(self);
        let mut consumed = 0;
        for token in tokens {
            let Some(child) = node.child(token).cloned() else {
                break;
            };
            node = child;
            consumed += 1;
        }
        PrefixMatch {
            node,
            consumed,
            path: CommandPath::from_segments(tokens[..consumed].iter().cloned()),
        }
    }
}

impl fmt::Debug for CommandNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandNode")
            .field("segment", &self.segment)
            .field("executable", &self.is_executable())
            .field("children", &self.children.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Deepest node reached by [`CommandNode::lookup_prefix`].
#[derive(Debug, Clone)]
pub struct PrefixMatch {
    /// Deepest node reached.
    pub node: Arc<CommandNode>,
    /// Number of tokens consumed from the input.
    pub consumed: usize,
    /// Path of `node` relative to where the walk started.
    pub path: CommandPath,
}

enum Payload {
    Command(Arc<RegisteredCommand>),
    Namespace(String),
}

fn with_inserted(
    node: &CommandNode,
    segments: &[String],
    payload: Payload,
    replace: bool,
    path: &CommandPath,
) -> Result<CommandNode, ShellError> {
    let mut next = node.clone();
    let Some((first, rest)) = segments.split_first() else {
        match payload {
            Payload::Command(command) => {
                if next.command.is_some() && !replace {
                    return Err(ShellError::Conflict { path: path.clone() });
                }
                next.command = Some(command);
            }
            Payload::Namespace(help) => next.help = Some(help),
        }
        return Ok(next);
    };
    let child = node
        .children
        .get(first)
        .map(|child| child.as_ref().clone())
        .unwrap_or_else(|| CommandNode::named(first));
    let child = with_inserted(&child, rest, payload, replace, path)?;
    next.children.insert(first.clone(), Arc::new(child));
    Ok(next)
}

#[derive(Clone, Copy)]
enum Removal<'a> {
    Subtree,
    CommandOnly,
    /// The command only while it is still this exact registration.
    Owned(&'a Arc<RegisteredCommand>),
}

/// Returns the rebuilt node, or `None` when nothing matched.
fn with_removed(node: &CommandNode, segments: &[String], removal: Removal<'_>) -> Option<CommandNode> {
    let (first, rest) = segments.split_first()?;
    let child = node.children.get(first)?;
    let mut next = node.clone();

    let replacement = if rest.is_empty() {
        match removal {
            Removal::Subtree => None,
            Removal::CommandOnly | Removal::Owned(_) => {
                let current = child.command.as_ref()?;
                if let Removal::Owned(owned) = removal {
                    if !Arc::ptr_eq(current, owned) {
                        return None;
                    }
                }
                let mut cleared = child.as_ref().clone();
                cleared.command = None;
                Some(cleared)
            }
        }
    } else {
        Some(with_removed(child, rest, removal)?)
    };

    match replacement {
        Some(child) if !child.is_vacant() => {
            next.children.insert(first.clone(), Arc::new(child));
        }
        _ => {
            next.children.remove(first);
        }
    }
    Some(next)
}

/// Shared, thread-safe command registry.
///
/// Cloning the registry clones a handle; every clone sees the same trie.
#[derive(Clone, Default)]
pub struct Registry {
    root: Arc<RwLock<Arc<CommandNode>>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consistent view of the whole trie.
    pub fn snapshot(&self) -> Arc<CommandNode> {
        Arc::clone(&self.root.read())
    }

    fn update<T>(
        &self,
        mutate: impl FnOnce(&CommandNode) -> Result<(CommandNode, T), ShellError>,
    ) -> Result<T, ShellError> {
        let mut root = self.root.write();
        let (next, out) = mutate(&root)?;
        *root = Arc::new(next);
        Ok(out)
    }

    /// Registers a command; fails with `Conflict` when the path is already executable.
    ///
    /// Missing intermediate nodes are created as implicit namespaces.
    pub fn register(&self, registration: CommandRegistration) -> Result<(), ShellError> {
        self.insert(registration, false)
    }

    /// Registers a command, replacing any command already at the path.
    pub fn replace(&self, registration: CommandRegistration) -> Result<(), ShellError> {
        self.insert(registration, true)
    }

    fn insert(&self, registration: CommandRegistration, replace: bool) -> Result<(), ShellError> {
        let command = Arc::new(registration.into_command()?);
        let path = command.path().clone();
        self.update(|root| {
            let next = with_inserted(
                root,
                path.segments(),
                Payload::Command(command),
                replace,
                &path,
            )?;
            Ok((next, ()))
        })?;
        tracing::debug!(path = %path, replace, "registered command");
        Ok(())
    }

    /// Creates (or re-describes) a namespace node carrying `help`.
    pub fn register_namespace(
        &self,
        path: impl Into<CommandPath>,
        help: impl Into<String>,
    ) -> Result<(), ShellError> {
        let path = path.into();
        if path.is_root() || !path.segments().iter().all(|segment| valid_segment(segment)) {
            return Err(ShellError::InvalidRegistration {
                path,
                reason: "namespace paths need one or more valid segments".to_string(),
            });
        }
        let help = help.into();
        self.update(|root| {
            let next = with_inserted(root, path.segments(), Payload::Namespace(help), false, &path)?;
            Ok((next, ()))
        })?;
        tracing::debug!(path = %path, "registered namespace");
        Ok(())
    }

    /// Removes the node at `path` and its whole subtree, pruning emptied ancestors.
    pub fn unregister(&self, path: &CommandPath) -> Result<(), ShellError> {
        self.remove(path, Removal::Subtree)
    }

    /// Removes only the command at `path`, keeping any children.
    pub fn unregister_command(&self, path: &CommandPath) -> Result<(), ShellError> {
        self.remove(path, Removal::CommandOnly)
    }

    fn remove(&self, path: &CommandPath, removal: Removal<'_>) -> Result<(), ShellError> {
        self.update(|root| {
            let next = with_removed(root, path.segments(), removal)
                .ok_or_else(|| ShellError::NotFound { path: path.clone() })?;
            Ok((next, ()))
        })?;
        tracing::debug!(path = %path, "unregistered");
        Ok(())
    }

    /// Removes each command that is still the registration in `commands`, in one swap.
    ///
    /// Paths since replaced or removed by someone else are left alone. Returns how many
    /// commands were removed.
    fn remove_owned(&self, commands: &[Arc<RegisteredCommand>]) -> usize {
        let mut root = self.root.write();
        let mut next = CommandNode::clone(&root);
        let mut removed = 0;
        for command in commands {
            if let Some(pruned) =
                with_removed(&next, command.path().segments(), Removal::Owned(command))
            {
                next = pruned;
                removed += 1;
            }
        }
        if removed > 0 {
            *root = Arc::new(next);
        }
        removed
    }

    /// Walks `tokens` from the root as far as the current trie allows.
    pub fn lookup_prefix(&self, tokens: &[String]) -> PrefixMatch {
        self.snapshot().lookup_prefix(tokens)
    }

    /// Child segments of the node at `path`.
    pub fn list_children(&self, path: &CommandPath) -> Result<Vec<String>, ShellError> {
        self.snapshot()
            .descend(path.segments())
            .map(CommandNode::child_names)
            .ok_or_else(|| ShellError::NotFound { path: path.clone() })
    }

    /// Whether a node exists at `path`.
    pub fn contains(&self, path: &CommandPath) -> bool {
        self.snapshot().descend(path.segments()).is_some()
    }

    /// Command registered at `path`.
    pub fn command(&self, path: &CommandPath) -> Option<Arc<RegisteredCommand>> {
        self.snapshot()
            .descend(path.segments())
            .and_then(|node| node.command().cloned())
    }

    /// Every registered command, depth-first in segment order.
    pub fn commands(&self) -> Vec<Arc<RegisteredCommand>> {
        self.snapshot().commands()
    }

    /// Registers every command a plugin contributes, all or nothing.
    ///
    /// The returned handle removes those commands again on [`PluginHandle::unload`] or drop.
    pub fn load_plugin(&self, plugin: &dyn Plugin) -> Result<PluginHandle, ShellError> {
        let commands = plugin
            .commands()
            .into_iter()
            .map(|registration| registration.into_command().map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;
        let paths = commands
            .iter()
            .map(|command| command.path().clone())
            .collect::<Vec<_>>();

        self.update(|root| {
            let mut next = root.clone();
            for command in &commands {
                let path = command.path();
                next = with_inserted(
                    &next,
                    path.segments(),
                    Payload::Command(Arc::clone(command)),
                    false,
                    path,
                )?;
            }
            Ok((next, ()))
        })?;
        tracing::info!(plugin = plugin.name(), commands = paths.len(), "loaded plugin");

        Ok(PluginHandle {
            registry: self.clone(),
            name: plugin.name().to_string(),
            paths,
            commands,
            active: Arc::new(AtomicBool::new(true)),
        })
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("root", &self.snapshot())
            .finish()
    }
}

/// A bundle of commands loaded together.
pub trait Plugin: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Commands to register.
    fn commands(&self) -> Vec<CommandRegistration>;
}

/// Drop-based handle for a loaded plugin.
#[derive(Debug)]
pub struct PluginHandle {
    registry: Registry,
    name: String,
    paths: Vec<CommandPath>,
    commands: Vec<Arc<RegisteredCommand>>,
    active: Arc<AtomicBool>,
}

impl PluginHandle {
    /// Plugin name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Paths the plugin registered.
    pub fn paths(&self) -> &[CommandPath] {
        &self.paths
    }

    /// Removes the plugin's commands if they are still loaded.
    ///
    /// Commands another party already removed or replaced are skipped.
    pub fn unload(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        let removed = self.registry.remove_owned(&self.commands);
        if removed < self.commands.len() {
            tracing::debug!(
                plugin = %self.name,
                skipped = self.commands.len() - removed,
                "plugin commands already removed or replaced"
            );
        }
        tracing::info!(plugin = %self.name, removed, "unloaded plugin");
    }
}

impl Drop for PluginHandle {
    fn drop(&mut self) {
        self.unload();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{binder::BoundArguments, command::HandlerResult, context::CommandContext};
    use pretty_assertions::assert_eq;

    async fn noop(_args: BoundArguments, _ctx: CommandContext) -> HandlerResult {
        Ok(None)
    }

    fn command(path: &str) -> CommandRegistration {
        CommandRegistration::new(path, noop).summary(format!("run {path}"))
    }

    fn tokens(raw: &str) -> Vec<String> {
        raw.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn register_creates_implicit_namespaces() {
        let registry = Registry::new();
        registry.register(command("db query")).expect("register");
        let db = CommandPath::new("db");
        assert!(registry.contains(&db));
        assert!(registry.command(&db).is_none());
        assert_eq!(registry.list_children(&db).expect("children"), vec!["query"]);
        assert_eq!(
            registry.list_children(&CommandPath::root()).expect("root"),
            vec!["db"]
        );
    }

    #[test]
    fn second_registration_conflicts_unless_replacing() {
        let registry = Registry::new();
        registry.register(command("greet")).expect("register");
        assert_eq!(
            registry.register(command("greet")),
            Err(ShellError::Conflict {
                path: CommandPath::new("greet")
            })
        );
        registry
            .replace(command("greet").summary("new"))
            .expect("replace");
        let greet = registry.command(&CommandPath::new("greet")).expect("greet");
        assert_eq!(greet.summary(), "new");
    }

    #[test]
    fn node_can_be_command_and_namespace() {
        let registry = Registry::new();
        registry.register(command("db query")).expect("register");
        registry.register(command("db")).expect("register db");
        let root = registry.snapshot();
        let db = root.child("db").expect("db");
        assert!(db.is_executable());
        assert!(db.is_namespace());
    }

    #[test]
    fn lookup_prefix_stops_at_first_unknown_segment() {
        let registry = Registry::new();
        registry.register(command("db query")).expect("register");
        let found = registry.lookup_prefix(&tokens("db qury x"));
        assert_eq!(found.consumed, 1);
        assert_eq!(found.path, CommandPath::new("db"));
        assert!(!found.node.is_executable());
    }

    #[test]
    fn unregister_removes_subtree_and_prunes_implicit_ancestors() {
        let registry = Registry::new();
        registry.register(command("a b c")).expect("register");
        registry.unregister(&CommandPath::new("a b c")).expect("unregister");
        assert!(!registry.contains(&CommandPath::new("a")));

        registry.register(command("db query")).expect("register");
        registry.register(command("db migrate")).expect("register");
        registry.unregister(&CommandPath::new("db")).expect("unregister");
        assert!(registry.commands().is_empty());
        assert_eq!(
            registry.unregister(&CommandPath::new("db")),
            Err(ShellError::NotFound {
                path: CommandPath::new("db")
            })
        );
    }

    #[test]
    fn described_namespaces_survive_pruning() {
        let registry = Registry::new();
        registry.register_namespace("db", "Database tools").expect("namespace");
        registry.register(command("db query")).expect("register");
        registry.unregister(&CommandPath::new("db query")).expect("unregister");
        let root = registry.snapshot();
        assert_eq!(root.child("db").and_then(|db| db.help()), Some("Database tools"));
    }

    #[test]
    fn snapshots_are_unaffected_by_later_mutation() {
        let registry = Registry::new();
        registry.register(command("greet")).expect("register");
        let before = registry.snapshot();
        registry.unregister(&CommandPath::new("greet")).expect("unregister");
        assert!(before.child("greet").is_some());
        assert!(registry.snapshot().child("greet").is_none());
    }

    struct Db;

    impl Plugin for Db {
        fn name(&self) -> &str {
            "db"
        }

        fn commands(&self) -> Vec<CommandRegistration> {
            vec![command("db query"), command("db migrate")]
        }
    }

    #[test]
    fn plugin_load_is_all_or_nothing() {
        let registry = Registry::new();
        registry.register(command("db migrate")).expect("register");
        let err = registry.load_plugin(&Db).expect_err("conflict");
        assert!(matches!(err, ShellError::Conflict { .. }));
        assert!(!registry.contains(&CommandPath::new("db query")));
    }

    #[test]
    fn plugin_handle_unloads_on_drop() {
        let registry = Registry::new();
        registry.register(command("db status")).expect("register");
        {
            let handle = registry.load_plugin(&Db).expect("load");
            assert_eq!(handle.paths().len(), 2);
            assert_eq!(
                registry.list_children(&CommandPath::new("db")).expect("db"),
                vec!["migrate", "query", "status"]
            );
        }
        assert_eq!(
            registry.list_children(&CommandPath::new("db")).expect("db"),
            vec!["status"]
        );
    }

    #[test]
    fn plugin_unload_keeps_children_registered_by_others() {
        struct Parent;
        impl Plugin for Parent {
            fn name(&self) -> &str {
                "parent"
            }
            fn commands(&self) -> Vec<CommandRegistration> {
                vec![command("db")]
            }
        }

        let registry = Registry::new();
        let handle = registry.load_plugin(&Parent).expect("load");
        registry.register(command("db query")).expect("register");
        handle.unload();
        assert!(registry.command(&CommandPath::new("db")).is_none());
        assert!(registry.command(&CommandPath::new("db query")).is_some());
    }
}
