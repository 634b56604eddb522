use std::sync::Arc;

use shellody_contract::{CommandPath, ShellError};

use crate::{
    command::RegisteredCommand,
    registry::{CommandNode, PrefixMatch},
};

const MAX_SUGGESTIONS: usize = 5;
const MAX_EDIT_DISTANCE: usize = 2;

/// A token sequence matched to an executable command.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Resolved command.
    pub command: Arc<RegisteredCommand>,
    /// Tokens after the command path.
    pub args: Vec<String>,
}

impl Resolution {
    /// Whether the arguments ask for help the command does not handle itself.
    ///
    /// Only tokens before a `--` separator count.
    pub fn wants_help(&self) -> bool {
        !self.command.declares_help()
            && self
                .args
                .iter()
                .take_while(|arg| arg.as_str() != "--")
                .any(|arg| arg == "--help" || arg == "-h")
    }
}

/// Resolves `tokens` to the deepest executable node.
///
/// A non-root `namespace` is tried first, so `query` inside `db` finds `db query`; the root
/// is the fallback. The deepest executable node on the walked prefix wins, which lets a node
/// be both a namespace and a command.
pub fn resolve(
    root: &Arc<CommandNode>,
    namespace: &CommandPath,
    tokens: &[String],
) -> Result<Resolution, ShellError> {
    let mut attempts = Vec::with_capacity(2);
    if !namespace.is_root() {
        let mut scoped = namespace.segments().to_vec();
        scoped.extend_from_slice(tokens);
        if let Some(resolution) = executable(root, &scoped, namespace.len(), &mut attempts) {
            return Ok(resolution);
        }
    }
    if let Some(resolution) = executable(root, tokens, 0, &mut attempts) {
        return Ok(resolution);
    }

    // Report against the attempt that got furthest into what the user typed.
    let (base, best) = attempts
        .into_iter()
        .max_by_key(|(base, found)| found.consumed - base)
        .unwrap_or_else(|| (0, root.lookup_prefix(&[])));
    let typed = best.consumed - base;
    let next = tokens.get(typed).map(String::as_str);
    let suggestions = match next {
        Some(next) => suggest(&best.node, next),
        None => best.node.child_names(),
    };
    tracing::debug!(input = ?tokens, prefix = %best.path, "unknown command");
    Err(ShellError::UnknownCommand {
        input: tokens.join(" "),
        longest_prefix: best.path,
        suggestions,
    })
}

/// Walks `tokens` and backs off to the deepest executable node at least one segment past
/// `base`.
fn executable(
    root: &Arc<CommandNode>,
    tokens: &[String],
    base: usize,
    attempts: &mut Vec<(usize, PrefixMatch)>,
) -> Option<Resolution> {
    let found = root.lookup_prefix(tokens);
    if found.consumed < base {
        return None;
    }
    let resolution = (base + 1..=found.consumed).rev().find_map(|depth| {
        let node = root.descend(&tokens[..depth])?;
        let command = node.command()?.clone();
        Some(Resolution {
            command,
            args: tokens[depth..].to_vec(),
        })
    });
    if resolution.is_none() {
        attempts.push((base, found));
    }
    resolution
}

/// Child names close to `typed`: a prefix match or within a small edit distance.
pub fn suggest(node: &CommandNode, typed: &str) -> Vec<String> {
    let mut scored = node
        .child_names()
        .into_iter()
        .filter_map(|name| {
            let distance = levenshtein(&name, typed);
            (distance <= MAX_EDIT_DISTANCE || name.starts_with(typed)).then_some((distance, name))
        })
        .collect::<Vec<_>>();
    scored.sort();
    scored
        .into_iter()
        .take(MAX_SUGGESTIONS)
        .map(|(_, name)| name)
        .collect()
}

fn levenshtein(left: &str, right: &str) -> usize {
    let right = right.chars().collect::<Vec<_>>();
    let mut previous = (0..=right.len()).collect::<Vec<_>>();
    let mut current = vec![0; right.len() + 1];
    for (i, lc) in left.chars().enumerate() {
        current[0] = i + 1;
        for (j, rc) in right.iter().enumerate() {
            let substitution = previous[j] + usize::from(lc != *rc);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[right.len()]
}
