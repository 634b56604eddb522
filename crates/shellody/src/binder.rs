//! Binds argument tokens against an [`ArgumentSchema`].
//!
//! Grammar, applied left to right:
//!
//! - `--` ends option parsing; every later token is positional;
//! - `--name` names a flag or option and `--name=value` supplies the value inline;
//! - `-x` names a short alias, `-xyz` is a cluster of short flags, and an option inside a
//!   cluster takes the rest of the cluster (`-n5`) or the next token (`-n 5`) as its value;
//! - a token is option-like when it starts with `-`, is longer than one character, and the
//!   character after the dash is not a digit or `.`, so `-5` and `-.5` stay positional;
//! - an option always consumes the next token as its value, even when it looks like an option;
//! - repeating a non-variadic option keeps the last value, repeating a variadic option
//!   collects every value.
//!
//! Errors are reported in a fixed order: partition errors (unknown option, missing option
//! value), then surplus positionals, then missing required parameters in schema order, then
//! type errors in schema order.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use shellody_contract::{ArgValue, ArgumentSchema, ParamKind, ParamSpec, ShellError, ValueType};

/// Typed values keyed by parameter name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BoundArguments {
    values: BTreeMap<String, ArgValue>,
}

impl BoundArguments {
    /// Value bound to `name`.
    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.values.get(name)
    }

    /// Whether `name` has a value, explicit or default.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// String or choice value.
    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ArgValue::as_str)
    }

    /// Integer value.
    pub fn i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(ArgValue::as_i64)
    }

    /// Float value; integers widen.
    pub fn f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(ArgValue::as_f64)
    }

    /// Flag value; absent or non-boolean parameters read as `false`.
    pub fn flag(&self, name: &str) -> bool {
        self.get(name).and_then(ArgValue::as_bool).unwrap_or(false)
    }

    /// Items of a variadic value; empty when absent.
    pub fn list(&self, name: &str) -> &[ArgValue] {
        self.get(name).and_then(ArgValue::as_list).unwrap_or(&[])
    }

    /// Items of a variadic value rendered as text.
    pub fn strings(&self, name: &str) -> Vec<String> {
        self.list(name).iter().map(ToString::to_string).collect()
    }

    /// Iterates values in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArgValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Number of bound parameters.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// JSON object of every bound value.
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.values
                .iter()
                .map(|(name, value)| (name.clone(), value.to_json()))
                .collect(),
        )
    }
}

impl<S: Into<String>> FromIterator<(S, ArgValue)> for BoundArguments {
    fn from_iter<T: IntoIterator<Item = (S, ArgValue)>>(iter: T) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        }
    }
}

/// Returns whether a token names a flag or option rather than a positional value.
pub fn is_option_like(token: &str) -> bool {
    let Some(rest) = token.strip_prefix('-') else {
        return false;
    };
    match rest.chars().next() {
        None => false,
        Some(next) => !(next.is_ascii_digit() || next == '.'),
    }
}

/// Result of walking the tokens once.
struct Walk<'a> {
    named: Vec<(&'a ParamSpec, Option<String>)>,
    positionals: Vec<String>,
    pending: Option<&'a ParamSpec>,
    options_done: bool,
}

/// Splits tokens into named occurrences and positionals.
///
/// In strict mode unknown options and options missing their value are errors. In lenient
/// mode, used for completion, unknown options are skipped and a trailing option waiting for
/// its value is reported through `pending`.
fn walk<'a>(
    schema: &'a ArgumentSchema,
    tokens: &[String],
    strict: bool,
) -> Result<Walk<'a>, ShellError> {
    let mut walk = Walk {
        named: Vec::new(),
        positionals: Vec::new(),
        pending: None,
        options_done: false,
    };
    let mut tokens = tokens.iter();

    while let Some(token) = tokens.next() {
        if walk.options_done || !is_option_like(token) {
            walk.positionals.push(token.clone());
            continue;
        }
        if token == "--" {
            walk.options_done = true;
            continue;
        }

        if let Some(long) = token.strip_prefix("--") {
            let (name, inline) = match long.split_once('=') {
                Some((name, value)) => (name, Some(value.to_string())),
                None => (long, None),
            };
            let Some(param) = schema.find_long(name) else {
                if strict {
                    return Err(ShellError::UnknownOption {
                        option: format!("--{name}"),
                    });
                }
                continue;
            };
            if param.kind == ParamKind::Flag || inline.is_some() {
                walk.named.push((param, inline));
                continue;
            }
            match tokens.next() {
                Some(value) => walk.named.push((param, Some(value.clone()))),
                None if strict => {
                    return Err(ShellError::MissingValue {
                        name: param.name.clone(),
                    })
                }
                None => walk.pending = Some(param),
            }
            continue;
        }

        let cluster = &token[1..];
        for (offset, short) in cluster.char_indices() {
            let Some(param) = schema.find_short(short) else {
                if strict {
                    return Err(ShellError::UnknownOption {
                        option: format!("-{short}"),
                    });
                }
                continue;
            };
            if param.kind == ParamKind::Flag {
                walk.named.push((param, None));
                continue;
            }
            let attached = &cluster[offset + short.len_utf8()..];
            if !attached.is_empty() {
                walk.named.push((param, Some(attached.to_string())));
            } else {
                match tokens.next() {
                    Some(value) => walk.named.push((param, Some(value.clone()))),
                    None if strict => {
                        return Err(ShellError::MissingValue {
                            name: param.name.clone(),
                        })
                    }
                    None => walk.pending = Some(param),
                }
            }
            break;
        }
    }

    Ok(walk)
}

/// Binds `tokens` against `schema`.
pub fn bind(schema: &ArgumentSchema, tokens: &[String]) -> Result<BoundArguments, ShellError> {
    let walk = walk(schema, tokens, true)?;

    let mut raw: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    let mut surplus = walk.positionals.into_iter();
    for param in schema.positionals() {
        let taken: Vec<String> = if param.variadic {
            surplus.by_ref().collect()
        } else {
            surplus.next().into_iter().collect()
        };
        if !taken.is_empty() {
            raw.insert(param.name.as_str(), taken);
        }
    }
    if let Some(unexpected) = surplus.next() {
        return Err(ShellError::TooManyArguments { unexpected });
    }

    let mut flags: BTreeMap<&str, Option<String>> = BTreeMap::new();
    for (param, value) in walk.named {
        match param.kind {
            ParamKind::Flag => {
                flags.insert(param.name.as_str(), value);
            }
            _ => {
                let values = raw.entry(param.name.as_str()).or_default();
                if !param.variadic {
                    values.clear();
                }
                values.extend(value);
            }
        }
    }

    if let Some(missing) = schema.params().iter().find(|param| {
        param.required && !raw.contains_key(param.name.as_str()) && param.default.is_none()
    }) {
        return Err(ShellError::MissingArgument {
            name: missing.name.clone(),
        });
    }

    let mut bound = BTreeMap::new();
    for param in schema.params() {
        let name = param.name.as_str();
        if param.kind == ParamKind::Flag {
            let value = match flags.get(name) {
                None => param.default.clone().unwrap_or(ArgValue::Boolean(false)),
                Some(None) => ArgValue::Boolean(true),
                Some(Some(raw)) => convert(param, &ValueType::Boolean, raw)?,
            };
            bound.insert(param.name.clone(), value);
            continue;
        }
        match raw.get(name) {
            Some(values) if param.variadic => {
                let items = values
                    .iter()
                    .map(|value| convert(param, &param.value_type, value))
                    .collect::<Result<Vec<_>, _>>()?;
                bound.insert(param.name.clone(), ArgValue::List(items));
            }
            Some(values) => {
                if let Some(value) = values.last() {
                    bound.insert(param.name.clone(), convert(param, &param.value_type, value)?);
                }
            }
            None => {
                if let Some(default) = &param.default {
                    bound.insert(param.name.clone(), default.clone());
                }
            }
        }
    }

    Ok(BoundArguments { values: bound })
}

fn convert(param: &ParamSpec, value_type: &ValueType, raw: &str) -> Result<ArgValue, ShellError> {
    value_type.convert(raw).ok_or_else(|| ShellError::Type {
        name: param.name.clone(),
        raw: raw.to_string(),
        expected: value_type.describe(),
    })
}

/// What the word under the cursor should complete to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompletionTarget<'a> {
    /// The word starts with `-`; offer flag and option names.
    OptionName,
    /// The previous token is an option waiting for its value.
    OptionValue(&'a ParamSpec),
    /// The word fills this positional parameter.
    Positional(&'a ParamSpec),
    /// Every parameter is already filled.
    Nothing,
}

/// Decides which parameter the word under the cursor belongs to.
///
/// `completed` are the argument tokens before the current word; `current` is the text typed
/// so far. Never fails.
pub fn completion_target<'a>(
    schema: &'a ArgumentSchema,
    completed: &[String],
    current: &str,
) -> CompletionTarget<'a> {
    let Ok(walk) = walk(schema, completed, false) else {
        return CompletionTarget::Nothing;
    };
    if let Some(param) = walk.pending {
        return CompletionTarget::OptionValue(param);
    }
    if !walk.options_done && current.starts_with('-') && (current == "-" || is_option_like(current))
    {
        return CompletionTarget::OptionName;
    }
    let filled = walk.positionals.len();
    let target = schema
        .positionals()
        .filter(|param| !param.variadic)
        .nth(filled)
        .or_else(|| schema.positionals().find(|param| param.variadic));
    target.map_or(CompletionTarget::Nothing, CompletionTarget::Positional)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tokens(raw: &str) -> Vec<String> {
        raw.split_whitespace().map(str::to_string).collect()
    }

    fn greet() -> ArgumentSchema {
        ArgumentSchema::new()
            .param(ParamSpec::positional("name", ValueType::String))
            .param(ParamSpec::flag("loud").short('l'))
    }

    #[test]
    fn binds_positional_and_flag() {
        let bound = bind(&greet(), &tokens("Ada --loud")).expect("bind");
        assert_eq!(bound.str("name"), Some("Ada"));
        assert!(bound.flag("loud"));
    }

    #[test]
    fn absent_flag_binds_false() {
        let bound = bind(&greet(), &tokens("Ada")).expect("bind");
        assert_eq!(bound.get("loud"), Some(&ArgValue::Boolean(false)));
    }

    #[test]
    fn flag_accepts_inline_boolean() {
        let bound = bind(&greet(), &tokens("Ada --loud=off")).expect("bind");
        assert!(!bound.flag("loud"));
        let err = bind(&greet(), &tokens("Ada --loud=maybe")).expect_err("bad bool");
        assert!(matches!(err, ShellError::Type { .. }));
    }

    #[test]
    fn missing_required_positional() {
        assert_eq!(
            bind(&greet(), &[]),
            Err(ShellError::MissingArgument {
                name: "name".to_string()
            })
        );
    }

    #[test]
    fn surplus_positional_is_reported_before_missing() {
        let schema = ArgumentSchema::new().param(ParamSpec::option("count", ValueType::Integer).required());
        assert_eq!(
            bind(&schema, &tokens("extra")),
            Err(ShellError::TooManyArguments {
                unexpected: "extra".to_string()
            })
        );
        assert_eq!(
            bind(&greet(), &tokens("Ada Bob")),
            Err(ShellError::TooManyArguments {
                unexpected: "Bob".to_string()
            })
        );
    }

    #[test]
    fn missing_is_reported_before_type_errors() {
        let schema = ArgumentSchema::new()
            .param(ParamSpec::option("limit", ValueType::Integer))
            .param(ParamSpec::positional("sql", ValueType::String));
        assert_eq!(
            bind(&schema, &tokens("--limit ten")),
            Err(ShellError::MissingArgument {
                name: "sql".to_string()
            })
        );
        assert_eq!(
            bind(&schema, &tokens("--limit ten select")),
            Err(ShellError::Type {
                name: "limit".to_string(),
                raw: "ten".to_string(),
                expected: "integer".to_string(),
            })
        );
    }

    #[test]
    fn unknown_option_and_missing_value() {
        assert_eq!(
            bind(&greet(), &tokens("Ada --quiet")),
            Err(ShellError::UnknownOption {
                option: "--quiet".to_string()
            })
        );
        let schema = ArgumentSchema::new().param(ParamSpec::option("limit", ValueType::Integer));
        assert_eq!(
            bind(&schema, &tokens("--limit")),
            Err(ShellError::MissingValue {
                name: "limit".to_string()
            })
        );
    }

    #[test]
    fn double_dash_ends_option_parsing() {
        let bound = bind(&greet(), &tokens("-- --loud")).expect("bind");
        assert_eq!(bound.str("name"), Some("--loud"));
        assert!(!bound.flag("loud"));
    }

    #[test]
    fn negative_numbers_are_positional() {
        let schema = ArgumentSchema::new().param(ParamSpec::positional("delta", ValueType::Float));
        let bound = bind(&schema, &tokens("-2.5")).expect("bind");
        assert_eq!(bound.f64("delta"), Some(-2.5));
    }

    #[test]
    fn options_take_inline_attached_or_next_values() {
        let schema = ArgumentSchema::new()
            .param(ParamSpec::option("limit", ValueType::Integer).short('n'))
            .param(ParamSpec::flag("verbose").short('v'));
        for line in ["--limit=5", "--limit 5", "-n5", "-n 5", "-vn5", "-vn 5"] {
            let bound = bind(&schema, &tokens(line)).expect(line);
            assert_eq!(bound.i64("limit"), Some(5), "{line}");
        }
        assert!(bind(&schema, &tokens("-vn5")).expect("bind").flag("verbose"));
    }

    #[test]
    fn option_consumes_dash_prefixed_value() {
        let schema = ArgumentSchema::new().param(ParamSpec::option("pattern", ValueType::String));
        let bound = bind(&schema, &tokens("--pattern --x")).expect("bind");
        assert_eq!(bound.str("pattern"), Some("--x"));
    }

    #[test]
    fn repeated_option_keeps_last_unless_variadic() {
        let schema = ArgumentSchema::new()
            .param(ParamSpec::option("limit", ValueType::Integer))
            .param(ParamSpec::option("tag", ValueType::String).variadic());
        let bound = bind(&schema, &tokens("--limit 1 --tag a --limit 2 --tag b")).expect("bind");
        assert_eq!(bound.i64("limit"), Some(2));
        assert_eq!(bound.strings("tag"), vec!["a", "b"]);
    }

    #[test]
    fn variadic_positional_collects_surplus() {
        let schema = ArgumentSchema::new()
            .param(ParamSpec::positional("target", ValueType::String))
            .param(ParamSpec::positional("files", ValueType::String).optional().variadic());
        let bound = bind(&schema, &tokens("out a b c")).expect("bind");
        assert_eq!(bound.str("target"), Some("out"));
        assert_eq!(bound.strings("files"), vec!["a", "b", "c"]);

        let bound = bind(&schema, &tokens("out")).expect("bind");
        assert!(!bound.contains("files"));
        assert!(bound.list("files").is_empty());
    }

    #[test]
    fn defaults_fill_absent_parameters() {
        let schema = ArgumentSchema::new()
            .param(ParamSpec::option("limit", ValueType::Integer).with_default(10))
            .param(ParamSpec::positional("env", ValueType::String).with_default("dev"));
        let bound = bind(&schema, &[]).expect("bind");
        assert_eq!(bound.i64("limit"), Some(10));
        assert_eq!(bound.str("env"), Some("dev"));
    }

    #[test]
    fn choice_values_are_checked() {
        let schema = ArgumentSchema::new().param(ParamSpec::positional(
            "format",
            ValueType::Choice(vec!["json".to_string(), "plain".to_string()]),
        ));
        assert_eq!(bind(&schema, &tokens("plain")).expect("bind").str("format"), Some("plain"));
        assert_eq!(
            bind(&schema, &tokens("yaml")),
            Err(ShellError::Type {
                name: "format".to_string(),
                raw: "yaml".to_string(),
                expected: "one of json|plain".to_string(),
            })
        );
    }

    #[test]
    fn bound_arguments_render_as_json() {
        let bound = bind(&greet(), &tokens("Ada")).expect("bind");
        assert_eq!(bound.to_json(), serde_json::json!({"loud": false, "name": "Ada"}));
    }

    #[test]
    fn completion_target_follows_the_grammar() {
        let schema = ArgumentSchema::new()
            .param(ParamSpec::positional("table", ValueType::String))
            .param(ParamSpec::positional("columns", ValueType::String).optional().variadic())
            .param(ParamSpec::option("limit", ValueType::Integer).short('n'))
            .param(ParamSpec::flag("all"));

        assert_eq!(completion_target(&schema, &[], "--"), CompletionTarget::OptionName);
        assert_eq!(completion_target(&schema, &[], "-"), CompletionTarget::OptionName);
        assert!(matches!(
            completion_target(&schema, &[], "us"),
            CompletionTarget::Positional(param) if param.name == "table"
        ));
        assert!(matches!(
            completion_target(&schema, &tokens("users --all id"), ""),
            CompletionTarget::Positional(param) if param.name == "columns"
        ));
        assert!(matches!(
            completion_target(&schema, &tokens("users --limit"), ""),
            CompletionTarget::OptionValue(param) if param.name == "limit"
        ));
        assert!(matches!(
            completion_target(&schema, &tokens("--bogus"), ""),
            CompletionTarget::Positional(param) if param.name == "table"
        ));
        assert!(matches!(
            completion_target(&schema, &tokens("--"), "-x"),
            CompletionTarget::Positional(param) if param.name == "table"
        ));
    }

    #[test]
    fn completion_target_is_nothing_when_full() {
        assert_eq!(
            completion_target(&greet(), &tokens("Ada"), ""),
            CompletionTarget::Nothing
        );
    }
}
