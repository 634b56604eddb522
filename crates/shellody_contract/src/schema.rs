use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::value::{ArgValue, ValueType};

/// How a parameter is supplied on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParamKind {
    /// Matched by position.
    Positional,
    /// `--name` with no value; binds to a boolean.
    Flag,
    /// `--name <value>` or `--name=value`.
    Option,
}

/// One parameter descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Parameter name; also the long option name for flags and options.
    pub name: String,
    /// Positional, flag, or option.
    pub kind: ParamKind,
    /// Declared value type.
    pub value_type: ValueType,
    /// Whether binding fails when the parameter is absent.
    pub required: bool,
    /// Value used when the parameter is absent.
    pub default: Option<ArgValue>,
    /// Whether the parameter collects several values into a list.
    pub variadic: bool,
    /// Optional one-letter alias for flags and options.
    pub short: Option<char>,
    /// One-line description for help output.
    pub summary: String,
}

impl ParamSpec {
    fn new(name: impl Into<String>, kind: ParamKind, value_type: ValueType, required: bool) -> Self {
        Self {
            name: name.into(),
            kind,
            value_type,
            required,
            default: None,
            variadic: false,
            short: None,
            summary: String::new(),
        }
    }

    /// Required positional parameter.
    pub fn positional(name: impl Into<String>, value_type: ValueType) -> Self {
        Self::new(name, ParamKind::Positional, value_type, true)
    }

    /// Boolean flag; absent flags bind to `false`.
    pub fn flag(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Flag, ValueType::Boolean, false)
    }

    /// Optional named option taking one value.
    pub fn option(name: impl Into<String>, value_type: ValueType) -> Self {
        Self::new(name, ParamKind::Option, value_type, false)
    }

    /// Marks the parameter optional.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Marks the parameter required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Collects every surplus positional (or every repetition of an option) into a list.
    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    /// Sets a default value; a parameter with a default is never required.
    pub fn with_default(mut self, value: impl Into<ArgValue>) -> Self {
        self.default = Some(value.into());
        self.required = false;
        self
    }

    /// Sets the one-letter alias.
    pub fn short(mut self, short: char) -> Self {
        self.short = Some(short);
        self
    }

    /// Sets the help summary.
    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    /// Returns whether this is a positional parameter.
    pub fn is_positional(&self) -> bool {
        self.kind == ParamKind::Positional
    }

    /// Returns whether the parameter consumes a value token after its name.
    pub fn takes_value(&self) -> bool {
        self.kind == ParamKind::Option
    }

    /// Usage fragment such as `<name>`, `[paths...]` or `[--count <integer>]`.
    pub fn usage(&self) -> String {
        let ellipsis = if self.variadic { "..." } else { "" };
        let body = match self.kind {
            ParamKind::Positional => {
                if self.required {
                    return format!("<{}>{ellipsis}", self.name);
                }
                return format!("[{}]{ellipsis}", self.name);
            }
            ParamKind::Flag => format!("--{}", self.name),
            ParamKind::Option => format!("--{} <{}>{ellipsis}", self.name, self.value_type.describe()),
        };
        if self.required {
            body
        } else {
            format!("[{body}]")
        }
    }
}

/// Schema validation failures, reported at registration time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// A parameter name is empty, contains whitespace, or starts with `-`.
    #[error("invalid parameter name `{0}`")]
    InvalidName(String),
    /// Two parameters share a name.
    #[error("duplicate parameter `{0}`")]
    DuplicateName(String),
    /// Two flags or options share a short alias.
    #[error("duplicate short option `-{0}`")]
    DuplicateShort(char),
    /// A short alias was set on a positional parameter, or is not alphabetic.
    #[error("invalid short option on `{0}`")]
    InvalidShort(String),
    /// More than one variadic positional.
    #[error("only one variadic positional is allowed (`{first}` and `{second}`)")]
    MultipleVariadic {
        /// First variadic positional.
        first: String,
        /// Second variadic positional.
        second: String,
    },
    /// A positional follows the variadic positional.
    #[error("variadic positional `{0}` must be the last positional")]
    VariadicNotLast(String),
    /// A required positional follows an optional one.
    #[error("required positional `{required}` follows optional `{optional}`")]
    RequiredAfterOptional {
        /// The offending required positional.
        required: String,
        /// The earlier optional positional.
        optional: String,
    },
    /// Flags are boolean switches and cannot be required or variadic.
    #[error("flag `{0}` cannot be required or variadic")]
    InvalidFlag(String),
    /// A choice type with no choices.
    #[error("choice parameter `{0}` has no choices")]
    EmptyChoice(String),
    /// A parameter with a default is optional and cannot also be required.
    #[error("parameter `{0}` has a default and cannot be required")]
    RequiredWithDefault(String),
    /// A default that does not fit the declared type.
    #[error("default for `{name}` is not a valid {expected}")]
    DefaultTypeMismatch {
        /// Parameter name.
        name: String,
        /// Declared type.
        expected: String,
    },
}

/// Ordered parameter list for one command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArgumentSchema {
    params: Vec<ParamSpec>,
}

impl ArgumentSchema {
    /// Empty schema; the command accepts no arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one parameter.
    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    /// All parameters in declaration order.
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Returns whether the schema declares no parameters.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Positional parameters in order.
    pub fn positionals(&self) -> impl Iterator<Item = &ParamSpec> {
        self.params.iter().filter(|param| param.is_positional())
    }

    /// Flags and options in order.
    pub fn named(&self) -> impl Iterator<Item = &ParamSpec> {
        self.params.iter().filter(|param| !param.is_positional())
    }

    /// Looks up a parameter by name.
    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|param| param.name == name)
    }

    /// Looks up a flag or option by long name.
    pub fn find_long(&self, name: &str) -> Option<&ParamSpec> {
        self.named().find(|param| param.name == name)
    }

    /// Looks up a flag or option by short alias.
    pub fn find_short(&self, short: char) -> Option<&ParamSpec> {
        self.named().find(|param| param.short == Some(short))
    }

    /// One-line usage string for the parameters, without the command path.
    pub fn usage(&self) -> String {
        self.named()
            .chain(self.positionals())
            .map(ParamSpec::usage)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Checks the schema invariants.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut names = BTreeSet::new();
        let mut shorts = BTreeSet::new();
        let mut variadic: Option<&str> = None;
        let mut optional: Option<&str> = None;

        for param in &self.params {
            if param.name.is_empty()
                || param.name.starts_with('-')
                || param.name.chars().any(char::is_whitespace)
                || param.name.contains('=')
            {
                return Err(SchemaError::InvalidName(param.name.clone()));
            }
            if !names.insert(param.name.as_str()) {
                return Err(SchemaError::DuplicateName(param.name.clone()));
            }
            if let Some(short) = param.short {
                if param.is_positional() || !short.is_ascii_alphabetic() {
                    return Err(SchemaError::InvalidShort(param.name.clone()));
                }
                if !shorts.insert(short) {
                    return Err(SchemaError::DuplicateShort(short));
                }
            }
            if let ValueType::Choice(choices) = &param.value_type {
                if choices.is_empty() {
                    return Err(SchemaError::EmptyChoice(param.name.clone()));
                }
            }
            if let Some(default) = &param.default {
                if param.required {
                    return Err(SchemaError::RequiredWithDefault(param.name.clone()));
                }
                let fits = match (param.variadic, default) {
                    (true, ArgValue::List(items)) => {
                        items.iter().all(|item| param.value_type.accepts(item))
                    }
                    (true, _) => false,
                    (false, value) => param.value_type.accepts(value),
                };
                if !fits {
                    return Err(SchemaError::DefaultTypeMismatch {
                        name: param.name.clone(),
                        expected: param.value_type.describe(),
                    });
                }
            }

            match param.kind {
                ParamKind::Flag => {
                    if param.required || param.variadic || param.value_type != ValueType::Boolean {
                        return Err(SchemaError::InvalidFlag(param.name.clone()));
                    }
                }
                ParamKind::Option => {}
                ParamKind::Positional => {
                    if let Some(first) = variadic {
                        if param.variadic {
                            return Err(SchemaError::MultipleVariadic {
                                first: first.to_string(),
                                second: param.name.clone(),
                            });
                        }
                        return Err(SchemaError::VariadicNotLast(first.to_string()));
                    }
                    if param.required {
                        if let Some(optional) = optional {
                            return Err(SchemaError::RequiredAfterOptional {
                                required: param.name.clone(),
                                optional: optional.to_string(),
                            });
                        }
                    } else {
                        optional = Some(param.name.as_str());
                    }
                    if param.variadic {
                        variadic = Some(param.name.as_str());
                    }
                }
            }
        }
        Ok(())
    }
}

impl From<Vec<ParamSpec>> for ArgumentSchema {
    fn from(params: Vec<ParamSpec>) -> Self {
        Self { params }
    }
}
