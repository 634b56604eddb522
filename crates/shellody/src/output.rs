use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shellody_contract::ShellError;

/// Destination for command results, notices, and errors.
///
/// Sinks are shared by the foreground session and background jobs, so writes must be
/// safe from any task.
pub trait OutputSink: Send + Sync {
    /// Writes one block of text; the sink appends the line break.
    fn write(&self, text: &str);

    /// Reports an error to the user.
    fn write_error(&self, error: &ShellError);
}

/// How structured handler results are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// Pretty-printed JSON.
    #[default]
    Json,
    /// Bare strings, `key: value` lines for objects, one line per array item.
    Plain,
}

/// Renders a handler result for display.
pub fn render_value(value: &Value, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        OutputFormat::Plain => render_plain(value),
    }
}

fn render_plain(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        Value::Array(items) => items
            .iter()
            .map(render_scalar)
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Object(fields) => fields
            .iter()
            .map(|(key, value)| format!("{key}: {}", render_scalar(value)))
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// One recorded output event.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputEvent {
    /// Text written with [`OutputSink::write`].
    Text(String),
    /// Error written with [`OutputSink::write_error`].
    Error(ShellError),
}

/// In-memory sink used by tests and embedders that post-process output.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<OutputEvent>>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded event in write order.
    pub fn events(&self) -> Vec<OutputEvent> {
        self.events.lock().clone()
    }

    /// Recorded text blocks.
    pub fn texts(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                OutputEvent::Text(text) => Some(text.clone()),
                OutputEvent::Error(_) => None,
            })
            .collect()
    }

    /// Recorded errors.
    pub fn errors(&self) -> Vec<ShellError> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                OutputEvent::Error(error) => Some(error.clone()),
                OutputEvent::Text(_) => None,
            })
            .collect()
    }

    /// Drops every recorded event.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl OutputSink for MemorySink {
    fn write(&self, text: &str) {
        self.events.lock().push(OutputEvent::Text(text.to_string()));
    }

    fn write_error(&self, error: &ShellError) {
        self.events.lock().push(OutputEvent::Error(error.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_rendering_flattens_objects_and_arrays() {
        let value = json!({"name": "Ada", "count": 2});
        assert_eq!(render_value(&value, OutputFormat::Plain), "count: 2\nname: Ada");
        assert_eq!(
            render_value(&json!(["a", 1, true]), OutputFormat::Plain),
            "a\n1\ntrue"
        );
        assert_eq!(render_value(&json!("hello"), OutputFormat::Plain), "hello");
    }

    #[test]
    fn json_rendering_is_pretty() {
        assert_eq!(
            render_value(&json!({"a": 1}), OutputFormat::Json),
            "{\n  \"a\": 1\n}"
        );
    }

    #[test]
    fn memory_sink_separates_text_and_errors() {
        let sink = MemorySink::new();
        sink.write("one");
        sink.write_error(&ShellError::session("broken"));
        assert_eq!(sink.texts(), vec!["one"]);
        assert_eq!(sink.errors(), vec![ShellError::session("broken")]);
        assert_eq!(sink.events().len(), 2);
    }
}
