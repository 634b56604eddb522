use std::io::{self, Write};

use shellody::{OutputSink, ShellError};

/// Writes results to stdout and errors to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdioSink;

impl StdioSink {
    /// Creates the sink.
    pub fn new() -> Self {
        Self
    }
}

impl OutputSink for StdioSink {
    fn write(&self, text: &str) {
        let mut stdout = io::stdout().lock();
        // Write failures such as a closed pipe are ignored.
        let _ = writeln!(stdout, "{text}");
        let _ = stdout.flush();
    }

    fn write_error(&self, error: &ShellError) {
        let _ = writeln!(io::stderr().lock(), "error: {error}");
    }
}
