//! Terminal host for the `shellody` command engine.
//!
//! Wires the engine to `rustyline`, stdio, a TOML config file, `tracing` logging, and the bundled
//! demo plugins. The binary in `main.rs` is a thin wrapper around [`app::main_with`].

#![warn(missing_docs, rustdoc::broken_intra_doc_links)]

pub mod app;
pub mod config;
pub mod error;
pub mod logging;
pub mod plugins;
pub mod reader;
pub mod sink;

pub use app::{Cli, Host};
pub use config::{CliConfig, ConfigLoader};
pub use error::{CliError, CliErrorCategory, CliResult};
pub use reader::{HistoryOptions, RustylineReader};
pub use sink::StdioSink;
