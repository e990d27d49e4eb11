//! # Command-Line Interface
//!
//! User-facing CLI commands and output formatting.
//!
//! ## Command Groups
//!
//! | Group | Purpose | Examples |
//! |-------|---------|----------|
//! | Core | Project setup | `init` |
//! | Artifact | Create and inspect | `new`, `show`, `list` |
//! | Lifecycle | State changes | `transition`, `complete` |
//! | Dependencies | Sibling ordering | `dep`, `undep` |
//! | Query | Readiness and health | `ready`, `blocked`, `why`, `validate` |
//! | Context | Markdown digest | `context` |
//!
//! ## Output Formats
//!
//! All commands support `--format` flag:
//! - `text` (default) - Human-readable output
//! - `json` - Machine-parseable JSON
//!
//! ## Verbose Mode
//!
//! Use `--verbose` (or `-v`) for debug output:
//! ```bash
//! kodebase --verbose ready
//! ```
//!
//! ## Entry Point
//!
//! Call [`run()`] to parse arguments and execute the appropriate command.

mod app;
mod output;
mod artifact;
mod query;
mod context;

pub use app::{Cli, Commands, run};
pub use output::{Output, OutputFormat};
