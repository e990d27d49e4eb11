//! Text and JSON rendering shared by every kodebase command

use serde::Serialize;

use crate::storage::ConfigFormat;

/// Value of `--format`; falls back to `default_format` from the global config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl From<ConfigFormat> for OutputFormat {
    fn from(format: ConfigFormat) -> Self {
        match format {
            ConfigFormat::Text => OutputFormat::Text,
            ConfigFormat::Json => OutputFormat::Json,
        }
    }
}

/// Renders command results on stdout and `--verbose` diagnostics on stderr
pub struct Output {
    format: OutputFormat,
    verbose: bool,
}

impl Output {
    pub fn new(format: OutputFormat, verbose: bool) -> Self {
        Self { format, verbose }
    }

    /// One-line confirmation; `{"success": true, "message": ..}` in JSON
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Text => println!("{}", message),
            OutputFormat::Json => println!("{}", success_json(message)),
        }
    }

    /// Compact JSON in JSON mode, pretty JSON for text callers without a renderer
    pub fn data<T: Serialize>(&self, data: &T) {
        let rendered = match self.format {
            OutputFormat::Text => serde_json::to_string_pretty(data),
            OutputFormat::Json => serde_json::to_string(data),
        };
        if let Ok(json) = rendered {
            println!("{}", json);
        }
    }

    /// Spacer between text sections; JSON stays one document
    pub fn blank(&self) {
        if self.format == OutputFormat::Text {
            println!();
        }
    }

    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    pub fn verbose(&self, message: &str) {
        if self.verbose {
            eprintln!("[verbose] {}", message);
        }
    }

    /// Like [`Output::verbose`], tagged with the command or engine stage
    pub fn verbose_ctx(&self, context: &str, message: &str) {
        if self.verbose {
            eprintln!("[verbose:{}] {}", context, message);
        }
    }
}

fn success_json(message: &str) -> serde_json::Value {
    serde_json::json!({
        "success": true,
        "message": message
    })
}
