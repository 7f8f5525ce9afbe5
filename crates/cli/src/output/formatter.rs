//! Human and JSON rendering of command results
//!
//! In JSON mode stdout carries exactly one JSON document per command and
//! errors go to stderr as `{"error": ..., "exit_code": ...}`. Status lines
//! (success, warning) are human-only.

use console::{Color, style};
use serde::Serialize;

use super::OutputConfig;

/// Error document written to stderr in JSON mode
#[derive(Debug, Serialize)]
struct ErrorOutput<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    exit_code: Option<i32>,
}

/// Renders command output according to the global output flags
#[derive(Debug, Clone, Default)]
pub struct Formatter {
    config: OutputConfig,
}

impl Formatter {
    pub fn new(config: OutputConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OutputConfig {
        &self.config
    }

    pub fn is_json(&self) -> bool {
        self.config.json
    }

    pub fn is_quiet(&self) -> bool {
        self.config.quiet
    }

    /// Colors apply to human output only
    pub fn colors_enabled(&self) -> bool {
        !self.config.no_color && !self.config.json
    }

    /// Print a success line; silent in quiet and JSON mode
    pub fn success(&self, message: &str) {
        if self.config.quiet || self.config.json {
            return;
        }
        println!("{} {message}", self.mark("✓", Color::Green));
    }

    /// Print a warning to stderr; silent in quiet and JSON mode
    pub fn warning(&self, message: &str) {
        if self.config.quiet || self.config.json {
            return;
        }
        eprintln!("{} {message}", self.mark("⚠", Color::Yellow));
    }

    /// Print an error to stderr, even in quiet mode
    pub fn error(&self, message: &str) {
        eprintln!("{}", self.render_error(message, None));
    }

    /// Print an error together with the exit code it causes
    ///
    /// Only JSON output carries the code; humans read it from `$?`.
    pub fn error_with_code(&self, message: &str, exit_code: i32) {
        eprintln!("{}", self.render_error(message, Some(exit_code)));
    }

    /// Print a serializable value as the command's JSON document
    pub fn json<T: Serialize>(&self, value: &T) {
        match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Error serializing output: {e}"),
        }
    }

    /// Print a line of human output unless quiet
    pub fn println(&self, message: &str) {
        if !self.config.quiet {
            println!("{message}");
        }
    }

    /// Dim a column for human output, e.g. dates in listings
    pub fn dim(&self, text: &str) -> String {
        if self.colors_enabled() {
            style(text).dim().to_string()
        } else {
            text.to_string()
        }
    }

    /// Highlight a directory-like entry
    pub fn dir(&self, text: &str) -> String {
        if self.colors_enabled() {
            style(text).blue().bold().to_string()
        } else {
            text.to_string()
        }
    }

    fn mark(&self, symbol: &str, color: Color) -> String {
        if self.colors_enabled() {
            style(symbol).fg(color).to_string()
        } else {
            symbol.to_string()
        }
    }

    fn render_error(&self, message: &str, exit_code: Option<i32>) -> String {
        if !self.config.json {
            return format!("{} {message}", self.mark("✗", Color::Red));
        }
        let error = ErrorOutput {
            error: message,
            exit_code,
        };
        serde_json::to_string_pretty(&error).unwrap_or_else(|_| message.to_string())
    }
}
