//! Output formatting utilities
//!
//! This module provides formatters for CLI output in both human-readable
//! and JSON formats. It also handles progress bars and colored output.

mod formatter;
mod progress;

pub use formatter::Formatter;
pub use progress::{ProgressBar, Tracked};

/// Output configuration derived from CLI flags
#[derive(Debug, Clone, Default)]
pub struct OutputConfig {
    /// Use JSON output format
    pub json: bool,
    /// Disable colored output
    pub no_color: bool,
    /// Disable progress bar
    pub no_progress: bool,
    /// Suppress non-error output
    pub quiet: bool,
}

impl OutputConfig {
    /// Merge command-line flags with the `[defaults]` table of the config file
    ///
    /// Flags can only switch features off or JSON on; the config file
    /// supplies the baseline.
    pub fn with_defaults(mut self, defaults: &osc_core::Defaults) -> Self {
        self.json |= defaults.output == "json";
        self.no_color |= defaults.color == "never";
        self.no_progress |= !defaults.progress;
        self
    }
}

/// Human-readable size, e.g. "1.5 MiB"
pub fn human_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Timestamp column used by listings
pub fn format_timestamp(ts: Option<jiff::Timestamp>) -> String {
    ts.map(|t| t.strftime("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| " ".repeat(19))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_defaults() {
        let defaults = osc_core::Defaults {
            output: "json".to_string(),
            color: "never".to_string(),
            progress: false,
            ..Default::default()
        };
        let config = OutputConfig::default().with_defaults(&defaults);
        assert!(config.json);
        assert!(config.no_color);
        assert!(config.no_progress);
        assert!(!config.quiet);
    }

    #[test]
    fn test_flags_survive_defaults() {
        let config = OutputConfig {
            json: true,
            ..Default::default()
        }
        .with_defaults(&osc_core::Defaults::default());
        assert!(config.json);
        assert!(!config.no_progress);
    }

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(0), "0 B");
        assert_eq!(human_size(1024), "1 KiB");
    }

    #[test]
    fn test_format_timestamp() {
        let ts: jiff::Timestamp = "2024-03-01T12:30:00Z".parse().unwrap();
        assert_eq!(format_timestamp(Some(ts)), "2024-03-01 12:30:00");
        assert_eq!(format_timestamp(None).len(), 19);
    }
}
