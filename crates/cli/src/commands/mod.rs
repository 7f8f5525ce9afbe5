//! CLI command definitions and execution
//!
//! Each command lives in its own module with an `execute` entry point that
//! returns an [`ExitCode`]. The storage work of a command is a separate
//! function over `&dyn ObjectStorageClient`, so it runs against any backend.

use clap::{Parser, Subcommand};
use osc_core::path::{validate_container_name, validate_object_name};
use osc_core::{
    ConfigManager, Defaults, Error, ObjectPath, ObjectStorageClient, ProfileManager, parse_path,
};

use crate::backend;
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

mod completions;
mod get;
mod ls;
mod mb;
mod meta;
mod profile;
mod put;
mod rb;
mod rm;
mod stat;
mod test_config;

/// osc - provider-agnostic object storage client
///
/// One command set for S3-compatible services and any other backend with a
/// configured profile.
#[derive(Parser, Debug)]
#[command(name = "osc")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format: human-readable or JSON
    #[arg(long, global = true, default_value = "false")]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true, default_value = "false")]
    pub no_color: bool,

    /// Disable progress bar
    #[arg(long, global = true, default_value = "false")]
    pub no_progress: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true, default_value = "false")]
    pub quiet: bool,

    /// Enable debug logging
    #[arg(long, global = true, default_value = "false")]
    pub debug: bool,

    /// Profile to run against (default: defaults.profile, then OBS_STORAGE)
    #[arg(short, long, global = true, env = "OSC_PROFILE")]
    pub profile: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage storage profiles
    #[command(subcommand)]
    Profile(profile::ProfileCommands),

    /// Check that the selected profile can reach its backend
    TestConfig(test_config::TestConfigArgs),

    /// List containers, or objects in a container
    Ls(ls::LsArgs),

    /// Create a container
    #[command(visible_alias = "container-create")]
    Mb(mb::MbArgs),

    /// Remove a container
    #[command(visible_alias = "container-delete")]
    Rb(rb::RbArgs),

    /// Show object or container details
    #[command(visible_aliases = ["object-info", "container-info"])]
    Stat(stat::StatArgs),

    /// Upload a local file or stdin to an object
    #[command(visible_alias = "upload")]
    Put(put::PutArgs),

    /// Download an object to a local file or stdout
    #[command(visible_alias = "download")]
    Get(get::GetArgs),

    /// Remove objects
    #[command(visible_alias = "object-delete")]
    Rm(rm::RmArgs),

    /// Manage object metadata
    #[command(subcommand)]
    Meta(meta::MetaCommands),

    /// Generate shell completion scripts
    Completions(completions::CompletionsArgs),
}

/// Per-invocation state shared by all commands
#[derive(Debug, Clone)]
pub struct Context {
    pub output: OutputConfig,
    pub profile: Option<String>,
    pub defaults: Defaults,
}

impl Context {
    pub fn formatter(&self) -> Formatter {
        Formatter::new(self.output.clone())
    }

    /// Resolve the profile and build its client
    pub async fn connect(&self) -> osc_core::Result<Box<dyn ObjectStorageClient>> {
        let manager = ProfileManager::new()?;
        let profile = manager.resolve(self.profile.as_deref())?;
        backend::connect(profile, &self.defaults).await
    }
}

/// Print an error and return the exit code it maps to
///
/// Partial failures also list every failed item.
pub(crate) fn fail(formatter: &Formatter, err: &Error) -> ExitCode {
    let code = ExitCode::from_error(err);

    if let Error::Partial(report) = err {
        if formatter.is_json() {
            let failed: Vec<_> = report
                .failed
                .iter()
                .map(|f| serde_json::json!({ "name": f.name, "error": f.error.to_string() }))
                .collect();
            formatter.json(&serde_json::json!({
                "error": err.to_string(),
                "exit_code": code.as_i32(),
                "succeeded": report.succeeded,
                "failed": failed,
            }));
            return code;
        }
        for failure in &report.failed {
            formatter.warning(&format!("{}: {}", failure.name, failure.error));
        }
    }

    formatter.error_with_code(&err.to_string(), code.as_i32());
    code
}

/// Resolve an object argument into container and key
///
/// With `--container` the whole argument is the key. A path without a slash
/// is a key in the client's default container. Otherwise the first path
/// segment is the container.
pub(crate) fn object_target(
    path: &str,
    explicit: Option<&str>,
    default: Option<&str>,
) -> osc_core::Result<ObjectPath> {
    let path = path.trim_start_matches('/');
    let target = match (explicit, default) {
        (Some(container), _) => {
            validate_container_name(container)?;
            ObjectPath::new(container, path)
        }
        (None, Some(container)) if !path.contains('/') => ObjectPath::new(container, path),
        _ => parse_path(path)?,
    };
    validate_object_name(target.require_key()?)?;
    Ok(target)
}

fn load_defaults() -> Defaults {
    match ConfigManager::new().and_then(|m| m.load()) {
        Ok(config) => config.defaults,
        Err(e) => {
            tracing::warn!(error = %e, "Could not load config file, using built-in defaults");
            Defaults::default()
        }
    }
}

/// Execute the CLI command and return an exit code
pub async fn execute(cli: Cli) -> ExitCode {
    let defaults = load_defaults();
    let output = OutputConfig {
        json: cli.json,
        no_color: cli.no_color,
        no_progress: cli.no_progress,
        quiet: cli.quiet,
    }
    .with_defaults(&defaults);

    let ctx = Context {
        output,
        profile: cli.profile,
        defaults,
    };

    match cli.command {
        Commands::Profile(cmd) => profile::execute(cmd, &ctx).await,
        Commands::TestConfig(args) => test_config::execute(args, &ctx).await,
        Commands::Ls(args) => ls::execute(args, &ctx).await,
        Commands::Mb(args) => mb::execute(args, &ctx).await,
        Commands::Rb(args) => rb::execute(args, &ctx).await,
        Commands::Stat(args) => stat::execute(args, &ctx).await,
        Commands::Put(args) => put::execute(args, &ctx).await,
        Commands::Get(args) => get::execute(args, &ctx).await,
        Commands::Rm(args) => rm::execute(args, &ctx).await,
        Commands::Meta(cmd) => meta::execute(cmd, &ctx).await,
        Commands::Completions(args) => completions::execute(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["osc", "ls", "photos", "--json", "-p", "minio"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.profile.as_deref(), Some("minio"));
        assert!(matches!(cli.command, Commands::Ls(_)));
    }

    #[test]
    fn test_command_aliases() {
        let cli = Cli::try_parse_from(["osc", "container-create", "photos"]).unwrap();
        assert!(matches!(cli.command, Commands::Mb(_)));

        let cli = Cli::try_parse_from(["osc", "object-info", "photos/a.jpg"]).unwrap();
        assert!(matches!(cli.command, Commands::Stat(_)));

        let cli = Cli::try_parse_from(["osc", "upload", "a.jpg", "photos/a.jpg"]).unwrap();
        assert!(matches!(cli.command, Commands::Put(_)));

        let cli = Cli::try_parse_from(["osc", "download", "photos/a.jpg", "-"]).unwrap();
        assert!(matches!(cli.command, Commands::Get(_)));
    }

    #[test]
    fn test_object_target() {
        let target = object_target("photos/2024/a.jpg", None, None).unwrap();
        assert_eq!(target.container, "photos");
        assert_eq!(target.key, "2024/a.jpg");

        let target = object_target("photos/2024/a.jpg", Some("archive"), None).unwrap();
        assert_eq!(target.container, "archive");
        assert_eq!(target.key, "photos/2024/a.jpg");

        let target = object_target("a.jpg", None, Some("photos")).unwrap();
        assert_eq!(target.container, "photos");
        assert_eq!(target.key, "a.jpg");

        assert!(object_target("photos", None, None).is_err());
        assert!(object_target("photos/", None, None).is_err());
        assert!(object_target("", Some("archive"), None).is_err());
    }

    #[test]
    fn test_partial_failure_exit_code() {
        let mut report = osc_core::BatchReport::new("drain container c");
        report.record_success("a");
        report.record_failure("b", Error::PermissionDenied("b".into()));
        let formatter = Formatter::new(OutputConfig {
            quiet: true,
            ..Default::default()
        });

        let code = fail(&formatter, &Error::Partial(Box::new(report)));
        assert_eq!(code, ExitCode::PartialFailure);
    }
}
