//! Profile management commands
//!
//! Profiles are named backend configurations: provider, endpoint, region,
//! credentials and an optional default container.

use clap::Subcommand;
use comfy_table::{Table, presets::NOTHING};
use serde::Serialize;

use osc_core::{Profile, ProfileManager, Provider, Result, SwiftAuth};

use super::{Context, fail};
use crate::exit_code::ExitCode;
use crate::output::Formatter;

/// Profile subcommands
#[derive(Subcommand, Debug)]
pub enum ProfileCommands {
    /// Add or update a profile
    Set(SetArgs),

    /// List all configured profiles
    List(ListArgs),

    /// Remove a profile
    Remove(RemoveArgs),
}

/// Arguments for the `profile set` command
#[derive(clap::Args, Debug)]
pub struct SetArgs {
    /// Profile name (e.g., "minio", "aws")
    pub name: String,

    /// Storage provider
    #[arg(long, default_value = "s3")]
    pub provider: Provider,

    /// Endpoint URL (e.g., "http://localhost:9000"); omit for AWS S3
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Access key ID; omit to use the provider's default credential chain
    #[arg(long, env = "OSC_ACCESS_KEY", hide_env_values = true)]
    pub access_key: Option<String>,

    /// Secret access key
    #[arg(long, env = "OSC_SECRET_KEY", hide_env_values = true)]
    pub secret_key: Option<String>,

    /// Region (default: us-east-1)
    #[arg(long, default_value = "us-east-1")]
    pub region: String,

    /// Bucket lookup style: auto, path, or dns
    #[arg(long, default_value = "auto")]
    pub bucket_lookup: String,

    /// Container used when a command omits one
    #[arg(long)]
    pub container: Option<String>,

    #[command(flatten)]
    pub swift: SwiftArgs,

    /// Make this the default profile
    #[arg(long)]
    pub default: bool,
}

/// Credentials for `--provider swift`; the endpoint is the storage URL
#[derive(clap::Args, Debug, Default)]
#[command(next_help_heading = "Swift")]
pub struct SwiftArgs {
    /// Keystone v3 URL
    #[arg(long)]
    pub auth_url: Option<String>,

    #[arg(long)]
    pub username: Option<String>,

    #[arg(long, env = "OS_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Project the token is scoped to
    #[arg(long)]
    pub project: Option<String>,

    #[arg(long)]
    pub user_domain: Option<String>,

    #[arg(long)]
    pub project_domain: Option<String>,

    /// Pre-issued token instead of Keystone credentials
    #[arg(long, env = "OS_AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: Option<String>,
}

impl From<SwiftArgs> for SwiftAuth {
    fn from(args: SwiftArgs) -> Self {
        Self {
            auth_url: args.auth_url,
            username: args.username,
            password: args.password,
            project_name: args.project,
            user_domain: args.user_domain,
            project_domain: args.project_domain,
            token: args.auth_token,
        }
    }
}

/// Arguments for the `profile list` command
#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Show full details including region and bucket lookup
    #[arg(short, long)]
    pub long: bool,
}

/// Arguments for the `profile remove` command
#[derive(clap::Args, Debug)]
pub struct RemoveArgs {
    /// Name of the profile to remove
    pub name: String,
}

/// Profile information for output (without credentials)
#[derive(Debug, Serialize)]
struct ProfileInfo {
    name: String,
    provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    endpoint: Option<String>,
    region: String,
    bucket_lookup: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    container: Option<String>,
    default: bool,
}

impl ProfileInfo {
    fn new(profile: &Profile, default: Option<&str>) -> Self {
        Self {
            name: profile.name.clone(),
            provider: profile.provider.to_string(),
            endpoint: profile.endpoint.clone(),
            region: profile.region.clone(),
            bucket_lookup: profile.bucket_lookup.clone(),
            container: profile.container.clone(),
            default: default == Some(profile.name.as_str()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ProfileListOutput {
    profiles: Vec<ProfileInfo>,
}

#[derive(Debug, Serialize)]
struct ProfileOperationOutput {
    status: &'static str,
    profile: String,
}

/// Execute a profile subcommand
pub async fn execute(cmd: ProfileCommands, ctx: &Context) -> ExitCode {
    let formatter = ctx.formatter();
    let manager = match ProfileManager::new() {
        Ok(m) => m,
        Err(e) => return fail(&formatter, &e),
    };

    let result = match cmd {
        ProfileCommands::Set(args) => execute_set(args, &manager, &formatter),
        ProfileCommands::List(args) => execute_list(&args, &manager, &formatter),
        ProfileCommands::Remove(args) => execute_remove(&args, &manager, &formatter),
    };

    match result {
        Ok(()) => ExitCode::Success,
        Err(e) => fail(&formatter, &e),
    }
}

fn profile_from_args(args: SetArgs) -> Profile {
    let mut profile = Profile::new(&args.name, args.provider);
    profile.endpoint = args.endpoint.filter(|e| !e.is_empty());
    profile.access_key = args.access_key;
    profile.secret_key = args.secret_key;
    profile.region = args.region;
    profile.bucket_lookup = args.bucket_lookup;
    profile.container = args.container;
    if args.provider == Provider::Swift {
        profile.swift = Some(args.swift.into());
    }
    profile
}

fn execute_set(args: SetArgs, manager: &ProfileManager, formatter: &Formatter) -> Result<()> {
    let make_default = args.default;
    let profile = profile_from_args(args);
    let name = profile.name.clone();

    manager.set(profile)?;

    if make_default {
        let config_manager = manager.config_manager();
        let mut config = config_manager.load()?;
        config.defaults.profile = Some(name.clone());
        config_manager.save(&config)?;
    }

    if formatter.is_json() {
        formatter.json(&ProfileOperationOutput {
            status: "success",
            profile: name,
        });
    } else {
        formatter.success(&format!("Profile '{name}' configured successfully."));
    }
    Ok(())
}

fn execute_list(args: &ListArgs, manager: &ProfileManager, formatter: &Formatter) -> Result<()> {
    let config = manager.config_manager().load()?;
    let default = config.defaults.profile.as_deref();
    let profiles: Vec<ProfileInfo> = config
        .profiles
        .iter()
        .map(|p| ProfileInfo::new(p, default))
        .collect();

    if formatter.is_json() {
        formatter.json(&ProfileListOutput { profiles });
        return Ok(());
    }

    if profiles.is_empty() {
        formatter.println("No profiles configured.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(NOTHING);
    for p in &profiles {
        let marker = if p.default { "*" } else { "" };
        let endpoint = p.endpoint.clone().unwrap_or_else(|| "-".to_string());
        let mut row = vec![
            format!("{}{marker}", p.name),
            p.provider.clone(),
            endpoint,
        ];
        if args.long {
            row.push(format!("region: {}", p.region));
            row.push(format!("lookup: {}", p.bucket_lookup));
            row.push(format!(
                "container: {}",
                p.container.as_deref().unwrap_or("-")
            ));
        }
        table.add_row(row);
    }
    formatter.println(&table.to_string());
    Ok(())
}

fn execute_remove(args: &RemoveArgs, manager: &ProfileManager, formatter: &Formatter) -> Result<()> {
    manager.remove(&args.name)?;

    if formatter.is_json() {
        formatter.json(&ProfileOperationOutput {
            status: "success",
            profile: args.name.clone(),
        });
    } else {
        formatter.success(&format!("Profile '{}' removed successfully.", args.name));
    }
    Ok(())
}
