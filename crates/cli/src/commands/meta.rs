//! meta commands - Read and change object metadata
//!
//! `set` and `delete` change some keys and keep the rest; `replace` swaps the
//! whole set. `set` and `delete` read the current metadata once and write the
//! result once, so two writers on one object can still lose an update.

use clap::Subcommand;
use serde::Serialize;

use osc_core::metadata::{normalize_key, parse_pairs};
use osc_core::{Metadata, ObjectPath, ObjectStorageClient, Result};

use super::{Context, fail, object_target};
use crate::exit_code::ExitCode;
use crate::output::Formatter;

/// Metadata subcommands
#[derive(Subcommand, Debug)]
pub enum MetaCommands {
    /// Show the metadata of an object
    Get(TargetArgs),

    /// Set metadata keys, keeping the others
    Set(SetArgs),

    /// Delete metadata keys, keeping the others
    Delete(DeleteArgs),

    /// Replace all metadata; without pairs, clears it
    Replace(ReplaceArgs),
}

/// Object selection shared by the metadata commands
#[derive(clap::Args, Debug)]
pub struct TargetArgs {
    /// Object path (container/key)
    pub path: String,

    /// Container name; the path is then the object key
    #[arg(long)]
    pub container: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct SetArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Pairs to set
    #[arg(required = true, value_name = "KEY=VALUE")]
    pub pairs: Vec<String>,
}

#[derive(clap::Args, Debug)]
pub struct DeleteArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Keys to delete
    #[arg(required = true, value_name = "KEY")]
    pub keys: Vec<String>,
}

#[derive(clap::Args, Debug)]
pub struct ReplaceArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// New metadata
    #[arg(value_name = "KEY=VALUE")]
    pub pairs: Vec<String>,
}

#[derive(Debug, Serialize)]
struct MetaOutput {
    container: String,
    name: String,
    metadata: Metadata,
}

/// Execute a metadata subcommand
pub async fn execute(cmd: MetaCommands, ctx: &Context) -> ExitCode {
    let formatter = ctx.formatter();

    let client = match ctx.connect().await {
        Ok(c) => c,
        Err(e) => return fail(&formatter, &e),
    };

    let target_args = match &cmd {
        MetaCommands::Get(t) => t,
        MetaCommands::Set(a) => &a.target,
        MetaCommands::Delete(a) => &a.target,
        MetaCommands::Replace(a) => &a.target,
    };
    let target = match object_target(
        &target_args.path,
        target_args.container.as_deref(),
        client.default_container(),
    ) {
        Ok(t) => t,
        Err(e) => return fail(&formatter, &e),
    };

    let client = client.as_ref();
    let result = match &cmd {
        MetaCommands::Get(_) => current(client, &target).await,
        MetaCommands::Set(args) => set(client, &target, &args.pairs).await,
        MetaCommands::Delete(args) => delete(client, &target, &args.keys).await,
        MetaCommands::Replace(args) => replace(client, &target, &args.pairs).await,
    };

    match result {
        Ok(metadata) => {
            print_metadata(&formatter, &target, metadata);
            ExitCode::Success
        }
        Err(e) => fail(&formatter, &e),
    }
}

async fn current(client: &dyn ObjectStorageClient, target: &ObjectPath) -> Result<Metadata> {
    let info = client.object_info(Some(&target.container), &target.key).await?;
    Ok(info.metadata.unwrap_or_default())
}

async fn set(
    client: &dyn ObjectStorageClient,
    target: &ObjectPath,
    pairs: &[String],
) -> Result<Metadata> {
    let updates = parse_pairs(pairs)?;
    let mut merged = current(client, target).await?;
    merged.extend(updates);

    client
        .object_replace_metadata(Some(&target.container), &target.key, merged.clone())
        .await?;
    Ok(merged)
}

async fn delete(
    client: &dyn ObjectStorageClient,
    target: &ObjectPath,
    keys: &[String],
) -> Result<Metadata> {
    let mut remaining = current(client, target).await?;
    let before = remaining.len();
    for key in keys {
        remaining.remove(&normalize_key(key));
    }

    if remaining.len() != before {
        client
            .object_replace_metadata(Some(&target.container), &target.key, remaining.clone())
            .await?;
    }
    Ok(remaining)
}

async fn replace(
    client: &dyn ObjectStorageClient,
    target: &ObjectPath,
    pairs: &[String],
) -> Result<Metadata> {
    let metadata = parse_pairs(pairs)?;
    client
        .object_replace_metadata(Some(&target.container), &target.key, metadata.clone())
        .await?;
    Ok(metadata)
}

fn print_metadata(formatter: &Formatter, target: &ObjectPath, metadata: Metadata) {
    if formatter.is_json() {
        formatter.json(&MetaOutput {
            container: target.container.clone(),
            name: target.key.clone(),
            metadata,
        });
        return;
    }

    if metadata.is_empty() {
        formatter.println(&format!("{target}: no metadata"));
        return;
    }
    formatter.println(&format!("{target}:"));
    for (key, value) in &metadata {
        formatter.println(&format!("  {key}: {value}"));
    }
}
