//! rb command - Remove container
//!
//! Removes a container. `--force` deletes every object first and asks for
//! confirmation when the container is not empty, unless `--yes` is given.

use clap::Args;
use console::Term;
use serde::Serialize;

use osc_core::path::validate_container_name;
use osc_core::{Error, ObjectStorageClient, Result};

use super::stat::container_usage;
use super::{Context, fail};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, ProgressBar};

/// Remove a container
#[derive(Args, Debug)]
pub struct RbArgs {
    /// Container name
    pub container: String,

    /// Delete all objects (and versions) in the container first
    #[arg(long)]
    pub force: bool,

    /// Do not ask for confirmation before a force delete
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Debug, Serialize)]
struct RbOutput {
    status: &'static str,
    container: String,
    existed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    objects_deleted: Option<u64>,
}

/// Execute the rb command
pub async fn execute(args: RbArgs, ctx: &Context) -> ExitCode {
    let formatter = ctx.formatter();
    let container = args.container.trim_end_matches('/').to_string();

    if let Err(e) = validate_container_name(&container) {
        return fail(&formatter, &e);
    }

    let client = match ctx.connect().await {
        Ok(c) => c,
        Err(e) => return fail(&formatter, &e),
    };

    match client.container_info(&container).await {
        Ok(_) => {}
        Err(e) if e.is_not_found() => {
            if formatter.is_json() {
                formatter.json(&RbOutput {
                    status: "success",
                    container,
                    existed: false,
                    objects_deleted: None,
                });
            } else {
                formatter.warning(&format!("Container '{container}' does not exist."));
            }
            return ExitCode::Success;
        }
        Err(e) => return fail(&formatter, &e),
    }

    let mut objects_deleted = None;
    if args.force {
        let (count, _) = match container_usage(client.as_ref(), &container).await {
            Ok(usage) => usage,
            Err(e) => return fail(&formatter, &e),
        };

        if count > 0 && !args.yes && !confirm(&formatter, &container, count) {
            let err = Error::NotEmpty(format!(
                "{container}: holds {count} objects, delete aborted"
            ));
            return fail(&formatter, &err);
        }
        objects_deleted = Some(count);
    }

    let spinner = ProgressBar::spinner(formatter.config(), &format!("Removing {container}"));
    let result = remove(client.as_ref(), &container, args.force).await;
    spinner.finish_and_clear();

    match result {
        Ok(()) => {
            if formatter.is_json() {
                formatter.json(&RbOutput {
                    status: "success",
                    container,
                    existed: true,
                    objects_deleted,
                });
            } else {
                formatter.success(&format!("Container '{container}' removed successfully."));
            }
            ExitCode::Success
        }
        Err(e @ Error::NotEmpty(_)) => {
            let code = fail(&formatter, &e);
            if !formatter.is_json() {
                formatter.println("Use --force to delete all objects first.");
            }
            code
        }
        Err(e) => fail(&formatter, &e),
    }
}

async fn remove(client: &dyn ObjectStorageClient, container: &str, force: bool) -> Result<()> {
    client.container_delete(container, force).await?;
    tracing::info!(container, force, "Container removed");
    Ok(())
}

/// Ask on the terminal; anything but y/yes (or no terminal at all) is a no
fn confirm(formatter: &Formatter, container: &str, count: u64) -> bool {
    if formatter.is_json() {
        return false;
    }

    let term = Term::stderr();
    let prompt = format!(
        "WARNING: delete container '{container}' and all its {count} objects? [y/N]: "
    );
    if term.write_str(&prompt).is_err() {
        return false;
    }

    match term.read_line() {
        Ok(answer) => is_yes(&answer),
        Err(_) => false,
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
