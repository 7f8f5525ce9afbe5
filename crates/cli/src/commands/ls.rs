//! ls command - List containers and objects
//!
//! Without a path, lists containers. With `container[/prefix]`, lists the
//! objects under the prefix one level deep, folder style: keys continuing
//! past the next `/` are grouped into subdirectories. A trailing `*` lists
//! every key starting with the text before it.

use clap::Args;
use comfy_table::{CellAlignment, Table, presets::NOTHING};
use serde::Serialize;

use osc_core::{ContainerInfo, ListOptions, Listing, ListingEntry, parse_path};

use super::{Context, fail};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, format_timestamp, human_size};

/// List containers or objects
#[derive(Args, Debug)]
pub struct LsArgs {
    /// Container path (container[/prefix]); omit to list containers
    pub path: Option<String>,

    /// List every key under the prefix instead of one level
    #[arg(short, long)]
    pub recursive: bool,

    /// Fetch each object's metadata (one extra request per object)
    #[arg(long)]
    pub metadata: bool,
}

#[derive(Debug, Serialize)]
struct ContainerListOutput {
    containers: Vec<ContainerInfo>,
}

#[derive(Debug, Serialize)]
struct FailureOutput {
    name: String,
    error: String,
}

#[derive(Debug, Serialize)]
struct ObjectListOutput {
    container: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    prefix: Option<String>,
    items: Vec<ListingEntry>,
    summary: Summary,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    failures: Vec<FailureOutput>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct Summary {
    objects: usize,
    subdirs: usize,
    total_size_bytes: u64,
}

/// Execute the ls command
pub async fn execute(args: LsArgs, ctx: &Context) -> ExitCode {
    let formatter = ctx.formatter();

    let target = match args.path.as_deref().map(parse_path).transpose() {
        Ok(t) => t,
        Err(e) => return fail(&formatter, &e),
    };

    let client = match ctx.connect().await {
        Ok(c) => c,
        Err(e) => return fail(&formatter, &e),
    };

    let Some(target) = target else {
        return match client.container_list(None).await {
            Ok(containers) => {
                print_containers(&formatter, containers);
                ExitCode::Success
            }
            Err(e) => fail(&formatter, &e),
        };
    };

    let prefix = target.listing_prefix();
    let options = list_options(prefix.clone(), &args, ctx.defaults.list_concurrency);

    match client.object_list(Some(&target.container), options).await {
        Ok(listing) => {
            let complete = listing.is_complete();
            print_listing(&formatter, &target.container, prefix, listing);
            if complete {
                ExitCode::Success
            } else {
                ExitCode::PartialFailure
            }
        }
        Err(e) => fail(&formatter, &e),
    }
}

fn list_options(prefix: Option<String>, args: &LsArgs, concurrency: usize) -> ListOptions {
    let mut options = ListOptions::new()
        .fetch_metadata(args.metadata)
        .metadata_concurrency(concurrency);
    options.prefix = prefix;
    if !args.recursive {
        options = options.delimiter("/");
    }
    options
}

/// Part of the prefix hidden from displayed names: up to its last `/`
fn display_base(prefix: Option<&str>) -> &str {
    prefix
        .and_then(|p| p.rfind('/').map(|i| &p[..=i]))
        .unwrap_or("")
}

fn summarize(listing: &Listing) -> Summary {
    Summary {
        objects: listing.objects().count(),
        subdirs: listing.subdirs().count(),
        total_size_bytes: listing.objects().filter_map(|o| o.size_bytes).sum(),
    }
}

fn print_containers(formatter: &Formatter, containers: Vec<ContainerInfo>) {
    if formatter.is_json() {
        formatter.json(&ContainerListOutput { containers });
        return;
    }

    let mut table = Table::new();
    table.load_preset(NOTHING);
    for c in &containers {
        table.add_row(vec![
            formatter.dim(&format!("[{}]", format_timestamp(c.creation_date))),
            formatter.dir(&format!("{}/", c.name)),
            c.region.clone().unwrap_or_default(),
        ]);
    }
    if !containers.is_empty() {
        formatter.println(&table.to_string());
    }
    formatter.println(&format!("{} containers", containers.len()));
}

fn print_listing(formatter: &Formatter, container: &str, prefix: Option<String>, listing: Listing) {
    let summary = summarize(&listing);

    if formatter.is_json() {
        formatter.json(&ObjectListOutput {
            container: container.to_string(),
            prefix,
            summary,
            failures: listing
                .failures
                .iter()
                .map(|f| FailureOutput {
                    name: f.name.clone(),
                    error: f.error.to_string(),
                })
                .collect(),
            items: listing.entries,
        });
        return;
    }

    let base = display_base(prefix.as_deref());
    let mut table = Table::new();
    table.load_preset(NOTHING);
    for entry in &listing.entries {
        let name = entry.name().strip_prefix(base).unwrap_or(entry.name());
        match entry {
            ListingEntry::Subdir(_) => {
                table.add_row(vec![
                    formatter.dim(&format!("[{}]", format_timestamp(None))),
                    "DIR".to_string(),
                    formatter.dir(name),
                    String::new(),
                ]);
            }
            ListingEntry::Object(object) => {
                let metadata = object
                    .metadata
                    .as_ref()
                    .map(|m| {
                        m.iter()
                            .map(|(k, v)| format!("{k}={v}"))
                            .collect::<Vec<_>>()
                            .join(" ")
                    })
                    .unwrap_or_default();
                table.add_row(vec![
                    formatter.dim(&format!("[{}]", format_timestamp(object.last_modified))),
                    human_size(object.size_bytes.unwrap_or(0)),
                    name.to_string(),
                    metadata,
                ]);
            }
        }
    }
    if let Some(column) = table.column_mut(1) {
        column.set_cell_alignment(CellAlignment::Right);
    }

    if !listing.entries.is_empty() {
        formatter.println(&table.to_string());
    }
    formatter.println(&format!(
        "{} objects, {} subdirectories, {}",
        summary.objects,
        summary.subdirs,
        human_size(summary.total_size_bytes)
    ));

    for failure in &listing.failures {
        formatter.warning(&format!(
            "{}: metadata unavailable: {}",
            failure.name, failure.error
        ));
    }
}
