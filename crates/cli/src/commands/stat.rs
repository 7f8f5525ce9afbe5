//! stat command - Show object or container details
//!
//! `stat container` shows a container, `stat container/key` an object with
//! its metadata. `--usage` adds object count and total size to a container,
//! computed from a full listing.

use clap::Args;
use serde::Serialize;

use osc_core::{ContainerInfo, ListOptions, ObjectInfo, ObjectStorageClient, Result, parse_path};

use super::{Context, fail, object_target};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, human_size};

/// Show object or container details
#[derive(Args, Debug)]
pub struct StatArgs {
    /// Container or object path (container[/key])
    pub path: String,

    /// Container name; the path is then the object key
    #[arg(long)]
    pub container: Option<String>,

    /// Count objects and bytes in a container (lists every object)
    #[arg(long)]
    pub usage: bool,
}

#[derive(Debug, Serialize)]
struct ContainerOutput {
    #[serde(flatten)]
    info: ContainerInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    object_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    size_bytes: Option<u64>,
}

#[derive(Debug, Serialize)]
struct ObjectOutput {
    container: String,
    #[serde(flatten)]
    info: ObjectInfo,
}

/// Execute the stat command
pub async fn execute(args: StatArgs, ctx: &Context) -> ExitCode {
    let formatter = ctx.formatter();

    let client = match ctx.connect().await {
        Ok(c) => c,
        Err(e) => return fail(&formatter, &e),
    };

    let container_only = args.container.is_none()
        && parse_path(&args.path).is_ok_and(|p| p.key.is_empty());

    let result = if container_only {
        let name = args.path.trim_matches('/');
        stat_container(client.as_ref(), name, args.usage)
            .await
            .map(|output| print_container(&formatter, &output))
    } else {
        let target = match object_target(
            &args.path,
            args.container.as_deref(),
            client.default_container(),
        ) {
            Ok(t) => t,
            Err(e) => return fail(&formatter, &e),
        };
        client
            .object_info(Some(&target.container), &target.key)
            .await
            .map(|info| {
                print_object(
                    &formatter,
                    &ObjectOutput {
                        container: target.container.clone(),
                        info,
                    },
                )
            })
    };

    match result {
        Ok(()) => ExitCode::Success,
        Err(e) => fail(&formatter, &e),
    }
}

/// Object count and total bytes of a container
pub(super) async fn container_usage(
    client: &dyn ObjectStorageClient,
    container: &str,
) -> Result<(u64, u64)> {
    let listing = client
        .object_list(Some(container), ListOptions::default())
        .await?;
    Ok(listing.objects().fold((0, 0), |(count, bytes), o| {
        (count + 1, bytes + o.size_bytes.unwrap_or(0))
    }))
}

async fn stat_container(
    client: &dyn ObjectStorageClient,
    name: &str,
    usage: bool,
) -> Result<ContainerOutput> {
    let info = client.container_info(name).await?;
    let (object_count, size_bytes) = if usage {
        let (count, bytes) = container_usage(client, name).await?;
        (Some(count), Some(bytes))
    } else {
        (None, None)
    };

    Ok(ContainerOutput {
        info,
        object_count,
        size_bytes,
    })
}

fn print_container(formatter: &Formatter, output: &ContainerOutput) {
    if formatter.is_json() {
        formatter.json(output);
        return;
    }

    formatter.println(&format!("Container : {}", output.info.name));
    if let Some(created) = output.info.creation_date {
        formatter.println(&format!(
            "Created   : {}",
            created.strftime("%Y-%m-%d %H:%M:%S UTC")
        ));
    }
    if let Some(region) = &output.info.region {
        formatter.println(&format!("Region    : {region}"));
    }
    if let Some(count) = output.object_count {
        formatter.println(&format!("Objects   : {count}"));
    }
    if let Some(bytes) = output.size_bytes {
        formatter.println(&format!("Size      : {} ({bytes} bytes)", human_size(bytes)));
    }
}

fn print_object(formatter: &Formatter, output: &ObjectOutput) {
    if formatter.is_json() {
        formatter.json(output);
        return;
    }

    let info = &output.info;
    formatter.println(&format!("Name      : {}/{}", output.container, info.name));
    if let Some(size) = info.size_bytes {
        formatter.println(&format!("Size      : {} ({size} bytes)", human_size(size)));
    }
    if let Some(modified) = info.last_modified {
        formatter.println(&format!(
            "Date      : {}",
            modified.strftime("%Y-%m-%d %H:%M:%S UTC")
        ));
    }
    if let Some(etag) = &info.etag {
        formatter.println(&format!("ETag      : {etag}"));
    }
    if let Some(ct) = &info.content_type {
        formatter.println(&format!("Type      : {ct}"));
    }
    match info.metadata.as_ref().filter(|m| !m.is_empty()) {
        None => formatter.println("Metadata  : none"),
        Some(metadata) => {
            formatter.println("Metadata  :");
            for (key, value) in metadata {
                formatter.println(&format!("  {key}: {value}"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use osc_core::{ErrorKind, MemoryClient, Metadata, UploadSource};

    async fn upload(client: &MemoryClient, name: &str, body: &[u8]) {
        let mut reader = body;
        client
            .object_upload(Some("docs"), name, UploadSource::new(&mut reader), Metadata::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_container_usage_counts_every_page() {
        let client = MemoryClient::new().with_page_size(2);
        client.container_create("docs").await.unwrap();
        upload(&client, "a", b"12345").await;
        upload(&client, "b/c", b"123").await;
        upload(&client, "b/d", b"").await;

        assert_eq!(container_usage(&client, "docs").await.unwrap(), (3, 8));
    }

    #[tokio::test]
    async fn test_stat_container_without_usage() {
        let client = MemoryClient::new();
        client.container_create("docs").await.unwrap();

        let output = stat_container(&client, "docs", false).await.unwrap();
        assert_eq!(output.info.name, "docs");
        assert!(output.object_count.is_none());

        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["name"], "docs");
        assert!(json.get("object_count").is_none());
    }

    #[tokio::test]
    async fn test_stat_missing_container() {
        let client = MemoryClient::new();
        let err = stat_container(&client, "nope", true).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_object_output_flattens_info() {
        let output = ObjectOutput {
            container: "docs".to_string(),
            info: ObjectInfo::new("a.txt", 3).with_etag("\"abc\""),
        };
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["container"], "docs");
        assert_eq!(json["name"], "a.txt");
        assert_eq!(json["etag"], "abc");
    }
}
