//! rm command - Remove objects
//!
//! Deletes one or more objects. Deleting an object that does not exist
//! succeeds. Every path is attempted; failures are reported together.

use clap::Args;
use serde::Serialize;

use osc_core::{BatchReport, ObjectStorageClient, Result};

use super::{Context, fail, object_target};
use crate::exit_code::ExitCode;
use crate::output::Formatter;

/// Remove objects
#[derive(Args, Debug)]
pub struct RmArgs {
    /// Object paths (container/key)
    #[arg(required = true)]
    pub paths: Vec<String>,

    /// Container name; the paths are then object keys
    #[arg(long)]
    pub container: Option<String>,
}

#[derive(Debug, Serialize)]
struct RmOutput {
    status: &'static str,
    deleted: Vec<String>,
}

/// Execute the rm command
pub async fn execute(args: RmArgs, ctx: &Context) -> ExitCode {
    let formatter = ctx.formatter();

    let client = match ctx.connect().await {
        Ok(c) => c,
        Err(e) => return fail(&formatter, &e),
    };

    let container = args.container.as_deref();
    match remove_all(client.as_ref(), &args.paths, container, &formatter).await {
        Ok(report) => {
            if formatter.is_json() {
                formatter.json(&RmOutput {
                    status: "success",
                    deleted: report.succeeded,
                });
            }
            ExitCode::Success
        }
        Err(e) => fail(&formatter, &e),
    }
}

async fn remove_all(
    client: &dyn ObjectStorageClient,
    paths: &[String],
    container: Option<&str>,
    formatter: &Formatter,
) -> Result<BatchReport> {
    let mut report = BatchReport::new("remove objects");

    for path in paths {
        let result = match object_target(path, container, client.default_container()) {
            Ok(target) => client
                .object_delete(Some(&target.container), &target.key)
                .await
                .map(|()| target.to_string()),
            Err(e) => Err(e),
        };

        match result {
            Ok(removed) => {
                formatter.success(&format!("Removed '{removed}'."));
                report.record_success(removed);
            }
            Err(e) => report.record_failure(path.as_str(), e),
        }
    }

    // A single failure is reported as itself, not as a batch
    if paths.len() == 1 && !report.is_complete() {
        if let Some(failure) = report.failed.pop() {
            return Err(failure.error);
        }
    }

    report.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputConfig;
    use osc_core::{ErrorKind, MemoryClient, Metadata, UploadSource};

    fn quiet() -> Formatter {
        Formatter::new(OutputConfig {
            quiet: true,
            ..Default::default()
        })
    }

    fn paths(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    async fn seeded() -> MemoryClient {
        let client = MemoryClient::new();
        client.container_create("docs").await.unwrap();
        for name in ["a.txt", "b.txt"] {
            let mut body: &[u8] = b"x";
            client
                .object_upload(Some("docs"), name, UploadSource::new(&mut body), Metadata::new())
                .await
                .unwrap();
        }
        client
    }

    #[tokio::test]
    async fn test_remove_existing_and_absent() {
        let client = seeded().await;
        let targets = paths(&["docs/a.txt", "docs/gone.txt"]);
        let report = remove_all(&client, &targets, None, &quiet()).await.unwrap();

        assert_eq!(report.succeeded, vec!["docs/a.txt", "docs/gone.txt"]);
        let err = client.object_info(Some("docs"), "a.txt").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_remove_with_container_flag() {
        let client = seeded().await;
        remove_all(&client, &paths(&["b.txt"]), Some("docs"), &quiet())
            .await
            .unwrap();
        assert!(client.object_info(Some("docs"), "b.txt").await.is_err());
    }

    #[tokio::test]
    async fn test_remove_collects_failures() {
        let client = seeded().await;
        let targets = paths(&["docs/a.txt", "nope/x", "docs"]);
        let err = remove_all(&client, &targets, None, &quiet()).await.unwrap_err();

        let report = match err {
            osc_core::Error::Partial(report) => report,
            other => panic!("expected partial failure, got {other}"),
        };
        assert_eq!(report.succeeded, vec!["docs/a.txt"]);
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.failed[0].error.kind(), ErrorKind::NotFound);
        assert_eq!(report.failed[1].error.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_single_failure_keeps_its_kind() {
        let client = seeded().await;
        let err = remove_all(&client, &paths(&["nope/x"]), None, &quiet())
            .await
            .unwrap_err();
        assert_eq!(ExitCode::from_error(&err), ExitCode::NotFound);
    }
}
