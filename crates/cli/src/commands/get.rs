//! get command - Download an object
//!
//! Streams an object into a local file or stdout. A failed download removes
//! the partial file.

use std::path::{Path, PathBuf};

use clap::Args;
use serde::Serialize;

use osc_core::{ObjectPath, ObjectStorageClient, Result};

use super::{Context, fail, object_target};
use crate::exit_code::ExitCode;
use crate::output::{ProgressBar, Tracked, human_size};

/// Download an object to a file or stdout
#[derive(Args, Debug)]
pub struct GetArgs {
    /// Object path (container/key)
    pub path: String,

    /// Local file or directory, or "-" for stdout
    pub destination: String,

    /// Container name; the path is then the object key
    #[arg(long)]
    pub container: Option<String>,
}

#[derive(Debug, Serialize)]
struct GetOutput {
    status: &'static str,
    source: String,
    destination: String,
    size_bytes: u64,
}

/// Execute the get command
pub async fn execute(args: GetArgs, ctx: &Context) -> ExitCode {
    let formatter = ctx.formatter();

    let client = match ctx.connect().await {
        Ok(c) => c,
        Err(e) => return fail(&formatter, &e),
    };

    let target = match object_target(
        &args.path,
        args.container.as_deref(),
        client.default_container(),
    ) {
        Ok(t) => t,
        Err(e) => return fail(&formatter, &e),
    };

    if args.destination == "-" {
        let mut stdout = tokio::io::stdout();
        return match client
            .object_download(Some(&target.container), &target.key, &mut stdout)
            .await
        {
            Ok(_) => ExitCode::Success,
            Err(e) => fail(&formatter, &e),
        };
    }

    let path = local_path(Path::new(&args.destination), &target.key);

    // Fails before a local file exists when the object is missing
    let size = match client.object_info(Some(&target.container), &target.key).await {
        Ok(info) => info.size_bytes,
        Err(e) => return fail(&formatter, &e),
    };

    let progress = match size {
        Some(size) => ProgressBar::new(formatter.config(), size),
        None => ProgressBar::spinner(formatter.config(), "downloaded"),
    };
    let result = download_to_file(client.as_ref(), &target, &path, progress.clone()).await;
    progress.finish_and_clear();

    match result {
        Ok(written) => {
            let destination = path.display().to_string();
            if formatter.is_json() {
                formatter.json(&GetOutput {
                    status: "success",
                    source: target.to_string(),
                    destination,
                    size_bytes: written,
                });
            } else {
                formatter.success(&format!(
                    "{target} -> {destination} ({})",
                    human_size(written)
                ));
            }
            ExitCode::Success
        }
        Err(e) => fail(&formatter, &e),
    }
}

/// Local file for a download; a directory gets the key's last segment
fn local_path(destination: &Path, key: &str) -> PathBuf {
    let as_dir = destination.is_dir() || destination.to_string_lossy().ends_with('/');
    if !as_dir {
        return destination.to_path_buf();
    }
    let file_name = key.rsplit('/').find(|s| !s.is_empty()).unwrap_or(key);
    destination.join(file_name)
}

async fn download_to_file(
    client: &dyn ObjectStorageClient,
    target: &ObjectPath,
    path: &Path,
    progress: ProgressBar,
) -> Result<u64> {
    let file = tokio::fs::File::create(path).await?;
    let mut sink = Tracked::new(file, progress);

    match client
        .object_download(Some(&target.container), &target.key, &mut sink)
        .await
    {
        Ok(written) => Ok(written),
        Err(e) => {
            drop(sink);
            if let Err(remove_err) = tokio::fs::remove_file(path).await {
                tracing::warn!(path = %path.display(), error = %remove_err, "Could not remove partial download");
            }
            Err(e)
        }
    }
}
