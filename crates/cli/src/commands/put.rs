//! put command - Upload a local file or stdin
//!
//! The source is streamed; a file of any size or an unbounded stdin pipe is
//! uploaded without being loaded into memory.

use std::path::Path;

use clap::Args;
use serde::Serialize;
use tokio::io::AsyncRead;

use osc_core::metadata::parse_pairs;
use osc_core::{Metadata, ObjectInfo, ObjectPath, ObjectStorageClient, Result, UploadSource};

use super::{Context, fail, object_target};
use crate::exit_code::ExitCode;
use crate::output::{ProgressBar, Tracked, human_size};

/// Upload a file or stdin to an object
#[derive(Args, Debug)]
pub struct PutArgs {
    /// Local file path, or "-" for stdin
    pub source: String,

    /// Destination (container/key); a trailing "/" appends the file name
    pub path: String,

    /// Container name; the destination is then the object key
    #[arg(long)]
    pub container: Option<String>,

    /// Content type (default: guessed from the name)
    #[arg(long)]
    pub content_type: Option<String>,

    /// Metadata to attach, as key=value (repeatable)
    #[arg(short, long = "meta", value_name = "KEY=VALUE")]
    pub meta: Vec<String>,
}

#[derive(Debug, Serialize)]
struct PutOutput {
    status: &'static str,
    source: String,
    container: String,
    #[serde(flatten)]
    info: ObjectInfo,
}

/// Execute the put command
pub async fn execute(args: PutArgs, ctx: &Context) -> ExitCode {
    let formatter = ctx.formatter();

    let metadata = match parse_pairs(&args.meta) {
        Ok(m) => m,
        Err(e) => return fail(&formatter, &e),
    };

    let from_stdin = args.source == "-";
    let destination = destination(&args.path, (!from_stdin).then(|| Path::new(&args.source)));

    let client = match ctx.connect().await {
        Ok(c) => c,
        Err(e) => return fail(&formatter, &e),
    };

    let target = match object_target(
        &destination,
        args.container.as_deref(),
        client.default_container(),
    ) {
        Ok(t) => t,
        Err(e) => return fail(&formatter, &e),
    };

    let content_type = args
        .content_type
        .clone()
        .unwrap_or_else(|| guess_content_type(&target.key));

    let result = if from_stdin {
        let progress = ProgressBar::spinner(formatter.config(), "uploaded");
        let mut reader = Tracked::new(tokio::io::stdin(), progress.clone());
        let result = upload(
            client.as_ref(),
            &target,
            &mut reader,
            None,
            &content_type,
            metadata,
        )
        .await;
        progress.finish_and_clear();
        result
    } else {
        let (file, length) = match open_source(&args.source).await {
            Ok(opened) => opened,
            Err(e) => return fail(&formatter, &e),
        };
        let progress = ProgressBar::new(formatter.config(), length);
        let mut reader = Tracked::new(file, progress.clone());
        let result = upload(
            client.as_ref(),
            &target,
            &mut reader,
            Some(length),
            &content_type,
            metadata,
        )
        .await;
        progress.finish_and_clear();
        result
    };

    match result {
        Ok(info) => {
            if formatter.is_json() {
                formatter.json(&PutOutput {
                    status: "success",
                    source: args.source,
                    container: target.container,
                    info,
                });
            } else {
                let size = info.size_bytes.map(human_size).unwrap_or_default();
                formatter.success(&format!("{} -> {target} ({size})", args.source));
            }
            ExitCode::Success
        }
        Err(e) => fail(&formatter, &e),
    }
}

/// Destination path, with the file name appended to a folder-style path
fn destination(path: &str, source: Option<&Path>) -> String {
    match source.and_then(Path::file_name) {
        Some(name) if path.ends_with('/') => format!("{path}{}", name.to_string_lossy()),
        _ => path.to_string(),
    }
}

fn guess_content_type(key: &str) -> String {
    mime_guess::from_path(key)
        .first()
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

async fn open_source(path: &str) -> Result<(tokio::fs::File, u64)> {
    let file = tokio::fs::File::open(path).await?;
    let length = file.metadata().await?.len();
    Ok((file, length))
}

async fn upload<R>(
    client: &dyn ObjectStorageClient,
    target: &ObjectPath,
    reader: &mut R,
    length: Option<u64>,
    content_type: &str,
    metadata: Metadata,
) -> Result<ObjectInfo>
where
    R: AsyncRead + Send + Unpin,
{
    let mut source = UploadSource::new(reader).with_content_type(content_type);
    if let Some(length) = length {
        source = source.with_length(length);
    }

    tracing::debug!(path = %target, ?length, content_type, "Uploading");
    client
        .object_upload(Some(&target.container), &target.key, source, metadata)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use osc_core::ErrorKind;
    use osc_core::MemoryClient;
    use std::io::Write;

    #[test]
    fn test_destination() {
        let file = Path::new("/tmp/report.pdf");
        assert_eq!(destination("docs/", Some(file)), "docs/report.pdf");
        assert_eq!(destination("docs/2024/", Some(file)), "docs/2024/report.pdf");
        assert_eq!(destination("docs/final.pdf", Some(file)), "docs/final.pdf");
        assert_eq!(destination("docs/", None), "docs/");
    }

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type("a/b.json"), "application/json");
        assert_eq!(guess_content_type("photo.JPG"), "image/jpeg");
        assert_eq!(guess_content_type("noext"), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_upload_file_with_metadata() {
        let client = MemoryClient::new();
        client.container_create("docs").await.unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hello").unwrap();
        let (mut reader, length) = open_source(file.path().to_str().unwrap()).await.unwrap();

        let target = ObjectPath::new("docs", "greeting.txt");
        let metadata = parse_pairs(&["Author=me"]).unwrap();
        let info = upload(&client, &target, &mut reader, Some(length), "text/plain", metadata)
            .await
            .unwrap();
        assert_eq!(info.size_bytes, Some(5));

        let head = client.object_info(Some("docs"), "greeting.txt").await.unwrap();
        assert_eq!(head.content_type.as_deref(), Some("text/plain"));
        assert_eq!(
            head.metadata.unwrap().get("author").map(String::as_str),
            Some("me")
        );
    }

    #[tokio::test]
    async fn test_upload_unknown_length() {
        let client = MemoryClient::new();
        client.container_create("docs").await.unwrap();

        let mut reader: &[u8] = b"streamed";
        let target = ObjectPath::new("docs", "stream.bin");
        let info = upload(
            &client,
            &target,
            &mut reader,
            None,
            "application/octet-stream",
            Metadata::new(),
        )
        .await
        .unwrap();
        assert_eq!(info.size_bytes, Some(8));
    }

    #[tokio::test]
    async fn test_upload_to_missing_container() {
        let client = MemoryClient::new();
        let mut reader: &[u8] = b"x";
        let target = ObjectPath::new("nope", "x");
        let err = upload(&client, &target, &mut reader, None, "text/plain", Metadata::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_open_missing_source() {
        let err = open_source("/definitely/not/here.txt").await.unwrap_err();
        assert_eq!(ExitCode::from_error(&err), ExitCode::GeneralError);
    }
}
