//! mb command - Make container
//!
//! Creates a new container. Re-creating a container the caller already owns
//! succeeds; a name held by another account is a conflict.

use clap::Args;
use serde::Serialize;

use osc_core::path::validate_container_name;

use super::{Context, fail};
use crate::exit_code::ExitCode;

/// Create a container
#[derive(Args, Debug)]
pub struct MbArgs {
    /// Container name
    pub container: String,
}

#[derive(Debug, Serialize)]
struct MbOutput {
    status: &'static str,
    container: String,
    created: bool,
}

/// Execute the mb command
pub async fn execute(args: MbArgs, ctx: &Context) -> ExitCode {
    let formatter = ctx.formatter();
    let container = args.container.trim_end_matches('/').to_string();

    if let Err(e) = validate_container_name(&container) {
        return fail(&formatter, &e);
    }

    let client = match ctx.connect().await {
        Ok(c) => c,
        Err(e) => return fail(&formatter, &e),
    };

    match client.container_create(&container).await {
        Ok(created) => {
            if formatter.is_json() {
                formatter.json(&MbOutput {
                    status: "success",
                    container,
                    created,
                });
            } else if created {
                formatter.success(&format!("Container '{container}' created successfully."));
            } else {
                formatter.success(&format!("Container '{container}' already exists."));
            }
            ExitCode::Success
        }
        Err(e) => fail(&formatter, &e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use osc_core::{ErrorKind, MemoryClient, MemoryStore, ObjectStorageClient};

    #[tokio::test]
    async fn test_create_is_repeatable_for_owner() {
        let client = MemoryClient::new();
        assert!(client.container_create("photos").await.unwrap());
        assert!(!client.container_create("photos").await.unwrap());
    }

    #[tokio::test]
    async fn test_create_taken_name_is_conflict() {
        let store = MemoryStore::new();
        let alice = MemoryClient::with_store(store.clone(), "alice");
        let bob = MemoryClient::with_store(store, "bob");

        alice.container_create("shared").await.unwrap();
        let err = bob.container_create("shared").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(ExitCode::from_error(&err), ExitCode::Conflict);
    }

    #[test]
    fn test_mb_output_serialization() {
        let output = MbOutput {
            status: "success",
            container: "photos".to_string(),
            created: false,
        };
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["container"], "photos");
        assert_eq!(json["created"], false);
    }
}
