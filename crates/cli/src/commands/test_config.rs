//! test-config command - verify the selected profile
//!
//! Resolves the profile the other commands would use, connects, and lists
//! containers once to prove credentials and endpoint work.

use clap::Args;
use serde::Serialize;

use osc_core::{ObjectStorageClient, ProfileManager, Result};

use super::{Context, fail};
use crate::backend;
use crate::exit_code::ExitCode;

/// Check connectivity of the selected profile
#[derive(Args, Debug)]
pub struct TestConfigArgs {}

#[derive(Debug, Serialize)]
struct TestConfigOutput {
    status: &'static str,
    profile: String,
    backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    endpoint: Option<String>,
    region: String,
    containers: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    default_container: Option<String>,
}

/// Execute the test-config command
pub async fn execute(_args: TestConfigArgs, ctx: &Context) -> ExitCode {
    let formatter = ctx.formatter();

    let profile = match ProfileManager::new().and_then(|m| m.resolve(ctx.profile.as_deref())) {
        Ok(p) => p,
        Err(e) => return fail(&formatter, &e),
    };

    if !formatter.is_json() {
        formatter.println(&format!(
            "Connecting to {} ({}, region={})",
            profile.provider,
            profile.endpoint.as_deref().unwrap_or("default endpoint"),
            profile.region
        ));
    }

    let name = profile.name.clone();
    let endpoint = profile.endpoint.clone();
    let region = profile.region.clone();

    let client = match backend::connect(profile, &ctx.defaults).await {
        Ok(c) => c,
        Err(e) => return fail(&formatter, &e),
    };

    match check_connection(client.as_ref()).await {
        Ok(containers) => {
            if formatter.is_json() {
                formatter.json(&TestConfigOutput {
                    status: "success",
                    profile: name,
                    backend: client.name().to_string(),
                    endpoint,
                    region,
                    containers,
                    default_container: client.default_container().map(str::to_string),
                });
            } else {
                formatter.success(&format!(
                    "Connection is working! Profile '{name}' sees {containers} container(s)."
                ));
            }
            ExitCode::Success
        }
        Err(e) => fail(&formatter, &e),
    }
}

/// List containers, and check the default container when one is selected
async fn check_connection(client: &dyn ObjectStorageClient) -> Result<usize> {
    let containers = client.container_list(None).await?;
    if let Some(container) = client.default_container() {
        client.container_info(container).await?;
    }
    Ok(containers.len())
}
