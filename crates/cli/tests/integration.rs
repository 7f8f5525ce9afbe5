//! Integration tests for the osc binary
//!
//! Tests in `memory_backend` run against the in-process memory backend and
//! need nothing else. Tests in `s3_backend` need a running S3-compatible
//! server and are skipped when its settings are absent.
//!
//! Run with:
//! ```bash
//! # Start an S3-compatible server, e.g. MinIO
//! docker run -d --name minio -p 9000:9000 \
//!     -e MINIO_ROOT_USER=accesskey \
//!     -e MINIO_ROOT_PASSWORD=secretkey \
//!     minio/minio server /data
//!
//! export TEST_S3_ENDPOINT=http://localhost:9000
//! export TEST_S3_ACCESS_KEY=accesskey
//! export TEST_S3_SECRET_KEY=secretkey
//! cargo test --features integration
//! ```

#![cfg(feature = "integration")]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::Duration;

use tempfile::TempDir;

fn osc_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_osc"))
}

/// Run osc with an isolated config directory
fn run_osc(args: &[&str], config_dir: &Path) -> Output {
    Command::new(osc_binary())
        .args(args)
        .env("OSC_CONFIG_DIR", config_dir)
        .env_remove("OSC_PROFILE")
        .env_remove("OBS_STORAGE")
        .output()
        .expect("Failed to execute osc")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout is not JSON ({e}): {}",
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "command failed with {:?}: {}",
        output.status.code(),
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Generate a unique suffix for test resources
fn unique_suffix() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{:x}", duration.as_nanos() % 0xFFFF_FFFF)
}

mod profile_management {
    use super::*;

    #[test]
    fn test_set_list_remove() {
        let config_dir = tempfile::tempdir().unwrap();

        let output = run_osc(
            &[
                "profile",
                "set",
                "local",
                "--endpoint",
                "http://localhost:9000",
                "--access-key",
                "ak",
                "--secret-key",
                "sk",
                "--bucket-lookup",
                "path",
                "--default",
            ],
            config_dir.path(),
        );
        assert_success(&output);
        assert!(config_dir.path().join("config.toml").exists());

        let output = run_osc(&["profile", "list", "--json"], config_dir.path());
        assert_success(&output);
        let json = stdout_json(&output);
        let profiles = json["profiles"].as_array().unwrap();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0]["name"], "local");
        assert_eq!(profiles[0]["endpoint"], "http://localhost:9000");
        let listed = serde_json::to_string(&json).unwrap();
        assert!(!listed.contains("\"sk\""), "secrets must not be listed");

        let output = run_osc(&["profile", "remove", "local"], config_dir.path());
        assert_success(&output);

        let output = run_osc(&["profile", "remove", "local"], config_dir.path());
        assert_eq!(output.status.code(), Some(5));
    }

    #[test]
    fn test_invalid_bucket_lookup_is_rejected() {
        let config_dir = tempfile::tempdir().unwrap();
        let output = run_osc(
            &["profile", "set", "bad", "--bucket-lookup", "sideways"],
            config_dir.path(),
        );
        assert_eq!(output.status.code(), Some(2));
    }

    #[test]
    fn test_no_profile_is_usage_error() {
        let config_dir = tempfile::tempdir().unwrap();
        let output = run_osc(&["ls", "--json"], config_dir.path());
        assert_eq!(output.status.code(), Some(2));

        // Errors go to stderr, as JSON when --json is set
        let json: serde_json::Value = serde_json::from_slice(&output.stderr).unwrap();
        assert_eq!(json["exit_code"], 2);
        assert!(json["error"].as_str().is_some());
    }

    #[test]
    fn test_unknown_profile() {
        let config_dir = tempfile::tempdir().unwrap();
        let output = run_osc(&["-p", "ghost", "ls"], config_dir.path());
        assert_eq!(output.status.code(), Some(5));
    }
}

mod memory_backend {
    use super::*;

    /// Config directory with a default memory profile
    fn memory_profile() -> TempDir {
        let config_dir = tempfile::tempdir().unwrap();
        let output = run_osc(
            &["profile", "set", "mem", "--provider", "memory", "--default"],
            config_dir.path(),
        );
        assert_success(&output);
        config_dir
    }

    #[test]
    fn test_config_reaches_backend() {
        let config_dir = memory_profile();
        let output = run_osc(&["test-config", "--json"], config_dir.path());
        assert_success(&output);
        assert_eq!(stdout_json(&output)["profile"], "mem");
    }

    #[test]
    fn test_create_container() {
        let config_dir = memory_profile();
        let output = run_osc(&["mb", "fresh", "--json"], config_dir.path());
        assert_success(&output);

        let json = stdout_json(&output);
        assert_eq!(json["container"], "fresh");
        assert_eq!(json["created"], true);
    }

    #[test]
    fn test_invalid_container_name() {
        let config_dir = memory_profile();
        let output = run_osc(&["container-create", "Bad_Name"], config_dir.path());
        assert_eq!(output.status.code(), Some(2));
    }

    #[test]
    fn test_missing_container_exit_codes() {
        let config_dir = memory_profile();

        let output = run_osc(&["ls", "nowhere/"], config_dir.path());
        assert_eq!(output.status.code(), Some(5));

        let output = run_osc(&["stat", "nowhere/file.txt"], config_dir.path());
        assert_eq!(output.status.code(), Some(5));

        let output = run_osc(&["rm", "nowhere/file.txt"], config_dir.path());
        assert_eq!(output.status.code(), Some(5));
    }

    #[test]
    fn test_remove_missing_container_succeeds() {
        let config_dir = memory_profile();
        let output = run_osc(&["rb", "nowhere", "--json"], config_dir.path());
        assert_success(&output);
        assert_eq!(stdout_json(&output)["existed"], false);
    }

    #[test]
    fn test_completions() {
        let config_dir = tempfile::tempdir().unwrap();
        let output = run_osc(&["completions", "bash"], config_dir.path());
        assert_success(&output);
        assert!(String::from_utf8_lossy(&output.stdout).contains("osc"));
    }
}

mod s3_backend {
    use super::*;

    fn test_config() -> Option<(String, String, String)> {
        let endpoint = std::env::var("TEST_S3_ENDPOINT").ok()?;
        let access_key = std::env::var("TEST_S3_ACCESS_KEY").ok()?;
        let secret_key = std::env::var("TEST_S3_SECRET_KEY").ok()?;
        Some((endpoint, access_key, secret_key))
    }

    /// Wait for the server to answer container listings
    fn wait_for_ready(config_dir: &Path) -> bool {
        for _ in 0..30 {
            if run_osc(&["ls", "--json"], config_dir).status.success() {
                return true;
            }
            std::thread::sleep(Duration::from_secs(1));
        }
        false
    }

    /// Set up a default S3 profile and a fresh container
    fn setup() -> Option<(TempDir, String)> {
        let (endpoint, access_key, secret_key) = test_config()?;
        let config_dir = tempfile::tempdir().ok()?;

        let output = run_osc(
            &[
                "profile",
                "set",
                "test",
                "--endpoint",
                &endpoint,
                "--access-key",
                &access_key,
                "--secret-key",
                &secret_key,
                "--bucket-lookup",
                "path",
                "--default",
            ],
            config_dir.path(),
        );
        if !output.status.success() {
            eprintln!(
                "Failed to set profile: {}",
                String::from_utf8_lossy(&output.stderr)
            );
            return None;
        }

        if !wait_for_ready(config_dir.path()) {
            eprintln!("S3 service did not become ready in time");
            return None;
        }

        let container = format!("osc-test-{}", unique_suffix());
        let output = run_osc(&["mb", &container], config_dir.path());
        if !output.status.success() {
            eprintln!(
                "Failed to create container: {}",
                String::from_utf8_lossy(&output.stderr)
            );
            return None;
        }

        Some((config_dir, container))
    }

    fn cleanup(config_dir: &Path, container: &str) {
        let _ = run_osc(&["rb", container, "--force", "--yes"], config_dir);
    }

    fn put_file(config_dir: &Path, dir: &Path, dest: &str, body: &[u8], meta: &[&str]) {
        let source = dir.join("upload.bin");
        std::fs::write(&source, body).unwrap();
        let source = source.to_string_lossy().to_string();

        let mut args = vec!["put", source.as_str(), dest];
        for pair in meta {
            args.extend(["--meta", pair]);
        }
        assert_success(&run_osc(&args, config_dir));
    }

    #[test]
    fn test_object_lifecycle() {
        let Some((config_dir, container)) = setup() else {
            eprintln!("Skipping: S3 test config not available");
            return;
        };
        let config = config_dir.path();
        let work = tempfile::tempdir().unwrap();

        // Upload with metadata
        let dest = format!("{container}/docs/report.txt");
        put_file(config, work.path(), &dest, b"quarterly numbers", &["Owner=alice"]);

        // Details
        let output = run_osc(&["stat", &dest, "--json"], config);
        assert_success(&output);
        let json = stdout_json(&output);
        assert_eq!(json["name"], "docs/report.txt");
        assert_eq!(json["size_bytes"], 17);
        assert_eq!(json["content_type"], "text/plain");
        assert_eq!(json["metadata"]["owner"], "alice");

        // Single-key changes keep the other keys
        let output = run_osc(&["meta", "set", &dest, "stage=final", "--json"], config);
        assert_success(&output);
        let json = stdout_json(&output);
        assert_eq!(json["metadata"]["owner"], "alice");
        assert_eq!(json["metadata"]["stage"], "final");

        let output = run_osc(&["meta", "delete", &dest, "owner", "--json"], config);
        assert_success(&output);
        let json = stdout_json(&output);
        assert!(json["metadata"].get("owner").is_none());
        assert_eq!(json["metadata"]["stage"], "final");

        // Replacing metadata leaves the body alone
        let output = run_osc(&["meta", "replace", &dest, "--json"], config);
        assert_success(&output);
        assert!(stdout_json(&output)["metadata"].as_object().unwrap().is_empty());

        let local = work.path().join("downloaded.txt");
        let output = run_osc(&["get", &dest, &local.to_string_lossy()], config);
        assert_success(&output);
        assert_eq!(std::fs::read(&local).unwrap(), b"quarterly numbers");

        // Delete twice; the second delete is still a success
        assert_success(&run_osc(&["rm", &dest], config));
        assert_success(&run_osc(&["rm", &dest], config));
        let output = run_osc(&["stat", &dest], config);
        assert_eq!(output.status.code(), Some(5));

        cleanup(config, &container);
    }

    #[test]
    fn test_folder_listing() {
        let Some((config_dir, container)) = setup() else {
            eprintln!("Skipping: S3 test config not available");
            return;
        };
        let config = config_dir.path();
        let work = tempfile::tempdir().unwrap();

        for key in ["a.txt", "photos/1.jpg", "photos/2024/2.jpg", "photos-old.zip"] {
            put_file(config, work.path(), &format!("{container}/{key}"), b"x", &[]);
        }

        let output = run_osc(&["ls", &format!("{container}/"), "--json"], config);
        assert_success(&output);
        let json = stdout_json(&output);
        let names: Vec<&str> = json["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["name"].as_str().or(e["prefix"].as_str()).unwrap())
            .collect();
        assert_eq!(names, vec!["a.txt", "photos-old.zip", "photos/"]);

        let output = run_osc(&["ls", &format!("{container}/photos/"), "--json"], config);
        assert_success(&output);
        let json = stdout_json(&output);
        assert_eq!(json["summary"]["objects"], 1);
        assert_eq!(json["summary"]["subdirs"], 1);

        let output = run_osc(
            &["ls", &format!("{container}/photos"), "--recursive", "--json"],
            config,
        );
        assert_success(&output);
        assert_eq!(stdout_json(&output)["summary"]["objects"], 3);

        cleanup(config, &container);
    }

    #[test]
    fn test_container_delete_needs_force() {
        let Some((config_dir, container)) = setup() else {
            eprintln!("Skipping: S3 test config not available");
            return;
        };
        let config = config_dir.path();
        let work = tempfile::tempdir().unwrap();
        put_file(config, work.path(), &format!("{container}/keep.txt"), b"x", &[]);

        let output = run_osc(&["rb", &container], config);
        assert_eq!(output.status.code(), Some(6));

        let output = run_osc(&["rb", &container, "--force", "--yes", "--json"], config);
        assert_success(&output);
        assert_eq!(stdout_json(&output)["objects_deleted"], 1);

        let output = run_osc(&["stat", &container], config);
        assert_eq!(output.status.code(), Some(5));
    }

    #[test]
    fn test_stdin_upload_and_stdout_download() {
        use std::io::Write;
        use std::process::Stdio;

        let Some((config_dir, container)) = setup() else {
            eprintln!("Skipping: S3 test config not available");
            return;
        };
        let config = config_dir.path();
        let dest = format!("{container}/piped.bin");

        let mut child = Command::new(osc_binary())
            .args(["put", "-", &dest])
            .env("OSC_CONFIG_DIR", config)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()
            .unwrap();
        child
            .stdin
            .take()
            .unwrap()
            .write_all(&vec![7u8; 64 * 1024])
            .unwrap();
        assert!(child.wait().unwrap().success());

        let output = run_osc(&["get", &dest, "-"], config);
        assert_success(&output);
        assert_eq!(output.stdout.len(), 64 * 1024);

        cleanup(config, &container);
    }
}
