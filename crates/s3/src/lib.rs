//! osc-s3: S3 backend for the osc object storage client
//!
//! This crate implements the ObjectStorageClient trait from osc-core using
//! the aws-sdk-s3 crate. It is the only crate that directly depends on the
//! AWS SDK.

pub mod capability;
pub mod client;
mod error;
pub mod multipart;

pub use client::S3Client;
