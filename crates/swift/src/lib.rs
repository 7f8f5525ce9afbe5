//! osc-swift: OpenStack Swift backend for the osc object storage client
//!
//! This crate implements the ObjectStorageClient trait from osc-core over
//! the Swift HTTP API with reqwest. Tokens come from Keystone v3 password
//! authentication or are supplied directly.

mod auth;
pub mod client;
mod error;
mod listing;

pub use client::SwiftClient;
