//! osc-core: Core library for the osc object storage client
//!
//! This crate provides the provider-independent parts of osc:
//! - The `ObjectStorageClient` trait every backend implements
//! - The error taxonomy and batch failure reports
//! - Metadata normalization and validation
//! - Configuration and profile management
//! - Path parsing
//! - An in-memory backend and a conformance suite for backends
//!
//! Nothing here depends on a provider SDK; backends live in their own crates.

pub mod config;
pub mod conformance;
pub mod error;
pub mod memory;
pub mod metadata;
pub mod path;
pub mod profile;
pub mod traits;

pub use config::{Config, ConfigManager, Defaults};
pub use error::{BatchReport, Error, ErrorKind, ItemFailure, Result};
pub use memory::{MemoryClient, MemoryStore};
pub use metadata::{Metadata, MetadataLimits};
pub use path::{ObjectPath, object_path, parse_path};
pub use profile::{Profile, ProfileManager, Provider, RetryConfig, SwiftAuth, TimeoutConfig};
pub use traits::{
    Capabilities, ContainerInfo, ListOptions, ListPage, Listing, ListingEntry, ObjectInfo,
    ObjectStorageClient, SubdirInfo, UploadSource,
};
