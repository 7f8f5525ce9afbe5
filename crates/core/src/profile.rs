//! Profile management
//!
//! A profile names one storage backend: which provider to talk to, where its
//! endpoint is, and how requests are retried and timed out. Credentials are
//! optional; when absent the provider SDK resolves them from its own chain.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::ConfigManager;
use crate::error::{Error, Result};

/// Name of the profile built from `OBS_*` environment variables
pub const ENV_PROFILE: &str = "env";

/// Storage provider behind a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Amazon S3 or an S3-compatible server
    #[default]
    S3,
    /// OpenStack Swift, authenticated through Keystone or a static token
    Swift,
    /// Process-local store, for tests and dry runs
    Memory,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::S3 => f.write_str("s3"),
            Provider::Swift => f.write_str("swift"),
            Provider::Memory => f.write_str("memory"),
        }
    }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "s3" => Ok(Provider::S3),
            "swift" => Ok(Provider::Swift),
            "memory" => Ok(Provider::Memory),
            other => Err(Error::Config(format!(
                "Unknown storage provider '{other}', expected s3, swift or memory"
            ))),
        }
    }
}

/// Retry configuration for a profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial backoff duration in milliseconds
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff duration in milliseconds
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff() -> u64 {
    100
}

fn default_max_backoff() -> u64 {
    10000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

/// Timeout configuration for a profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Connection timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_ms: u64,

    /// Read timeout in milliseconds
    #[serde(default = "default_read_timeout")]
    pub read_ms: u64,

    /// Overall limit for one operation attempt, unset by default so large
    /// transfers are not cut off
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_attempt_ms: Option<u64>,
}

fn default_connect_timeout() -> u64 {
    5000
}

fn default_read_timeout() -> u64 {
    30000
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: default_connect_timeout(),
            read_ms: default_read_timeout(),
            operation_attempt_ms: None,
        }
    }
}

/// Swift credentials
///
/// Either a pre-issued `token`, or Keystone v3 password credentials that are
/// exchanged for a token when the client is built.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SwiftAuth {
    /// Keystone endpoint, e.g. `https://keystone.example.com/v3`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Project (tenant) the token is scoped to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_domain: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_domain: Option<String>,

    /// Pre-issued token; skips Keystone entirely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl SwiftAuth {
    /// Read `OS_*` variables the way the OpenStack clients do
    fn from_lookup<F>(lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|s| !s.is_empty());
        Self {
            auth_url: var("OS_AUTH_URL"),
            username: var("OS_USERNAME"),
            password: var("OS_PASSWORD"),
            project_name: var("OS_PROJECT_NAME").or_else(|| var("OS_TENANT_NAME")),
            user_domain: var("OS_USER_DOMAIN_NAME"),
            project_domain: var("OS_PROJECT_DOMAIN_NAME"),
            token: var("OS_AUTH_TOKEN"),
        }
    }

    /// Keystone fields still missing for password authentication
    pub fn missing_password_fields(&self) -> Vec<&'static str> {
        [
            ("auth_url", self.auth_url.is_none()),
            ("username", self.username.is_none()),
            ("password", self.password.is_none()),
            ("project_name", self.project_name.is_none()),
        ]
        .into_iter()
        .filter_map(|(field, missing)| missing.then_some(field))
        .collect()
    }
}

/// A named storage backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Unique name for this profile
    pub name: String,

    /// Storage provider
    #[serde(default)]
    pub provider: Provider,

    /// Endpoint URL; `None` uses the provider's public endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Region containers are created in
    #[serde(default = "default_region")]
    pub region: String,

    /// Static access key ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,

    /// Static secret access key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,

    /// Swift credentials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swift: Option<SwiftAuth>,

    /// Bucket lookup style: "auto", "path", or "dns"
    #[serde(default = "default_bucket_lookup")]
    pub bucket_lookup: String,

    /// Container used when a command names none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,

    /// Retry configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,

    /// Timeout configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<TimeoutConfig>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_bucket_lookup() -> String {
    "auto".to_string()
}

impl Profile {
    /// Create a new profile for a provider with default settings
    pub fn new(name: impl Into<String>, provider: Provider) -> Self {
        Self {
            name: name.into(),
            provider,
            endpoint: None,
            region: default_region(),
            access_key: None,
            secret_key: None,
            swift: None,
            bucket_lookup: default_bucket_lookup(),
            container: None,
            retry: None,
            timeout: None,
        }
    }

    /// Create an S3 profile pointing at an endpoint with static credentials
    pub fn s3(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            access_key: Some(access_key.into()),
            secret_key: Some(secret_key.into()),
            ..Self::new(name, Provider::S3)
        }
    }

    /// Build the `env` profile from `OBS_*` variables
    ///
    /// `OBS_STORAGE` picks the provider. S3 reads `OBS_S3_LOCATION` and
    /// `OBS_S3_ENDPOINT`; Swift reads its storage URL from `OBS_SWIFT_URL`
    /// and credentials from the usual `OS_*` variables. Returns `None` when
    /// `OBS_STORAGE` is unset.
    pub fn from_env() -> Result<Option<Self>> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Option<Self>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let Some(storage) = lookup("OBS_STORAGE").filter(|s| !s.is_empty()) else {
            return Ok(None);
        };

        let var = |key: &str| lookup(key).filter(|s| !s.is_empty());
        let mut profile = Self::new(ENV_PROFILE, storage.parse()?);
        match profile.provider {
            Provider::S3 => {
                if let Some(region) = var("OBS_S3_LOCATION") {
                    profile.region = region;
                }
                profile.endpoint = var("OBS_S3_ENDPOINT");
            }
            Provider::Swift => {
                profile.endpoint = Some(var("OBS_SWIFT_URL").ok_or_else(|| {
                    Error::Config("OBS_STORAGE=swift requires OBS_SWIFT_URL".into())
                })?);
                profile.swift = Some(SwiftAuth::from_lookup(&lookup));
            }
            Provider::Memory => {}
        }

        Ok(Some(profile))
    }

    /// Check the fields a backend needs before connecting
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::Config("Profile name cannot be empty".into()));
        }
        if let Some(endpoint) = &self.endpoint {
            url::Url::parse(endpoint)?;
        }
        if self.access_key.is_some() != self.secret_key.is_some() {
            return Err(Error::Config(format!(
                "Profile '{}' must set both access_key and secret_key, or neither",
                self.name
            )));
        }
        if !matches!(self.bucket_lookup.as_str(), "auto" | "path" | "dns") {
            return Err(Error::Config(format!(
                "Invalid bucket_lookup '{}', expected auto, path or dns",
                self.bucket_lookup
            )));
        }
        if self.provider == Provider::Swift {
            self.validate_swift()?;
        }
        Ok(())
    }

    fn validate_swift(&self) -> Result<()> {
        if self.endpoint.is_none() {
            return Err(Error::Config(format!(
                "Swift profile '{}' needs the storage URL as its endpoint",
                self.name
            )));
        }
        let auth = self.swift.clone().unwrap_or_default();
        if auth.token.is_some() {
            return Ok(());
        }
        let missing = auth.missing_password_fields();
        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "Swift profile '{}' needs a token or {}",
                self.name,
                missing.join(", ")
            )));
        }
        if let Some(auth_url) = &auth.auth_url {
            url::Url::parse(auth_url)?;
        }
        Ok(())
    }

    /// Get the effective retry configuration
    pub fn retry_config(&self) -> RetryConfig {
        self.retry.clone().unwrap_or_default()
    }

    /// Get the effective timeout configuration
    pub fn timeout_config(&self) -> TimeoutConfig {
        self.timeout.clone().unwrap_or_default()
    }
}

/// Manager for profile operations
pub struct ProfileManager {
    config_manager: ConfigManager,
}

impl ProfileManager {
    /// Create a new ProfileManager with a specific ConfigManager
    pub fn with_config_manager(config_manager: ConfigManager) -> Self {
        Self { config_manager }
    }

    /// Create a new ProfileManager using the default config location
    pub fn new() -> Result<Self> {
        let config_manager = ConfigManager::new()?;
        Ok(Self { config_manager })
    }

    pub fn config_manager(&self) -> &ConfigManager {
        &self.config_manager
    }

    /// List all configured profiles
    pub fn list(&self) -> Result<Vec<Profile>> {
        let config = self.config_manager.load()?;
        Ok(config.profiles)
    }

    /// Get a profile by name
    ///
    /// `env` resolves to the environment profile unless a saved profile
    /// already uses that name.
    pub fn get(&self, name: &str) -> Result<Profile> {
        let config = self.config_manager.load()?;
        if let Some(profile) = config.profiles.into_iter().find(|p| p.name == name) {
            return Ok(profile);
        }
        if name == ENV_PROFILE {
            if let Some(profile) = Profile::from_env()? {
                return Ok(profile);
            }
        }
        Err(Error::ProfileNotFound(name.to_string()))
    }

    /// Pick the profile a command runs against
    ///
    /// Order: the explicit name, then `defaults.profile` from the config
    /// file, then the environment profile.
    pub fn resolve(&self, explicit: Option<&str>) -> Result<Profile> {
        if let Some(name) = explicit {
            return self.get(name);
        }

        let config = self.config_manager.load()?;
        if let Some(name) = config.defaults.profile.as_deref() {
            return self.get(name);
        }

        Profile::from_env()?.ok_or_else(|| {
            Error::Config(
                "No profile selected: pass --profile, set defaults.profile, or set OBS_STORAGE"
                    .into(),
            )
        })
    }

    /// Add a new profile, failing if the name is taken
    pub fn add(&self, profile: Profile) -> Result<()> {
        let mut config = self.config_manager.load()?;
        if config.profiles.iter().any(|p| p.name == profile.name) {
            return Err(Error::ProfileExists(profile.name));
        }
        profile.validate()?;
        config.profiles.push(profile);
        self.config_manager.save(&config)
    }

    /// Add or update a profile
    pub fn set(&self, profile: Profile) -> Result<()> {
        profile.validate()?;
        let mut config = self.config_manager.load()?;

        config.profiles.retain(|p| p.name != profile.name);
        config.profiles.push(profile);

        self.config_manager.save(&config)
    }

    /// Remove a profile
    pub fn remove(&self, name: &str) -> Result<()> {
        let mut config = self.config_manager.load()?;
        let original_len = config.profiles.len();

        config.profiles.retain(|p| p.name != name);

        if config.profiles.len() == original_len {
            return Err(Error::ProfileNotFound(name.to_string()));
        }

        if config.defaults.profile.as_deref() == Some(name) {
            config.defaults.profile = None;
        }

        self.config_manager.save(&config)
    }

    /// Check if a profile exists in the config file
    pub fn exists(&self, name: &str) -> Result<bool> {
        let config = self.config_manager.load()?;
        Ok(config.profiles.iter().any(|p| p.name == name))
    }
}
