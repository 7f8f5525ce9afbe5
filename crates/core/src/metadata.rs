//! User-defined object metadata
//!
//! Keys are normalized to lowercase, which is how both S3 (`x-amz-meta-*`)
//! and Swift (`X-Object-Meta-*`) hand them back. Limits differ per provider,
//! so each backend reports its own [`MetadataLimits`] and metadata is checked
//! against them before a request is sent.

use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// User metadata attached to an object
pub type Metadata = BTreeMap<String, String>;

/// Provider limits on user metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataLimits {
    /// Combined byte length of all keys and values
    pub max_total_bytes: usize,

    /// Maximum number of keys, if the provider caps it
    pub max_keys: Option<usize>,
}

impl MetadataLimits {
    /// S3 caps user metadata at 2 KiB of keys and values combined
    pub const S3: Self = Self {
        max_total_bytes: 2 * 1024,
        max_keys: None,
    };

    /// Swift caps metadata at 90 items and 4 KiB overall
    pub const SWIFT: Self = Self {
        max_total_bytes: 4 * 1024,
        max_keys: Some(90),
    };
}

impl Default for MetadataLimits {
    fn default() -> Self {
        Self::S3
    }
}

/// Normalize a metadata key to its stored form
pub fn normalize_key(key: &str) -> String {
    key.trim().to_ascii_lowercase()
}

/// Normalize every key of a metadata map
///
/// When two keys differ only by case, the last one in iteration order wins.
pub fn normalize<I, K, V>(entries: I) -> Metadata
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
{
    entries
        .into_iter()
        .map(|(k, v)| (normalize_key(k.as_ref()), v.into()))
        .collect()
}

/// Characters allowed in an HTTP header name besides ASCII alphanumerics
const TOKEN_SYMBOLS: &str = "!#$%&'*+-.^_`|~";

/// Check a metadata key: a non-empty HTTP token, as metadata keys travel
/// inside header names
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::Validation("Metadata key cannot be empty".into()));
    }

    if let Some(c) = key
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || TOKEN_SYMBOLS.contains(*c)))
    {
        return Err(Error::Validation(format!(
            "Metadata key '{key}' contains invalid character {c:?}"
        )));
    }

    Ok(())
}

/// Check a metadata value: printable ASCII, as HTTP headers require
pub fn validate_value(key: &str, value: &str) -> Result<()> {
    if value.chars().any(|c| !(c == ' ' || c.is_ascii_graphic())) {
        return Err(Error::Validation(format!(
            "Metadata value for '{key}' must be printable ASCII"
        )));
    }
    Ok(())
}

/// Validate a whole (already normalized) metadata map against provider limits
pub fn validate(metadata: &Metadata, limits: &MetadataLimits) -> Result<()> {
    let mut total = 0usize;
    for (key, value) in metadata {
        validate_key(key)?;
        validate_value(key, value)?;
        total += key.len() + value.len();
    }

    if let Some(max_keys) = limits.max_keys {
        if metadata.len() > max_keys {
            return Err(Error::Validation(format!(
                "Metadata has {} keys, the backend allows at most {max_keys}",
                metadata.len()
            )));
        }
    }

    if total > limits.max_total_bytes {
        return Err(Error::Validation(format!(
            "Metadata is {total} bytes, the backend allows at most {} bytes",
            limits.max_total_bytes
        )));
    }

    Ok(())
}

/// Parse `key=value` pairs, as accepted on the command line
pub fn parse_pairs<S: AsRef<str>>(pairs: &[S]) -> Result<Metadata> {
    let mut metadata = Metadata::new();
    for pair in pairs {
        let pair = pair.as_ref();
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            Error::Validation(format!("Expected key=value metadata, got '{pair}'"))
        })?;
        metadata.insert(normalize_key(key), value.to_string());
    }
    Ok(metadata)
}
