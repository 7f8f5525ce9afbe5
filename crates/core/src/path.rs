//! Path parsing and naming rules
//!
//! Remote paths have the format `container[/key]`. The container part is
//! always the first segment; everything after the first slash is the object
//! key, slashes included.

use crate::error::{Error, Result};

/// Longest object key accepted by S3 and Swift, in bytes
pub const MAX_OBJECT_NAME_BYTES: usize = 1024;

/// A parsed remote path pointing to a container or an object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectPath {
    /// Container name
    pub container: String,
    /// Object key (empty for the container root)
    pub key: String,
}

impl ObjectPath {
    pub fn new(container: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            key: key.into(),
        }
    }

    /// Whether the path ends with a slash or names the container root
    pub fn is_dir(&self) -> bool {
        self.key.is_empty() || self.key.ends_with('/')
    }

    /// The key, or an error when the path names only a container
    pub fn require_key(&self) -> Result<&str> {
        if self.key.is_empty() {
            return Err(Error::InvalidPath(format!(
                "'{}' names a container; expected container/object",
                self.container
            )));
        }
        Ok(&self.key)
    }

    /// Prefix to use for a directory-like listing of this path
    ///
    /// A trailing `*` lists everything starting with the text before it;
    /// otherwise the key is treated as a folder and gets a trailing slash.
    pub fn listing_prefix(&self) -> Option<String> {
        if self.key.is_empty() {
            None
        } else if let Some(stem) = self.key.strip_suffix('*') {
            Some(stem.to_string()).filter(|s| !s.is_empty())
        } else if self.key.ends_with('/') {
            Some(self.key.clone())
        } else {
            Some(format!("{}/", self.key))
        }
    }
}

impl std::fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.key.is_empty() {
            write!(f, "{}", self.container)
        } else {
            write!(f, "{}/{}", self.container, self.key)
        }
    }
}

/// Parse a `container[/key]` path
pub fn parse_path(path: &str) -> Result<ObjectPath> {
    let path = path.trim_start_matches('/');

    if path.is_empty() {
        return Err(Error::InvalidPath("Path cannot be empty".into()));
    }

    let (container, key) = match path.split_once('/') {
        Some((container, key)) => (container, key),
        None => (path, ""),
    };

    validate_container_name(container)?;

    Ok(ObjectPath::new(container, key))
}

/// Build the display path of an object: `/container/object`
///
/// Duplicate slashes are collapsed; without a container the path is just
/// `/object`.
pub fn object_path(container: Option<&str>, object: &str) -> String {
    let object = object.trim_start_matches('/');
    let path = match container {
        Some(container) => format!("/{container}/{object}"),
        None => format!("/{object}"),
    };

    let mut collapsed = String::with_capacity(path.len());
    for c in path.chars() {
        if c == '/' && collapsed.ends_with('/') {
            continue;
        }
        collapsed.push(c);
    }
    collapsed
}

/// Provider-independent container name check
pub fn validate_container_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Validation("Container name cannot be empty".into()));
    }
    if name.contains('/') {
        return Err(Error::Validation(format!(
            "Container name '{name}' cannot contain '/'"
        )));
    }
    Ok(())
}

/// Provider-independent object name check
pub fn validate_object_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Validation("Object name cannot be empty".into()));
    }
    if name.len() > MAX_OBJECT_NAME_BYTES {
        return Err(Error::Validation(format!(
            "Object name is {} bytes, at most {MAX_OBJECT_NAME_BYTES} are allowed",
            name.len()
        )));
    }
    Ok(())
}
