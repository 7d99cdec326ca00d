//! Storage keys and the `wasabi-key:` marker that stands in for them.
//!
//! A storage key locates an asset in the object store, for system uploads
//! always `documents/<documentId>/<stem>.webp`. Persisted bodies carry the
//! key as a marker in an image source; the marker is the only durable form.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::KeyError;

/// Prefix that turns a storage key into a key marker.
pub const KEY_PREFIX: &str = "wasabi-key:";

/// Path segment every system-managed key starts with.
pub const DOCUMENTS_SEGMENT: &str = "documents/";

/// Extension of every system-managed upload.
pub const ASSET_EXTENSION: &str = ".webp";

/// An opaque, path-like object-store key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageKey(String);

impl StorageKey {
    /// Wrap a key verbatim. No shape check is made: the resolver hands
    /// whatever follows a marker prefix to the signer as-is.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Build the key the upload path assigns to an image inserted into a
    /// document: `documents/<document_id>/<file_stem>.webp`.
    ///
    /// # Errors
    ///
    /// - [`KeyError::Empty`] if either component is empty.
    /// - [`KeyError::ForbiddenCharacter`] if a component contains `/`, a
    ///   quote, or whitespace.
    pub fn for_upload(document_id: &str, file_stem: &str) -> Result<Self, KeyError> {
        check_component("document id", document_id)?;
        check_component("file stem", file_stem)?;
        Ok(Self(format!(
            "{DOCUMENTS_SEGMENT}{document_id}/{file_stem}{ASSET_EXTENSION}"
        )))
    }

    /// Recognize a system-managed asset from a URL path.
    ///
    /// The path must contain `documents/` and end with `.webp`; the key is
    /// everything from the first `documents/` onwards. Bucket prefixes and
    /// other leading segments are dropped.
    pub fn from_asset_path(path: &str) -> Option<Self> {
        if !path.ends_with(ASSET_EXTENSION) {
            return None;
        }
        let start = path.find(DOCUMENTS_SEGMENT)?;
        Some(Self(path[start..].to_owned()))
    }

    /// Render the durable marker form, `wasabi-key:<key>`.
    pub fn marker(&self) -> String {
        format!("{KEY_PREFIX}{}", self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StorageKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Extract the storage key from an attribute value in marker form.
///
/// Returns `None` for values without the prefix or with nothing after it.
pub fn parse_marker(value: &str) -> Option<StorageKey> {
    value
        .strip_prefix(KEY_PREFIX)
        .filter(|key| !key.is_empty())
        .map(StorageKey::new)
}

fn check_component(component: &'static str, value: &str) -> Result<(), KeyError> {
    if value.is_empty() {
        return Err(KeyError::Empty { component });
    }
    if let Some(found) = value
        .chars()
        .find(|c| matches!(c, '/' | '"' | '\'') || c.is_whitespace())
    {
        return Err(KeyError::ForbiddenCharacter { component, found });
    }
    Ok(())
}
