//! File entries inside a package library

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A path inside a package, with optional metadata such as
/// `platform` or `buildAction`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawItem", into = "RawItem")]
pub struct LockFileItem {
    path: String,
    properties: BTreeMap<String, String>,
}

impl LockFileItem {
    /// Create an item for a plain path
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Attach a property, replacing any previous value for `key`
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    /// The bare path, only when no metadata is attached
    pub fn as_plain_path(&self) -> Option<&str> {
        self.properties.is_empty().then_some(self.path.as_str())
    }
}

impl fmt::Display for LockFileItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

/// On-disk shape: a bare string when there is no metadata
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawItem {
    Path(String),
    Detailed {
        path: String,
        #[serde(default)]
        properties: BTreeMap<String, String>,
    },
}

impl From<RawItem> for LockFileItem {
    fn from(raw: RawItem) -> Self {
        match raw {
            RawItem::Path(path) => Self::new(path),
            RawItem::Detailed { path, properties } => Self { path, properties },
        }
    }
}

impl From<LockFileItem> for RawItem {
    fn from(item: LockFileItem) -> Self {
        if item.properties.is_empty() {
            RawItem::Path(item.path)
        } else {
            RawItem::Detailed {
                path: item.path,
                properties: item.properties,
            }
        }
    }
}
