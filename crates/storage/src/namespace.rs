//! Namespace patterns.

use crate::error::{StorageError, StorageResult};
use regex::Regex;
use std::fmt;

/// A compiled namespace pattern.
///
/// Patterns are regular expressions matched against the whole tag, so
/// `uber-usi/.*` matches `uber-usi/labrat` but not `x/uber-usi/labrat`.
#[derive(Clone)]
pub struct NamespacePattern {
    source: String,
    regex: Regex,
}

impl NamespacePattern {
    pub fn new(pattern: &str) -> StorageResult<Self> {
        let regex = Regex::new(&format!("^(?:{pattern})$")).map_err(|e| {
            StorageError::InvalidNamespace {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn is_match(&self, tag: &str) -> bool {
        self.regex.is_match(tag)
    }

    /// The pattern as it was registered.
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Debug for NamespacePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NamespacePattern({})", self.source)
    }
}

impl fmt::Display for NamespacePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
