//! Namespace to remote tag index mapping.

use tagindex_core::config::RemoteConfig;
use tagindex_storage::{NamespacePattern, StorageResult};

/// Resolves which remote tag indexes receive a tag.
#[derive(Debug, Default)]
pub struct Remotes {
    entries: Vec<(NamespacePattern, Vec<String>)>,
}

impl Remotes {
    pub fn from_config(config: &[RemoteConfig]) -> StorageResult<Self> {
        let entries = config
            .iter()
            .map(|r| Ok((NamespacePattern::new(&r.namespace)?, r.addresses.clone())))
            .collect::<StorageResult<Vec<_>>>()?;
        Ok(Self { entries })
    }

    /// Remote addresses for `tag`: the union over every matching pattern,
    /// in configuration order, without duplicates.
    pub fn resolve(&self, tag: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for (pattern, addresses) in &self.entries {
            if !pattern.is_match(tag) {
                continue;
            }
            for addr in addresses {
                if !out.contains(addr) {
                    out.push(addr.clone());
                }
            }
        }
        out
    }

    /// True when no pattern lists any address.
    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|(_, addresses)| addresses.is_empty())
    }
}
