//! The **Missing-commit ledger**: subrepo commits the operator has
//! acknowledged as permanently unfetchable, keyed by the raw submodule URL
//! they were missing from.
//!
//! Populated from `toprepo.missing-commits.rev-<hash> = <raw-url>` entries,
//! read the same way `git-storage::config` reads `user.name`/`user.email`
//! off a live `git2::Config` — through `Config::entries`, not a file parse.

use std::collections::{HashMap, HashSet};

use toprepo_hash::Hash;

const KEY_PREFIX: &str = "toprepo.missing-commits.rev-";

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error(transparent)]
    Git(#[from] git2::Error),
    #[error("invalid commit hash in key {0:?}")]
    InvalidHash(String),
}

/// `raw_url -> {hashes known to be missing from that URL}`.
#[derive(Debug, Default, Clone)]
pub struct MissingCommits {
    by_url: HashMap<String, HashSet<Hash>>,
}

impl MissingCommits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read every `toprepo.missing-commits.rev-<hash>` entry out of `config`.
    pub fn load(config: &git2::Config) -> Result<Self, LedgerError> {
        let mut by_url: HashMap<String, HashSet<Hash>> = HashMap::new();
        let mut entries = config.entries(Some("toprepo.missing-commits.rev-*"))?;
        while let Some(entry) = entries.next() {
            let entry = entry?;
            let Some(name) = entry.name() else { continue };
            let Some(hex) = name.strip_prefix(KEY_PREFIX) else {
                continue;
            };
            let hash: Hash = hex
                .parse()
                .map_err(|_| LedgerError::InvalidHash(name.to_string()))?;
            let Some(raw_url) = entry.value() else { continue };
            by_url.entry(raw_url.to_string()).or_default().insert(hash);
        }
        Ok(Self { by_url })
    }

    /// Whether `hash`, expected from `raw_url`, has been acknowledged as
    /// permanently missing.
    pub fn is_acknowledged(&self, raw_url: &str, hash: Hash) -> bool {
        self.by_url
            .get(raw_url)
            .is_some_and(|hashes| hashes.contains(&hash))
    }

    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.by_url.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_and_looks_up_acknowledged_commits() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config");
        let mut config = git2::Config::open(&config_path).unwrap();
        let hash: Hash = git2::Oid::from_bytes(&[9; 20]).unwrap().into();
        config
            .set_str(&format!("toprepo.missing-commits.rev-{hash}"), "../lib.git")
            .unwrap();

        let ledger = MissingCommits::load(&config).unwrap();
        assert!(ledger.is_acknowledged("../lib.git", hash));
        let other: Hash = git2::Oid::from_bytes(&[1; 20]).unwrap().into();
        assert!(!ledger.is_acknowledged("../lib.git", other));
        assert!(!ledger.is_acknowledged("../other.git", hash));
    }
}
