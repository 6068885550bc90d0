//! **Conversion Map**: the bidirectional translation table between source
//! commits and the mono commits produced from them.

use std::collections::HashMap;

use toprepo_commit_graph::LocalId;
use toprepo_hash::RepoId;

use crate::MonoId;

/// A source commit, identified by which repo it came from and its local id
/// in that repo's `CommitGraph`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SourceCommit {
    pub repo: RepoId,
    pub id: LocalId,
}

/// Source commit → mono commit, and back.
///
/// Injective in the forward direction during a single expansion: one source
/// commit maps to at most one mono commit. Reset wholesale on branch change
/// (`spec.md` §4.4.5) — `reset` drops the forward/backward maps without
/// touching any [`MonoId`] already handed out, since those live in the
/// caller's arena, not here.
#[derive(Debug, Default)]
pub struct ConversionMap {
    forward: HashMap<SourceCommit, MonoId>,
    backward: HashMap<MonoId, SourceCommit>,
    current_branch: Option<String>,
}

impl ConversionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the map if `branch` differs from the branch the last call
    /// recorded, per `spec.md` §4.4.5.
    pub fn enter_branch(&mut self, branch: &str) {
        if self.current_branch.as_deref() != Some(branch) {
            self.forward.clear();
            self.backward.clear();
            self.current_branch = Some(branch.to_string());
        }
    }

    /// Record that `source` translates to `mono`. First-writer-wins: an
    /// existing mapping for `source` is left untouched, matching the
    /// `setdefault` semantics `spec.md` §4.4.4 specifies for ambiguous
    /// bases.
    pub fn insert(&mut self, source: SourceCommit, mono: MonoId) {
        if !self.forward.contains_key(&source) {
            self.forward.insert(source.clone(), mono);
            self.backward.entry(mono).or_insert(source);
        }
    }

    pub fn get(&self, source: &SourceCommit) -> Option<MonoId> {
        self.forward.get(source).copied()
    }

    pub fn contains(&self, source: &SourceCommit) -> bool {
        self.forward.contains_key(source)
    }

    pub fn source_of(&self, mono: MonoId) -> Option<&SourceCommit> {
        self.backward.get(&mono)
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(repo: &str, n: u32) -> SourceCommit {
        SourceCommit {
            repo: RepoId::new(repo).unwrap(),
            id: LocalId::for_test(n),
        }
    }

    #[test]
    fn insert_is_first_writer_wins() {
        let mut map = ConversionMap::new();
        map.enter_branch("main");
        let src = source("lib", 1);
        map.insert(src.clone(), MonoId::for_test(10));
        map.insert(src.clone(), MonoId::for_test(20));
        assert_eq!(map.get(&src), Some(MonoId::for_test(10)));
    }

    #[test]
    fn branch_change_clears_the_map() {
        let mut map = ConversionMap::new();
        map.enter_branch("main");
        let src = source("lib", 1);
        map.insert(src.clone(), MonoId::for_test(10));

        map.enter_branch("release");
        assert!(map.get(&src).is_none());
    }

    #[test]
    fn same_branch_reentry_keeps_the_map() {
        let mut map = ConversionMap::new();
        map.enter_branch("main");
        let src = source("lib", 1);
        map.insert(src.clone(), MonoId::for_test(10));
        map.enter_branch("main");
        assert_eq!(map.get(&src), Some(MonoId::for_test(10)));
    }
}
