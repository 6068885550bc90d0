//! **BumpInfo**: per mono commit, per submodule subdir, which subrepo
//! commit is currently installed there.
//!
//! Inherited along the first-parent chain until a subdir's pin changes;
//! deleted when the submodule is removed. Never mutated in place once
//! attached to a mono commit — a child mono commit gets its own clone with
//! the relevant subdir entries overwritten, so an older [`BumpInfo`] a
//! caller is still holding for diagnostics stays valid.

use std::{collections::HashMap, rc::Rc};

use toprepo_commit_graph::LocalId;
use toprepo_hash::RepoId;

use crate::MonoId;

/// What is currently installed at one subdir.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bump {
    pub repo: RepoId,
    /// The subrepo commit installed there, as a [`LocalId`] into that
    /// repo's `CommitGraph`.
    pub commit: LocalId,
    /// `commit`'s depth in its own `CommitGraph`, cached here so the bump
    /// generator (`expand.rs`) can prioritise candidates without holding a
    /// reference to every subrepo's graph at once.
    pub depth: u32,
    /// The mono commit that first introduced this exact bump.
    pub introduced_at: MonoId,
}

/// The full set of subdir -> [`Bump`] entries effective at a mono commit.
///
/// Cloning is cheap (an `Rc`-shared map is swapped in wholesale); individual
/// subdir updates still require rebuilding the map, since `HashMap` has no
/// structural sharing — `spec.md` §4.4 notes this as a known, deliberate
/// simplification over a persistent-map implementation.
#[derive(Clone, Debug, Default)]
pub struct BumpInfo {
    by_subdir: Rc<HashMap<String, Bump>>,
}

impl BumpInfo {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, subdir: &str) -> Option<&Bump> {
        self.by_subdir.get(subdir)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Bump)> {
        self.by_subdir.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Inherit `self` into a new [`BumpInfo`], applying `updates` (`None`
    /// removes the subdir's bump, matching submodule-removal semantics).
    pub fn with_updates<I>(&self, updates: I) -> Self
    where
        I: IntoIterator<Item = (String, Option<Bump>)>,
    {
        let mut map: HashMap<String, Bump> = (*self.by_subdir).clone();
        for (subdir, bump) in updates {
            match bump {
                Some(bump) => {
                    map.insert(subdir, bump);
                }
                None => {
                    map.remove(&subdir);
                }
            }
        }
        Self { by_subdir: Rc::new(map) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bump(n: u32) -> Bump {
        Bump {
            repo: RepoId::new("sub").unwrap(),
            commit: LocalId::for_test(n),
            depth: n,
            introduced_at: MonoId::for_test(0),
        }
    }

    #[test]
    fn inheriting_without_updates_shares_the_underlying_map() {
        let parent = BumpInfo::empty().with_updates([("lib".to_string(), Some(bump(1)))]);
        let child = parent.with_updates([]);
        assert!(Rc::ptr_eq(&parent.by_subdir, &child.by_subdir));
    }

    #[test]
    fn removing_a_subdir_drops_its_bump() {
        let parent = BumpInfo::empty().with_updates([("lib".to_string(), Some(bump(1)))]);
        let child = parent.with_updates([("lib".to_string(), None)]);
        assert!(child.get("lib").is_none());
        assert!(parent.get("lib").is_some());
    }
}
