//! The **Commit Graph Store**: a one-shot, in-memory index of a repository's
//! history (`spec.md` §4.3).
//!
//! [`CommitGraph::collect`] streams every commit reachable from a set of
//! refs exactly once, the way `git-storage`'s `odb::Read` streams objects
//! out of a `git2::Repository`, and keeps a compact [`CommitRecord`] per
//! commit: parents (resolved to local ids where known, or left as a raw
//! hash when not — see [`ParentRef`]), author/committer, message, tree, and
//! a derived topological depth.

pub mod author;

use std::{collections::HashMap, path::Path};

use tracing::debug;

pub use author::Author;
use toprepo_hash::Hash;

/// An index into a [`CommitGraph`]'s arena. Stable for the lifetime of the
/// graph that produced it; never compared across two different graphs.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct LocalId(u32);

impl LocalId {
    /// Build a [`LocalId`] out of thin air, for tests that need one without
    /// running a full `collect`.
    #[doc(hidden)]
    pub fn for_test(n: u32) -> Self {
        Self(n)
    }
}

/// A parent edge: either a commit known to this graph, or a bare hash when
/// the parent lies outside the collected ref set (a shallow/partial
/// history). See `spec.md` §3.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParentRef {
    Known(LocalId),
    Unresolved(Hash),
}

/// A single commit's metadata, as held by the Commit Graph Store.
#[derive(Clone, Debug)]
pub struct CommitRecord {
    pub id: LocalId,
    pub hash: Hash,
    pub tree: Hash,
    pub parents: Vec<ParentRef>,
    pub author: Author,
    pub committer: Author,
    pub message: String,
    /// `1 + max(depth of known parents)`, `1` for roots.
    ///
    /// Monotone along known edges; not necessarily equal to the DAG's
    /// longest path if a parent is unresolved (`spec.md` §3).
    pub depth: u32,
}

impl CommitRecord {
    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    pub fn first_parent(&self) -> Option<ParentRef> {
        self.parents.first().copied()
    }
}

pub mod error {
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum Collect {
        #[error(transparent)]
        Git(#[from] git2::Error),
        #[error(transparent)]
        InvalidSignature(#[from] super::author::InvalidSignature),
    }
}

/// A repository's history, collected once and kept for the lifetime of a
/// translation run.
#[derive(Debug, Default)]
pub struct CommitGraph {
    arena: Vec<CommitRecord>,
    by_hash: HashMap<Hash, LocalId>,
}

impl CommitGraph {
    /// Stream every commit reachable from `refs` in `repo`, assigning each a
    /// [`LocalId`] and computing its depth.
    ///
    /// `refs` are given as ref names (e.g. `refs/heads/main`); they must
    /// already exist in `repo`.
    #[tracing::instrument(skip(repo), fields(refs = refs.len()))]
    pub fn collect<R: AsRef<str> + std::fmt::Debug>(
        repo: &git2::Repository,
        refs: &[R],
    ) -> Result<Self, error::Collect> {
        Self::collect_with(repo, |revwalk| {
            for r in refs {
                revwalk.push_ref(r.as_ref())?;
            }
            Ok(())
        })
    }

    /// Like [`collect`](Self::collect), but the caller configures the
    /// revwalk directly — used by the resolver (`spec.md` §4.5) to collect a
    /// bounded window (`push`/`hide` by raw [`git2::Oid`]) instead of a full
    /// ref's history.
    pub fn collect_with(
        repo: &git2::Repository,
        configure: impl FnOnce(&mut git2::Revwalk) -> Result<(), git2::Error>,
    ) -> Result<Self, error::Collect> {
        let mut revwalk = repo.revwalk()?;
        revwalk.set_sorting(git2::Sort::TOPOLOGICAL)?;
        configure(&mut revwalk)?;

        // `TOPOLOGICAL` order never shows a parent before all its children;
        // reversing it gives us roots-before-children, which is what depth
        // computation needs (every parent's `LocalId` is already known by
        // the time we reach a child).
        let mut oids: Vec<git2::Oid> = revwalk.collect::<Result<_, _>>()?;
        oids.reverse();

        let mut graph = CommitGraph {
            arena: Vec::with_capacity(oids.len()),
            by_hash: HashMap::with_capacity(oids.len()),
        };

        for oid in oids {
            let commit = repo.find_commit(oid)?;
            graph.push_commit(&commit)?;
        }

        debug!(commits = graph.arena.len(), "collected commit graph");
        Ok(graph)
    }

    fn push_commit(&mut self, commit: &git2::Commit) -> Result<LocalId, error::Collect> {
        let hash = Hash::from(commit.id());
        if let Some(&existing) = self.by_hash.get(&hash) {
            return Ok(existing);
        }

        let tree = Hash::from(commit.tree_id());
        let mut parents = Vec::with_capacity(commit.parent_count());
        let mut max_parent_depth: Option<u32> = None;
        for parent_oid in commit.parent_ids() {
            let parent_hash = Hash::from(parent_oid);
            match self.by_hash.get(&parent_hash) {
                Some(&pid) => {
                    let depth = self.arena[pid.0 as usize].depth;
                    max_parent_depth = Some(max_parent_depth.map_or(depth, |m| m.max(depth)));
                    parents.push(ParentRef::Known(pid));
                }
                None => parents.push(ParentRef::Unresolved(parent_hash)),
            }
        }
        let depth = 1 + max_parent_depth.unwrap_or(0);

        let author = Author::try_from(&commit.author())?;
        let committer = Author::try_from(&commit.committer())?;
        let message = String::from_utf8_lossy(commit.message_bytes()).into_owned();

        let id = LocalId(self.arena.len() as u32);
        self.arena.push(CommitRecord {
            id,
            hash,
            tree,
            parents,
            author,
            committer,
            message,
            depth,
        });
        self.by_hash.insert(hash, id);
        Ok(id)
    }

    pub fn get(&self, id: LocalId) -> &CommitRecord {
        &self.arena[id.0 as usize]
    }

    pub fn find(&self, hash: Hash) -> Option<LocalId> {
        self.by_hash.get(&hash).copied()
    }

    pub fn contains(&self, hash: Hash) -> bool {
        self.by_hash.contains_key(&hash)
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommitRecord> {
        self.arena.iter()
    }
}

/// Collect commit graphs for several repositories in parallel.
///
/// Each job opens its own `git2::Repository` handle on its own worker
/// thread (a `git2::Repository` is not safely shared between threads, so
/// handles are never passed across the `thread::scope` boundary — only
/// paths and ref lists are, per `spec.md` §5). The resulting graphs stay
/// keyed by the caller-supplied key rather than merged into one arena,
/// which is the "re-keyed at join time" option `spec.md` §4.3 describes.
pub fn collect_many<K, R>(
    jobs: Vec<(K, std::path::PathBuf, Vec<R>)>,
) -> Result<HashMap<K, CommitGraph>, error::Collect>
where
    K: std::hash::Hash + Eq + Send,
    R: AsRef<str> + std::fmt::Debug + Send,
{
    std::thread::scope(|scope| {
        let handles: Vec<_> = jobs
            .into_iter()
            .map(|(key, path, refs)| {
                scope.spawn(move || -> Result<(K, CommitGraph), error::Collect> {
                    let repo = git2::Repository::open(path)?;
                    let graph = CommitGraph::collect(&repo, &refs)?;
                    Ok((key, graph))
                })
            })
            .collect();

        let mut out = HashMap::with_capacity(handles.len());
        for handle in handles {
            let (key, graph) = handle.join().expect("commit graph worker panicked")?;
            out.insert(key, graph);
        }
        Ok(out)
    })
}

/// Build a fresh, bare repository for tests.
#[doc(hidden)]
pub fn test_repo(dir: &Path) -> git2::Repository {
    git2::Repository::init(dir).expect("failed to init test repo")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn commit(
        repo: &git2::Repository,
        refname: &str,
        parents: &[&git2::Commit],
        filename: &str,
    ) -> git2::Oid {
        let sig = git2::Signature::now("Test", "test@example.com").unwrap();
        let path = repo.path().parent().unwrap().join(filename);
        fs::write(&path, filename).unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new(filename)).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        repo.commit(Some(refname), &sig, &sig, filename, &tree, parents)
            .unwrap()
    }

    #[test]
    fn depth_is_one_plus_max_parent_depth() {
        let dir = tempfile::tempdir().unwrap();
        let repo = test_repo(dir.path());

        let c0 = commit(&repo, "refs/heads/main", &[], "a");
        let commit0 = repo.find_commit(c0).unwrap();
        let c1 = commit(&repo, "refs/heads/main", &[&commit0], "b");
        let commit1 = repo.find_commit(c1).unwrap();
        let _c2 = commit(&repo, "refs/heads/main", &[&commit1], "c");

        let graph = CommitGraph::collect(&repo, &["refs/heads/main"]).unwrap();
        assert_eq!(graph.len(), 3);

        let root = graph.get(graph.find(c0.into()).unwrap());
        assert_eq!(root.depth, 1);
        let tip = graph.get(graph.find(_c2.into()).unwrap());
        assert_eq!(tip.depth, 3);
    }

    #[test]
    fn merge_depth_is_one_plus_max_of_both_parents() {
        let dir = tempfile::tempdir().unwrap();
        let repo = test_repo(dir.path());

        let c0 = commit(&repo, "refs/heads/main", &[], "a");
        let commit0 = repo.find_commit(c0).unwrap();
        let c1 = commit(&repo, "refs/heads/main", &[&commit0], "b");
        let commit1 = repo.find_commit(c1).unwrap();
        let c2 = commit(&repo, "refs/heads/main", &[&commit0], "c");
        let commit2 = repo.find_commit(c2).unwrap();
        let merge = commit(&repo, "refs/heads/main", &[&commit1, &commit2], "d");

        let graph = CommitGraph::collect(&repo, &["refs/heads/main"]).unwrap();
        let merge_record = graph.get(graph.find(merge.into()).unwrap());
        assert_eq!(merge_record.depth, 3);
        assert!(merge_record.is_merge());
    }

    #[test]
    fn collect_many_keys_graphs_by_caller_supplied_key() {
        let dir_a = tempfile::tempdir().unwrap();
        let repo_a = test_repo(dir_a.path());
        commit(&repo_a, "refs/heads/main", &[], "a");

        let dir_b = tempfile::tempdir().unwrap();
        let repo_b = test_repo(dir_b.path());
        commit(&repo_b, "refs/heads/main", &[], "b");

        let graphs = collect_many(vec![
            ("a", dir_a.path().to_path_buf(), vec!["refs/heads/main"]),
            ("b", dir_b.path().to_path_buf(), vec!["refs/heads/main"]),
        ])
        .unwrap();

        assert_eq!(graphs.len(), 2);
        assert_eq!(graphs["a"].len(), 1);
        assert_eq!(graphs["b"].len(), 1);
    }
}
