//! The Subrepo-onto-Mono Resolver (`spec.md` §4.5), used by `fetch`: given a
//! newly fetched subrepo tip, find the mono commit it should be rebased onto
//! and splice in whatever subrepo history isn't already represented there.
//!
//! Shares the Expander's depth-first "walk back until every branch bottoms
//! out at something already converted" shape, but the base here comes from a
//! footer-derived map built from the destination branch's own history rather
//! than an in-memory `BumpInfo`, since a `fetch` has no top-commit bump
//! driving it.
//!
//! Two-phase: try a short window first (cheap, and almost always enough
//! since a subrepo advances a handful of commits between fetches), and only
//! fall back to the repository's full history if the window turns out to be
//! too small — signalled by a parent the collected subgraph could not
//! resolve.

use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashMap, HashSet},
    path::Path,
};

use tracing::{debug, instrument};

use toprepo_commit_graph::{CommitGraph, LocalId, ParentRef};
use toprepo_config::Config;
use toprepo_hash::{Hash, RepoId};

use crate::{error::Resolve as ResolveError, tree};

/// How many of the subrepo's most recent commits to search before giving up
/// and re-trying against full history. One less than [`FEW_MONO_COMMITS`]:
/// the mono side footer map is built first, so the subrepo walk gets to
/// start one commit "ahead" of it.
const FEW_SUBREPO_COMMITS: usize = 999;
/// How many of the destination branch's most recent mono commits to search
/// for a footer-derived base before giving up.
const FEW_MONO_COMMITS: usize = 1000;

#[derive(Clone, Copy)]
struct SubEntry {
    depth: u32,
    counter: Reverse<u32>,
    id: LocalId,
}
impl PartialEq for SubEntry {
    fn eq(&self, other: &Self) -> bool {
        self.depth == other.depth && self.counter == other.counter
    }
}
impl Eq for SubEntry {}
impl PartialOrd for SubEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for SubEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.depth, self.counter).cmp(&(other.depth, other.counter))
    }
}

/// `{oid}~{n}`, or `None` if the repository doesn't have `n` ancestors —
/// meaning a window of `n` is already the full history, and the caller's
/// windowed attempt already searched everything there is to search.
fn ancestor_n(repo: &git2::Repository, oid: git2::Oid, n: usize) -> Option<git2::Oid> {
    repo.revparse_single(&format!("{oid}~{n}")).ok().map(|o| o.id())
}

/// Map, for `subdir`, every subrepo commit hash annotated somewhere in
/// `mono_graph` to the mono commit that carries that footer.
///
/// Iterated newest-first (mirroring `git log`'s default order) with
/// first-occurrence-wins, so if the same subrepo commit was ever pinned
/// twice, the more recent mono commit wins — a newer rebase target is
/// always at least as good a base as an older one.
fn map_subdir_hash_to_mono_hash(mono_graph: &CommitGraph, subdir: &str) -> HashMap<Hash, Hash> {
    let mut map = HashMap::new();
    for record in mono_graph.iter().rev() {
        if let Ok(footers) = toprepo_trailers::Footers::parse(&record.message) {
            if let Some(hash) = footers.get(subdir) {
                map.entry(hash).or_insert(record.hash);
            }
        }
    }
    map
}

/// Walk back from `start` in depth-first-by-depth order, stopping each
/// branch as soon as it hits a commit already mapped to a mono base.
/// Returns the commits that still need converting, oldest first (so
/// `start` is always last), or `None` if an unresolved parent was reached
/// before every branch bottomed out — the window was too small.
fn find_missing_to_convert(
    sub_graph: &CommitGraph,
    start: LocalId,
    base_map: &HashMap<Hash, Hash>,
    converted: &mut HashMap<LocalId, Hash>,
) -> Option<Vec<LocalId>> {
    let mut to_convert = Vec::new();
    let mut seen = HashSet::new();
    let mut counter = 0u32;
    let mut queue: BinaryHeap<SubEntry> = BinaryHeap::new();
    seen.insert(start);
    queue.push(SubEntry {
        depth: sub_graph.get(start).depth,
        counter: Reverse(counter),
        id: start,
    });

    while let Some(entry) = queue.pop() {
        let record = sub_graph.get(entry.id);
        if let Some(&mono_hash) = base_map.get(&record.hash) {
            converted.insert(entry.id, mono_hash);
            continue;
        }
        to_convert.push(entry.id);
        for parent in &record.parents {
            match parent {
                ParentRef::Known(pid) => {
                    if seen.insert(*pid) {
                        counter += 1;
                        queue.push(SubEntry {
                            depth: sub_graph.get(*pid).depth,
                            counter: Reverse(counter),
                            id: *pid,
                        });
                    }
                }
                ParentRef::Unresolved(_) => return None,
            }
        }
    }
    to_convert.reverse();
    Some(to_convert)
}

/// Translates a subrepo tip onto the mono side of `spec.md` §4.4, for the
/// `fetch` code path.
pub struct Resolver<'a> {
    config: &'a Config,
}

impl<'a> Resolver<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Rebase `sub_tip` (a commit in `subrepo`) onto `mono_tip`'s history,
    /// writing the result to `dest_ref`, and return the resulting mono hash
    /// (`mono_tip` itself if `sub_tip` was already fully represented there).
    #[instrument(skip(self, repo), fields(subdir))]
    pub fn resolve_onto(
        &mut self,
        repo: &git2::Repository,
        subrepo: &RepoId,
        subdir: &str,
        sub_tip: git2::Oid,
        mono_tip: git2::Oid,
        dest_ref: &str,
    ) -> Result<Hash, ResolveError> {
        if self.config.repo(subrepo).is_none() {
            return Err(ResolveError::UnknownRepo(subrepo.clone()));
        }

        let windowed = self.try_resolve(
            repo,
            subdir,
            sub_tip,
            mono_tip,
            ancestor_n(repo, sub_tip, FEW_SUBREPO_COMMITS),
            ancestor_n(repo, mono_tip, FEW_MONO_COMMITS),
        )?;
        let tip_hash = match windowed {
            Some(hash) => hash,
            None => self
                .try_resolve(repo, subdir, sub_tip, mono_tip, None, None)?
                .ok_or_else(|| ResolveError::NoBaseFound {
                    subdir: subdir.to_string(),
                })?,
        };

        repo.reference(dest_ref, tip_hash.into(), true, "toprepo fetch")?;
        debug!(subdir, %tip_hash, "resolved subrepo tip onto mono history");
        Ok(tip_hash)
    }

    /// One phase of the two-phase search: `sub_limit`/`mono_limit` bound how
    /// far back each side's history is collected. Returns `Ok(None)` if the
    /// window was too small to find a base for every branch.
    fn try_resolve(
        &mut self,
        repo: &git2::Repository,
        subdir: &str,
        sub_tip: git2::Oid,
        mono_tip: git2::Oid,
        sub_limit: Option<git2::Oid>,
        mono_limit: Option<git2::Oid>,
    ) -> Result<Option<Hash>, ResolveError> {
        let mono_graph = CommitGraph::collect_with(repo, |revwalk| {
            revwalk.push(mono_tip)?;
            if let Some(limit) = mono_limit {
                revwalk.hide(limit)?;
            }
            Ok(())
        })?;
        let base_map = map_subdir_hash_to_mono_hash(&mono_graph, subdir);

        let sub_graph = CommitGraph::collect_with(repo, |revwalk| {
            revwalk.push(sub_tip)?;
            if let Some(limit) = sub_limit {
                revwalk.hide(limit)?;
            }
            Ok(())
        })?;
        let Some(target) = sub_graph.find(sub_tip.into()) else {
            return Ok(None);
        };

        let mut converted: HashMap<LocalId, Hash> = HashMap::new();
        let Some(to_convert) = find_missing_to_convert(&sub_graph, target, &base_map, &mut converted)
        else {
            return Ok(None);
        };

        if to_convert.is_empty() {
            return Ok(Some(
                *converted
                    .get(&target)
                    .expect("an empty to_convert list means the target itself was mapped"),
            ));
        }

        let tip = self.materialize(repo, subdir, &sub_graph, &to_convert, &mut converted)?;
        Ok(Some(tip))
    }

    /// Create one mono commit per entry in `to_convert` (oldest first),
    /// mounting each subrepo commit's tree under `subdir` on top of the
    /// previous one, exactly as `expand::inject_subrepo_history` does for
    /// the Expander.
    fn materialize(
        &self,
        repo: &git2::Repository,
        subdir: &str,
        sub_graph: &CommitGraph,
        to_convert: &[LocalId],
        converted: &mut HashMap<LocalId, Hash>,
    ) -> Result<Hash, ResolveError> {
        let mut tip = None;
        for &id in to_convert {
            let record = sub_graph.get(id);
            let parent_hashes: Vec<Hash> = record
                .parents
                .iter()
                .map(|parent| match parent {
                    ParentRef::Known(pid) => *converted
                        .get(pid)
                        .expect("subrepo parents are converted before their children"),
                    ParentRef::Unresolved(hash) => {
                        panic!("unresolved subrepo parent {hash} reached materialization")
                    }
                })
                .collect();

            let base_tree = match parent_hashes.first() {
                Some(&hash) => Some(repo.find_commit(hash.into())?.tree()?),
                None => None,
            };
            let new_tree_id = tree::set_path_opt(
                repo,
                base_tree.as_ref(),
                Path::new(subdir),
                record.tree.into(),
                tree::TREE_MODE,
            )?;
            let new_tree = repo.find_tree(new_tree_id)?;

            let message = toprepo_trailers::annotate(&record.message, subdir, record.hash);
            let author = record.author.to_git2_signature()?;
            let committer = record.committer.to_git2_signature()?;
            let parent_commits: Vec<git2::Commit> = parent_hashes
                .iter()
                .map(|&hash| repo.find_commit(hash.into()))
                .collect::<Result<_, _>>()?;
            let parent_refs: Vec<&git2::Commit> = parent_commits.iter().collect();

            let new_oid = repo.commit(None, &author, &committer, &message, &new_tree, &parent_refs)?;
            let new_hash = Hash::from(new_oid);
            converted.insert(id, new_hash);
            tip = Some(new_hash);
        }
        Ok(tip.expect("to_convert is checked non-empty by the caller"))
    }
}
