//! The Expander (`spec.md` §4.4): walks top-repository commits in
//! topological order and, for each, rewrites every submodule pointer bump
//! into a mono-repository commit that splices in the referenced subrepo
//! history.
//!
//! Object transfer between repositories (fetching, moving objects into a
//! shared object database) is an external collaborator per `spec.md` §1;
//! this module assumes `repo` already holds every object — top, subrepo,
//! and previously-written mono commits — reachable by hash.

use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashMap, HashSet},
    path::{Path, PathBuf},
};

use tracing::{debug, instrument, warn};

use toprepo_commit_graph::{CommitGraph, CommitRecord, LocalId, ParentRef};
use toprepo_config::{gitmodules, ledger::MissingCommits, Config};
use toprepo_hash::{Hash, RepoId};

use crate::{
    bump::{Bump, BumpInfo},
    convert::{ConversionMap, SourceCommit},
    error::Expand as ExpandError,
    tree,
    warning::{suggest_repo_stanza, Warning},
    MonoId,
};

const TREE_MODE: i32 = 0o040000;
const GITLINK_MODE: i32 = 0o160000;

/// The mono repository's history as built so far during this run: one
/// [`MonoRecord`] per commit written, indexed by [`MonoId`].
#[derive(Debug, Default)]
pub struct MonoStore {
    arena: Vec<MonoRecord>,
}

#[derive(Debug)]
struct MonoRecord {
    hash: Hash,
    branch: String,
    bumps: BumpInfo,
    parents: Vec<MonoId>,
}

impl MonoStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        hash: Hash,
        branch: impl Into<String>,
        bumps: BumpInfo,
        parents: Vec<MonoId>,
    ) -> MonoId {
        let id = MonoId::new(self.arena.len());
        self.arena.push(MonoRecord {
            hash,
            branch: branch.into(),
            bumps,
            parents,
        });
        id
    }

    /// Overwrite the bumps recorded for `id`. Used right after [`push`],
    /// once the just-created [`MonoId`] is known and can be used as a
    /// bump's `introduced_at`.
    pub fn set_bumps(&mut self, id: MonoId, bumps: BumpInfo) {
        self.arena[id.index()].bumps = bumps;
    }

    pub fn hash(&self, id: MonoId) -> Hash {
        self.arena[id.index()].hash
    }

    pub fn branch(&self, id: MonoId) -> &str {
        &self.arena[id.index()].branch
    }

    pub fn bump(&self, id: MonoId, subdir: &str) -> Option<Bump> {
        self.arena[id.index()].bumps.get(subdir).copied()
    }

    pub fn bump_info(&self, id: MonoId) -> &BumpInfo {
        &self.arena[id.index()].bumps
    }

    pub fn parents(&self, id: MonoId) -> &[MonoId] {
        &self.arena[id.index()].parents
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }
}

#[derive(Clone, Copy)]
struct QueueEntry {
    depth: u32,
    counter: Reverse<u32>,
    mono: MonoId,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.depth == other.depth && self.counter == other.counter
    }
}
impl Eq for QueueEntry {}
impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.depth, self.counter).cmp(&(other.depth, other.counter))
    }
}

/// The "mono side iterator" of `spec.md` §4.4.4: yields mono commits
/// carrying a bump for one subdir, most-recent subrepo depth first.
struct BumpGenerator<'m> {
    mono: &'m MonoStore,
    subdir: String,
    counter: u32,
    queue: BinaryHeap<QueueEntry>,
    seen_subrepo_ids: HashSet<LocalId>,
}

impl<'m> BumpGenerator<'m> {
    fn new(mono: &'m MonoStore, subdir: &str) -> Self {
        Self {
            mono,
            subdir: subdir.to_string(),
            counter: 0,
            queue: BinaryHeap::new(),
            seen_subrepo_ids: HashSet::new(),
        }
    }

    /// Consider `mono_parent` as a candidate base, provided it carries a
    /// bump no deeper than `max_subrepo_depth`. A deeper bump means the
    /// pointer regressed somewhere along this branch; per the pruning
    /// rule, stop descending it rather than yield a wrong base.
    fn add_candidate(&mut self, mono_parent: MonoId, max_subrepo_depth: u32) {
        let Some(bump) = self.mono.bump(mono_parent, &self.subdir) else {
            return;
        };
        if bump.depth > max_subrepo_depth {
            return;
        }
        if self.seen_subrepo_ids.insert(bump.commit) {
            self.counter += 1;
            self.queue.push(QueueEntry {
                depth: bump.depth,
                counter: Reverse(self.counter),
                mono: mono_parent,
            });
        }
    }

    /// Yield the next-most-recent base, then dig one step deeper by
    /// considering the parents of the mono commit that *first* introduced
    /// the yielded bump (not the yielded commit's own parents — several
    /// mono commits may just be inheriting the same bump unchanged).
    fn next(&mut self) -> Option<MonoId> {
        let entry = self.queue.pop()?;
        let bump = self
            .mono
            .bump(entry.mono, &self.subdir)
            .expect("queued entries always carry a bump for this subdir");
        for &pid in self.mono.parents(bump.introduced_at) {
            self.add_candidate(pid, bump.depth.saturating_sub(1));
        }
        Some(entry.mono)
    }
}

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

/// What splicing one subrepo bump into the mono history produced.
pub struct Injection {
    /// Translated images of `h_new`'s own parents, to be added to the
    /// mono commit that realises the bump itself (minus any already
    /// present, per `spec.md` §4.4 "Parent preservation").
    pub new_parents: Vec<MonoId>,
}

/// Splice the subrepo history between the already-converted ancestors of
/// `h_new` and `h_new` itself into the mono repository, as new commits
/// mounted under `subdir` on `branch`.
///
/// `h_new` itself is *not* converted here: the caller realises it via the
/// submodule pin entry of the top commit that bumped to it. This is the
/// core algorithm of `spec.md` §4.4.4.
#[allow(clippy::too_many_arguments)]
#[instrument(skip(repo, mono, conversion, subgraph), fields(subdir = %subdir.display()))]
pub fn inject_subrepo_history(
    repo: &git2::Repository,
    mono: &mut MonoStore,
    conversion: &mut ConversionMap,
    subgraph: &CommitGraph,
    subrepo: &RepoId,
    subdir: &Path,
    branch: &str,
    initial_parents: &[MonoId],
    h_new: LocalId,
) -> Result<Injection, ExpandError> {
    let subdir_key = subdir.to_string_lossy().into_owned();
    let h_new_record = subgraph.get(h_new);

    let mut generator = BumpGenerator::new(mono, &subdir_key);
    for &pid in initial_parents {
        generator.add_candidate(pid, h_new_record.depth.saturating_sub(1));
    }

    // Sentinel matching `h_new`'s own depth, so the search loop below gets
    // its first chance to run the generator.
    let mut latest_bump_depth = h_new_record.depth;

    let mut counter = 0u32;
    let mut sub_queue: BinaryHeap<SubEntry> = BinaryHeap::new();
    let mut sub_seen: HashSet<LocalId> = HashSet::new();
    sub_seen.insert(h_new);
    sub_queue.push(SubEntry {
        depth: h_new_record.depth,
        counter: Reverse(counter),
        id: h_new,
    });

    let mut to_convert: Vec<LocalId> = Vec::new();

    while let Some(entry) = sub_queue.pop() {
        while latest_bump_depth >= subgraph.get(entry.id).depth {
            let Some(latest_bump_mono) = generator.next() else {
                break;
            };
            let bump = mono
                .bump(latest_bump_mono, &subdir_key)
                .expect("the generator only yields commits carrying this bump");
            latest_bump_depth = bump.depth;
            // First-writer-wins: the search runs oldest-target-first, so
            // an existing mapping is always at least as good a base.
            conversion.insert(
                SourceCommit {
                    repo: subrepo.clone(),
                    id: bump.commit,
                },
                latest_bump_mono,
            );
        }

        let key = SourceCommit {
            repo: subrepo.clone(),
            id: entry.id,
        };
        if !conversion.contains(&key) {
            to_convert.push(entry.id);
            for parent in &subgraph.get(entry.id).parents {
                if let ParentRef::Known(pid) = parent {
                    if sub_seen.insert(*pid) {
                        counter += 1;
                        sub_queue.push(SubEntry {
                            depth: subgraph.get(*pid).depth,
                            counter: Reverse(counter),
                            id: *pid,
                        });
                    }
                }
            }
        }
    }

    if let Some(&first) = to_convert.first() {
        debug_assert_eq!(first, h_new);
    }

    for &p in to_convert.iter().skip(1).rev() {
        let record = subgraph.get(p);
        let translated_parents: Vec<MonoId> = record
            .parents
            .iter()
            .map(|parent| match parent {
                ParentRef::Known(pid) => conversion
                    .get(&SourceCommit {
                        repo: subrepo.clone(),
                        id: *pid,
                    })
                    .expect("subrepo parents are converted before their children"),
                ParentRef::Unresolved(hash) => {
                    panic!("unresolved subrepo parent {hash} reached the injector")
                }
            })
            .collect();

        let base_tree = match translated_parents.first() {
            Some(&parent) => Some(repo.find_commit(mono.hash(parent).into())?.tree()?),
            None => None,
        };
        let new_tree_id =
            tree::set_path_opt(repo, base_tree.as_ref(), subdir, record.tree.into(), TREE_MODE)?;
        let new_tree = repo.find_tree(new_tree_id)?;

        let message = toprepo_trailers::annotate(&record.message, &subdir_key, record.hash);
        let author = record.author.to_git2_signature()?;
        let committer = record.committer.to_git2_signature()?;
        let parent_commits: Vec<git2::Commit> = translated_parents
            .iter()
            .map(|&pid| repo.find_commit(mono.hash(pid).into()))
            .collect::<Result<_, _>>()?;
        let parent_refs: Vec<&git2::Commit> = parent_commits.iter().collect();

        let new_oid = repo.commit(None, &author, &committer, &message, &new_tree, &parent_refs)?;
        let new_hash = Hash::from(new_oid);

        let parent_bumps = translated_parents
            .first()
            .map(|&parent| mono.bump_info(parent).clone())
            .unwrap_or_default();
        let new_id = mono.push(new_hash, branch.to_string(), BumpInfo::empty(), translated_parents);
        let bumps = parent_bumps.with_updates([(
            subdir_key.clone(),
            Some(Bump {
                repo: subrepo.clone(),
                commit: p,
                depth: record.depth,
                introduced_at: new_id,
            }),
        )]);
        mono.set_bumps(new_id, bumps);

        conversion.insert(
            SourceCommit {
                repo: subrepo.clone(),
                id: p,
            },
            new_id,
        );
        debug!(subrepo = %subrepo, hash = %record.hash, mono_hash = %new_hash, "injected subrepo commit");
    }

    let new_parents = h_new_record
        .parents
        .iter()
        .map(|parent| match parent {
            ParentRef::Known(pid) => conversion
                .get(&SourceCommit {
                    repo: subrepo.clone(),
                    id: *pid,
                })
                .expect("h_new's parents are converted by the loop above"),
            ParentRef::Unresolved(hash) => {
                panic!("unresolved parent of the bump target: {hash}")
            }
        })
        .collect();

    Ok(Injection { new_parents })
}

/// One gitlink entry whose target commit changed between a top commit and
/// its first parent (or was added/removed entirely).
struct GitlinkChange {
    path: PathBuf,
    new: Option<Hash>,
}

/// Diff `new_tree` against `old_tree` (the first parent's tree, if any)
/// for gitlink (mode `160000`) entries that were added, changed, or
/// removed. Renames are not detected (git2's default diff does not infer
/// them), matching this system's stance that submodule renames are an
/// unsupported, unimplemented case rather than something to guess at.
fn diff_gitlinks(
    repo: &git2::Repository,
    old_tree: Option<&git2::Tree>,
    new_tree: &git2::Tree,
) -> Result<Vec<GitlinkChange>, git2::Error> {
    let diff = repo.diff_tree_to_tree(old_tree, Some(new_tree), None)?;
    let mut changes = Vec::new();
    for delta in diff.deltas() {
        let is_gitlink = |mode: git2::FileMode| mode == git2::FileMode::Commit;
        let old_is_link = is_gitlink(delta.old_file().mode());
        let new_is_link = is_gitlink(delta.new_file().mode());
        if !old_is_link && !new_is_link {
            continue;
        }
        let path = if new_is_link {
            delta.new_file().path()
        } else {
            delta.old_file().path()
        };
        let Some(path) = path else { continue };
        let new = new_is_link.then(|| Hash::from(delta.new_file().id()));
        changes.push(GitlinkChange {
            path: path.to_path_buf(),
            new,
        });
    }
    Ok(changes)
}

/// Translates top-repository commits into mono-repository commits.
pub struct Expander<'a> {
    config: &'a Config,
    missing_commits: &'a MissingCommits,
    subgraphs: &'a HashMap<RepoId, CommitGraph>,
    gitmodules_cache: gitmodules::Cache,
    /// Persistent top-commit -> mono-commit map; never reset, so a
    /// re-run can resume (`spec.md` §3 "Lifecycle").
    top_conversion: ConversionMap,
    /// The per-subdir subrepo base cache, reset on branch change
    /// (`spec.md` §4.4.5). Shared across every subdir and subrepo, as in
    /// the original implementation.
    subrepo_conversion: ConversionMap,
    mono: MonoStore,
    warnings: Vec<Warning>,
}

impl<'a> Expander<'a> {
    pub fn new(
        config: &'a Config,
        missing_commits: &'a MissingCommits,
        subgraphs: &'a HashMap<RepoId, CommitGraph>,
    ) -> Self {
        Self {
            config,
            missing_commits,
            subgraphs,
            gitmodules_cache: gitmodules::Cache::new(),
            top_conversion: ConversionMap::new(),
            subrepo_conversion: ConversionMap::new(),
            mono: MonoStore::new(),
            warnings: Vec::new(),
        }
    }

    pub fn mono(&self) -> &MonoStore {
        &self.mono
    }

    pub fn conversion(&self) -> &ConversionMap {
        &self.top_conversion
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Translate every commit in `top_graph` (expected to be in
    /// root-first topological order, as produced by
    /// [`CommitGraph::collect`]) onto `branch`.
    pub fn expand_refs(
        &mut self,
        repo: &git2::Repository,
        top_graph: &CommitGraph,
        branch: &str,
    ) -> Result<(), ExpandError> {
        self.subrepo_conversion.enter_branch(branch);
        for record in top_graph.iter() {
            self.expand_commit(repo, record, branch)?;
        }
        Ok(())
    }

    /// Translate a single top commit, assuming its parents were already
    /// translated (true when commits are visited in topological order).
    #[instrument(skip(self, repo, record), fields(hash = %record.hash))]
    pub fn expand_commit(
        &mut self,
        repo: &git2::Repository,
        record: &CommitRecord,
        branch: &str,
    ) -> Result<MonoId, ExpandError> {
        if let Some(existing) = self.top_conversion.get(&SourceCommit {
            repo: RepoId::top(),
            id: record.id,
        }) {
            return Ok(existing);
        }

        let top_commit = repo.find_commit(record.hash.into())?;
        let new_tree = top_commit.tree()?;
        // The gitlink diff is always computed against the *top* repository's
        // own first-parent tree, independent of translation state.
        let top_first_parent_tree = if top_commit.parent_count() > 0 {
            Some(top_commit.parent(0)?.tree()?)
        } else {
            None
        };

        let mut translated_parents: Vec<MonoId> = Vec::new();
        for parent in &record.parents {
            match parent {
                ParentRef::Known(pid) => {
                    let mono_parent = self
                        .top_conversion
                        .get(&SourceCommit {
                            repo: RepoId::top(),
                            id: *pid,
                        })
                        .expect("top parents are translated before their children");
                    translated_parents.push(mono_parent);
                }
                ParentRef::Unresolved(hash) => {
                    panic!("unresolved top parent {hash}; the top history was streamed incompletely")
                }
            }
        }

        let gitmodules = self.load_gitmodules(repo, &top_commit)?;

        let changes = diff_gitlinks(repo, top_first_parent_tree.as_ref(), &new_tree)?;

        let mut current_tree = new_tree.id();
        let mut bump_updates: Vec<(String, Option<Bump>)> = Vec::new();
        let mut bump_messages: Vec<String> = Vec::new();

        for change in changes {
            let subdir_key = change.path.to_string_lossy().into_owned();
            let Some(new_hash) = change.new else {
                bump_updates.push((subdir_key, None));
                continue;
            };

            let Some(submodule) = gitmodules.get(&change.path) else {
                warn!(subdir = %subdir_key, "gitlink with no matching .gitmodules entry");
                continue;
            };

            let raw_url_index = self.config.raw_url_index();
            let Some(repo_configs) = raw_url_index.get(submodule.raw_url.as_str()) else {
                self.warnings.push(Warning::UnknownUrl {
                    raw_url: submodule.raw_url.clone(),
                    suggested_stanza: suggest_repo_stanza(&submodule.raw_url),
                });
                continue;
            };
            let Some(repo_config) = repo_configs.first() else {
                continue;
            };
            if !repo_config.enabled {
                continue;
            }
            let repo_id = repo_config.id.clone();

            let Some(subgraph) = self.subgraphs.get(&repo_id) else {
                continue;
            };
            let Some(local_id) = subgraph.find(new_hash) else {
                if self
                    .missing_commits
                    .is_acknowledged(&submodule.raw_url, new_hash)
                {
                    continue;
                }
                return Err(ExpandError::MissingCommit {
                    raw_url: submodule.raw_url.clone(),
                    hash: new_hash,
                });
            };
            if self
                .missing_commits
                .is_acknowledged(&submodule.raw_url, new_hash)
            {
                self.warnings.push(Warning::OverspecifiedMissingCommit {
                    raw_url: submodule.raw_url.clone(),
                    hash: new_hash,
                });
            }

            let injection = inject_subrepo_history(
                repo,
                &mut self.mono,
                &mut self.subrepo_conversion,
                subgraph,
                &repo_id,
                &change.path,
                branch,
                &translated_parents,
                local_id,
            )?;
            for extra in injection.new_parents {
                if !translated_parents.contains(&extra) {
                    translated_parents.push(extra);
                }
            }

            let subrepo_record = subgraph.get(local_id);
            current_tree = tree::set_path(
                repo,
                &repo.find_tree(current_tree)?,
                &change.path,
                subrepo_record.tree.into(),
                TREE_MODE,
            )?;
            bump_messages.push(toprepo_trailers::annotate(
                &subrepo_record.message,
                &subdir_key,
                subrepo_record.hash,
            ));
            bump_updates.push((
                subdir_key,
                Some(Bump {
                    repo: repo_id,
                    commit: local_id,
                    depth: subrepo_record.depth,
                    introduced_at: MonoId::for_test(0), // patched below
                }),
            ));
        }

        let top_message = toprepo_trailers::annotate(&record.message, toprepo_trailers::TOP, record.hash);
        let message = toprepo_trailers::merge_messages(std::iter::once(top_message).chain(bump_messages));

        let final_tree = repo.find_tree(current_tree)?;
        let author = record.author.to_git2_signature()?;
        let committer = record.committer.to_git2_signature()?;
        let parent_commits: Vec<git2::Commit> = translated_parents
            .iter()
            .map(|&pid| repo.find_commit(self.mono.hash(pid).into()))
            .collect::<Result<_, _>>()?;
        let parent_refs: Vec<&git2::Commit> = parent_commits.iter().collect();

        let new_oid = repo.commit(None, &author, &committer, &message, &final_tree, &parent_refs)?;
        let new_hash = Hash::from(new_oid);

        let parent_bumps = translated_parents
            .first()
            .map(|&pid| self.mono.bump_info(pid).clone())
            .unwrap_or_default();
        let new_id = self
            .mono
            .push(new_hash, branch.to_string(), BumpInfo::empty(), translated_parents);

        // Re-point each freshly-introduced bump's `introduced_at` at the
        // commit we just created, now that its id is known.
        let updates = bump_updates.into_iter().map(|(subdir, bump)| {
            (
                subdir,
                bump.map(|b| Bump {
                    introduced_at: new_id,
                    ..b
                }),
            )
        });
        let bumps = parent_bumps.with_updates(updates);
        self.mono.set_bumps(new_id, bumps);

        self.top_conversion.insert(
            SourceCommit {
                repo: RepoId::top(),
                id: record.id,
            },
            new_id,
        );

        Ok(new_id)
    }

    fn load_gitmodules(
        &mut self,
        repo: &git2::Repository,
        commit: &git2::Commit,
    ) -> Result<std::rc::Rc<gitmodules::GitModules>, ExpandError> {
        let tree = commit.tree()?;
        let Some(entry) = tree.get_name(".gitmodules") else {
            return Ok(std::rc::Rc::new(gitmodules::GitModules::default()));
        };
        let blob_hash = Hash::from(entry.id());
        let blob = repo.find_blob(entry.id())?;
        let content = String::from_utf8_lossy(blob.content()).into_owned();
        let parsed = self.gitmodules_cache.get_or_parse(blob_hash, &content);
        for error in &parsed.errors {
            self.warnings.push(Warning::InvalidGitModulesEntry {
                subdir: error.subdir.clone(),
                reason: error.reason.clone(),
            });
        }
        Ok(parsed)
    }
}
