//! The Splitter (`spec.md` §4.6): walks commits a developer made directly in
//! the mono repository and turns each into one commit per repository it
//! touched, ready to be pushed back out — the inverse of the Expander.
//!
//! Every file change whose path starts with a subdir known to the commit's
//! own `.gitmodules` is routed to that subrepo; everything else goes to the
//! top repository. A commit touching more than one repository must carry a
//! `Topic:` trailer, so the resulting per-repo commits can be grouped back
//! together on review.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use tracing::{debug, instrument};

use toprepo_config::{
    gitmodules::{self, GitModules},
    Config,
};
use toprepo_hash::{Hash, RepoId};

use crate::{error::Split as SplitError, tree, warning::Warning};

/// One commit ready to be pushed to a single repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushInstruction {
    pub repo: RepoId,
    pub commit_hash: Hash,
    /// Extra `git push` options, e.g. `-o topic=<value>` when the source
    /// commit carried a `Topic:` trailer.
    pub extra_args: Vec<String>,
}

/// Group `instructions` by repository (preserving first-seen order across
/// repos) and, within each repo's run, collapse consecutive instructions
/// that differ only in `commit_hash`, keeping the last — so a long chain of
/// intermediate commits to the same repo with the same push options pushes
/// only its tip (`spec.md` §8, Testable Property 9).
pub fn coalesce(instructions: Vec<PushInstruction>) -> Vec<PushInstruction> {
    let mut order: Vec<RepoId> = Vec::new();
    let mut buckets: HashMap<RepoId, Vec<PushInstruction>> = HashMap::new();
    for instr in instructions {
        if !buckets.contains_key(&instr.repo) {
            order.push(instr.repo.clone());
        }
        let bucket = buckets.entry(instr.repo.clone()).or_default();
        if let Some(last) = bucket.last() {
            if last.extra_args == instr.extra_args {
                bucket.pop();
            }
        }
        bucket.push(instr);
    }
    order
        .into_iter()
        .flat_map(|repo| buckets.remove(&repo).unwrap_or_default())
        .collect()
}

/// A file added/modified (`Some`) or removed (`None`), already made
/// relative to the subdir it was routed to.
struct FileChange {
    path: PathBuf,
    new_id: Option<git2::Oid>,
    mode: i32,
}

enum TargetRepo {
    Known(RepoId),
    Unknown,
}

/// Every gitlink (mode `160000`) entry in the tree of the top commit
/// `top_hash`, keyed by its path — the submodule pins in effect at that
/// point in top history, used to seed per-subdir parents for a mono commit
/// whose parent was not itself produced during this run.
fn top_commit_subrepo_pins(
    repo: &git2::Repository,
    top_hash: Hash,
) -> Result<HashMap<String, Hash>, git2::Error> {
    let commit = repo.find_commit(top_hash.into())?;
    let tree = commit.tree()?;
    let mut pins = HashMap::new();
    tree.walk(git2::TreeWalkMode::PreOrder, |root, entry| {
        if entry.filemode() == i32::from(git2::FileMode::Commit) {
            let name = entry.name().unwrap_or_default();
            pins.insert(format!("{root}{name}"), Hash::from(entry.id()));
        }
        git2::TreeWalkResult::Ok
    })?;
    Ok(pins)
}

fn find_subdir<'g>(path: &Path, gitmodules: Option<&'g GitModules>) -> Option<&'g gitmodules::SubmoduleInfo> {
    gitmodules?.iter().find(|info| path.starts_with(&info.path))
}

/// Translates new mono commits back into per-repository pushes.
pub struct Splitter<'a> {
    config: &'a Config,
    gitmodules_cache: gitmodules::Cache,
    /// Per processed mono commit, the parent-commit-hashes each subdir
    /// (`""` for the top repository) should forward to its children.
    resolved: HashMap<Hash, HashMap<String, Vec<Hash>>>,
    warnings: Vec<Warning>,
}

impl<'a> Splitter<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            gitmodules_cache: gitmodules::Cache::new(),
            resolved: HashMap::new(),
            warnings: Vec::new(),
        }
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Split every commit reachable from `local_ref` but not from
    /// `exclude_refs` (typically the already-pushed state of each
    /// downstream repo), oldest first.
    #[instrument(skip(self, repo, exclude_refs))]
    pub fn split(
        &mut self,
        repo: &git2::Repository,
        local_ref: &str,
        exclude_refs: &[String],
    ) -> Result<Vec<PushInstruction>, SplitError> {
        let mut revwalk = repo.revwalk()?;
        revwalk.set_sorting(git2::Sort::TOPOLOGICAL)?;
        revwalk.push_ref(local_ref)?;
        for r in exclude_refs {
            revwalk.hide_ref(r)?;
        }
        let mut oids: Vec<git2::Oid> = revwalk.collect::<Result<_, _>>()?;
        oids.reverse();

        let mut instructions = Vec::new();
        for oid in oids {
            let commit = repo.find_commit(oid)?;
            instructions.extend(self.split_commit(repo, &commit)?);
        }
        Ok(instructions)
    }

    fn load_gitmodules(
        &mut self,
        repo: &git2::Repository,
        tree: &git2::Tree,
    ) -> Option<std::rc::Rc<GitModules>> {
        let entry = tree.get_name(".gitmodules")?;
        let blob_hash = Hash::from(entry.id());
        let blob = repo.find_blob(entry.id()).ok()?;
        let content = String::from_utf8_lossy(blob.content()).into_owned();
        let parsed = self.gitmodules_cache.get_or_parse(blob_hash, &content);
        for error in &parsed.errors {
            self.warnings.push(Warning::InvalidGitModulesEntry {
                subdir: error.subdir.clone(),
                reason: error.reason.clone(),
            });
        }
        Some(parsed)
    }

    fn resolve_target_repo(
        &self,
        subdir: &str,
        gitmodules: Option<&GitModules>,
    ) -> Result<TargetRepo, SplitError> {
        let Some(info) = gitmodules.and_then(|g| g.get(Path::new(subdir))) else {
            return Ok(TargetRepo::Unknown);
        };
        let index = self.config.raw_url_index();
        let Some(repos) = index.get(info.raw_url.as_str()) else {
            return Ok(TargetRepo::Unknown);
        };
        match repos.len() {
            0 => Ok(TargetRepo::Unknown),
            1 => Ok(TargetRepo::Known(repos[0].id.clone())),
            _ => {
                let mut names: Vec<&str> = repos.iter().map(|r| r.id.as_str()).collect();
                names.sort_unstable();
                Err(SplitError::AmbiguousPushTarget {
                    subdir: subdir.to_string(),
                    repos: names.join(", "),
                })
            }
        }
    }

    /// Translate one mono commit, returning one [`PushInstruction`] per
    /// repository it touched (`spec.md` §4.6, step-by-step description).
    #[instrument(skip(self, repo, commit), fields(hash = %commit.id()))]
    fn split_commit(
        &mut self,
        repo: &git2::Repository,
        commit: &git2::Commit,
    ) -> Result<Vec<PushInstruction>, SplitError> {
        let hash = Hash::from(commit.id());
        let message = String::from_utf8_lossy(commit.message_bytes()).into_owned();

        let mut parent_map: HashMap<String, Vec<Hash>> = HashMap::new();
        for parent in commit.parents() {
            let parent_hash = Hash::from(parent.id());
            if let Some(prev) = self.resolved.get(&parent_hash) {
                for (subdir, hashes) in prev {
                    let list = parent_map.entry(subdir.clone()).or_default();
                    for h in hashes {
                        if !list.contains(h) {
                            list.push(*h);
                        }
                    }
                }
                continue;
            }
            let parent_message = String::from_utf8_lossy(parent.message_bytes()).into_owned();
            let footers = toprepo_trailers::Footers::parse(&parent_message)?;
            let top_hash = footers
                .top()
                .ok_or(SplitError::UnresolvedParent(parent_hash))?;

            let top_list = parent_map.entry(String::new()).or_default();
            if !top_list.contains(&top_hash) {
                top_list.push(top_hash);
            }
            for (subdir, pin_hash) in top_commit_subrepo_pins(repo, top_hash)? {
                let list = parent_map.entry(subdir).or_default();
                if !list.contains(&pin_hash) {
                    list.push(pin_hash);
                }
            }
        }

        let tree = commit.tree()?;
        let gitmodules = self.load_gitmodules(repo, &tree);
        let base_tree = if commit.parent_count() > 0 {
            Some(commit.parent(0)?.tree()?)
        } else {
            None
        };
        let diff = repo.diff_tree_to_tree(base_tree.as_ref(), Some(&tree), None)?;

        let mut changes_per_subdir: HashMap<String, Vec<FileChange>> = HashMap::new();
        for delta in diff.deltas() {
            let path = delta
                .new_file()
                .path()
                .or_else(|| delta.old_file().path())
                .map(Path::to_path_buf);
            let Some(path) = path else { continue };
            let new_id = (!delta.new_file().id().is_zero()).then(|| delta.new_file().id());
            let mode = i32::from(delta.new_file().mode());

            match find_subdir(&path, gitmodules.as_deref()) {
                Some(info) => {
                    let subdir_key = info.path.to_string_lossy().into_owned();
                    let rel = path
                        .strip_prefix(&info.path)
                        .expect("find_subdir only matches path prefixes")
                        .to_path_buf();
                    changes_per_subdir
                        .entry(subdir_key)
                        .or_default()
                        .push(FileChange { path: rel, new_id, mode });
                }
                None => {
                    changes_per_subdir
                        .entry(String::new())
                        .or_default()
                        .push(FileChange { path, new_id, mode });
                }
            }
        }

        let topic = toprepo_trailers::topic(&message)?;
        if changes_per_subdir.len() > 1 && topic.is_none() {
            let mut repos: Vec<&str> = changes_per_subdir.keys().map(String::as_str).collect();
            repos.sort_unstable();
            return Err(SplitError::TopicRequired {
                commit: hash,
                repos: repos.join(", "),
            });
        }
        let trimmed_message = toprepo_trailers::strip_for_push(&message)
            .map_err(|_| SplitError::CherryPickResidue { commit: hash })?;
        let extra_args: Vec<String> = match &topic {
            Some(value) => vec!["-o".to_string(), format!("topic={value}")],
            None => Vec::new(),
        };

        let author = commit.author();
        let committer = commit.committer();

        let mut subdirs: Vec<&String> = changes_per_subdir.keys().collect();
        subdirs.sort_unstable();

        let mut instructions = Vec::new();
        let mut touched: HashMap<String, Hash> = HashMap::new();
        for subdir in subdirs {
            let file_changes = &changes_per_subdir[subdir];
            let parent_hashes = parent_map.get(subdir).cloned().unwrap_or_default();

            let mut current = match parent_hashes.first() {
                Some(&h) => Some(repo.find_commit(h.into())?.tree()?.id()),
                None => None,
            };
            for change in file_changes {
                current = Some(match change.new_id {
                    Some(oid) => {
                        let base = current.map(|id| repo.find_tree(id)).transpose()?;
                        tree::set_path_opt(repo, base.as_ref(), &change.path, oid, change.mode)?
                    }
                    None => match current {
                        Some(id) => tree::remove_path(repo, &repo.find_tree(id)?, &change.path)?,
                        None => continue,
                    },
                });
            }
            let new_tree_id = match current {
                Some(id) => id,
                None => repo.treebuilder(None)?.write()?,
            };
            let new_tree = repo.find_tree(new_tree_id)?;

            let repo_id = if subdir.is_empty() {
                RepoId::top()
            } else {
                match self.resolve_target_repo(subdir, gitmodules.as_deref())? {
                    TargetRepo::Known(id) => id,
                    TargetRepo::Unknown => RepoId::top(),
                }
            };

            let parent_commits: Vec<git2::Commit> = parent_hashes
                .iter()
                .map(|&h| repo.find_commit(h.into()))
                .collect::<Result<_, _>>()?;
            let parent_refs: Vec<&git2::Commit> = parent_commits.iter().collect();

            let new_oid = repo.commit(
                None,
                &author,
                &committer,
                &trimmed_message,
                &new_tree,
                &parent_refs,
            )?;
            let new_hash = Hash::from(new_oid);
            touched.insert(subdir.clone(), new_hash);
            debug!(subdir, repo = %repo_id, %new_hash, "split mono commit into per-repo commit");
            instructions.push(PushInstruction {
                repo: repo_id,
                commit_hash: new_hash,
                extra_args: extra_args.clone(),
            });
        }

        for (subdir, new_hash) in touched {
            parent_map.insert(subdir, vec![new_hash]);
        }
        self.resolved.insert(hash, parent_map);

        Ok(instructions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn sig<'a>() -> git2::Signature<'a> {
        git2::Signature::now("Test", "test@example.com").unwrap()
    }

    fn write_blob(repo: &git2::Repository, path: &str, content: &[u8]) -> git2::Oid {
        let full = repo.path().parent().unwrap().join(path);
        if let Some(parent) = std::path::Path::new(&full).parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&full, content).unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new(path)).unwrap();
        index.write().unwrap();
        index.write_tree().unwrap()
    }

    fn commit(
        repo: &git2::Repository,
        refname: &str,
        parents: &[&git2::Commit],
        tree_id: git2::Oid,
        message: &str,
    ) -> git2::Oid {
        let tree = repo.find_tree(tree_id).unwrap();
        let s = sig();
        repo.commit(Some(refname), &s, &s, message, &tree, parents).unwrap()
    }

    fn basic_config(repo_stanza: &str) -> Config {
        let config_dict = toprepo_config::dict::ConfigDict::parse(&format!(
            "remote.origin.url=https://example.com/top.git\n\
             remote.top.pushurl=https://example.com/top.git\n\
             {repo_stanza}"
        ))
        .unwrap();
        Config::build(&config_dict, toprepo_config::ledger::MissingCommits::new()).unwrap()
    }

    /// Scenario E: a developer edits a file inside a single submodule's
    /// subdir; the split produces one push instruction, to that repo, with
    /// the edit mounted at the subrepo-relative path.
    #[test]
    fn scenario_e_single_subrepo_edit_produces_one_push_instruction() {
        let dir = tempfile::tempdir().unwrap();
        let repo = git2::Repository::init(dir.path()).unwrap();

        write_blob(
            &repo,
            ".gitmodules",
            b"[submodule \"sub\"]\n\tpath = lib\n\turl = ../sub.git\n",
        );
        let root_tree_id = write_blob(&repo, "README", b"hi");

        let sub_root_tree = {
            let mut b = repo.treebuilder(None).unwrap();
            let blob = repo.blob(b"v1").unwrap();
            b.insert("x.c", blob, git2::FileMode::Blob.into()).unwrap();
            b.write().unwrap()
        };
        let top_commit_tree = tree::set_path_opt(
            &repo,
            Some(&repo.find_tree(root_tree_id).unwrap()),
            Path::new("lib"),
            sub_root_tree,
            git2::FileMode::Tree.into(),
        )
        .unwrap();
        // `base_mono` is the root commit of this mono history: it touches
        // both the top repo (`README`, `.gitmodules`) and `lib` at once, so
        // it needs its own `Topic:` trailer. Its own top-commit hash is
        // never dereferenced here since a root commit has no parents to
        // resolve through the footer.
        let top_hash = git2::Oid::from_bytes(&[9; 20]).unwrap();
        let annotated = toprepo_trailers::annotate(
            "Setup\n\nTopic: setup\n",
            toprepo_trailers::TOP,
            top_hash.into(),
        );
        let base_mono = commit(&repo, "refs/heads/main", &[], top_commit_tree, &annotated);
        let base_mono_commit = repo.find_commit(base_mono).unwrap();

        let new_blob = repo.blob(b"v2").unwrap();
        let edited_tree = tree::set_path_opt(
            &repo,
            Some(&repo.find_tree(top_commit_tree).unwrap()),
            Path::new("lib/x.c"),
            new_blob,
            git2::FileMode::Blob.into(),
        )
        .unwrap();
        commit(
            &repo,
            "refs/heads/main",
            &[&base_mono_commit],
            edited_tree,
            "Fix a bug in lib",
        );

        let config = basic_config("toprepo.repo.sub.urls=../sub.git\n");
        let mut splitter = Splitter::new(&config);
        let instructions = splitter.split(&repo, "refs/heads/main", &[]).unwrap();

        let sub_id = RepoId::new("sub").unwrap();
        let sub_instructions: Vec<&PushInstruction> =
            instructions.iter().filter(|i| i.repo == sub_id).collect();
        assert_eq!(sub_instructions.len(), 2);
        let edit_instr = sub_instructions[1];
        assert!(edit_instr.extra_args.is_empty());

        let new_commit = repo.find_commit(edit_instr.commit_hash.into()).unwrap();
        assert_eq!(new_commit.parent_count(), 1);
        assert_eq!(new_commit.parent(0).unwrap().id(), sub_instructions[0].commit_hash.into());
        let x_c = new_commit.tree().unwrap().get_name("x.c").unwrap();
        let blob = repo.find_blob(x_c.id()).unwrap();
        assert_eq!(blob.content(), b"v2");
        let message = String::from_utf8_lossy(new_commit.message_bytes()).into_owned();
        assert!(!message.contains("^-- "));
    }

    /// Scenario F: a commit edits files in two different subrepos without a
    /// `Topic:` trailer; the splitter refuses it.
    #[test]
    fn scenario_f_multi_repo_edit_without_topic_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let repo = git2::Repository::init(dir.path()).unwrap();

        let gm_tree = write_blob(
            &repo,
            ".gitmodules",
            b"[submodule \"a\"]\n\tpath = a\n\turl = ../a.git\n\
              [submodule \"b\"]\n\tpath = b\n\turl = ../b.git\n",
        );
        let a_blob = repo.blob(b"a1").unwrap();
        let b_blob = repo.blob(b"b1").unwrap();
        let with_a = tree::set_path_opt(
            &repo,
            Some(&repo.find_tree(gm_tree).unwrap()),
            Path::new("a/x"),
            a_blob,
            git2::FileMode::Blob.into(),
        )
        .unwrap();
        let with_both = tree::set_path_opt(
            &repo,
            Some(&repo.find_tree(with_a).unwrap()),
            Path::new("b/y"),
            b_blob,
            git2::FileMode::Blob.into(),
        )
        .unwrap();
        // `base_mono` is a root commit that itself touches the top repo and
        // both submodules at once, so it needs its own `Topic:` trailer.
        let top_hash = git2::Oid::from_bytes(&[8; 20]).unwrap();
        let annotated = toprepo_trailers::annotate(
            "Setup\n\nTopic: setup\n",
            toprepo_trailers::TOP,
            top_hash.into(),
        );
        let base_mono = commit(&repo, "refs/heads/main", &[], with_both, &annotated);
        let base_mono_commit = repo.find_commit(base_mono).unwrap();

        let a_blob2 = repo.blob(b"a2").unwrap();
        let b_blob2 = repo.blob(b"b2").unwrap();
        let edit_a = tree::set_path_opt(
            &repo,
            Some(&repo.find_tree(with_both).unwrap()),
            Path::new("a/x"),
            a_blob2,
            git2::FileMode::Blob.into(),
        )
        .unwrap();
        let edit_both = tree::set_path_opt(
            &repo,
            Some(&repo.find_tree(edit_a).unwrap()),
            Path::new("b/y"),
            b_blob2,
            git2::FileMode::Blob.into(),
        )
        .unwrap();
        commit(
            &repo,
            "refs/heads/main",
            &[&base_mono_commit],
            edit_both,
            "Cross-cutting change",
        );

        let config = basic_config(
            "toprepo.repo.a.urls=../a.git\n\
             toprepo.repo.b.urls=../b.git\n",
        );
        let mut splitter = Splitter::new(&config);
        let err = splitter.split(&repo, "refs/heads/main", &[]).unwrap_err();
        assert!(matches!(err, SplitError::TopicRequired { .. }));
    }

    #[test]
    fn coalesce_keeps_only_the_tip_of_a_same_repo_run() {
        let repo_a = RepoId::new("a").unwrap();
        let repo_b = RepoId::new("b").unwrap();
        let h = |n: u8| Hash::from(git2::Oid::from_bytes(&[n; 20]).unwrap());
        let instructions = vec![
            PushInstruction { repo: repo_a.clone(), commit_hash: h(1), extra_args: vec![] },
            PushInstruction { repo: repo_b.clone(), commit_hash: h(2), extra_args: vec![] },
            PushInstruction { repo: repo_a.clone(), commit_hash: h(3), extra_args: vec![] },
        ];
        let coalesced = coalesce(instructions);
        assert_eq!(coalesced.len(), 2);
        assert_eq!(coalesced[0].repo, repo_a);
        assert_eq!(coalesced[0].commit_hash, h(3));
        assert_eq!(coalesced[1].repo, repo_b);
        assert_eq!(coalesced[1].commit_hash, h(2));
    }

    #[test]
    fn coalesce_keeps_runs_separate_across_different_extra_args() {
        let repo_a = RepoId::new("a").unwrap();
        let h = |n: u8| Hash::from(git2::Oid::from_bytes(&[n; 20]).unwrap());
        let instructions = vec![
            PushInstruction {
                repo: repo_a.clone(),
                commit_hash: h(1),
                extra_args: vec!["-o".to_string(), "topic=x".to_string()],
            },
            PushInstruction { repo: repo_a.clone(), commit_hash: h(2), extra_args: vec![] },
        ];
        let coalesced = coalesce(instructions);
        assert_eq!(coalesced.len(), 2);
    }
}
