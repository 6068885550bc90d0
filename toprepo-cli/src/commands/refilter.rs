//! `git-toprepo refilter [--from-scratch] [--offline]`: re-run the Expander
//! over every raw top ref already fetched into `refs/repos/top/*`.
//!
//! Re-running the full top history each time is correct, not just a
//! placeholder: Testable Property 6 guarantees the Expander is idempotent,
//! so a from-scratch run reproduces byte-identical mono commits for history
//! it has already translated. `--from-scratch` additionally clears the
//! translated branches first, which only matters if a prior run left behind
//! a branch this run no longer produces.

use std::collections::{HashMap, HashSet};

use tracing::{info, warn};

use toprepo_commit_graph::{collect_many, CommitGraph};
use toprepo_hash::RepoId;
use toprepo_translate::{convert::SourceCommit, expand::Expander};

use crate::{commands, error::CliError, layout};

pub fn run(from_scratch: bool, offline: bool) -> Result<(), CliError> {
    let repo = commands::open_repo()?;
    execute(&repo, from_scratch, offline)
}

/// The body of `run`, taking an already-opened repository so tests can
/// point it at a fixture without relying on `git2::Repository::discover`
/// finding the process's current directory.
pub fn execute(repo: &git2::Repository, from_scratch: bool, offline: bool) -> Result<(), CliError> {
    let config = commands::load_config(repo, offline)?;

    if from_scratch {
        let mut refs = repo.references_glob(layout::translated_glob())?;
        while let Some(r) = refs.next() {
            let mut r = r?;
            r.delete()?;
        }
    }

    let subgraph_jobs = config
        .repos
        .iter()
        .filter(|r| r.enabled)
        .map(|r| {
            let refs = ref_names(repo, &layout::raw_repo_glob(&r.id))?;
            Ok((r.id.clone(), repo.path().to_path_buf(), refs))
        })
        .collect::<Result<Vec<_>, CliError>>()?;
    let subgraphs: HashMap<RepoId, CommitGraph> = collect_many(subgraph_jobs)?;

    let mut expander = Expander::new(&config, &config.missing_commits, &subgraphs);

    let top_refs = ref_names(repo, &layout::raw_top_glob())?;
    let mut processed_branches = HashSet::new();
    for top_ref in top_refs {
        let Some(branch) = layout::branch_of_raw_ref(&RepoId::top(), &top_ref) else {
            continue;
        };
        let top_graph = CommitGraph::collect(repo, &[top_ref.as_str()])?;
        let Some(tip) = top_graph.iter().last() else {
            continue;
        };
        let tip_id = tip.id;
        expander.expand_refs(repo, &top_graph, &branch)?;

        let mono_id = expander
            .conversion()
            .get(&SourceCommit {
                repo: RepoId::top(),
                id: tip_id,
            })
            .expect("the tip was just expanded");
        let mono_hash = expander.mono().hash(mono_id);
        repo.reference(
            &layout::translated_ref(&branch),
            mono_hash.into(),
            true,
            "git-toprepo refilter",
        )?;
        processed_branches.insert(branch.clone());
        info!(branch, commits = top_graph.len(), "refiltered branch");
    }

    remove_stale_translated_refs(repo, &processed_branches)?;

    for warning in expander.warnings() {
        warn!(?warning);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn sig<'a>() -> git2::Signature<'a> {
        git2::Signature::now("Test", "test@example.com").unwrap()
    }

    fn commit_file(repo: &git2::Repository, refname: &str, parents: &[&git2::Commit], name: &str, content: &[u8], message: &str) -> git2::Oid {
        std::fs::write(repo.path().parent().unwrap().join(name), content).unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new(name)).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let s = sig();
        repo.commit(Some(refname), &s, &s, message, &tree, parents).unwrap()
    }

    #[test]
    fn refilter_translates_every_raw_top_ref_into_a_mono_branch() {
        let dir = tempfile::tempdir().unwrap();
        let repo = git2::Repository::init(dir.path()).unwrap();
        {
            let mut config = repo.config().unwrap();
            config.set_str("remote.origin.url", "https://example.com/top.git").unwrap();
            config.set_str("remote.top.pushurl", "https://example.com/top.git").unwrap();
        }

        commit_file(&repo, "refs/repos/top/main", &[], "README.md", b"hello", "root");

        execute(&repo, false, true).unwrap();

        let translated = repo.find_reference("refs/remotes/origin/main").unwrap();
        let mono = repo.find_commit(translated.target().unwrap()).unwrap();
        let tree = mono.tree().unwrap();
        assert!(tree.get_name("README.md").is_some());
    }

    #[test]
    fn from_scratch_drops_branches_whose_source_ref_is_gone() {
        let dir = tempfile::tempdir().unwrap();
        let repo = git2::Repository::init(dir.path()).unwrap();
        {
            let mut config = repo.config().unwrap();
            config.set_str("remote.origin.url", "https://example.com/top.git").unwrap();
            config.set_str("remote.top.pushurl", "https://example.com/top.git").unwrap();
        }
        commit_file(&repo, "refs/repos/top/stale", &[], "a.txt", b"1", "root");
        execute(&repo, false, true).unwrap();
        assert!(repo.find_reference("refs/remotes/origin/stale").is_ok());

        repo.find_reference("refs/repos/top/stale").unwrap().delete().unwrap();
        commit_file(&repo, "refs/repos/top/main", &[], "b.txt", b"1", "root");
        execute(&repo, true, true).unwrap();

        assert!(repo.find_reference("refs/remotes/origin/stale").is_err());
        assert!(repo.find_reference("refs/remotes/origin/main").is_ok());
    }
}

fn ref_names(repo: &git2::Repository, glob: &str) -> Result<Vec<String>, CliError> {
    let mut out = Vec::new();
    let mut refs = repo.references_glob(glob)?;
    while let Some(r) = refs.next() {
        let r = r?;
        if let Some(name) = r.name() {
            out.push(name.to_string());
        }
    }
    Ok(out)
}

/// Delete translated branches from a prior run that this run didn't
/// reproduce, because their source ref under `refs/repos/top/*` is gone
/// (`spec.md` §4.4.3, "deleted refs are removed").
fn remove_stale_translated_refs(
    repo: &git2::Repository,
    processed_branches: &HashSet<String>,
) -> Result<(), CliError> {
    let mut refs = repo.references_glob(layout::translated_glob())?;
    let mut stale = Vec::new();
    while let Some(r) = refs.next() {
        let r = r?;
        let Some(name) = r.name() else { continue };
        let Some(branch) = name.strip_prefix("refs/remotes/origin/") else {
            continue;
        };
        if !processed_branches.contains(branch) {
            stale.push(name.to_string());
        }
    }
    for name in stale {
        repo.find_reference(&name)?.delete()?;
    }
    Ok(())
}
