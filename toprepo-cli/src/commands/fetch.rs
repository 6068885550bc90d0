//! `git-toprepo fetch [<remote> [<refspec>]] [--skip-filter]`.

use std::path::PathBuf;

use tracing::{debug, info};

use toprepo_config::{gitmodules::GitModules, remote_to_repo, Config};
use toprepo_hash::RepoId;
use toprepo_translate::resolve::Resolver;

use crate::{
    commands::{self, refilter},
    error::CliError,
    layout,
    remote::{Fetcher, Git2Fetcher},
};

pub fn run(remote: Option<String>, refspec: Option<String>, skip_filter: bool) -> Result<(), CliError> {
    let repo = commands::open_repo()?;
    execute(&repo, remote, refspec, skip_filter)
}

/// The body of `run`, taking an already-opened repository so tests can
/// point it at a fixture without relying on `git2::Repository::discover`
/// finding the process's current directory.
pub fn execute(
    repo: &git2::Repository,
    remote: Option<String>,
    refspec: Option<String>,
    skip_filter: bool,
) -> Result<(), CliError> {
    let config = commands::load_config(repo, false)?;
    let fetcher = Git2Fetcher::new(repo);

    match remote {
        None => {
            fetch_one(&fetcher, repo, &config.top_fetch_url, &RepoId::top(), None)?;
            for repo_config in config.repos.iter().filter(|r| r.enabled) {
                fetch_one(&fetcher, repo, &repo_config.fetch_url, &repo_config.id, None)?;
                let is_default = repo_config
                    .fetch_args
                    .iter()
                    .map(String::as_str)
                    .eq(toprepo_config::DEFAULT_FETCH_ARGS);
                if !is_default {
                    debug!(
                        repo = repo_config.id.as_str(),
                        args = ?repo_config.fetch_args,
                        "fetchArgs are not forwarded to the native git2 transport"
                    );
                }
            }
        }
        Some(remote) => {
            let (repo_id, subdir) = resolve_remote(repo, &config, &remote)?;
            let url = if repo_id.is_top() {
                config.top_fetch_url.clone()
            } else {
                config
                    .repo(&repo_id)
                    .expect("resolve_remote only returns configured repos")
                    .fetch_url
                    .clone()
            };
            let tip = fetch_one(&fetcher, repo, &url, &repo_id, refspec.as_deref())?;

            // A subrepo fetched by name, with a specific ref, can be spliced
            // onto the checked-out mono branch right away instead of waiting
            // for `top` to bump its pin and a `refilter` to pick it up.
            if let (Some(subdir), Some(sub_tip)) = (subdir, tip) {
                splice_onto_checkout(repo, &config, &repo_id, &subdir, sub_tip)?;
            }
        }
    }

    if !skip_filter {
        refilter::execute(repo, false, false)?;
    }
    Ok(())
}

fn fetch_one(
    fetcher: &Git2Fetcher,
    repo: &git2::Repository,
    url: &str,
    repo_id: &RepoId,
    refspec: Option<&str>,
) -> Result<Option<git2::Oid>, CliError> {
    let (spec, dest_ref) = match refspec {
        None => (format!("+refs/heads/*:{}", layout::raw_repo_glob(repo_id)), None),
        Some(raw) => {
            let parsed = toprepo_refspec::Refspec::parse(raw)?;
            let branch = parsed.dst.strip_prefix("refs/heads/").unwrap_or(&parsed.dst);
            let dest = layout::raw_history_ref(repo_id, branch);
            (format!("+{}:{}", parsed.src, dest), Some(dest))
        }
    };
    fetcher.fetch(url, &[spec])?;
    debug!(repo = repo_id.as_str(), url, "fetched raw history");

    let tip = match dest_ref {
        Some(dest) => repo.find_reference(&dest)?.target(),
        None => None,
    };
    Ok(tip)
}

/// Insert `sub_tip`'s history under `subdir` onto the currently checked-out
/// mono branch, if one exists. Silently does nothing on an unborn or
/// detached HEAD: there is no branch tip yet to splice onto, and the next
/// `refilter` will pick the commit up once `top` bumps its pin.
fn splice_onto_checkout(
    repo: &git2::Repository,
    config: &Config,
    repo_id: &RepoId,
    subdir: &PathBuf,
    sub_tip: git2::Oid,
) -> Result<(), CliError> {
    let Ok(head) = repo.head() else {
        return Ok(());
    };
    let (Some(branch_ref), Some(mono_tip)) = (head.name(), head.target()) else {
        return Ok(());
    };
    let branch_ref = branch_ref.to_string();
    let subdir = subdir.to_string_lossy().into_owned();

    let mut resolver = Resolver::new(config);
    let result = resolver.resolve_onto(repo, repo_id, &subdir, sub_tip, mono_tip, &branch_ref)?;
    info!(subdir, %result, "spliced subrepo tip onto checked-out branch");
    Ok(())
}

/// Resolve a remote name (as given to `git fetch <remote>`) to its
/// configured repo and, if it names a submodule rather than `top`, the
/// subdirectory that submodule is mounted at — using `.gitmodules` as last
/// seen at the tip of any already-fetched top branch.
fn resolve_remote(
    repo: &git2::Repository,
    config: &Config,
    remote: &str,
) -> Result<(RepoId, Option<PathBuf>), CliError> {
    let modules = current_gitmodules(repo)?;
    let (name, module) = remote_to_repo(remote, &modules, config)
        .ok_or_else(|| CliError::UnknownRemote(remote.to_string()))?;
    let repo_id = RepoId::new(name).map_err(|_| CliError::UnknownRemote(remote.to_string()))?;
    Ok((repo_id, module.map(|m| m.path.clone())))
}

fn current_gitmodules(repo: &git2::Repository) -> Result<GitModules, CliError> {
    let mut refs = repo.references_glob(&layout::raw_top_glob())?;
    let Some(reference) = refs.next() else {
        return Ok(GitModules::default());
    };
    let reference = reference?;
    let Some(oid) = reference.target() else {
        return Ok(GitModules::default());
    };
    let commit = repo.find_commit(oid)?;
    let tree = commit.tree()?;
    let Some(entry) = tree.get_name(".gitmodules") else {
        return Ok(GitModules::default());
    };
    let blob = repo.find_blob(entry.id())?;
    let content = String::from_utf8_lossy(blob.content());
    Ok(GitModules::parse(&content))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig<'a>() -> git2::Signature<'a> {
        git2::Signature::now("Test", "test@example.com").unwrap()
    }

    /// A bare source repository with one commit on `main`, usable as a
    /// `file://`-less local path remote the way `git2::remote_anonymous`
    /// fetches from any filesystem path.
    fn source_repo_with_one_commit(dir: &std::path::Path) -> git2::Oid {
        let repo = git2::Repository::init_bare(dir).unwrap();
        let tree_id = repo.treebuilder(None).unwrap().write().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let s = sig();
        repo.commit(Some("refs/heads/main"), &s, &s, "root", &tree, &[]).unwrap()
    }

    #[test]
    fn fetching_the_unnamed_remote_set_pulls_top_and_every_enabled_repo() {
        let top_dir = tempfile::tempdir().unwrap();
        let top_oid = source_repo_with_one_commit(top_dir.path());
        let lib_dir = tempfile::tempdir().unwrap();
        source_repo_with_one_commit(lib_dir.path());

        let mono_dir = tempfile::tempdir().unwrap();
        let mono = git2::Repository::init(mono_dir.path()).unwrap();
        {
            let mut cfg = mono.config().unwrap();
            cfg.set_str("remote.origin.url", top_dir.path().to_str().unwrap()).unwrap();
            cfg.set_str("remote.top.pushurl", top_dir.path().to_str().unwrap()).unwrap();
            cfg.set_str(
                "toprepo.repo.lib.urls",
                lib_dir.path().to_str().unwrap(),
            )
            .unwrap();
        }

        execute(&mono, None, None, true).unwrap();

        let top_ref = mono.find_reference("refs/repos/top/main").unwrap();
        assert_eq!(top_ref.target().unwrap(), top_oid);
        assert!(mono.find_reference("refs/repos/lib/main").is_ok());
    }

    #[test]
    fn unknown_remote_name_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let repo = git2::Repository::init(dir.path()).unwrap();
        {
            let mut cfg = repo.config().unwrap();
            cfg.set_str("remote.origin.url", "https://example.com/top.git").unwrap();
            cfg.set_str("remote.top.pushurl", "https://example.com/top.git").unwrap();
        }
        let err = execute(&repo, Some("nope".to_string()), None, true).unwrap_err();
        assert!(matches!(err, CliError::UnknownRemote(_)));
    }
}
