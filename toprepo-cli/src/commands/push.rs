//! `git-toprepo push [<remote>] <local-ref>:<remote-ref> [--dry-run]`.

use tracing::info;

use toprepo_translate::split::{coalesce, Splitter};

use crate::{commands, error::CliError, layout, remote::{Git2Pusher, Pusher}};

pub fn run(remote: &str, refspec: &str, dry_run: bool) -> Result<(), CliError> {
    let repo = commands::open_repo()?;
    execute(&repo, remote, refspec, dry_run)
}

/// The body of `run`, taking an already-opened repository so tests can
/// point it at a fixture without relying on `git2::Repository::discover`
/// finding the process's current directory.
pub fn execute(repo: &git2::Repository, remote: &str, refspec: &str, dry_run: bool) -> Result<(), CliError> {
    let config = commands::load_config(repo, false)?;
    let parsed = toprepo_refspec::Refspec::parse(refspec)?;

    let branch = parsed.src.strip_prefix("refs/heads/").unwrap_or(&parsed.src);
    let translated = layout::translated_ref(branch);
    let exclude_refs: Vec<String> = if repo.find_reference(&translated).is_ok() {
        vec![translated]
    } else {
        Vec::new()
    };

    let mut splitter = Splitter::new(&config);
    let instructions = splitter.split(repo, &parsed.src, &exclude_refs)?;
    let instructions = coalesce(instructions);

    let pusher = Git2Pusher::new(repo);
    for instruction in &instructions {
        let url = push_url_for(repo, &config, remote, &instruction.repo);
        let push_spec = format!("{}:{}", instruction.commit_hash, parsed.dst);

        if dry_run {
            println!(
                "would push {} to {} ({})",
                instruction.commit_hash, instruction.repo, url
            );
            continue;
        }

        repo.reference(
            &layout::push_staging_ref(&instruction.repo),
            instruction.commit_hash.into(),
            true,
            "git-toprepo push",
        )?;
        pusher.push(&url, &push_spec, &instruction.extra_args)?;
        info!(repo = %instruction.repo, hash = %instruction.commit_hash, "pushed");
    }

    for warning in splitter.warnings() {
        tracing::warn!(?warning);
    }
    Ok(())
}

fn push_url_for(
    repo: &git2::Repository,
    config: &toprepo_config::Config,
    remote: &str,
    repo_id: &toprepo_hash::RepoId,
) -> String {
    if repo_id.is_top() {
        if let Ok(named) = repo.find_remote(remote) {
            if let Some(url) = named.pushurl().or_else(|| named.url()) {
                return url.to_string();
            }
        }
        return config.top_push_url.clone();
    }
    config
        .repo(repo_id)
        .map(|r| r.push_url.clone())
        .unwrap_or_else(|| config.top_push_url.clone())
}
