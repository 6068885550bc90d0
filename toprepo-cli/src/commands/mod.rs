pub mod config;
pub mod fetch;
pub mod init;
pub mod push;
pub mod refilter;

use toprepo_config::{
    dict::ConfigDict, ledger::MissingCommits, source::ConfigSource, Config,
};

use crate::{error::CliError, remote::Git2Fetcher};

pub fn open_repo() -> Result<git2::Repository, CliError> {
    Ok(git2::Repository::discover(".")?)
}

/// Accumulate the `toprepo.config.<id>` DAG rooted at the repository's own
/// `.git/config` and build a [`Config`] from it plus the missing-commit
/// ledger. Shared by every subcommand but `init` (which has no config yet).
pub fn load_config(repo: &git2::Repository, offline: bool) -> Result<Config, CliError> {
    let dict = load_config_dict(repo, offline)?;
    let missing_commits = MissingCommits::load(&repo.config()?)?;
    Ok(Config::build(&dict, missing_commits)?)
}

pub fn load_config_dict(repo: &git2::Repository, offline: bool) -> Result<ConfigDict, CliError> {
    let top_fetch_url = repo
        .config()?
        .get_string("remote.origin.url")
        .map_err(|_| CliError::NotAToprepoRepo)?;
    let fetcher = Git2Fetcher::new(repo);
    Ok(toprepo_config::source::accumulate(
        repo,
        ConfigSource::LocalGitConfig,
        &top_fetch_url,
        &fetcher,
        !offline,
    )?)
}
