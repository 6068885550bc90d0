//! Moving objects between repositories on disk and over the network is
//! explicitly an external collaborator's job (`spec.md` §1), kept behind
//! [`Fetcher`]/[`Pusher`] so the library crates stay testable without one.
//!
//! The real implementations use `git2`'s own remote transport, the same way
//! `git-submerge`'s `fetch_submodule_history` does — `repo.remote_anonymous`
//! followed by `.fetch()` — rather than shelling out to a `git` binary.

use tracing::warn;

pub trait Fetcher {
    fn fetch(&self, url: &str, refspecs: &[String]) -> Result<(), git2::Error>;
}

pub trait Pusher {
    fn push(&self, url: &str, refspec: &str, extra_args: &[String]) -> Result<(), git2::Error>;
}

pub struct Git2Fetcher<'a> {
    repo: &'a git2::Repository,
}

impl<'a> Git2Fetcher<'a> {
    pub fn new(repo: &'a git2::Repository) -> Self {
        Self { repo }
    }
}

impl Fetcher for Git2Fetcher<'_> {
    fn fetch(&self, url: &str, refspecs: &[String]) -> Result<(), git2::Error> {
        let mut remote = self.repo.remote_anonymous(url)?;
        let specs: Vec<&str> = refspecs.iter().map(String::as_str).collect();
        remote.fetch(&specs, None, None)
    }
}

/// Lets [`Git2Fetcher`] double as the network side-effect a
/// `ConfigSource::GitRemote` needs, so `init`/`config`/`refilter` share one
/// fetcher instance rather than the CLI wiring up two kinds.
impl toprepo_config::source::RemoteFetcher for Git2Fetcher<'_> {
    fn fetch(
        &self,
        url: &str,
        remote_ref: &str,
        local_ref: &str,
    ) -> Result<(), toprepo_config::source::LoaderError> {
        let mut remote = self.repo.remote_anonymous(url)?;
        remote.fetch(&[format!("{remote_ref}:{local_ref}")], None, None)?;
        Ok(())
    }
}

pub struct Git2Pusher<'a> {
    repo: &'a git2::Repository,
}

impl<'a> Git2Pusher<'a> {
    pub fn new(repo: &'a git2::Repository) -> Self {
        Self { repo }
    }
}

impl Pusher for Git2Pusher<'_> {
    fn push(&self, url: &str, refspec: &str, extra_args: &[String]) -> Result<(), git2::Error> {
        if !extra_args.is_empty() {
            warn!(
                ?extra_args,
                "push options are not forwarded: not exposed by this git2 binding"
            );
        }
        let mut remote = self.repo.remote_anonymous(url)?;
        remote.push(&[refspec], None)
    }
}
