//! Fatal error kinds, per `spec.md` §7.

use toprepo_hash::{Hash, RepoId};

#[derive(Debug, thiserror::Error)]
pub enum Expand {
    #[error(transparent)]
    Git(#[from] git2::Error),
    #[error("submodule commit {hash} from {raw_url:?} is neither fetchable nor listed in the missing-commit ledger")]
    MissingCommit { raw_url: String, hash: Hash },
    #[error("renaming submodule at {subdir:?} is not supported")]
    SubmoduleRename { subdir: String },
    #[error("could not resolve remote {0:?} to a configured repository")]
    UnknownRemote(String),
}

#[derive(Debug, thiserror::Error)]
pub enum Split {
    #[error(transparent)]
    Git(#[from] git2::Error),
    #[error("commit {commit} touches multiple repos ({repos}) but has no 'Topic:' footer")]
    TopicRequired { commit: Hash, repos: String },
    #[error("commit {commit} still contains a '^-- ' footer after stripping the most recent one")]
    CherryPickResidue { commit: Hash },
    #[error("subdir {subdir:?} maps to more than one configured repo: {repos}")]
    AmbiguousPushTarget { subdir: String, repos: String },
    #[error("parent {0} of a new mono commit was neither already processed nor a resolvable pre-existing commit")]
    UnresolvedParent(Hash),
    #[error(transparent)]
    Trailers(#[from] toprepo_trailers::ParseError),
}

#[derive(Debug, thiserror::Error)]
pub enum Resolve {
    #[error(transparent)]
    Git(#[from] git2::Error),
    #[error(transparent)]
    CommitGraph(#[from] toprepo_commit_graph::error::Collect),
    #[error("no base mono commit found for subdir {subdir:?} even with the full history window")]
    NoBaseFound { subdir: String },
    #[error("repo {0} is not configured")]
    UnknownRepo(RepoId),
}
