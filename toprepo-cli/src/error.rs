//! The CLI's own error taxonomy: every fatal condition a subcommand can hit,
//! mapped to the exit codes `spec.md` §6 assigns (0 success, 1 a run-time
//! failure, 2 a usage error clap itself doesn't already catch).

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Git(#[from] git2::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] toprepo_config::ConfigError),
    #[error(transparent)]
    Ledger(#[from] toprepo_config::ledger::LedgerError),
    #[error(transparent)]
    Loader(#[from] toprepo_config::source::AccumulateError),
    #[error(transparent)]
    GitConfigParse(#[from] toprepo_config::gitconfig::ParseError),
    #[error(transparent)]
    CommitGraph(#[from] toprepo_commit_graph::error::Collect),
    #[error(transparent)]
    Expand(#[from] toprepo_translate::error::Expand),
    #[error(transparent)]
    Resolve(#[from] toprepo_translate::error::Resolve),
    #[error(transparent)]
    Split(#[from] toprepo_translate::error::Split),
    #[error(transparent)]
    Refspec(#[from] toprepo_refspec::ParseError),
    #[error("not a git-toprepo repository (no remote.origin.url configured)")]
    NotAToprepoRepo,
    #[error("remote {0:?} does not resolve to a configured repository")]
    UnknownRemote(String),
    #[error("{0}")]
    Usage(String),
}

impl CliError {
    /// The process exit code this error should produce, per `spec.md` §6.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Usage(_) => 2,
            _ => 1,
        }
    }
}
