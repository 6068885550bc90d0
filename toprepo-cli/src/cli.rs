//! Argument grammar for the five subcommands `spec.md` §6 specifies, via
//! `clap`'s derive API — the same crate `git-submerge` uses for its own
//! single-command CLI, on its newer attribute-macro surface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "git-toprepo", version, about = "Translate between a top repository and its flattened mono repository")]
pub struct Cli {
    /// Increase log verbosity; repeat for more (-v, -vv, -vvv).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a new mono repository tracking `url`.
    Init {
        url: String,
        dir: Option<PathBuf>,
    },

    /// Print the effective configuration.
    Config {
        /// Print every resolved key instead of a single one.
        #[arg(long)]
        list: bool,
        /// The key to print, e.g. `toprepo.repo.lib.fetchurl`.
        key: Option<String>,
        /// Don't fetch any `toprepo.config.<id>` sources over the network.
        #[arg(long)]
        offline: bool,
    },

    /// Re-run the Expander over every fetched top ref.
    Refilter {
        /// Forget any `refs/remotes/origin/*` state and rebuild from scratch.
        #[arg(long)]
        from_scratch: bool,
        #[arg(long)]
        offline: bool,
    },

    /// Fetch from a repo (or every configured repo) and refilter.
    Fetch {
        remote: Option<String>,
        refspec: Option<String>,
        /// Fetch only; don't run the Expander afterwards.
        #[arg(long)]
        skip_filter: bool,
    },

    /// Split and push mono commits back out to their source repos.
    Push {
        /// `[<remote>] <local-ref>:<remote-ref>`.
        #[arg(num_args = 1..=2, required = true)]
        args: Vec<String>,
        #[arg(long)]
        dry_run: bool,
    },
}

/// `[<remote>] <local-ref>:<remote-ref>` resolved into its two parts, the
/// remote defaulting to `origin` the way a bare `git push <refspec>` does.
pub struct PushArgs {
    pub remote: String,
    pub refspec: String,
}

impl Command {
    pub fn push_args(args: &[String]) -> PushArgs {
        match args {
            [refspec] => PushArgs {
                remote: "origin".to_string(),
                refspec: refspec.clone(),
            },
            [remote, refspec] => PushArgs {
                remote: remote.clone(),
                refspec: refspec.clone(),
            },
            _ => unreachable!("clap enforces 1..=2 args"),
        }
    }
}
