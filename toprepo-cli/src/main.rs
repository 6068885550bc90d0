//! `git-toprepo`: the command-line front end for the translator library
//! crates. Subcommand parsing and network/process plumbing live here; the
//! actual translation algorithms stay in `toprepo-translate` and friends so
//! they remain usable (and testable) without a binary at all.

mod cli;
mod commands;
mod error;
mod layout;
mod logging;
mod remote;

use clap::Parser;

use cli::{Cli, Command};
use error::CliError;

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let result = match cli.command {
        Command::Init { url, dir } => commands::init::run(&url, dir),
        Command::Config { list, key, offline } => commands::config::run(list, key, offline),
        Command::Refilter { from_scratch, offline } => commands::refilter::run(from_scratch, offline),
        Command::Fetch { remote, refspec, skip_filter } => {
            commands::fetch::run(remote, refspec, skip_filter)
        }
        Command::Push { args, dry_run } => {
            let parsed = Command::push_args(&args);
            commands::push::run(&parsed.remote, &parsed.refspec, dry_run)
        }
    };

    if let Err(err) = result {
        report(&err);
        std::process::exit(err.exit_code());
    }
}

/// Print a short message to stderr; `spec.md` §7 asks for no backtraces or
/// internal detail leaking to the terminal.
fn report(err: &CliError) {
    eprintln!("git-toprepo: {err}");
}
