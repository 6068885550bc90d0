//! `git-toprepo init <url> [<dir>]`: scaffold a new mono repository.

use std::path::{Path, PathBuf};

use toprepo_config::source::ConfigSource;

use crate::error::CliError;

pub fn run(url: &str, dir: Option<PathBuf>) -> Result<(), CliError> {
    let dir = dir.unwrap_or_else(|| default_dir_name(url));
    let repo = git2::Repository::init(&dir)?;

    let mut config = repo.config()?;
    config.set_str("remote.origin.url", url)?;
    config.set_str("remote.top.pushurl", url)?;

    // Seed the default `toprepo.config.<id>` loader so a bare `init` is
    // enough to find central config at `refs/meta/git-toprepo` on `origin`,
    // per `toprepo_config::source::default_root`.
    let ConfigSource::Static(stanza) = toprepo_config::source::default_root() else {
        unreachable!("default_root always returns a Static source")
    };
    let parsed = toprepo_config::gitconfig::parse(&stanza)?;
    for (key, values) in parsed.iter() {
        for value in values {
            config.set_str(key, value)?;
        }
    }

    println!(
        "Initialized git-toprepo mono repository in {}",
        dir.display()
    );
    Ok(())
}

fn default_dir_name(url: &str) -> PathBuf {
    let name = url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(url)
        .strip_suffix(".git")
        .unwrap_or_else(|| url.trim_end_matches('/').rsplit('/').next().unwrap_or(url));
    PathBuf::from(Path::new(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_dir_name_strips_dot_git() {
        assert_eq!(
            default_dir_name("https://example.com/group/project.git"),
            PathBuf::from("project")
        );
        assert_eq!(
            default_dir_name("https://example.com/group/project"),
            PathBuf::from("project")
        );
    }
}
