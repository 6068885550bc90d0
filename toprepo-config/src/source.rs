//! The chainable `toprepo.config.<id>` loader DAG.
//!
//! A run's full configuration is never just `.git/config`: it can pull in
//! `toprepo.config.<id>` stanzas that point at a file on disk, a ref in
//! another repository, or (recursively) another such stanza discovered
//! while reading one of those. [`ConfigSource`] is the tagged representation
//! of one such pointer; [`accumulate`] walks the whole DAG breadth-first.

use std::{
    collections::{HashSet, VecDeque},
    path::PathBuf,
};

use crate::{dict::ConfigDict, gitconfig};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Literal config text, used for the built-in default stanza.
    Static(String),
    /// A file on the local filesystem, relative to the mono repository root.
    LocalFile { path: PathBuf, allow_missing: bool },
    /// `git config --list` of the local repository's own `.git/config`.
    LocalGitConfig,
    /// A file at `<local_ref>:<path>`, fetched from `url`'s `remote_ref`
    /// into `local_ref` first if `online` is set.
    GitRemote {
        url: String,
        remote_ref: String,
        path: String,
        local_ref: String,
    },
}

/// Performs the network side-effect a [`ConfigSource::GitRemote`] needs
/// before it can be read. Left abstract so `toprepo-config` stays testable
/// without a network; the CLI provides a real implementation that shells
/// out to `git fetch`.
pub trait RemoteFetcher {
    fn fetch(&self, url: &str, remote_ref: &str, local_ref: &str) -> Result<(), LoaderError>;
}

/// A fetcher that does nothing; suitable for fully offline runs where every
/// `GitRemote` source is expected to already be present locally.
pub struct NullFetcher;

impl RemoteFetcher for NullFetcher {
    fn fetch(&self, _url: &str, _remote_ref: &str, _local_ref: &str) -> Result<(), LoaderError> {
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error(transparent)]
    Git(#[from] git2::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Parse(#[from] gitconfig::ParseError),
    #[error("{0:?} is not valid UTF-8")]
    NotUtf8(PathBuf),
}

fn read_one(
    repo: &git2::Repository,
    source: &ConfigSource,
    fetcher: &dyn RemoteFetcher,
    online: bool,
) -> Result<ConfigDict, LoaderError> {
    match source {
        ConfigSource::Static(content) => Ok(gitconfig::parse(content)?),
        ConfigSource::LocalFile { path, allow_missing } => {
            let full_path = repo
                .workdir()
                .map(|dir| dir.join(path))
                .unwrap_or_else(|| path.clone());
            if *allow_missing && !full_path.exists() {
                return Ok(ConfigDict::new());
            }
            let content = std::fs::read_to_string(&full_path)?;
            Ok(gitconfig::parse(&content)?)
        }
        ConfigSource::LocalGitConfig => {
            let config = repo.config()?;
            let mut dict = ConfigDict::new();
            let mut entries = config.entries(None)?;
            while let Some(entry) = entries.next() {
                let entry = entry?;
                let name = entry.name().ok_or_else(|| {
                    LoaderError::NotUtf8(PathBuf::from("<config entry name>"))
                })?;
                let value = entry.value().unwrap_or_default();
                dict.insert(name, value);
            }
            Ok(dict)
        }
        ConfigSource::GitRemote {
            url,
            remote_ref,
            path,
            local_ref,
        } => {
            if online {
                fetcher.fetch(url, remote_ref, local_ref)?;
            }
            let spec = format!("{local_ref}:{path}");
            let object = repo.revparse_single(&spec)?;
            let blob = object.peel_to_blob()?;
            let content = std::str::from_utf8(blob.content())
                .map_err(|_| LoaderError::NotUtf8(PathBuf::from(path)))?;
            Ok(gitconfig::parse(content)?)
        }
    }
}

/// Reads several sources in order and merges them such that earlier sources
/// take precedence, mirroring `MultiConfigLoader`'s string-concatenation
/// approach without actually round-tripping through text twice.
pub struct MultiLoader(pub Vec<ConfigSource>);

impl MultiLoader {
    pub fn read(
        &self,
        repo: &git2::Repository,
        fetcher: &dyn RemoteFetcher,
        online: bool,
    ) -> Result<ConfigDict, LoaderError> {
        let mut dicts = Vec::with_capacity(self.0.len());
        for source in &self.0 {
            dicts.push(read_one(repo, source, fetcher, online)?);
        }
        dicts.reverse();
        Ok(ConfigDict::join(dicts))
    }
}

/// The bootstrap source: the repository's own `.git/config`, falling back
/// to the default `toprepo.config.default` stanza pointing at
/// `refs/meta/git-toprepo:toprepo.config`.
pub fn default_root() -> ConfigSource {
    ConfigSource::Static(
        "[toprepo \"config.default\"]\n\
         \ttype = git\n\
         \turl = .\n\
         \tref = refs/meta/git-toprepo\n\
         \tpath = toprepo.config\n"
            .to_string(),
    )
}

#[derive(Debug, thiserror::Error)]
pub enum AccumulateError {
    #[error(transparent)]
    Loader(#[from] LoaderError),
    #[error("toprepo.config.{0} configurations found in multiple sources")]
    DuplicateName(String),
    #[error("invalid toprepo.config.{name}.type {ty:?}")]
    InvalidType { name: String, ty: String },
    #[error("toprepo.config.{name} is missing required key {key:?}")]
    MissingKey { name: String, key: &'static str },
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "1" | "true")
}

fn child_source(
    name: &str,
    values: &ConfigDict,
    parent_fetch_url: &str,
) -> Result<ConfigSource, AccumulateError> {
    let require = |key: &'static str| {
        values
            .last(key)
            .map(str::to_string)
            .ok_or_else(|| AccumulateError::MissingKey { name: name.to_string(), key })
    };
    match values.last("type") {
        Some("none") => Ok(ConfigSource::Static(String::new())),
        Some("file") => Ok(ConfigSource::LocalFile {
            path: PathBuf::from(require("path")?),
            allow_missing: false,
        }),
        Some("git") => {
            let raw_url = require("url")?;
            let url = toprepo_refspec::url::join(parent_fetch_url, &raw_url);
            Ok(ConfigSource::GitRemote {
                url,
                remote_ref: require("ref")?,
                path: require("path")?,
                local_ref: format!("refs/toprepo/config/{name}"),
            })
        }
        other => Err(AccumulateError::InvalidType {
            name: name.to_string(),
            ty: other.unwrap_or("").to_string(),
        }),
    }
}

/// Expand the `toprepo.config.<id>` DAG reachable from `root`, folding
/// every discovered source's entries into one [`ConfigDict`].
///
/// A source nearer the root overrides values contributed by sources it
/// points at transitively, per `spec.md` §9 ("earlier loaded configs
/// override later loaded configs").
pub fn accumulate(
    repo: &git2::Repository,
    root: ConfigSource,
    parent_fetch_url: &str,
    fetcher: &dyn RemoteFetcher,
    online: bool,
) -> Result<ConfigDict, AccumulateError> {
    let mut full = ConfigDict::new();
    let mut existing_names: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<ConfigSource> = VecDeque::from([root]);

    while let Some(source) = queue.pop_front() {
        let current = read_one(repo, &source, fetcher, online)?;

        let own_loaders = current.extract_mapping("toprepo.config");
        let merged_for_lookup = ConfigDict::join([current.clone(), full.clone()]);
        let full_loaders = merged_for_lookup.extract_mapping("toprepo.config");

        for (name, own_values) in &own_loaders {
            let is_partial = own_values.last("partial").map(parse_bool).unwrap_or(false);
            if is_partial {
                continue;
            }
            if !existing_names.insert(name.clone()) {
                return Err(AccumulateError::DuplicateName(name.clone()));
            }
            let full_values = &full_loaders[name];
            queue.push_back(child_source(name, full_values, parent_fetch_url)?);
        }

        full = ConfigDict::join([current, full]);
    }

    Ok(full)
}
