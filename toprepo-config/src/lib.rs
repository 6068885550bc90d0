//! Everything a translation run needs to know before it can touch a
//! repository: the per-subrepo fetch/push URLs and enablement rules parsed
//! out of `toprepo.repo.*`/`toprepo.role.*`, the chainable
//! `toprepo.config.<id>` loader DAG (see [`source`]), the
//! `.gitmodules` cache (see [`gitmodules`]), and the
//! [Missing-commit ledger](ledger).

pub mod dict;
pub mod gitconfig;
pub mod gitmodules;
pub mod ledger;
pub mod source;

use std::collections::HashMap;

use regex::Regex;

use dict::ConfigDict;
use toprepo_hash::RepoId;

pub const TOP_REPO_NAME: &str = toprepo_hash::TOP;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Dict(#[from] dict::DictError),
    #[error("remote.origin.url is not set")]
    MissingFetchUrl,
    #[error("remote.top.pushUrl is not set")]
    MissingPushUrl,
    #[error("invalid repo name {0:?}: reserved for the top repository")]
    ReservedName(String),
    #[error("subdirectories are not allowed in a repo name: {0:?}")]
    NestedName(String),
    #[error(
        "toprepo.repo.{0}.urls is unspecified and toprepo.repo.{0}.fetchUrl is not set"
    )]
    MissingUrls(String),
    #[error(
        "toprepo.repo.{0}.fetchUrl is unset and multiple toprepo.repo.{0}.urls values \
         give an ambiguous default"
    )]
    AmbiguousFetchUrl(String),
    #[error("invalid wanted-repo pattern {pattern:?} for {name}: must start with '+' or '-'")]
    BadWantedPattern { name: String, pattern: String },
    #[error("invalid wanted-repo regex {regex:?} for {name}: {source}")]
    BadWantedRegex {
        name: String,
        regex: String,
        source: regex::Error,
    },
    #[error("could not determine if repo {0} is wanted or not")]
    UndeterminedWanted(String),
}

/// One `toprepo.repo.<name>` stanza, fully resolved against its role and
/// parent URLs.
#[derive(Debug, Clone)]
pub struct RepoConfig {
    pub id: RepoId,
    /// Whether the current role's `toprepo.role.<role>.repos` patterns
    /// select this repo for expansion.
    pub enabled: bool,
    /// `.gitmodules`-facing URLs this repo may be matched under. Not
    /// resolved; may be relative.
    pub raw_urls: Vec<String>,
    pub fetch_url: String,
    pub fetch_args: Vec<String>,
    pub push_url: String,
}

/// The default `git fetch` arguments used when a repo sets none of its own.
pub const DEFAULT_FETCH_ARGS: [&str; 3] = ["--prune", "--prune-tags", "--tags"];

fn default_fetch_args() -> Vec<String> {
    DEFAULT_FETCH_ARGS.iter().map(|s| s.to_string()).collect()
}

/// A fully-resolved toprepo configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub missing_commits: ledger::MissingCommits,
    pub top_fetch_url: String,
    pub top_push_url: String,
    pub repos: Vec<RepoConfig>,
}

impl Config {
    /// Assemble a [`Config`] from the accumulated `toprepo.*` entries and
    /// the missing-commit ledger.
    pub fn build(
        config_dict: &ConfigDict,
        missing_commits: ledger::MissingCommits,
    ) -> Result<Self, ConfigError> {
        let top_fetch_url = config_dict
            .last("remote.origin.url")
            .map(str::to_string)
            .ok_or(ConfigError::MissingFetchUrl)?;
        let top_push_url = config_dict
            .last("remote.top.pushurl")
            .map(str::to_string)
            .ok_or(ConfigError::MissingPushUrl)?;

        let role = config_dict.last("toprepo.role").unwrap_or("default");
        let role_key = format!("toprepo.role.{role}.repos");
        let wanted_patterns: Vec<&str> = if role == "default" {
            let configured = config_dict.get(&role_key);
            if configured.is_empty() {
                vec!["+.*"]
            } else {
                configured.iter().map(String::as_str).collect()
            }
        } else {
            config_dict.get(&role_key).iter().map(String::as_str).collect()
        };

        let repo_dicts = config_dict.extract_mapping("toprepo.repo");
        let mut repos = Vec::with_capacity(repo_dicts.len());
        for (name, repo_dict) in repo_dicts {
            repos.push(parse_repo_config(
                &name,
                &repo_dict,
                &wanted_patterns,
                &top_fetch_url,
                &top_push_url,
            )?);
        }

        Ok(Self {
            missing_commits,
            top_fetch_url,
            top_push_url,
            repos,
        })
    }

    pub fn repo(&self, id: &RepoId) -> Option<&RepoConfig> {
        self.repos.iter().find(|r| &r.id == id)
    }

    /// Index `raw_urls` to the [`RepoConfig`]s that list them, for
    /// resolving `.gitmodules` entries back to a configured repo.
    pub fn raw_url_index(&self) -> HashMap<&str, Vec<&RepoConfig>> {
        let mut index: HashMap<&str, Vec<&RepoConfig>> = HashMap::new();
        for repo in &self.repos {
            for raw_url in &repo.raw_urls {
                index.entry(raw_url.as_str()).or_default().push(repo);
            }
        }
        index
    }
}

fn parse_repo_config(
    name: &str,
    repo_dict: &ConfigDict,
    wanted_patterns: &[&str],
    parent_fetch_url: &str,
    parent_push_url: &str,
) -> Result<RepoConfig, ConfigError> {
    if name == TOP_REPO_NAME {
        return Err(ConfigError::ReservedName(name.to_string()));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(ConfigError::NestedName(name.to_string()));
    }

    let enabled = repo_is_wanted(name, wanted_patterns)?
        .ok_or_else(|| ConfigError::UndeterminedWanted(name.to_string()))?;

    let raw_urls: Vec<String> = repo_dict.get("urls").to_vec();
    if raw_urls.is_empty() {
        return Err(ConfigError::MissingUrls(name.to_string()));
    }

    let raw_fetch_url = match repo_dict.last("fetchurl") {
        Some(url) => url.to_string(),
        None => {
            let mut distinct: Vec<&str> = raw_urls.iter().map(String::as_str).collect();
            distinct.sort_unstable();
            distinct.dedup();
            if distinct.len() != 1 {
                return Err(ConfigError::AmbiguousFetchUrl(name.to_string()));
            }
            distinct[0].to_string()
        }
    };
    let fetch_url = toprepo_refspec::url::join(parent_fetch_url, &raw_fetch_url);

    let raw_push_url = repo_dict
        .last("pushurl")
        .map(str::to_string)
        .unwrap_or_else(|| raw_fetch_url.clone());
    let push_url = toprepo_refspec::url::join(parent_push_url, &raw_push_url);

    let fetch_args = {
        let configured = repo_dict.get("fetchargs");
        if configured.is_empty() {
            default_fetch_args()
        } else {
            configured.to_vec()
        }
    };

    Ok(RepoConfig {
        id: RepoId::new(name).map_err(|_| ConfigError::NestedName(name.to_string()))?,
        enabled,
        raw_urls,
        fetch_url,
        fetch_args,
        push_url,
    })
}

/// Resolve whether `name` is wanted by the role's `+pattern`/`-pattern`
/// list; later patterns override earlier ones when both match.
fn repo_is_wanted(name: &str, patterns: &[&str]) -> Result<Option<bool>, ConfigError> {
    let mut wanted = None;
    for pattern in patterns {
        let (sign, regex_src) = pattern.split_at(1);
        if sign != "+" && sign != "-" {
            return Err(ConfigError::BadWantedPattern {
                name: name.to_string(),
                pattern: pattern.to_string(),
            });
        }
        let regex = Regex::new(&format!("^(?:{regex_src})$")).map_err(|source| {
            ConfigError::BadWantedRegex {
                name: name.to_string(),
                regex: regex_src.to_string(),
                source,
            }
        })?;
        if regex.is_match(name) {
            wanted = Some(sign == "+");
        }
    }
    Ok(wanted)
}

/// Map a remote name or URL (as given to `git fetch <remote>` or found on
/// an incoming push) to the repo it refers to.
///
/// Mirrors the original implementation's progressively looser matching:
/// full value, then without a trailing `.git`, then without a URL scheme,
/// then without userinfo, then without the host. Ambiguous or unresolved
/// remotes return `None`.
type RemoteMatch<'a> = (&'a str, Option<&'a gitmodules::SubmoduleInfo>);
type RemoteIndex<'a> = HashMap<String, Vec<RemoteMatch<'a>>>;

/// Register `url` (and the looser forms of it: without `.git`, without a
/// scheme, without userinfo, without a host) as resolving to `entry`.
fn add_url<'a>(index: &mut RemoteIndex<'a>, url: &str, entry: RemoteMatch<'a>) {
    let mut insert = |key: String| {
        let bucket = index.entry(key).or_default();
        if !bucket.contains(&entry) {
            bucket.push(entry);
        }
    };
    insert(url.to_string());
    let no_git = url.strip_suffix(".git").unwrap_or(url).to_string();
    insert(no_git.clone());
    if let Some((_, rest)) = no_git.split_once("://") {
        insert(rest.to_string());
        if let Some((_, rest)) = rest.split_once('@') {
            insert(rest.to_string());
        }
        if rest.contains('/') && !rest.starts_with('.') {
            let (_, rest) = rest.split_once('/').unwrap();
            insert(rest.to_string());
        }
    }
}

pub fn remote_to_repo<'a>(
    remote: &str,
    modules: &'a gitmodules::GitModules,
    config: &'a Config,
) -> Option<(&'a str, Option<&'a gitmodules::SubmoduleInfo>)> {
    let mut index: RemoteIndex<'a> = HashMap::new();

    add_url(&mut index, "origin", (TOP_REPO_NAME, None));
    add_url(&mut index, ".", (TOP_REPO_NAME, None));
    add_url(&mut index, "", (TOP_REPO_NAME, None));
    add_url(&mut index, &config.top_fetch_url, (TOP_REPO_NAME, None));
    add_url(&mut index, &config.top_push_url, (TOP_REPO_NAME, None));

    let raw_index = config.raw_url_index();
    for module in modules.iter() {
        let Some(repos) = raw_index.get(module.raw_url.as_str()) else {
            continue;
        };
        for repo in repos {
            let entry = (repo.id.as_str(), Some(module));
            // The resolved URL (the raw, possibly-relative one joined
            // against the top repo's own URL), plus the raw URL itself.
            let resolved_url = toprepo_refspec::url::join(&config.top_fetch_url, &module.raw_url);
            add_url(&mut index, &resolved_url, entry);
            add_url(&mut index, &module.raw_url, entry);
            add_url(&mut index, &repo.fetch_url, entry);
            add_url(&mut index, &repo.push_url, entry);
            for raw_url in &repo.raw_urls {
                add_url(&mut index, raw_url, entry);
            }
            // The submodule's name and its mount path are also valid
            // `git fetch <remote>` targets, matched exactly (no loosening).
            let bucket = index.entry(module.name.clone()).or_default();
            if !bucket.contains(&entry) {
                bucket.push(entry);
            }
            let path_key = module.path.to_string_lossy().into_owned();
            let bucket = index.entry(path_key).or_default();
            if !bucket.contains(&entry) {
                bucket.push(entry);
            }
        }
    }

    let mut candidate = remote.trim_end_matches('/').to_string();
    candidate = candidate.strip_suffix(".git").unwrap_or(&candidate).to_string();

    let mut entries = index.get(&candidate);
    if entries.is_none() {
        if let Some((_, rest)) = candidate.split_once("://") {
            candidate = rest.to_string();
            entries = index.get(&candidate);
        }
    }
    if entries.is_none() {
        if let Some((_, rest)) = candidate.split_once('@') {
            candidate = rest.to_string();
            entries = index.get(&candidate);
        }
    }
    if entries.is_none() && candidate.contains('/') && !candidate.starts_with('.') {
        let (_, rest) = candidate.split_once('/').unwrap();
        candidate = rest.to_string();
        entries = index.get(&candidate);
    }

    match entries {
        Some(matches) if matches.len() == 1 => Some(matches[0]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict(text: &str) -> ConfigDict {
        ConfigDict::parse(text).unwrap()
    }

    #[test]
    fn build_requires_fetch_and_push_urls() {
        let cd = dict("toprepo.role=default\n");
        let err = Config::build(&cd, ledger::MissingCommits::new()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingFetchUrl));
    }

    #[test]
    fn build_resolves_one_repo_with_default_role() {
        let cd = dict(
            "remote.origin.url=https://example.com/top.git\n\
             remote.top.pushurl=ssh://example.com/top.git\n\
             toprepo.repo.lib.urls=../lib.git\n",
        );
        let config = Config::build(&cd, ledger::MissingCommits::new()).unwrap();
        assert_eq!(config.repos.len(), 1);
        let lib = &config.repos[0];
        assert_eq!(lib.id.as_str(), "lib");
        assert!(lib.enabled);
        assert_eq!(lib.fetch_url, "https://example.com/lib.git");
    }

    #[test]
    fn repo_named_like_the_top_sentinel_is_rejected() {
        let cd = dict(
            "remote.origin.url=u\n\
             remote.top.pushurl=u\n\
             toprepo.repo.top.urls=x\n",
        );
        assert!(matches!(
            Config::build(&cd, ledger::MissingCommits::new()),
            Err(ConfigError::ReservedName(_))
        ));
    }

    #[test]
    fn role_exclusion_pattern_disables_a_repo() {
        let cd = dict(
            "remote.origin.url=u\n\
             remote.top.pushurl=u\n\
             toprepo.role=restricted\n\
             toprepo.role.restricted.repos=+.*\n\
             toprepo.role.restricted.repos=-secret\n\
             toprepo.repo.secret.urls=x\n",
        );
        let config = Config::build(&cd, ledger::MissingCommits::new()).unwrap();
        assert!(!config.repos[0].enabled);
    }

    #[test]
    fn remote_to_repo_resolves_origin_to_the_top_repo() {
        let cd = dict(
            "remote.origin.url=https://example.com/top.git\n\
             remote.top.pushurl=https://example.com/top.git\n",
        );
        let config = Config::build(&cd, ledger::MissingCommits::new()).unwrap();
        let modules = gitmodules::GitModules::parse("");
        let (name, info) = remote_to_repo("origin", &modules, &config).unwrap();
        assert_eq!(name, TOP_REPO_NAME);
        assert!(info.is_none());
    }

    #[test]
    fn remote_to_repo_resolves_a_submodule_raw_url() {
        let cd = dict(
            "remote.origin.url=https://example.com/top.git\n\
             remote.top.pushurl=https://example.com/top.git\n\
             toprepo.repo.lib.urls=../lib.git\n",
        );
        let config = Config::build(&cd, ledger::MissingCommits::new()).unwrap();
        let modules = gitmodules::GitModules::parse(
            "[submodule \"lib\"]\n\tpath = vendor/lib\n\turl = ../lib.git\n",
        );
        let (name, info) = remote_to_repo("../lib.git", &modules, &config).unwrap();
        assert_eq!(name, "lib");
        assert!(info.is_some());
    }

    #[test]
    fn remote_to_repo_resolves_a_submodule_by_its_name_or_mount_path() {
        let cd = dict(
            "remote.origin.url=https://example.com/top.git\n\
             remote.top.pushurl=https://example.com/top.git\n\
             toprepo.repo.lib.urls=../lib.git\n",
        );
        let config = Config::build(&cd, ledger::MissingCommits::new()).unwrap();
        let modules = gitmodules::GitModules::parse(
            "[submodule \"lib\"]\n\tpath = vendor/lib\n\turl = ../lib.git\n",
        );

        let (name, info) = remote_to_repo("lib", &modules, &config).unwrap();
        assert_eq!(name, "lib");
        assert!(info.is_some());

        let (name, info) = remote_to_repo("vendor/lib", &modules, &config).unwrap();
        assert_eq!(name, "lib");
        assert!(info.is_some());
    }

    #[test]
    fn remote_to_repo_resolves_the_resolved_submodule_url() {
        let cd = dict(
            "remote.origin.url=https://example.com/group/top.git\n\
             remote.top.pushurl=https://example.com/group/top.git\n\
             toprepo.repo.lib.urls=../lib.git\n",
        );
        let config = Config::build(&cd, ledger::MissingCommits::new()).unwrap();
        let modules = gitmodules::GitModules::parse(
            "[submodule \"lib\"]\n\tpath = vendor/lib\n\turl = ../lib.git\n",
        );
        let (name, info) =
            remote_to_repo("https://example.com/lib.git", &modules, &config).unwrap();
        assert_eq!(name, "lib");
        assert!(info.is_some());
    }
}
