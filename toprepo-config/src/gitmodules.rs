//! The **Submodule Config Cache**: parsed `.gitmodules` blobs, memoised by
//! tree hash along first-parent history so an unchanged `.gitmodules` is
//! only parsed once.

use std::{collections::HashMap, path::PathBuf, rc::Rc};

use ini::Ini;
use toprepo_hash::Hash;

/// A malformed `.gitmodules` stanza, reported as a warning rather than
/// aborting the whole blob (`spec.md` §4.1, §7: "malformed entries are
/// reported and the offending subdir is skipped with a warning, not
/// fatal").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StanzaError {
    pub subdir: String,
    pub reason: String,
}

/// One `[submodule "name"]` stanza.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmoduleInfo {
    pub name: String,
    pub path: PathBuf,
    pub branch: Option<String>,
    /// The URL exactly as written in `.gitmodules` — possibly relative.
    pub raw_url: String,
}

/// The full set of submodules declared by one `.gitmodules` blob.
#[derive(Debug, Default, Clone)]
pub struct GitModules {
    by_path: HashMap<PathBuf, SubmoduleInfo>,
    /// Stanzas that couldn't be parsed; the rest of the blob is unaffected.
    pub errors: Vec<StanzaError>,
}

impl GitModules {
    /// Parse every `[submodule "name"]` stanza in `content`.
    ///
    /// A single bad stanza (missing `path`/`url`, a duplicate `path`, or an
    /// outright unparseable blob) never drops the other, otherwise valid,
    /// submodules: the offending stanza is recorded in [`GitModules::errors`]
    /// and skipped.
    pub fn parse(content: &str) -> Self {
        let mut by_path = HashMap::new();
        let mut errors = Vec::new();

        let ini = match Ini::load_from_str(content) {
            Ok(ini) => ini,
            Err(err) => {
                errors.push(StanzaError {
                    subdir: String::new(),
                    reason: err.to_string(),
                });
                return Self { by_path, errors };
            }
        };

        for (section, properties) in ini.iter() {
            let Some(section) = section else { continue };
            let Some(name) = section.strip_prefix("submodule \"").and_then(|s| s.strip_suffix('"'))
            else {
                continue;
            };

            let path = match properties.get("path") {
                Some(path) => path,
                None => {
                    errors.push(StanzaError {
                        subdir: name.to_string(),
                        reason: "no 'path' key".to_string(),
                    });
                    continue;
                }
            };
            let raw_url = match properties.get("url") {
                Some(url) => url,
                None => {
                    errors.push(StanzaError {
                        subdir: name.to_string(),
                        reason: "no 'url' key".to_string(),
                    });
                    continue;
                }
            };

            let info = SubmoduleInfo {
                name: name.to_string(),
                path: PathBuf::from(path),
                branch: properties.get("branch").map(str::to_string),
                raw_url: raw_url.to_string(),
            };
            if by_path.contains_key(&info.path) {
                errors.push(StanzaError {
                    subdir: name.to_string(),
                    reason: format!("duplicate submodule config for path {path:?}"),
                });
                continue;
            }
            by_path.insert(info.path.clone(), info);
        }

        Self { by_path, errors }
    }

    pub fn get(&self, path: &std::path::Path) -> Option<&SubmoduleInfo> {
        self.by_path.get(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SubmoduleInfo> {
        self.by_path.values()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }
}

/// Memoises [`GitModules`] by the hash of the `.gitmodules` blob.
///
/// Commits that keep the same `.gitmodules` content (the common case along
/// a first-parent chain) share one `Rc<GitModules>` instead of re-parsing
/// or deep-copying it.
#[derive(Debug, Default)]
pub struct Cache {
    by_blob: HashMap<Hash, Rc<GitModules>>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached [`GitModules`] for `blob_hash`, parsing and
    /// caching `content` if this is the first time this blob is seen.
    ///
    /// Never fails: malformed stanzas end up in the returned value's
    /// [`GitModules::errors`] instead of aborting the parse.
    pub fn get_or_parse(&mut self, blob_hash: Hash, content: &str) -> Rc<GitModules> {
        if let Some(cached) = self.by_blob.get(&blob_hash) {
            return Rc::clone(cached);
        }
        let parsed = Rc::new(GitModules::parse(content));
        self.by_blob.insert(blob_hash, Rc::clone(&parsed));
        parsed
    }

    pub fn len(&self) -> usize {
        self.by_blob.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_blob.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[submodule "lib"]
    path = vendor/lib
    url = ../lib.git
    branch = main

[submodule "tools"]
    path = vendor/tools
    url = https://example.com/tools.git
"#;

    #[test]
    fn parses_every_submodule_stanza() {
        let modules = GitModules::parse(SAMPLE);
        assert!(modules.errors.is_empty());
        let lib = modules.get(std::path::Path::new("vendor/lib")).unwrap();
        assert_eq!(lib.raw_url, "../lib.git");
        assert_eq!(lib.branch.as_deref(), Some("main"));

        let tools = modules.get(std::path::Path::new("vendor/tools")).unwrap();
        assert_eq!(tools.raw_url, "https://example.com/tools.git");
    }

    #[test]
    fn cache_shares_rc_for_the_same_blob_hash() {
        let mut cache = Cache::new();
        let hash: Hash = git2::Oid::from_bytes(&[7; 20]).unwrap().into();
        let first = cache.get_or_parse(hash, SAMPLE);
        let second = cache.get_or_parse(hash, SAMPLE);
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn a_malformed_stanza_is_skipped_without_losing_its_siblings() {
        let content = r#"
[submodule "broken"]
    url = broken.git

[submodule "lib"]
    path = vendor/lib
    url = ../lib.git
"#;
        let modules = GitModules::parse(content);
        assert_eq!(modules.errors, vec![StanzaError {
            subdir: "broken".to_string(),
            reason: "no 'path' key".to_string(),
        }]);
        assert!(modules.get(std::path::Path::new("vendor/lib")).is_some());
    }

    #[test]
    fn duplicate_path_keeps_the_first_stanza_and_warns_about_the_second() {
        let content = r#"
[submodule "a"]
    path = same
    url = a.git
[submodule "b"]
    path = same
    url = b.git
"#;
        let modules = GitModules::parse(content);
        assert_eq!(modules.errors.len(), 1);
        assert_eq!(modules.errors[0].subdir, "b");
        let kept = modules.get(std::path::Path::new("same")).unwrap();
        assert_eq!(kept.name, "a");
    }
}
