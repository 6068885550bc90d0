//! A `git config --list`-shaped multimap: each key can carry more than one
//! value, with "last value wins" as the convention for scalar options.

use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error)]
pub enum DictError {
    #[error("config line has no '=' separator: {0:?}")]
    MissingEquals(String),
    #[error("conflicting values for {key}: {values}")]
    Conflicting { key: String, values: String },
}

/// `key = [value, value, ...]`, built up from `git config --list` style
/// output (or any source producing the same `key=value` lines).
#[derive(Debug, Default, Clone)]
pub struct ConfigDict {
    entries: BTreeMap<String, Vec<String>>,
}

impl ConfigDict {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `key=value` lines, one config entry per line.
    pub fn parse(lines: &str) -> Result<Self, DictError> {
        let mut dict = Self::new();
        for line in lines.lines() {
            if line.is_empty() {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| DictError::MissingEquals(line.to_string()))?;
            dict.entries
                .entry(key.to_string())
                .or_default()
                .push(value.to_string());
        }
        Ok(dict)
    }

    /// Concatenate several dicts, earlier ones overriding later ones when
    /// read through [`Self::get_singleton`] (mirrors `ConfigDict.join`,
    /// which keeps the first loaded source authoritative).
    pub fn join<I: IntoIterator<Item = ConfigDict>>(dicts: I) -> Self {
        let mut merged = Self::new();
        for dict in dicts {
            for (key, values) in dict.entries {
                merged.entries.entry(key).or_default().extend(values);
            }
        }
        merged
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.entry(key.into()).or_default().push(value.into());
    }

    pub fn get(&self, key: &str) -> &[String] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The last value recorded for `key`, Git's convention for scalar
    /// options where several lines set the same key.
    pub fn last(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(|v| v.last()).map(String::as_str)
    }

    /// Like [`Self::last`], erroring if more than one distinct value was
    /// recorded (used where silently preferring the last value would hide
    /// an ambiguous configuration).
    pub fn get_singleton<'a>(&'a self, key: &str, default: Option<&'a str>) -> Result<Option<&'a str>, DictError> {
        let values = self.entries.get(key).map(Vec::as_slice).unwrap_or(&[]);
        if values.is_empty() {
            return Ok(default);
        }
        let mut distinct: Vec<&str> = values.iter().map(String::as_str).collect();
        distinct.sort_unstable();
        distinct.dedup();
        if distinct.len() != 1 {
            return Err(DictError::Conflicting {
                key: key.to_string(),
                values: distinct.join(", "),
            });
        }
        Ok(Some(distinct[0]))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Extract `<prefix>.<name>.<subkey> = value` entries into one
    /// [`ConfigDict`] per `name`, keyed by `subkey`.
    ///
    /// `prefix` must not include a trailing dot.
    pub fn extract_mapping(&self, prefix: &str) -> BTreeMap<String, ConfigDict> {
        debug_assert!(!prefix.ends_with('.'));
        let prefix_dot = format!("{prefix}.");
        let mut out: BTreeMap<String, ConfigDict> = BTreeMap::new();
        for (key, values) in &self.entries {
            let Some(rest) = key.strip_prefix(&prefix_dot) else {
                continue;
            };
            let Some((name, subkey)) = rest.split_once('.') else {
                continue;
            };
            let sub = out.entry(name.to_string()).or_default();
            sub.entries
                .entry(subkey.to_string())
                .or_default()
                .extend(values.iter().cloned());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_key_and_value_on_first_equals() {
        let dict = ConfigDict::parse("remote.origin.url=https://example.com/a=b.git\n").unwrap();
        assert_eq!(
            dict.last("remote.origin.url"),
            Some("https://example.com/a=b.git")
        );
    }

    #[test]
    fn join_keeps_all_values_with_first_source_first() {
        let a = ConfigDict::parse("toprepo.role=custom\n").unwrap();
        let b = ConfigDict::parse("toprepo.role=default\n").unwrap();
        let joined = ConfigDict::join([a, b]);
        assert_eq!(joined.get("toprepo.role"), &["custom", "default"]);
    }

    #[test]
    fn get_singleton_errors_on_conflicting_values() {
        let dict = ConfigDict::parse("remote.origin.url=a\nremote.origin.url=b\n").unwrap();
        assert!(matches!(
            dict.get_singleton("remote.origin.url", None),
            Err(DictError::Conflicting { .. })
        ));
    }

    #[test]
    fn extract_mapping_groups_by_middle_segment() {
        let dict = ConfigDict::parse(
            "toprepo.repo.lib.urls=../lib.git\ntoprepo.repo.lib.fetchArgs=--depth=1\n",
        )
        .unwrap();
        let mapping = dict.extract_mapping("toprepo.repo");
        let lib = &mapping["lib"];
        assert_eq!(lib.last("urls"), Some("../lib.git"));
        assert_eq!(lib.last("fetchArgs"), Some("--depth=1"));
    }
}
