//! The `^-- <subdir> <hash>` provenance footer that every translated mono
//! commit carries, and the sibling `Topic: <value>` trailer the splitter
//! reads back out.
//!
//! This plays the role `radicle-git-ext::commit::trailers` plays for
//! standard Git trailers, except the footer format here (`^-- subdir hash`)
//! is not a colon-delimited trailer, so it is parsed with a dedicated
//! regular expression rather than `git2::message_trailers_strs`.

use std::{collections::HashMap, sync::OnceLock};

use regex::Regex;
use toprepo_hash::Hash;

/// The sentinel subdir name denoting the top repository itself.
pub const TOP: &str = "<top>";

/// Append a `^-- <subdir> <hash>` footer to `message`.
///
/// Ensures a blank line separates the subject from the body first, so the
/// footer never folds into the subject in `git log --oneline` output.
pub fn annotate(message: &str, subdir: &str, hash: Hash) -> String {
    let mut out = message.trim_end_matches('\n').to_string();
    out.push('\n');
    if !out.contains("\n\n") {
        out.push('\n');
    }
    out.push_str(&format!("^-- {subdir} {hash}\n"));
    out
}

fn footer_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\^-- (\S+) ([0-9a-fA-F]+)$").unwrap())
}

fn topic_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^Topic: (.+)$").unwrap())
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("multiple '^-- {0} <hash>' footers found for the same subdir")]
    DuplicateFooter(String),
    #[error("invalid hash in footer for {subdir:?}")]
    InvalidHash {
        subdir: String,
        #[source]
        source: toprepo_hash::ParseError,
    },
    #[error("multiple 'Topic: <value>' trailers found")]
    MultipleTopics,
}

/// The set of provenance footers found in a translated commit message.
#[derive(Debug, Default, Clone)]
pub struct Footers {
    by_subdir: HashMap<String, Hash>,
}

impl Footers {
    /// Parse every `^-- <subdir> <hash>` footer out of `message`.
    ///
    /// Exactly zero or one footer is allowed per subdir; a second footer for
    /// a subdir already seen is an error, per `spec.md` §8, Property 1.
    pub fn parse(message: &str) -> Result<Self, ParseError> {
        let mut by_subdir = HashMap::new();
        for caps in footer_regex().captures_iter(message) {
            let subdir = caps[1].to_string();
            if by_subdir.contains_key(&subdir) {
                return Err(ParseError::DuplicateFooter(subdir));
            }
            let hash: Hash =
                caps[2]
                    .parse()
                    .map_err(|source| ParseError::InvalidHash {
                        subdir: subdir.clone(),
                        source,
                    })?;
            by_subdir.insert(subdir, hash);
        }
        Ok(Self { by_subdir })
    }

    /// The hash recorded for `subdir`, if any.
    pub fn get(&self, subdir: &str) -> Option<Hash> {
        self.by_subdir.get(subdir).copied()
    }

    /// The hash of the top-repository commit this mono commit was produced
    /// from, i.e. the footer tagged with the [`TOP`] sentinel.
    pub fn top(&self) -> Option<Hash> {
        self.get(TOP)
    }

    pub fn subdirs(&self) -> impl Iterator<Item = &str> {
        self.by_subdir.keys().map(String::as_str)
    }
}

/// Extract the `Topic: <value>` trailer, if present.
///
/// More than one `Topic:` line is an error (`spec.md` §4.2).
pub fn topic(message: &str) -> Result<Option<String>, ParseError> {
    let mut matches = topic_regex().captures_iter(message);
    let first = matches.next();
    if matches.next().is_some() {
        return Err(ParseError::MultipleTopics);
    }
    Ok(first.map(|caps| caps[1].to_string()))
}

/// The boilerplate subject the top repository uses for an automated
/// submodule-pointer bump; messages with this subject are sunk to the
/// bottom when merging, see `spec.md` §4.2.
const BORING_BUMP_SUBJECT: &str = "Update git submodules\n\n";

/// Merge the annotated messages collected while translating one top commit
/// (its own message plus one per newly injected submodule commit).
///
/// Boilerplate `Update git submodules` messages sink to the bottom so the
/// most informative message becomes the subject in `git log` output.
pub fn merge_messages<I>(messages: I) -> String
where
    I: IntoIterator<Item = String>,
{
    let mut top = Vec::new();
    let mut bottom = Vec::new();
    for message in messages {
        if message.starts_with(BORING_BUMP_SUBJECT) {
            bottom.push(message);
        } else {
            top.push(message);
        }
    }
    top.into_iter().chain(bottom).collect()
}

#[derive(Debug, thiserror::Error)]
#[error("commit message still contains a '^-- ' footer after trimming the most recent one; refusing to push a cherry-picked commit")]
pub struct ResidueError;

/// Strip the most recent `^-- ` footer line before pushing a mono commit
/// back out as a subrepo commit.
///
/// If another `^-- ` line remains afterwards, the commit looks like it was
/// already cherry-picked from upstream and pushing it would duplicate
/// history; refuse with [`ResidueError`] (`spec.md` §7, "Cherry-pick
/// residue").
pub fn strip_for_push(message: &str) -> Result<String, ResidueError> {
    let mut trimmed = message.to_string();
    if let Some(idx) = trimmed.rfind("\n^-- ") {
        trimmed.truncate(idx + 1);
    }
    if trimmed.contains("\n^-- ") {
        return Err(ResidueError);
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(n: u8) -> Hash {
        let bytes = [n; 20];
        git2::Oid::from_bytes(&bytes).unwrap().into()
    }

    #[test]
    fn annotate_adds_blank_line_for_subject_only_message() {
        let out = annotate("Subject", "lib", hash(1));
        assert!(out.contains("Subject\n\n^-- lib "));
    }

    #[test]
    fn annotate_roundtrips_through_parse() {
        let h = hash(2);
        let msg = annotate("Subject\n\nBody text.", "lib", h);
        let footers = Footers::parse(&msg).unwrap();
        assert_eq!(footers.get("lib"), Some(h));
    }

    #[test]
    fn duplicate_footer_for_same_subdir_is_an_error() {
        let msg = format!("Subject\n\n^-- lib {}\n^-- lib {}\n", hash(1), hash(2));
        assert!(matches!(
            Footers::parse(&msg),
            Err(ParseError::DuplicateFooter(subdir)) if subdir == "lib"
        ));
    }

    #[test]
    fn footers_for_distinct_subdirs_coexist() {
        let msg = format!(
            "Subject\n\n^-- {} {}\n^-- lib {}\n",
            TOP,
            hash(1),
            hash(2)
        );
        let footers = Footers::parse(&msg).unwrap();
        assert_eq!(footers.top(), Some(hash(1)));
        assert_eq!(footers.get("lib"), Some(hash(2)));
    }

    #[test]
    fn topic_is_optional_and_unique() {
        assert_eq!(topic("Subject\n\nBody").unwrap(), None);
        assert_eq!(
            topic("Subject\n\nTopic: feature/foo\n").unwrap(),
            Some("feature/foo".to_string())
        );
        assert!(matches!(
            topic("Subject\n\nTopic: a\nTopic: b\n"),
            Err(ParseError::MultipleTopics)
        ));
    }

    #[test]
    fn merge_messages_sinks_boring_bump_subject_to_the_bottom() {
        let merged = merge_messages(vec![
            "Update git submodules\n\nBump things.\n".to_string(),
            "Fix the actual bug\n\nDetails.\n".to_string(),
        ]);
        assert!(merged.starts_with("Fix the actual bug"));
        assert!(merged.ends_with("Bump things.\n"));
    }

    #[test]
    fn strip_for_push_removes_a_single_trailing_footer() {
        let msg = format!("Subject\n\nBody\n\n^-- {} {}\n", TOP, hash(3));
        let stripped = strip_for_push(&msg).unwrap();
        assert!(!stripped.contains("^-- "));
    }

    #[test]
    fn strip_for_push_rejects_residue_from_a_cherry_pick() {
        let msg = format!(
            "Subject\n\n^-- lib {}\n^-- {} {}\n",
            hash(1),
            TOP,
            hash(2)
        );
        assert!(matches!(strip_for_push(&msg), Err(ResidueError)));
    }

    proptest::proptest! {
        /// Testable Property 1 ("round-trip of annotation"): for any
        /// message/subdir/hash triple, parsing the footer of
        /// `annotate(msg, subdir, hash)` yields exactly `hash` back.
        #[test]
        fn annotate_parse_roundtrips_for_arbitrary_inputs(
            subject in "[A-Za-z0-9 ]{1,40}",
            subdir in "[a-z][a-z0-9/_-]{0,20}",
            hash_byte in 1u8..=255,
        ) {
            let h = hash(hash_byte);
            let annotated = annotate(&subject, &subdir, h);
            let footers = Footers::parse(&annotated).unwrap();
            proptest::prop_assert_eq!(footers.get(&subdir), Some(h));
        }
    }
}
