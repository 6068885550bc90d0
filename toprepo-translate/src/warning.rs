//! Non-fatal conditions surfaced alongside a successful expand/split result,
//! per `spec.md` §7 ("Propagation").

use toprepo_hash::Hash;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// A `.gitmodules` URL did not match any configured repo. Carries a
    /// ready-to-paste `[toprepo.repo "<name>"]` stanza, the way the
    /// original tool prints one on stderr.
    UnknownUrl { raw_url: String, suggested_stanza: String },
    /// A commit declared missing in the ledger was actually found.
    OverspecifiedMissingCommit { raw_url: String, hash: Hash },
    /// A `.gitmodules` entry could not be parsed; the subdir is skipped.
    InvalidGitModulesEntry { subdir: String, reason: String },
}

/// Build the `[toprepo.repo "<name>"]` stanza suggested for an unresolved
/// `.gitmodules` URL, using the URL's last path segment (minus `.git`) as a
/// guessed repo name.
pub fn suggest_repo_stanza(raw_url: &str) -> String {
    let trimmed = raw_url.trim_end_matches('/').trim_end_matches(".git");
    let guessed_name = trimmed.rsplit('/').next().unwrap_or(trimmed);
    format!(
        "[toprepo.repo \"{guessed_name}\"]\n\turls = {raw_url}\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggested_stanza_uses_the_last_path_segment_as_the_name() {
        let stanza = suggest_repo_stanza("../vendor/acme-lib.git");
        assert!(stanza.contains("[toprepo.repo \"acme-lib\"]"));
        assert!(stanza.contains("urls = ../vendor/acme-lib.git"));
    }
}
