//! Relative submodule URL resolution.
//!
//! `.gitmodules` entries may be relative to the URL of the repository that
//! contains them (`./other`, `../sibling`, or just `.`). `join` resolves
//! such a raw URL against its parent, following `spec.md` §6's rule: a
//! raw URL starting with `./`, `../`, or equal to `.` is resolved against
//! the parent, respecting the `scheme://` prefix; excess `../` past the
//! host collapses to literal `..` segments rather than erroring.

/// Join a (possibly relative) submodule URL `other` against the URL of its
/// containing repository, `parent`.
///
/// Absolute URLs (anything not starting with `./`, `../`, or equal to `.`)
/// pass through unchanged, per Testable Property 3 in `spec.md` §8.
pub fn join(parent: &str, other: &str) -> String {
    if !(other.starts_with("./") || other.starts_with("../") || other == ".") {
        return other.to_string();
    }

    let scheme_end = match parent.find("://") {
        Some(idx) => idx + 3,
        None => 0,
    };
    let scheme = &parent[..scheme_end];
    let mut parent = parent[scheme_end..].trim_end_matches('/').to_string();
    let mut other = other;

    loop {
        if let Some(rest) = other.strip_prefix('/') {
            // Ignore a double slash.
            other = rest;
        } else if let Some(rest) = other.strip_prefix("./") {
            other = rest;
        } else if let Some(rest) = other.strip_prefix("../") {
            match parent.rfind('/') {
                Some(idx) => parent.truncate(idx),
                None => parent.push_str("/.."),
            }
            other = rest;
        } else {
            break;
        }
    }

    if other.is_empty() || other == "." {
        format!("{scheme}{parent}")
    } else {
        format!("{scheme}{parent}/{other}")
    }
}

/// Normalise a URL for comparison: strip a trailing `.git` and a trailing
/// `/`, as `spec.md` §6 requires.
pub fn normalize(url: &str) -> &str {
    let url = url.strip_suffix('/').unwrap_or(url);
    url.strip_suffix(".git").unwrap_or(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dot_slash_appends_to_parent() {
        assert_eq!(join("https://h/o/r", "./f"), "https://h/o/r/f");
    }

    #[test]
    fn dot_dot_slash_pops_one_segment() {
        assert_eq!(join("https://h/o/r", "../f"), "https://h/o/f");
    }

    #[test]
    fn excess_dot_dot_collapses_to_literal_dot_dot() {
        assert_eq!(join("https://h/o/r", "../../../f"), "https://h/../f");
    }

    #[test]
    fn absolute_url_passes_through() {
        assert_eq!(join("https://h/o/r", "git://other/repo"), "git://other/repo");
        assert_eq!(
            join("https://h/o/r", "ssh://git@other/repo.git"),
            "ssh://git@other/repo.git"
        );
    }

    #[test]
    fn bare_dot_resolves_to_parent_itself() {
        assert_eq!(join("https://h/o/r", "."), "https://h/o/r");
    }

    #[test]
    fn schemeless_parent_is_handled() {
        assert_eq!(join("/srv/git/o/r", "../f"), "/srv/git/o/f");
    }

    #[test]
    fn normalize_strips_trailing_git_and_slash() {
        assert_eq!(normalize("https://h/r.git"), "https://h/r");
        assert_eq!(normalize("https://h/r/"), "https://h/r");
        assert_eq!(normalize("https://h/r.git/"), "https://h/r");
    }

    proptest::proptest! {
        /// Testable Property 3 ("URL join"), checked for arbitrary absolute
        /// URLs rather than the handful of literal cases above: any `other`
        /// that doesn't start with `./`/`../`/`.` passes through unchanged,
        /// no matter what `parent` is.
        #[test]
        fn absolute_urls_always_pass_through(
            parent in "[a-z]{1,8}://[a-z./]{0,16}",
            other in "[a-z]{1,8}://[a-z0-9./-]{0,16}",
        ) {
            proptest::prop_assert_eq!(join(&parent, &other), other);
        }

        /// `join` never panics on an arbitrary relative URL, however many
        /// `../` segments it carries relative to the parent's own depth.
        #[test]
        fn relative_join_never_panics(
            parent in "[a-z]{1,8}://[a-z]{1,6}(/[a-z]{1,6}){0,4}",
            dotdots in 0usize..8,
            leaf in "[a-z0-9]{1,6}",
        ) {
            let other = format!("{}{leaf}", "../".repeat(dotdots));
            let _ = join(&parent, &other);
        }
    }
}
