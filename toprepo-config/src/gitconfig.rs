//! A minimal git-config-format text parser.
//!
//! Used to turn the raw bytes read back from a blob (`toprepo.config.<id>`
//! files, fetched config refs) into a [`ConfigDict`], the same shape
//! `LocalGitConfigLoader`'s `git config --list` output produces. Only the
//! subset of the format toprepo's own config files use is supported:
//! `[section]` / `[section "subsection"]` headers and `key = value` lines.
//! Line continuations and quoted values with escapes are not handled, since
//! toprepo never writes config that needs them.

use crate::dict::ConfigDict;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("malformed section header: {0:?}")]
    BadSectionHeader(String),
    #[error("key=value line outside of any section: {0:?}")]
    KeyOutsideSection(String),
}

pub fn parse(text: &str) -> Result<ConfigDict, ParseError> {
    let mut dict = ConfigDict::new();
    let mut section: Option<String> = None;

    for raw_line in text.lines() {
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }
        if let Some(header) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            section = Some(parse_section_header(header)?);
            continue;
        }
        let Some(current_section) = &section else {
            return Err(ParseError::KeyOutsideSection(line.to_string()));
        };
        let (key, value) = match line.split_once('=') {
            Some((k, v)) => (k.trim(), v.trim()),
            // A bare key is a boolean `true`, per git-config(5).
            None => (line, "true"),
        };
        let value = value.trim_matches('"');
        dict.insert(format!("{current_section}.{}", key.to_lowercase()), value);
    }

    Ok(dict)
}

fn parse_section_header(header: &str) -> Result<String, ParseError> {
    match header.split_once(char::is_whitespace) {
        Some((name, rest)) => {
            let subsection = rest.trim();
            let subsection = subsection
                .strip_prefix('"')
                .and_then(|s| s.strip_suffix('"'))
                .ok_or_else(|| ParseError::BadSectionHeader(header.to_string()))?;
            Ok(format!("{}.{}", name.to_lowercase(), subsection))
        }
        None => Ok(header.to_lowercase()),
    }
}

fn strip_comment(line: &str) -> &str {
    for (idx, ch) in line.char_indices() {
        if ch == '#' || ch == ';' {
            return &line[..idx];
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_section() {
        let dict = parse("[remote \"origin\"]\n\turl = https://example.com/repo.git\n").unwrap();
        assert_eq!(
            dict.last("remote.origin.url"),
            Some("https://example.com/repo.git")
        );
    }

    #[test]
    fn preserves_subsection_case_but_lowercases_section_and_key() {
        let dict = parse("[Submodule \"Lib\"]\n\tPath = lib\n").unwrap();
        assert_eq!(dict.last("submodule.Lib.path"), Some("lib"));
    }

    #[test]
    fn bare_key_is_boolean_true() {
        let dict = parse("[toprepo.config.default]\n\tpartial\n").unwrap();
        assert_eq!(dict.last("toprepo.config.default.partial"), Some("true"));
    }

    #[test]
    fn ignores_comment_lines() {
        let dict = parse("# comment\n[a]\n\tb = c ; trailing comment\n").unwrap();
        assert_eq!(dict.last("a.b"), Some("c"));
    }
}
