//! `git-toprepo config (--list | <key>) [--offline]`.

use toprepo_config::dict::ConfigDict;

use crate::{commands, error::CliError};

pub fn run(list: bool, key: Option<String>, offline: bool) -> Result<(), CliError> {
    let repo = commands::open_repo()?;
    let dict = commands::load_config_dict(&repo, offline)?;

    for line in format_lines(&dict, list, key.as_deref())? {
        println!("{line}");
    }
    Ok(())
}

/// The lines `run` prints, factored out so the formatting can be checked
/// without capturing stdout.
fn format_lines(dict: &ConfigDict, list: bool, key: Option<&str>) -> Result<Vec<String>, CliError> {
    if list {
        return Ok(dict
            .iter()
            .flat_map(|(key, values)| values.iter().map(move |value| format!("{key}={value}")))
            .collect());
    }

    let key = key.ok_or_else(|| {
        CliError::Usage("either --list or a config key must be given".to_string())
    })?;
    Ok(dict.get(key).to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_formats_every_key_value_pair() {
        let dict = ConfigDict::parse("toprepo.repo.lib.urls=../lib.git\n").unwrap();
        let lines = format_lines(&dict, true, None).unwrap();
        assert_eq!(lines, vec!["toprepo.repo.lib.urls=../lib.git".to_string()]);
    }

    #[test]
    fn a_single_key_prints_only_its_values() {
        let dict = ConfigDict::parse(
            "toprepo.repo.lib.urls=../lib.git\ntoprepo.repo.tools.urls=../tools.git\n",
        )
        .unwrap();
        let lines = format_lines(&dict, false, Some("toprepo.repo.lib.urls")).unwrap();
        assert_eq!(lines, vec!["../lib.git".to_string()]);
    }

    #[test]
    fn neither_list_nor_key_is_a_usage_error() {
        let dict = ConfigDict::parse("").unwrap();
        let err = format_lines(&dict, false, None).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
