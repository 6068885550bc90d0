//! Names for the handful of refs the persisted mono repository uses, per
//! `spec.md` §6's "Persisted state" list.

use toprepo_hash::RepoId;

/// Raw history of `repo_id`, as last fetched (`top` under this name too).
pub fn raw_history_ref(repo_id: &RepoId, branch: &str) -> String {
    format!("refs/repos/{repo_id}/{branch}")
}

/// Glob matching every raw top ref, for the Commit Graph Store.
pub fn raw_top_glob() -> String {
    format!("refs/repos/{}/*", RepoId::top())
}

pub fn raw_repo_glob(repo_id: &RepoId) -> String {
    format!("refs/repos/{repo_id}/*")
}

/// The translated mono branch a top branch of this name produces.
pub fn translated_ref(branch: &str) -> String {
    format!("refs/remotes/origin/{branch}")
}

pub fn translated_glob() -> &'static str {
    "refs/remotes/origin/*"
}

/// Where a repo's most recently prepared push is staged before `git push`.
pub fn push_staging_ref(repo_id: &RepoId) -> String {
    format!("refs/repos/{repo_id}/toprepo/push")
}

pub const FETCH_HEAD: &str = "refs/toprepo/fetch-head";

/// Strip the `refs/repos/<repo_id>/` prefix a raw-history ref carries, back
/// down to the branch name it mirrors from the source repo.
pub fn branch_of_raw_ref(repo_id: &RepoId, full_ref: &str) -> Option<String> {
    full_ref
        .strip_prefix(&format!("refs/repos/{repo_id}/"))
        .map(str::to_string)
}
