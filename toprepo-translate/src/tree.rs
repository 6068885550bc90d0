//! Tree surgery: replacing a gitlink entry with a mounted subdirectory tree,
//! the operation underlying Testable Property 4 (tree equivalence).
//!
//! `git2::TreeBuilder` only edits one tree level at a time, so mounting a
//! tree several path components deep means rebuilding every tree along that
//! path, innermost first, the same bottom-up way `git mktree`-based
//! porcelain tooling does it.

use std::path::{Component, Path};

/// A directory entry's mode, for mounting a subrepo tree under a subdir.
pub const TREE_MODE: i32 = 0o040000;
/// A gitlink (submodule pointer) entry's mode.
pub const GITLINK_MODE: i32 = 0o160000;

/// Return a copy of `base` with `path` set to point at `target` (a tree or
/// blob object, `mode` given explicitly since gitlinks use `160000` rather
/// than a regular directory's `040000`).
///
/// Any existing entry at `path` is replaced wholesale, including everything
/// nested under it if it was previously a directory.
pub fn set_path(
    repo: &git2::Repository,
    base: &git2::Tree,
    path: &Path,
    target: git2::Oid,
    mode: i32,
) -> Result<git2::Oid, git2::Error> {
    set_path_opt(repo, Some(base), path, target, mode)
}

/// Like [`set_path`], but `base` may be absent (an empty starting tree),
/// for mounting a subrepo commit's tree as the first mono commit on a
/// branch, where there is no prior tree to start from.
pub fn set_path_opt(
    repo: &git2::Repository,
    base: Option<&git2::Tree>,
    path: &Path,
    target: git2::Oid,
    mode: i32,
) -> Result<git2::Oid, git2::Error> {
    let mut components: Vec<&str> = path
        .components()
        .map(|c| match c {
            Component::Normal(s) => s.to_str().expect("non-UTF-8 path component"),
            other => panic!("unexpected path component: {other:?}"),
        })
        .collect();
    let leaf = components.pop().expect("empty path");
    set_path_rec(repo, base, &components, leaf, target, mode)
}

fn set_path_rec(
    repo: &git2::Repository,
    current: Option<&git2::Tree>,
    dirs: &[&str],
    leaf: &str,
    target: git2::Oid,
    mode: i32,
) -> Result<git2::Oid, git2::Error> {
    match dirs.split_first() {
        None => {
            let mut builder = repo.treebuilder(current)?;
            builder.insert(leaf, target, mode)?;
            builder.write()
        }
        Some((dir, rest)) => {
            let child_tree = current
                .and_then(|t| t.get_name(dir))
                .and_then(|entry| entry.to_object(repo).ok())
                .and_then(|obj| obj.peel_to_tree().ok());
            let new_child = set_path_rec(repo, child_tree.as_ref(), rest, leaf, target, mode)?;
            let mut builder = repo.treebuilder(current)?;
            builder.insert(dir, new_child, git2::FileMode::Tree.into())?;
            builder.write()
        }
    }
}

/// Remove `path` from `base` entirely, if present. Used when a pin becomes
/// unresolvable and the gitlink cannot be replaced with a mounted tree, nor
/// sensibly left in place.
pub fn remove_path(
    repo: &git2::Repository,
    base: &git2::Tree,
    path: &Path,
) -> Result<git2::Oid, git2::Error> {
    let mut components: Vec<&str> = path
        .components()
        .map(|c| match c {
            Component::Normal(s) => s.to_str().expect("non-UTF-8 path component"),
            other => panic!("unexpected path component: {other:?}"),
        })
        .collect();
    let leaf = components.pop().expect("empty path");
    remove_path_rec(repo, base, &components, leaf)
}

fn remove_path_rec(
    repo: &git2::Repository,
    current: &git2::Tree,
    dirs: &[&str],
    leaf: &str,
) -> Result<git2::Oid, git2::Error> {
    match dirs.split_first() {
        None => {
            let mut builder = repo.treebuilder(Some(current))?;
            builder.remove(leaf)?;
            builder.write()
        }
        Some((dir, rest)) => {
            let Some(entry) = current.get_name(dir) else {
                return Ok(current.id());
            };
            let child_tree = entry.to_object(repo)?.peel_to_tree()?;
            let new_child = remove_path_rec(repo, &child_tree, rest, leaf)?;
            let mut builder = repo.treebuilder(Some(current))?;
            builder.insert(dir, new_child, git2::FileMode::Tree.into())?;
            builder.write()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn empty_blob(repo: &git2::Repository) -> git2::Oid {
        repo.blob(b"contents").unwrap()
    }

    #[test]
    fn set_path_mounts_a_tree_under_a_nested_subdir() {
        let dir = tempfile::tempdir().unwrap();
        let repo = git2::Repository::init_bare(dir.path()).unwrap();

        let base_blob = empty_blob(&repo);
        let mut root_builder = repo.treebuilder(None).unwrap();
        root_builder
            .insert("README", base_blob, git2::FileMode::Blob.into())
            .unwrap();
        let base_tree_id = root_builder.write().unwrap();
        let base_tree = repo.find_tree(base_tree_id).unwrap();

        let mut sub_builder = repo.treebuilder(None).unwrap();
        sub_builder
            .insert("x.c", base_blob, git2::FileMode::Blob.into())
            .unwrap();
        let sub_tree_id = sub_builder.write().unwrap();

        let new_root = set_path(
            &repo,
            &base_tree,
            &PathBuf::from("lib"),
            sub_tree_id,
            git2::FileMode::Tree.into(),
        )
        .unwrap();

        let new_tree = repo.find_tree(new_root).unwrap();
        assert!(new_tree.get_name("README").is_some());
        let lib_entry = new_tree.get_name("lib").unwrap();
        let lib_tree = lib_entry.to_object(&repo).unwrap().peel_to_tree().unwrap();
        assert!(lib_tree.get_name("x.c").is_some());
    }

    #[test]
    fn set_path_replaces_an_existing_gitlink() {
        let dir = tempfile::tempdir().unwrap();
        let repo = git2::Repository::init_bare(dir.path()).unwrap();

        let gitlink_oid = git2::Oid::from_bytes(&[3; 20]).unwrap();
        let mut root_builder = repo.treebuilder(None).unwrap();
        root_builder
            .insert("lib", gitlink_oid, git2::FileMode::Commit.into())
            .unwrap();
        let base_tree_id = root_builder.write().unwrap();
        let base_tree = repo.find_tree(base_tree_id).unwrap();

        let sub_tree_id = repo.treebuilder(None).unwrap().write().unwrap();
        let new_root = set_path(
            &repo,
            &base_tree,
            &PathBuf::from("lib"),
            sub_tree_id,
            git2::FileMode::Tree.into(),
        )
        .unwrap();

        let new_tree = repo.find_tree(new_root).unwrap();
        let entry = new_tree.get_name("lib").unwrap();
        assert_eq!(entry.filemode(), i32::from(git2::FileMode::Tree));
    }
}
