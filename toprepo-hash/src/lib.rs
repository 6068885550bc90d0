//! A [`Hash`] identifies a commit or tree object, independent of which
//! repository (top or subrepo) it lives in.
//!
//! It is never interpreted as anything but an opaque byte string outside of
//! user-facing output: see `spec.md` §3.

use std::{
    convert::TryFrom,
    fmt::{self, Display},
    ops::Deref,
    str::FromStr,
};

/// An opaque 20- or 32-byte object identifier.
///
/// Wraps [`git2::Oid`] the same way `radicle-git-ext::Oid` does, but keeps
/// its own name since this crate has no other dependency on `git2`'s object
/// model.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Hash(git2::Oid);

impl Deref for Hash {
    type Target = git2::Oid;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<git2::Oid> for Hash {
    fn as_ref(&self) -> &git2::Oid {
        &self.0
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl From<git2::Oid> for Hash {
    fn from(oid: git2::Oid) -> Self {
        Self(oid)
    }
}

impl From<Hash> for git2::Oid {
    fn from(hash: Hash) -> Self {
        hash.0
    }
}

impl Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ParseError(#[from] git2::Error);

impl TryFrom<&str> for Hash {
    type Error = ParseError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        s.parse().map(Self).map_err(ParseError)
    }
}

impl FromStr for Hash {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s)
    }
}

impl TryFrom<&[u8]> for Hash {
    type Error = ParseError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        git2::Oid::from_bytes(bytes)
            .map(Self)
            .map_err(ParseError)
    }
}

#[cfg(feature = "serde")]
mod serde_impls {
    use super::*;
    use serde::{de::Visitor, Deserialize, Deserializer, Serialize, Serializer};

    impl Serialize for Hash {
        fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            self.0.to_string().serialize(serializer)
        }
    }

    impl<'de> Deserialize<'de> for Hash {
        fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
        where
            D: Deserializer<'de>,
        {
            struct HashVisitor;

            impl<'de> Visitor<'de> for HashVisitor {
                type Value = Hash;

                fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                    write!(f, "a hexadecimal git object hash")
                }

                fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
                where
                    E: serde::de::Error,
                {
                    s.parse().map_err(serde::de::Error::custom)
                }
            }

            deserializer.deserialize_str(HashVisitor)
        }
    }
}

/// A local identifier for a repository (top or subrepo), unique within a
/// single translation run.
///
/// The name `top` is reserved for the top repository: see `spec.md` §3.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RepoId(String);

pub const TOP: &str = "top";

#[derive(Debug, thiserror::Error)]
pub enum RepoIdError {
    #[error("repository name must not contain a path separator: {0:?}")]
    PathSeparator(String),
    #[error("repository name must not be empty")]
    Empty,
}

impl RepoId {
    pub fn new(name: impl Into<String>) -> Result<Self, RepoIdError> {
        let name = name.into();
        if name.is_empty() {
            return Err(RepoIdError::Empty);
        }
        if name.contains('/') || name.contains('\\') {
            return Err(RepoIdError::PathSeparator(name));
        }
        Ok(Self(name))
    }

    /// The reserved identifier for the top repository.
    pub fn top() -> Self {
        Self(TOP.to_string())
    }

    pub fn is_top(&self) -> bool {
        self.0 == TOP
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RepoId {
    type Err = RepoIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}
