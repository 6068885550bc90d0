//! Author/committer metadata, generalized from `radicle-git-ext::author` so
//! it can be attached to commits from any repository (top or subrepo), not
//! just ones backed by a live `git2::Signature`.

use std::{fmt, str};

/// A point in time with a timezone offset, as recorded by Git.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Time {
    seconds: i64,
    /// Offset from UTC, in minutes.
    offset: i32,
}

impl Time {
    pub fn new(seconds: i64, offset: i32) -> Self {
        Self { seconds, offset }
    }

    pub fn seconds(&self) -> i64 {
        self.seconds
    }

    pub fn offset(&self) -> i32 {
        self.offset
    }
}

impl From<git2::Time> for Time {
    fn from(t: git2::Time) -> Self {
        Self::new(t.seconds(), t.offset_minutes())
    }
}

impl From<Time> for git2::Time {
    fn from(t: Time) -> Self {
        git2::Time::new(t.seconds, t.offset)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.offset.is_negative() { '-' } else { '+' };
        let hours = self.offset.abs() / 60;
        let minutes = self.offset.abs() % 60;
        write!(f, "{} {}{:0>2}{:0>2}", self.seconds, sign, hours, minutes)
    }
}

/// The `name <email> time` triple recorded for a commit's author or
/// committer.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Author {
    pub name: String,
    pub email: String,
    pub time: Time,
}

#[derive(Debug, thiserror::Error)]
#[error("author/committer signature was not valid UTF-8")]
pub struct InvalidSignature(#[from] str::Utf8Error);

impl<'a> TryFrom<&git2::Signature<'a>> for Author {
    type Error = InvalidSignature;

    fn try_from(sig: &git2::Signature<'a>) -> Result<Self, Self::Error> {
        Ok(Self {
            name: str::from_utf8(sig.name_bytes())?.to_string(),
            email: str::from_utf8(sig.email_bytes())?.to_string(),
            time: sig.when().into(),
        })
    }
}

impl Author {
    pub fn to_git2_signature(&self) -> Result<git2::Signature<'static>, git2::Error> {
        git2::Signature::new(&self.name, &self.email, &self.time.into())
    }
}

impl fmt::Display for Author {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}> {}", self.name, self.email, self.time)
    }
}
