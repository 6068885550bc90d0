//! Everything needed for handling the refspecs and submodule URLs that show
//! up on the `git-toprepo` command line and in `.gitmodules`/config.
//!
//! This is a deliberately smaller sibling of `git-ref-format`: we don't need
//! a zero-copy validated ref-name type here, just a parser for the two
//! textual formats `spec.md` §8 pins down exactly (`<src>[:<dst>]` refspecs,
//! and relative submodule URLs).

pub mod url;

use std::fmt;

/// A parsed `<src>:<dst>` refspec, as accepted by `git-toprepo fetch`/`push`.
///
/// See `spec.md` §8, Testable Property 2.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Refspec {
    pub src: String,
    pub dst: String,
}

#[derive(Debug, thiserror::Error, Eq, PartialEq)]
pub enum ParseError {
    #[error("refspec {0:?} has more than one ':' separator")]
    TooManyColons(String),
    #[error("refspec {0:?} is empty")]
    Empty,
}

impl Refspec {
    /// Parse a refspec of the form `x`, `refs/y`, or `a:b`.
    ///
    /// A bare name with no `/` prefix of `refs/` is expanded to
    /// `refs/heads/<name>` on both sides, matching the default Git
    /// behaviour for a one-sided refspec naming a branch.
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        if input.is_empty() {
            return Err(ParseError::Empty);
        }
        let mut parts = input.splitn(3, ':');
        let first = parts.next().expect("splitn always yields at least one part");
        match (parts.next(), parts.next()) {
            (None, _) => {
                let full = Self::expand(first);
                Ok(Self {
                    src: full.clone(),
                    dst: full,
                })
            }
            (Some(second), None) => Ok(Self {
                src: Self::expand(first),
                dst: Self::expand(second),
            }),
            (Some(_), Some(_)) => Err(ParseError::TooManyColons(input.to_string())),
        }
    }

    fn expand(name: &str) -> String {
        if name.starts_with("refs/") {
            name.to_string()
        } else {
            format!("refs/heads/{name}")
        }
    }
}

impl fmt::Display for Refspec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.src, self.dst)
    }
}
