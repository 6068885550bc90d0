//! Bidirectional history translation between a top repository (pinning
//! submodule commits) and a flattened mono repository (`spec.md` §4.4–4.6).
//!
//! - [`expand`] — the Expander: top commits → mono commits, splicing in
//!   subrepo history at every pin bump.
//! - [`resolve`] — the Subrepo-onto-Mono Resolver used by `fetch`.
//! - [`split`] — the Splitter: new mono commits → one commit per affected
//!   repository, with a push plan.
//! - [`bump`] — `BumpInfo`, the per-subdir "what's installed here" record.
//! - [`convert`] — the Conversion Map.
//! - [`tree`] — git2 tree-surgery helpers shared by expand/split.
//! - [`warning`] — non-fatal conditions surfaced alongside a result.
//! - [`error`] — the fatal error taxonomy of `spec.md` §7.

pub mod bump;
pub mod convert;
pub mod error;
pub mod expand;
pub mod resolve;
pub mod split;
pub mod tree;
pub mod warning;

pub use bump::{Bump, BumpInfo};
pub use convert::{ConversionMap, SourceCommit};
pub use warning::Warning;

/// An index into a [`expand::MonoStore`] arena: a mono commit that has been
/// written to the mono repository's object database during this run.
///
/// Mirrors `toprepo_commit_graph::LocalId`, kept as a separate type since
/// mono commits are produced incrementally by the expander rather than
/// collected up front from an existing ref set.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct MonoId(u32);

impl MonoId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }

    /// Build a [`MonoId`] out of thin air, for tests that exercise the
    /// algorithms against synthetic graph fixtures instead of a real
    /// `git2::Repository`.
    #[doc(hidden)]
    pub fn for_test(n: u32) -> Self {
        Self(n)
    }
}
