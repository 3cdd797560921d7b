//! Change model shared by every cache and operator.
//!
//! Keyed collections publish [`ChangeSet`]s of [`Change`] records; positional
//! collections publish [`ListChangeSet`]s of [`ListChange`] records. Operators
//! that only need "an ordered batch of changes" (such as buffering) work over
//! the [`ChangeBatch`] trait and accept either.

mod change_set;
mod keyed_change;
mod list;

pub use change_set::*;
pub use keyed_change::*;
pub use list::*;


use std::hash::Hash;

/// Bounds every cache key satisfies.
pub trait CacheKey: Clone + Eq + Hash + Send + Sync + 'static {}

impl<T> CacheKey for T where T: Clone + Eq + Hash + Send + Sync + 'static {}

/// Bounds every cached value satisfies.
pub trait CacheValue: Clone + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Clone + Send + Sync + 'static {}

/// An ordered batch of individual changes that can be flattened and rebuilt.
pub trait ChangeBatch: Clone + Send + Sync + 'static {
    type Item: Clone + Send + Sync + 'static;

    fn is_empty(&self) -> bool;

    /// Appends every change of this batch to `buffer`, preserving order
    fn append_to(
        &self,
        buffer: &mut Vec<Self::Item>,
    );

    fn from_changes(changes: Vec<Self::Item>) -> Self;
}
