//! In-memory change-tracking caches that publish ordered changesets.
//!
//! A [`SourceCache`] is edited in batches; every batch is reduced to its net
//! effect and broadcast as one [`ChangeSet`] to subscribers. Operators such as
//! [`Filter`], [`Transform`], [`InnerJoin`], [`RefCount`], [`MergeMany`] and
//! [`BufferIf`] consume and produce changeset streams, so pipelines can be
//! assembled from plain values:
//!
//! ```ignore
//! let people = SourceCache::new(|p: &Person| p.id);
//! let adults = people.connect(None).filter(|p| p.age >= 18).ref_count();
//! let _subscription = adults.subscribe_fn(|changes| println!("{changes:?}"));
//! people.add_or_update(Person::new(1, "Ada", 36));
//! ```

mod cache;
mod change;
mod config;
mod errors;
mod operators;
mod scheduler;
mod stream;

pub use cache::*;
pub use change::*;
pub use errors::*;
pub use operators::*;
pub use scheduler::*;
pub use stream::*;

pub use self::config::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
