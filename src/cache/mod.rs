//! Change-tracking caches.
//!
//! [`ChangeAwareCache`] records the net effect of a batch of mutations;
//! [`ReaderWriter`] wraps one in the cache lock; [`ObservableCache`] and its
//! editable flavours ([`SourceCache`], [`IntermediateCache`]) broadcast the
//! captured changesets to subscribers.

mod change_aware_cache;
mod intermediate_cache;
mod observable_cache;
mod reader_writer;
mod source_cache;

pub use change_aware_cache::*;
pub use intermediate_cache::*;
pub use observable_cache::*;
pub use reader_writer::*;
pub use source_cache::*;

#[cfg(test)]
mod reader_writer_test;
