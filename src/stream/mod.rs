//! Push-based stream core.
//!
//! An [`Observable`] delivers values to [`Observer`]s synchronously on the
//! thread that produced them. [`Subscription`] is the only cancellation
//! mechanism: dropping it detaches the observer and runs any cascading
//! teardown. [`Subject`] is the broadcast registry caches publish through.

mod bridge;
mod observable;
mod observer;
mod subject;
mod subscription;

pub use bridge::*;
pub use observable::*;
pub use observer::*;
pub use subject::*;
pub use subscription::*;


use crate::ChangeSet;

/// A stream of keyed changesets
pub type ChangeStream<V, K> = ObservableRef<ChangeSet<V, K>>;
