//! Operators over keyed changeset streams.
//!
//! Each operator is a concrete [`Observable`] built around its source(s).
//! [`ChangeStreamExt`] offers the same operators as chained calls on a
//! [`ChangeStream`].

mod buffer_if;
mod diagnostics;
mod filter;
mod inner_join;
mod merge_many;
mod ref_count;
mod transform;

pub use buffer_if::*;
pub use diagnostics::*;
pub use filter::*;
pub use inner_join::*;
pub use merge_many::*;
pub use ref_count::*;
pub use transform::*;

#[cfg(test)]
mod inner_join_test;
#[cfg(test)]
mod merge_many_test;

use std::sync::Arc;

use crate::CacheKey;
use crate::CacheValue;
use crate::ChangeStream;
use crate::ObservableRef;

pub trait ChangeStreamExt<V, K>
where
    V: CacheValue,
    K: CacheKey,
{
    fn filter(
        self,
        predicate: impl Fn(&V) -> bool + Send + Sync + 'static,
    ) -> ChangeStream<V, K>;

    fn transform<D: CacheValue>(
        self,
        transform: impl Fn(&K, &V) -> D + Send + Sync + 'static,
    ) -> ChangeStream<D, K>;

    fn merge_many<T: Send + 'static>(
        self,
        selector: impl Fn(&K, &V) -> ObservableRef<T> + Send + Sync + 'static,
    ) -> ObservableRef<T>;

    fn inner_join<RV, RK, D>(
        self,
        right: ChangeStream<RV, RK>,
        right_key_selector: impl Fn(&RV) -> K + Send + Sync + 'static,
        result_selector: impl Fn(&K, &V, &RV) -> D + Send + Sync + 'static,
    ) -> ChangeStream<D, K>
    where
        RV: CacheValue,
        RK: CacheKey,
        D: CacheValue;

    /// Shares one upstream subscription between all subscribers
    fn ref_count(self) -> ChangeStream<V, K>;

    fn collect_update_stats(self) -> ObservableRef<ChangeSummary>;
}

impl<V, K> ChangeStreamExt<V, K> for ChangeStream<V, K>
where
    V: CacheValue,
    K: CacheKey,
{
    fn filter(
        self,
        predicate: impl Fn(&V) -> bool + Send + Sync + 'static,
    ) -> ChangeStream<V, K> {
        Arc::new(Filter::new(self, predicate))
    }

    fn transform<D: CacheValue>(
        self,
        transform: impl Fn(&K, &V) -> D + Send + Sync + 'static,
    ) -> ChangeStream<D, K> {
        Arc::new(Transform::new(self, transform))
    }

    fn merge_many<T: Send + 'static>(
        self,
        selector: impl Fn(&K, &V) -> ObservableRef<T> + Send + Sync + 'static,
    ) -> ObservableRef<T> {
        Arc::new(MergeMany::new(self, selector))
    }

    fn inner_join<RV, RK, D>(
        self,
        right: ChangeStream<RV, RK>,
        right_key_selector: impl Fn(&RV) -> K + Send + Sync + 'static,
        result_selector: impl Fn(&K, &V, &RV) -> D + Send + Sync + 'static,
    ) -> ChangeStream<D, K>
    where
        RV: CacheValue,
        RK: CacheKey,
        D: CacheValue,
    {
        Arc::new(InnerJoin::new(self, right, right_key_selector, result_selector))
    }

    fn ref_count(self) -> ChangeStream<V, K> {
        Arc::new(RefCount::new(self))
    }

    fn collect_update_stats(self) -> ObservableRef<ChangeSummary> {
        collect_update_stats(self)
    }
}
