use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::ChangeSet;
use crate::ChangeStream;
use crate::Observable;
use crate::ObservableRef;
use crate::Observer;
use crate::ObserverRef;
use crate::SharedError;
use crate::Subscription;

/// Per-reason counts for one batch, or accumulated over many
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeStatistics {
    /// Batch sequence number, starting at 0
    pub index: usize,
    pub adds: usize,
    pub updates: usize,
    pub removes: usize,
    pub refreshes: usize,
    pub moves: usize,
    /// Items present once the batch has been applied
    pub count: usize,
    pub last_updated: Option<Instant>,
}

impl ChangeStatistics {
    fn empty() -> Self {
        Self {
            index: 0,
            adds: 0,
            updates: 0,
            removes: 0,
            refreshes: 0,
            moves: 0,
            count: 0,
            last_updated: None,
        }
    }
}

/// Latest batch statistics plus running totals
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSummary {
    pub current: ChangeStatistics,
    pub overall: ChangeStatistics,
}

impl ChangeSummary {
    fn empty() -> Self {
        Self {
            current: ChangeStatistics::empty(),
            overall: ChangeStatistics::empty(),
        }
    }

    fn record<V, K>(
        &mut self,
        changes: &ChangeSet<V, K>,
    ) {
        let index = if self.overall.last_updated.is_some() {
            self.current.index + 1
        } else {
            0
        };
        let count = (self.overall.count + changes.adds()).saturating_sub(changes.removes());
        let now = Some(Instant::now());

        self.current = ChangeStatistics {
            index,
            adds: changes.adds(),
            updates: changes.updates(),
            removes: changes.removes(),
            refreshes: changes.refreshes(),
            moves: changes.moves(),
            count,
            last_updated: now,
        };
        self.overall = ChangeStatistics {
            index,
            adds: self.overall.adds + changes.adds(),
            updates: self.overall.updates + changes.updates(),
            removes: self.overall.removes + changes.removes(),
            refreshes: self.overall.refreshes + changes.refreshes(),
            moves: self.overall.moves + changes.moves(),
            count,
            last_updated: now,
        };
    }
}

struct StatsObserver {
    downstream: ObserverRef<ChangeSummary>,
    summary: Mutex<ChangeSummary>,
}

impl<V, K> Observer<ChangeSet<V, K>> for StatsObserver {
    fn on_next(
        &self,
        changes: ChangeSet<V, K>,
    ) {
        let summary = {
            let mut summary = self.summary.lock();
            summary.record(&changes);
            summary.clone()
        };
        self.downstream.on_next(summary);
    }

    fn on_error(
        &self,
        error: SharedError,
    ) {
        self.downstream.on_error(error);
    }

    fn on_completed(&self) {
        self.downstream.on_completed();
    }
}

struct CollectUpdateStats<V, K> {
    source: ChangeStream<V, K>,
}

impl<V, K> Observable<ChangeSummary> for CollectUpdateStats<V, K>
where
    V: Send + Sync + 'static,
    K: Send + Sync + 'static,
{
    fn subscribe(
        &self,
        observer: ObserverRef<ChangeSummary>,
    ) -> Subscription {
        self.source.subscribe(Arc::new(StatsObserver {
            downstream: observer,
            summary: Mutex::new(ChangeSummary::empty()),
        }))
    }
}

/// Emits a [`ChangeSummary`] for every batch of `source`
pub fn collect_update_stats<V, K>(source: ChangeStream<V, K>) -> ObservableRef<ChangeSummary>
where
    V: Send + Sync + 'static,
    K: Send + Sync + 'static,
{
    Arc::new(CollectUpdateStats { source })
}
