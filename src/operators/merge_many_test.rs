use std::sync::Arc;

use super::*;
use crate::test_utils::Recorder;
use crate::Error;
use crate::ObservableRef;
use crate::Observer;
use crate::SourceCache;
use crate::Subject;

#[derive(Clone)]
struct Feed {
    id: u32,
    ticks: Subject<i32>,
}

fn feed(id: u32) -> Feed {
    Feed {
        id,
        ticks: Subject::new(),
    }
}

fn merged(source: &SourceCache<Feed, u32>) -> MergeMany<Feed, u32, i32> {
    MergeMany::new(source.connect(None), |_: &u32, feed: &Feed| {
        let ticks: ObservableRef<i32> = Arc::new(feed.ticks.clone());
        ticks
    })
}

#[test]
fn merges_values_of_every_item() {
    let source = SourceCache::new(|f: &Feed| f.id);
    let (a, b) = (feed(1), feed(2));
    source.edit(|updater| updater.add_or_update_many([a.clone(), b.clone()]));
    let (recorder, _subscription) = Recorder::record(&merged(&source));

    a.ticks.on_next(10);
    b.ticks.on_next(20);
    a.ticks.on_next(11);

    assert_eq!(recorder.values(), vec![10, 20, 11]);
}

#[test]
fn removed_item_is_unsubscribed() {
    let source = SourceCache::new(|f: &Feed| f.id);
    let a = feed(1);
    source.add_or_update(a.clone());
    let (recorder, _subscription) = Recorder::record(&merged(&source));

    source.remove(&1);
    a.ticks.on_next(10);

    assert!(recorder.values().is_empty());
    assert!(!a.ticks.has_observers());
}

#[test]
fn update_replaces_the_inner_subscription() {
    let source = SourceCache::new(|f: &Feed| f.id);
    let (old, new) = (feed(1), feed(1));
    source.add_or_update(old.clone());
    let (recorder, _subscription) = Recorder::record(&merged(&source));

    source.add_or_update(new.clone());
    old.ticks.on_next(1);
    new.ticks.on_next(2);

    assert_eq!(recorder.values(), vec![2]);
    assert!(!old.ticks.has_observers());
}

#[test]
fn inner_completion_is_ignored() {
    let source = SourceCache::new(|f: &Feed| f.id);
    let (a, b) = (feed(1), feed(2));
    source.edit(|updater| updater.add_or_update_many([a.clone(), b.clone()]));
    let (recorder, _subscription) = Recorder::record(&merged(&source));

    a.ticks.on_completed();
    b.ticks.on_next(5);

    assert_eq!(recorder.values(), vec![5]);
    assert!(!recorder.is_completed());
}

#[test]
fn inner_error_terminates_everything() {
    let source = SourceCache::new(|f: &Feed| f.id);
    let (a, b) = (feed(1), feed(2));
    source.edit(|updater| updater.add_or_update_many([a.clone(), b.clone()]));
    let (recorder, _subscription) = Recorder::record(&merged(&source));

    a.ticks.on_error(Error::Upstream("feed broke".into()).shared());
    b.ticks.on_next(5);
    let c = feed(3);
    source.add_or_update(c.clone());

    assert!(matches!(recorder.error().as_deref(), Some(Error::Upstream(_))));
    assert!(recorder.values().is_empty());
    assert!(!b.ticks.has_observers());
    assert!(!c.ticks.has_observers());
}

#[test]
fn dispose_releases_every_inner_subscription() {
    let source = SourceCache::new(|f: &Feed| f.id);
    let (a, b) = (feed(1), feed(2));
    source.edit(|updater| updater.add_or_update_many([a.clone(), b.clone()]));
    let (_recorder, subscription) = Recorder::record(&merged(&source));

    drop(subscription);

    assert!(!a.ticks.has_observers());
    assert!(!b.ticks.has_observers());
}
