use std::sync::Arc;

use super::*;
use crate::test_utils::ChangeSetAggregator;
use crate::Change;
use crate::ChangeReason;
use crate::ChangeSet;
use crate::ChangeStream;
use crate::Error;
use crate::Observer;
use crate::SourceCache;
use crate::Subject;

#[derive(Debug, Clone, PartialEq)]
struct Device {
    name: &'static str,
    firmware: u32,
}

#[derive(Debug, Clone, PartialEq)]
struct Metadata {
    id: u32,
    device: &'static str,
    favourite: bool,
}

fn device(
    name: &'static str,
    firmware: u32,
) -> Device {
    Device { name, firmware }
}

fn metadata(
    id: u32,
    device: &'static str,
) -> Metadata {
    Metadata {
        id,
        device,
        favourite: false,
    }
}

struct Fixture {
    devices: SourceCache<Device, &'static str>,
    metadata: SourceCache<Metadata, u32>,
    results: ChangeSetAggregator<String, &'static str>,
}

fn fixture() -> Fixture {
    let devices = SourceCache::new(|d: &Device| d.name);
    let metadata = SourceCache::new(|m: &Metadata| m.id);
    let join = InnerJoin::new(
        devices.connect(None),
        metadata.connect(None),
        |m: &Metadata| m.device,
        |name: &&'static str, d: &Device, m: &Metadata| format!("{name}/v{}/m{}", d.firmware, m.id),
    );
    let results = ChangeSetAggregator::new(&join);
    Fixture {
        devices,
        metadata,
        results,
    }
}

fn seed(fixture: &Fixture) {
    fixture.devices.edit(|updater| {
        updater.add_or_update_many([device("D1", 1), device("D2", 1), device("D3", 1)]);
    });
    fixture.metadata.edit(|updater| {
        updater.add_or_update_many([metadata(1, "D1"), metadata(2, "D2"), metadata(3, "D3")]);
    });
}

#[test]
fn pairs_appear_once_both_sides_exist() {
    let fixture = fixture();
    seed(&fixture);

    assert_eq!(fixture.results.count(), 3);
    assert_eq!(fixture.results.messages().len(), 1);
    assert_eq!(fixture.results.lookup(&"D2"), Some("D2/v1/m2".to_string()));
}

#[test]
fn removing_either_side_retracts_the_pair() {
    let fixture = fixture();
    seed(&fixture);

    fixture.devices.remove(&"D1");
    assert_eq!(fixture.results.count(), 2);

    fixture.metadata.remove(&3);
    assert_eq!(fixture.results.count(), 1);
    assert_eq!(fixture.results.lookup(&"D2"), Some("D2/v1/m2".to_string()));
}

#[test]
fn unmatched_items_produce_nothing() {
    let fixture = fixture();

    fixture.devices.add_or_update(device("D1", 1));
    fixture.metadata.add_or_update(metadata(9, "D9"));

    assert!(fixture.results.messages().is_empty());
}

#[test]
fn left_update_updates_the_pair() {
    let fixture = fixture();
    seed(&fixture);

    fixture.devices.add_or_update(device("D1", 2));

    let last = fixture.results.messages().pop().expect("update emitted");
    assert_eq!(
        last.to_vec(),
        vec![Change::update("D1", "D1/v2/m1".to_string(), "D1/v1/m1".to_string())]
    );
}

#[test]
fn right_update_keeping_its_key_updates_the_pair() {
    let fixture = fixture();
    seed(&fixture);

    fixture.metadata.add_or_update(Metadata {
        favourite: true,
        ..metadata(2, "D2")
    });

    let last = fixture.results.messages().pop().expect("update emitted");
    assert_eq!(last.len(), 1);
    assert_eq!(last.as_slice()[0].reason(), ChangeReason::Update);
    assert_eq!(fixture.results.count(), 3);
}

#[test]
fn right_item_moving_to_another_left_key_moves_the_pair() {
    let fixture = fixture();
    fixture.devices.edit(|updater| {
        updater.add_or_update_many([device("D1", 1), device("D2", 1)]);
    });
    fixture.metadata.add_or_update(metadata(1, "D1"));

    fixture.metadata.add_or_update(metadata(1, "D2"));

    let last = fixture.results.messages().pop().expect("move emitted");
    assert_eq!(
        last.to_vec(),
        vec![
            Change::remove("D1", "D1/v1/m1".to_string()),
            Change::add("D2", "D2/v1/m1".to_string())
        ]
    );
    assert_eq!(fixture.results.count(), 1);
}

#[test]
fn right_readded_after_removal_restores_the_pair() {
    let fixture = fixture();
    seed(&fixture);

    fixture.metadata.remove(&1);
    fixture.metadata.add_or_update(metadata(1, "D1"));

    assert_eq!(fixture.results.count(), 3);
}

#[test]
fn right_refresh_only_touches_its_own_pair() {
    let fixture = fixture();
    fixture.devices.add_or_update(device("D1", 1));
    fixture.metadata.add_or_update(metadata(1, "D1"));
    fixture.metadata.add_or_update(metadata(4, "D1"));
    let before = fixture.results.messages().len();

    fixture.metadata.edit(|updater| updater.refresh(&1));
    assert_eq!(fixture.results.messages().len(), before);

    fixture.metadata.edit(|updater| updater.refresh(&4));
    let last = fixture.results.messages().pop().expect("refresh emitted");
    assert_eq!(last.to_vec(), vec![Change::refresh("D1", "D1/v1/m4".to_string())]);
}

type Side = Subject<ChangeSet<i32, u32>>;

fn subject_join() -> (Side, Side, ChangeSetAggregator<i32, u32>) {
    let left = Subject::new();
    let right = Subject::new();
    let left_stream: ChangeStream<i32, u32> = Arc::new(left.clone());
    let right_stream: ChangeStream<i32, u32> = Arc::new(right.clone());
    let join = InnerJoin::new(
        left_stream,
        right_stream,
        |r: &i32| *r as u32,
        |_: &u32, l: &i32, r: &i32| l + r,
    );
    let results = ChangeSetAggregator::new(&join);
    (left, right, results)
}

#[test]
fn error_on_either_side_fails_the_join() {
    let (left, right, results) = subject_join();

    right.on_error(Error::Upstream("right failed".into()).shared());
    left.on_next(ChangeSet::new(vec![Change::add(1, 1)]));

    assert!(matches!(results.error().as_deref(), Some(Error::Upstream(_))));
    assert!(!left.has_observers());
    assert!(results.messages().is_empty());
}

#[test]
fn completes_only_after_both_sides_complete() {
    let (left, right, results) = subject_join();

    left.on_completed();
    assert!(!results.is_completed());

    right.on_next(ChangeSet::new(vec![Change::add(10, 7)]));
    right.on_completed();
    assert!(results.is_completed());
}
