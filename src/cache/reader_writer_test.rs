use std::panic;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use parking_lot::Mutex;

use super::*;
use crate::Change;
use crate::ChangeSet;
use crate::Error;

fn seeded() -> ReaderWriter<i32, &'static str> {
    let writer = ReaderWriter::new();
    writer.write(
        |updater| {
            updater.add_or_update("a", 1);
            updater.add_or_update("b", 2);
        },
        None,
        false,
    );
    writer
}

#[test]
fn direct_write_returns_no_changes() {
    let writer = seeded();

    assert_eq!(writer.count(), 2);
    assert_eq!(writer.lookup(&"b"), Some(2));
}

#[test]
fn collected_write_returns_net_changes() {
    let writer = seeded();

    let changes = writer.write(
        |updater| {
            updater.add_or_update("a", 10);
            updater.remove(&"b");
            updater.add_or_update("c", 3);
        },
        None,
        true,
    );

    assert_eq!(
        changes.to_vec(),
        vec![
            Change::update("a", 10, 1),
            Change::remove("b", 2),
            Change::add("c", 3)
        ]
    );
    assert_eq!(writer.count(), 2);
}

#[test]
fn reads_inside_edit_see_batch_in_progress() {
    let writer = seeded();
    let observed = Arc::new(Mutex::new(None));

    let seen = Arc::clone(&observed);
    writer.write(
        |updater| {
            updater.add_or_update("c", 3);
            *seen.lock() = Some(updater.count());
        },
        None,
        true,
    );

    assert_eq!(*observed.lock(), Some(3));
}

#[test]
fn preview_sees_pre_edit_state() {
    let writer = Arc::new(seeded());
    let observed = Arc::new(Mutex::new(Vec::new()));

    let reader = Arc::clone(&writer);
    let seen = Arc::clone(&observed);
    let preview: &dyn Fn(&ChangeSet<i32, &'static str>) = &move |changes| {
        seen.lock().push((changes.len(), reader.lookup(&"a"), reader.count()));
    };

    let changes = writer.write(
        |updater| {
            updater.add_or_update("a", 100);
            updater.add_or_update("z", 26);
        },
        Some(preview),
        false,
    );

    assert_eq!(changes.len(), 2);
    assert_eq!(*observed.lock(), vec![(2, Some(1), 2)]);
    assert_eq!(writer.lookup(&"a"), Some(100));
    assert_eq!(writer.count(), 3);
}

#[test]
fn nested_write_joins_active_batch() {
    let writer = Arc::new(seeded());

    let inner = Arc::clone(&writer);
    let changes = writer.write(
        |updater| {
            updater.add_or_update("c", 3);
            inner
                .write_nested(|nested| nested.add_or_update("d", 4))
                .unwrap();
        },
        None,
        true,
    );

    assert_eq!(changes.adds(), 2);
    assert_eq!(writer.lookup(&"d"), Some(4));
}

#[test]
fn nested_write_without_active_write_fails() {
    let writer = seeded();

    let result = writer.write_nested(|updater| updater.add_or_update("x", 9));

    assert!(matches!(result, Err(Error::InvalidOperation(_))));
    assert_eq!(writer.lookup(&"x"), None);
    assert_eq!(writer.count(), 2);
}

#[test]
fn initial_updates_honor_filter() {
    let writer = seeded();

    let all = writer.get_initial_updates(None);
    assert_eq!(all.adds(), 2);

    let even: &dyn Fn(&i32) -> bool = &|v| v % 2 == 0;
    let filtered = writer.get_initial_updates(Some(even));
    assert_eq!(filtered.to_vec(), vec![Change::add("b", 2)]);
}

#[test]
fn refresh_all_marks_every_key() {
    let writer = seeded();

    let changes = writer.write(|updater| updater.refresh_all(), None, true);

    assert_eq!(changes.refreshes(), 2);
}

#[test]
fn concurrent_writers_are_serialized() {
    let writer = Arc::new(ReaderWriter::<usize, usize>::new());

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let writer = Arc::clone(&writer);
            std::thread::spawn(move || {
                for i in 0..250 {
                    writer.write(|updater| updater.add_or_update(t * 1000 + i, i), None, true);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(writer.count(), 1000);
    assert_eq!(writer.keys().len(), writer.items().len());
}

#[test]
fn panicking_edit_restores_committed_data() {
    let writer = seeded();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        writer.write(
            |updater| {
                updater.add_or_update("a", 100);
                updater.remove(&"b");
                updater.add_or_update("x", 9);
                panic!("edit failed");
            },
            None,
            true,
        )
    }));

    assert!(outcome.is_err());
    let mut restored = writer.key_values();
    restored.sort();
    assert_eq!(restored, vec![("a", 1), ("b", 2)]);

    let changes = writer.write(|updater| updater.add_or_update("y", 3), None, true);
    assert_eq!(changes.to_vec(), vec![Change::add("y", 3)]);
}

#[test]
fn panicking_edit_with_preview_commits_nothing() {
    let writer = seeded();
    let previews = Arc::new(Mutex::new(0));

    let seen = Arc::clone(&previews);
    let preview: &dyn Fn(&ChangeSet<i32, &'static str>) = &move |_| *seen.lock() += 1;
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        writer.write(
            |updater| {
                updater.add_or_update("x", 9);
                panic!("edit failed");
            },
            Some(preview),
            false,
        )
    }));

    assert!(outcome.is_err());
    assert_eq!(*previews.lock(), 0);
    assert_eq!(writer.lookup(&"x"), None);
    assert_eq!(writer.count(), 2);
    assert!(writer.write_nested(|updater| updater.add_or_update("z", 1)).is_err());
}
