use std::sync::Arc;

use changeflow::Change;
use changeflow::ChangeStreamExt;
use changeflow::ObservableCache;
use changeflow::ObservableExt;
use changeflow::ObservableRef;
use changeflow::Observer;
use changeflow::SourceCache;
use changeflow::Subject;
use parking_lot::Mutex;

use crate::commons::Collector;
use crate::enable_logger;

#[derive(Debug, Clone, PartialEq)]
struct Order {
    id: u32,
    customer: u32,
    total: u32,
}

#[derive(Debug, Clone, PartialEq)]
struct Customer {
    id: u32,
    name: &'static str,
}

fn order(
    id: u32,
    customer: u32,
    total: u32,
) -> Order {
    Order { id, customer, total }
}

#[test]
fn filter_then_transform_tracks_source() {
    enable_logger();
    let orders = SourceCache::new(|o: &Order| o.id);
    let large = orders
        .connect(None)
        .filter(|o| o.total >= 100)
        .transform(|id, o| format!("#{id}: {}", o.total));
    let results = Collector::new(&large);

    orders.edit(|updater| updater.add_or_update_many([order(1, 1, 50), order(2, 1, 150), order(3, 2, 300)]));
    orders.add_or_update(order(1, 1, 120));
    orders.add_or_update(order(3, 2, 10));

    let data = results.data();
    assert_eq!(data.len(), 2);
    assert_eq!(data[&1], "#1: 120");
    assert_eq!(data[&2], "#2: 150");
    assert_eq!(
        results.last().map(|c| c.to_vec()),
        Some(vec![Change::remove(3, "#3: 300".to_string())])
    );
}

#[test]
fn shared_join_survives_subscriber_churn() {
    enable_logger();
    let customers = SourceCache::new(|c: &Customer| c.id);
    let orders = SourceCache::new(|o: &Order| o.id);
    customers.edit(|updater| {
        updater.add_or_update_many([
            Customer { id: 1, name: "ada" },
            Customer { id: 2, name: "bob" },
            Customer { id: 3, name: "cid" },
        ])
    });
    orders.edit(|updater| updater.add_or_update_many([order(10, 1, 5), order(20, 2, 7), order(30, 3, 9)]));

    let latest_order = customers
        .connect(None)
        .inner_join(orders.connect(None), |o: &Order| o.customer, |_, c: &Customer, o: &Order| {
            format!("{} spent {}", c.name, o.total)
        })
        .ref_count();

    let first = Collector::new(&latest_order);
    assert_eq!(first.data().len(), 3);

    customers.remove(&1);
    orders.remove(&30);
    let second = Collector::new(&latest_order);

    assert_eq!(first.data().len(), 1);
    assert_eq!(second.data().len(), 1);
    assert_eq!(second.data()[&2], "bob spent 7");
    assert_eq!(second.message_count(), 1);
}

#[test]
fn materialized_stream_can_be_queried() {
    let orders = SourceCache::new(|o: &Order| o.id);
    let large = ObservableCache::from_stream(&orders.connect(None).filter(|o| o.total >= 100));

    orders.edit(|updater| updater.add_or_update_many([order(1, 1, 50), order(2, 1, 150)]));

    assert_eq!(large.keys(), vec![2]);
    assert_eq!(large.lookup(&2), Some(order(2, 1, 150)));
}

#[test]
fn disposing_source_completes_downstream() {
    let orders = SourceCache::new(|o: &Order| o.id);
    let results = Collector::new(&orders.connect(None).transform(|_, o| o.total));

    orders.add_or_update(order(1, 1, 1));
    orders.dispose();

    assert!(results.is_completed());
    assert!(!results.has_error());
}

#[test]
fn merge_many_follows_cache_membership() {
    #[derive(Clone)]
    struct Sensor {
        id: u32,
        readings: Subject<f64>,
    }

    let sensors = SourceCache::new(|s: &Sensor| s.id);
    let merged = sensors.connect(None).merge_many(|_, s: &Sensor| {
        let readings: ObservableRef<f64> = Arc::new(s.readings.clone());
        readings
    });
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    let _subscription = merged.subscribe_fn(move |value| sink.lock().push(value));

    let kitchen = Sensor {
        id: 1,
        readings: Subject::new(),
    };
    sensors.add_or_update(kitchen.clone());
    kitchen.readings.on_next(21.5);
    sensors.remove(&1);
    kitchen.readings.on_next(99.0);

    assert_eq!(*received.lock(), vec![21.5]);
}
