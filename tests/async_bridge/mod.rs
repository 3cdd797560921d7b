use std::sync::Arc;
use std::time::Duration;

use changeflow::BufferIf;
use changeflow::Change;
use changeflow::ChangeSet;
use changeflow::ChangeStream;
use changeflow::Error;
use changeflow::ObservableExt;
use changeflow::Observer;
use changeflow::SourceCache;
use changeflow::Subject;
use changeflow::TokioScheduler;
use futures::StreamExt;

#[tokio::test]
async fn cache_changes_flow_into_async_stream() {
    let cache = SourceCache::new(|v: &(u32, &'static str)| v.0);
    cache.add_or_update((1, "one"));
    let mut stream = cache.connect(None).into_stream();

    cache.add_or_update((2, "two"));
    cache.remove(&1);

    let initial = stream.next().await.and_then(|r| r.ok()).map(|c| c.to_vec());
    assert_eq!(initial, Some(vec![Change::add(1, (1, "one"))]));
    let added = stream.next().await.and_then(|r| r.ok()).map(|c| c.to_vec());
    assert_eq!(added, Some(vec![Change::add(2, (2, "two"))]));
    let removed = stream.next().await.and_then(|r| r.ok()).map(|c| c.to_vec());
    assert_eq!(removed, Some(vec![Change::remove(1, (1, "one"))]));
}

#[tokio::test]
async fn stream_ends_after_upstream_error() {
    let subject: Subject<ChangeSet<u32, u32>> = Subject::new();
    let source: ChangeStream<u32, u32> = Arc::new(subject.clone());
    let mut stream = source.into_stream();

    subject.on_error(Error::Upstream("disconnected".into()).shared());

    assert!(matches!(stream.next().await, Some(Err(_))));
    assert!(stream.next().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn paused_buffer_flushes_on_timeout() {
    let cache = SourceCache::new(|v: &u32| *v);
    let gate: Subject<bool> = Subject::new();
    let buffered = BufferIf::new(
        cache.connect(None),
        Arc::new(gate.clone()),
        Arc::new(TokioScheduler::current().expect("inside runtime")),
    )
    .initial_paused(true)
    .with_timeout(Duration::from_secs(5))
    .expect("positive timeout");
    let mut stream = buffered.into_stream();

    cache.add_or_update(1);
    cache.add_or_update(2);

    let started = tokio::time::Instant::now();
    let flushed = stream.next().await.and_then(|r| r.ok()).map(|c| c.len());

    assert_eq!(flushed, Some(2));
    assert!(started.elapsed() >= Duration::from_secs(5));
}
