use std::sync::Arc;
use std::time::Duration;

use leadercast::{Config, EventKind, Fanout, LeaderStream, Runtime};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn runtime(fanout: Fanout) -> Arc<Runtime> {
    let cfg = Config {
        slow_client_timeout: Duration::from_millis(200),
        fanout,
        ..Config::default()
    };
    Runtime::builder(cfg).build()
}

async fn wait_registered(rt: &Runtime, n: usize) {
    while rt.broadcaster().subscriber_count().await < n {
        tokio::task::yield_now().await;
    }
}

/// Reads `stream` promptly on a separate task, forwarding every value.
fn pump(mut stream: LeaderStream) -> mpsc::UnboundedReceiver<bool> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(v) = stream.recv().await {
            if tx.send(v).is_err() {
                break;
            }
        }
    });
    rx
}

fn drain_kinds(rx: &mut tokio::sync::broadcast::Receiver<leadercast::Event>) -> Vec<EventKind> {
    let mut kinds = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        kinds.push(ev.kind);
    }
    kinds
}

#[tokio::test]
async fn first_value_is_current_state() {
    let rt = runtime(Fanout::Concurrent);
    let stop = CancellationToken::new();
    rt.broadcaster().broadcast(true, &stop).await;

    let mut stream = rt.subscribe(CancellationToken::new());
    assert_eq!(stream.recv().await, Some(true));
}

#[tokio::test]
async fn values_arrive_in_feed_order_with_repeats() {
    let rt = runtime(Fanout::Concurrent);
    let stop = CancellationToken::new();
    let mut events = rt.bus().subscribe();

    let mut rx = pump(rt.subscribe(CancellationToken::new()));
    assert_eq!(rx.recv().await, Some(false));
    wait_registered(&rt, 1).await;

    let feed = [true, true, false, false, true];
    for v in feed {
        let report = rt.broadcaster().broadcast(v, &stop).await;
        assert_eq!(report.delivered, 1);
    }

    let mut got = Vec::new();
    for _ in 0..feed.len() {
        got.push(rx.recv().await.unwrap());
    }
    assert_eq!(got, feed);

    let changes = drain_kinds(&mut events)
        .into_iter()
        .filter(|k| *k == EventKind::LeaderChanged)
        .count();
    assert_eq!(changes, 3);
}

#[tokio::test]
async fn concurrent_subscribers_each_get_one_initial_value() {
    const N: usize = 32;
    let rt = runtime(Fanout::Concurrent);
    let stop = CancellationToken::new();
    rt.broadcaster().broadcast(true, &stop).await;

    let mut receivers: Vec<_> = (0..N)
        .map(|_| pump(rt.subscribe(CancellationToken::new())))
        .collect();
    for rx in &mut receivers {
        assert_eq!(rx.recv().await, Some(true));
    }
    wait_registered(&rt, N).await;

    let report = rt.broadcaster().broadcast(false, &stop).await;
    assert_eq!(report.delivered, N);
    for rx in &mut receivers {
        assert_eq!(rx.recv().await, Some(false));
        assert!(rx.try_recv().is_err());
    }
}

#[tokio::test]
async fn cancelled_caller_is_removed_from_registry() {
    let rt = runtime(Fanout::Concurrent);
    let caller = CancellationToken::new();
    let mut stream = rt.subscribe(caller.clone());
    assert_eq!(stream.recv().await, Some(false));
    wait_registered(&rt, 1).await;

    caller.cancel();
    assert_eq!(stream.recv().await, None);
    while rt.broadcaster().subscriber_count().await > 0 {
        tokio::task::yield_now().await;
    }
}

// A connects, gets false; feed true reaches A with one change notice.
// A second true is delivered again without a notice.
#[tokio::test]
async fn repeated_value_is_delivered_without_second_notice() {
    let rt = runtime(Fanout::Concurrent);
    let stop = CancellationToken::new();
    let mut events = rt.bus().subscribe();

    let mut a = pump(rt.subscribe(CancellationToken::new()));
    assert_eq!(a.recv().await, Some(false));
    wait_registered(&rt, 1).await;

    rt.broadcaster().broadcast(true, &stop).await;
    assert_eq!(a.recv().await, Some(true));

    let ev = loop {
        let ev = events.recv().await.unwrap();
        if ev.kind == EventKind::LeaderChanged {
            break ev;
        }
    };
    assert_eq!((ev.from, ev.to), (Some(false), Some(true)));

    rt.broadcaster().broadcast(true, &stop).await;
    assert_eq!(a.recv().await, Some(true));
    assert!(!drain_kinds(&mut events).contains(&EventKind::LeaderChanged));
}

#[tokio::test(start_paused = true)]
async fn slow_subscriber_is_evicted_without_affecting_others() {
    let rt = runtime(Fanout::Concurrent);
    let stop = CancellationToken::new();
    let mut events = rt.bus().subscribe();
    rt.broadcaster().broadcast(true, &stop).await;

    let mut fast = pump(rt.subscribe(CancellationToken::new()));
    assert_eq!(fast.recv().await, Some(true));
    wait_registered(&rt, 1).await;

    let mut slow = rt.subscribe(CancellationToken::new());
    assert_eq!(slow.recv().await, Some(true));
    wait_registered(&rt, 2).await;

    let report = rt.broadcaster().broadcast(false, &stop).await;
    assert_eq!((report.delivered, report.evicted), (1, 1));
    assert_eq!(fast.recv().await, Some(false));
    assert_eq!(slow.recv().await, None);
    assert!(drain_kinds(&mut events).contains(&EventKind::SubscriberEvicted));

    let report = rt.broadcaster().broadcast(true, &stop).await;
    assert_eq!(report.evicted, 0);
    assert_eq!(fast.recv().await, Some(true));
}

// Shutdown while the sequential round waits on B: C, third in order, is never reached.
#[tokio::test(start_paused = true)]
async fn shutdown_mid_round_skips_remaining_subscribers() {
    let rt = runtime(Fanout::Sequential);
    let stop = CancellationToken::new();

    let mut a = pump(rt.subscribe(CancellationToken::new()));
    assert_eq!(a.recv().await, Some(false));
    wait_registered(&rt, 1).await;

    let mut b = rt.subscribe(CancellationToken::new());
    assert_eq!(b.recv().await, Some(false));
    wait_registered(&rt, 2).await;

    let mut c = rt.subscribe(CancellationToken::new());
    assert_eq!(c.recv().await, Some(false));
    wait_registered(&rt, 3).await;

    let hub = Arc::clone(rt.broadcaster());
    let round_stop = stop.clone();
    let round = tokio::spawn(async move { hub.broadcast(true, &round_stop).await });

    assert_eq!(a.recv().await, Some(true));
    // Let the round move on and block on B.
    tokio::time::sleep(Duration::from_millis(50)).await;
    stop.cancel();
    rt.shutdown();

    let report = round.await.unwrap();
    assert!(report.aborted);
    assert_eq!(report.pending, 2);
    assert_eq!(c.recv().await, None);
    assert_eq!(b.recv().await, None);
}

// A subscribes before B, but B takes its initial value and registers first.
#[tokio::test(start_paused = true)]
async fn sequential_round_follows_registration_order() {
    let rt = runtime(Fanout::Sequential);
    let stop = CancellationToken::new();

    let mut a = rt.subscribe(CancellationToken::new());
    let mut b = pump(rt.subscribe(CancellationToken::new()));

    assert_eq!(b.recv().await, Some(false));
    wait_registered(&rt, 1).await;
    assert_eq!(a.recv().await, Some(false));
    wait_registered(&rt, 2).await;

    let hub = Arc::clone(rt.broadcaster());
    let round_stop = stop.clone();
    let round = tokio::spawn(async move { hub.broadcast(true, &round_stop).await });

    let start = tokio::time::Instant::now();
    assert_eq!(b.recv().await, Some(true));
    assert!(start.elapsed() < Duration::from_millis(200));

    let report = round.await.unwrap();
    assert_eq!((report.delivered, report.evicted), (1, 1));
    assert_eq!(a.recv().await, None);
}
