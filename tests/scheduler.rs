//! Concurrency properties of the worker pool and the bucket locks

use jeapcached::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

#[test]
fn in_flight_never_exceeds_worker_count() {
    const WORKERS: usize = 3;

    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut table = DispatchTable::new(&StoreConfig::default());
    let (running_in, peak_in) = (Arc::clone(&running), Arc::clone(&peak));
    table.register(
        Command::Stat,
        Box::new(move |_store: &CacheStore, _request: &mut Request| -> Outcome {
            let now = running_in.fetch_add(1, Ordering::SeqCst) + 1;
            peak_in.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(5));
            running_in.fetch_sub(1, Ordering::SeqCst);
            Ok(Reply::Message(String::new()))
        }),
    );

    let sched = Scheduler::new(
        &SchedulerConfig { workers: WORKERS },
        4096,
        Arc::new(CacheStore::new(16)),
        table,
        Arc::new(Metrics::new()),
    )
    .unwrap();

    thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                for _ in 0..5 {
                    let stats = sched.stats();
                    assert!(stats.in_flight() <= WORKERS as u64);
                    sched
                        .submit_and_await(Job::new(Request::new(Command::Stat)))
                        .unwrap();
                }
            });
        }
    });

    let peak = peak.load(Ordering::SeqCst);
    assert!(peak >= 1);
    assert!(peak <= WORKERS, "{peak} jobs ran at once");

    sched.shutdown();
    let stats = sched.stats();
    assert_eq!(stats.submitted, 40);
    assert_eq!(stats.completed, 40);
}

#[test]
fn sets_on_different_buckets_do_not_block() {
    let store = Arc::new(CacheStore::new(64));
    let sched = Scheduler::new(
        &SchedulerConfig { workers: 2 },
        4096,
        Arc::clone(&store),
        DispatchTable::new(&StoreConfig::default()),
        Arc::new(Metrics::new()),
    )
    .unwrap();

    let held = store.bucket_of(b"held");
    let other = (0..1000)
        .map(|i| format!("key-{i}"))
        .find(|key| store.bucket_of(key.as_bytes()) != held)
        .unwrap();

    let guard = store.bucket(held).lock();
    assert!(store.bucket(held).try_lock().is_none());
    assert!(store.bucket(store.bucket_of(other.as_bytes())).try_lock().is_some());
    let blocked_done = AtomicBool::new(false);

    thread::scope(|s| {
        let blocked = s.spawn(|| {
            let request = Request::new(Command::Set).with_key("held").with_value("1");
            sched.submit_and_await(Job::new(request)).unwrap();
            blocked_done.store(true, Ordering::SeqCst);
        });

        // occupies the second worker while the first waits on the held bucket
        let request = Request::new(Command::Set)
            .with_key(other.clone())
            .with_value("2");
        let job = sched.submit_and_await(Job::new(request)).unwrap().unwrap();
        assert_eq!(job.outcome(), Some(&Ok(Reply::Stored)));

        thread::sleep(Duration::from_millis(50));
        assert!(!blocked_done.load(Ordering::SeqCst));

        drop(guard);
        blocked.join().unwrap();
    });

    assert!(blocked_done.load(Ordering::SeqCst));
    assert!(store.get(b"held").is_ok());
    assert!(store.get(other.as_bytes()).is_ok());
}

#[test]
fn fire_and_forget_jobs_are_completed_by_workers() {
    let sched = Scheduler::new(
        &SchedulerConfig { workers: 2 },
        4096,
        Arc::new(CacheStore::new(16)),
        DispatchTable::default(),
        Arc::new(Metrics::new()),
    )
    .unwrap();

    for i in 0..20 {
        let request = Request::new(Command::Set)
            .with_key(format!("k{i}"))
            .with_value("v")
            .with_noreply(true);
        assert!(sched.submit(Job::new(request)).unwrap().is_none());
    }

    sched.shutdown();
    let stats = sched.stats();
    assert_eq!(stats.completed, 20);
    assert_eq!(sched.store().stats().items, 20);
}

#[test]
fn metrics_follow_the_pool() {
    let metrics = Arc::new(Metrics::new());
    let sched = Scheduler::new(
        &SchedulerConfig { workers: 2 },
        4096,
        Arc::new(CacheStore::new(16)),
        DispatchTable::default(),
        Arc::clone(&metrics),
    )
    .unwrap();

    let set = Request::new(Command::Set).with_key("a").with_value("1");
    sched.submit_and_await(Job::new(set)).unwrap();
    sched
        .submit_and_await(Job::new(Request::new(Command::Get).with_key("a")))
        .unwrap();
    sched
        .submit_and_await(Job::new(Request::new(Command::Get).with_key("b")))
        .unwrap();
    let _ = sched.submit_and_await(Job::new(Request::new(Command::Get)));
    sched.shutdown();

    assert_eq!(metrics.get_hits.get(), 1);
    assert_eq!(metrics.get_misses.get(), 1);
    assert_eq!(metrics.jobs_submitted.get(), 3);
    assert_eq!(metrics.jobs_completed.get(), 3);
    assert_eq!(metrics.jobs_rejected.get(), 1);
    assert_eq!(metrics.jobs_in_flight.get(), 0);
}
