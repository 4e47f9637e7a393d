//! Single-slot job handoff feeding a fixed pool of worker threads
//!
//! A submitter may place a job in the slot only when a worker is idle, the
//! slot is empty and fewer than `workers` jobs are in flight. That keeps
//! backpressure trivial: the frontend can never run ahead of the pool.
//!
//! Three lock domains are in play and none is ever held while taking
//! another: the scheduler state lock below, the bucket locks inside the
//! store, and each job's completion lock.

pub mod dispatch;
pub mod job;

pub use dispatch::{DispatchTable, Handler, VERSION};
pub use job::{Job, Outcome, Reply, Request, Ticket};

use crate::config::SchedulerConfig;
use crate::metrics::Metrics;
use crate::protocol::Command;
use crate::storage::CacheStore;
use crate::{CacheError, JeapError};
use job::Completion;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Counters guarded by the scheduler lock
#[derive(Debug, Default)]
struct State {
    slot: Option<Job>,
    idle: usize,
    submitted: u64,
    completed: u64,
    stopping: bool,
}

impl State {
    fn in_flight(&self) -> u64 {
        self.submitted - self.completed
    }
}

/// Snapshot of scheduler counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStats {
    pub submitted: u64,
    pub completed: u64,
    pub idle: usize,
}

impl SchedulerStats {
    pub fn in_flight(&self) -> u64 {
        self.submitted - self.completed
    }
}

struct Shared {
    state: Mutex<State>,
    /// Workers wait here for the slot to fill
    work_ready: Condvar,
    /// Submitters wait here for the admission predicate
    slot_free: Condvar,
    workers: usize,
    max_value_length: usize,
    store: Arc<CacheStore>,
    dispatch: DispatchTable,
    metrics: Arc<Metrics>,
}

impl Shared {
    /// Worker side of the handoff. `None` tells the worker to retire.
    fn take(&self, worker: usize) -> Option<Job> {
        let mut state = self.state.lock();
        loop {
            if let Some(job) = state.slot.take() {
                debug!(worker, job = job.id(), "Worker claimed job");
                self.slot_free.notify_all();
                return Some(job);
            }
            if state.stopping {
                debug!(worker, "Worker retired");
                return None;
            }

            state.idle += 1;
            // a submitter may be waiting for an idle worker
            self.slot_free.notify_all();
            self.work_ready.wait(&mut state);
            state.idle -= 1;
        }
    }

    /// Signal the job's submitter, then account for the completion
    fn complete(&self, mut job: Job) {
        let id = job.id();
        match job.take_completion() {
            Some(completion) => completion.finish(job),
            None => drop(job),
        }

        let mut state = self.state.lock();
        state.completed += 1;
        self.metrics.jobs_completed.inc();
        self.metrics.jobs_in_flight.set(state.in_flight() as i64);
        self.slot_free.notify_all();
        drop(state);

        debug!(job = id, "Job completed");
    }

    fn run_worker(&self, worker: usize) {
        while let Some(mut job) = self.take(worker) {
            let command = job.command();
            let start = Instant::now();

            let outcome = self.dispatch.dispatch(&self.store, job.request_mut());

            self.metrics.cmd_latency.observe(start.elapsed().as_secs_f64());
            self.metrics.record_command(command);
            match (&outcome, command) {
                (Ok(_), Command::Get | Command::Gets) => self.metrics.get_hits.inc(),
                (Err(CacheError::NotFound), Command::Get | Command::Gets) => {
                    self.metrics.get_misses.inc();
                }
                (Err(e), _) if e.is_fatal() => fatal(*e, job.id()),
                _ => {}
            }

            job.set_outcome(outcome);
            self.complete(job);
        }
    }
}

/// Terminate the process on a detected structural failure
fn fatal(err: CacheError, job: u64) -> ! {
    error!(job, error = %err, "Unrecoverable store failure, terminating");
    std::process::exit(1);
}

/// The job scheduler and its worker pool
pub struct Scheduler {
    shared: Arc<Shared>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    /// Start `config.workers` worker threads over `store`
    pub fn new(
        config: &SchedulerConfig,
        max_value_length: usize,
        store: Arc<CacheStore>,
        dispatch: DispatchTable,
        metrics: Arc<Metrics>,
    ) -> crate::Result<Self> {
        if config.workers == 0 {
            return Err(JeapError::Scheduler("worker pool cannot be empty".to_string()));
        }

        let shared = Arc::new(Shared {
            state: Mutex::new(State::default()),
            work_ready: Condvar::new(),
            slot_free: Condvar::new(),
            workers: config.workers,
            max_value_length,
            store,
            dispatch,
            metrics,
        });

        let scheduler = Self {
            shared,
            handles: Mutex::new(Vec::with_capacity(config.workers)),
        };

        for worker in 0..config.workers {
            let shared = Arc::clone(&scheduler.shared);
            let handle = std::thread::Builder::new()
                .name(format!("worker-{worker}"))
                .spawn(move || shared.run_worker(worker))
                // dropping the scheduler retires the workers already started
                .map_err(|e| JeapError::Scheduler(format!("Failed to spawn worker: {e}")))?;
            scheduler.handles.lock().push(handle);
        }

        info!(workers = config.workers, "Scheduler started");

        Ok(scheduler)
    }

    /// Number of worker threads, also the in-flight bound
    pub fn workers(&self) -> usize {
        self.shared.workers
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.shared.store
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.shared.metrics
    }

    /// Largest body a store command may carry
    pub fn max_value_length(&self) -> usize {
        self.shared.max_value_length
    }

    pub fn stats(&self) -> SchedulerStats {
        let state = self.shared.state.lock();
        SchedulerStats {
            submitted: state.submitted,
            completed: state.completed,
            idle: state.idle,
        }
    }

    /// Checks a job must pass before it may enter the slot
    pub fn validate(&self, request: &Request) -> Result<(), CacheError> {
        if request.command.needs_key() && request.key.as_ref().is_none_or(|k| k.is_empty()) {
            return Err(CacheError::NotStored);
        }
        if request.command.is_store()
            && (request.value.is_none() || request.length() > self.shared.max_value_length)
        {
            return Err(CacheError::NotStored);
        }
        if !self.shared.dispatch.is_registered(request.command) {
            return Err(CacheError::NotImplement);
        }
        Ok(())
    }

    /// Hand `job` to a worker.
    ///
    /// Blocks until a worker is idle, the slot is empty and the in-flight
    /// bound allows another job. Returns a ticket to wait on unless the job
    /// is `noreply`, in which case the worker disposes of it.
    pub fn submit(&self, mut job: Job) -> Result<Option<Ticket>, CacheError> {
        if let Err(e) = self.validate(job.request()) {
            self.shared.metrics.jobs_rejected.inc();
            warn!(command = job.command().name(), error = %e, "Rejected job at submission");
            return Err(e);
        }

        let completion = (!job.is_noreply()).then(|| Arc::new(Completion::new()));

        let shared = &self.shared;
        let mut state = shared.state.lock();
        while !state.stopping
            && !(state.idle > 0
                && state.slot.is_none()
                && state.in_flight() < shared.workers as u64)
        {
            shared.slot_free.wait(&mut state);
        }
        if state.stopping {
            return Err(CacheError::ShuttingDown);
        }

        state.submitted += 1;
        let id = state.submitted;
        job.assign(id, completion.clone());
        debug!(job = id, command = job.command().name(), "Submitted job");
        state.slot = Some(job);
        shared.metrics.jobs_submitted.inc();
        shared.metrics.jobs_in_flight.set(state.in_flight() as i64);
        shared.work_ready.notify_all();
        drop(state);

        Ok(completion.map(Ticket))
    }

    /// Submit and, unless the job is `noreply`, wait for it to finish.
    ///
    /// `Ok(None)` means the job was fire-and-forget.
    pub fn submit_and_await(&self, job: Job) -> Result<Option<Job>, CacheError> {
        Ok(self.submit(job)?.map(Ticket::wait))
    }

    /// Stop accepting jobs, wake every idle worker and join the pool.
    ///
    /// A job already in the slot is still claimed and run before its
    /// worker retires. Calling this more than once is harmless.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock();
            if !state.stopping {
                info!("Scheduler stopping");
            }
            state.stopping = true;
            self.shared.work_ready.notify_all();
            self.shared.slot_free.notify_all();
        }

        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                error!("Worker thread panicked");
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;

    fn scheduler(workers: usize) -> Scheduler {
        Scheduler::new(
            &SchedulerConfig { workers },
            4096,
            Arc::new(CacheStore::new(64)),
            DispatchTable::new(&StoreConfig::default()),
            Arc::new(Metrics::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_ids_are_monotonic() {
        let sched = scheduler(2);
        let mut last = 0;
        for _ in 0..10 {
            let job = sched
                .submit_and_await(Job::new(Request::new(Command::Stat)))
                .unwrap()
                .unwrap();
            assert!(job.id() > last);
            last = job.id();
        }
    }

    #[test]
    fn test_noreply_returns_nothing() {
        let sched = scheduler(1);
        let job = Job::new(
            Request::new(Command::Set)
                .with_key("k")
                .with_value("v")
                .with_noreply(true),
        );
        assert!(sched.submit_and_await(job).unwrap().is_none());

        // the following synchronous job runs after the fire-and-forget one
        let job = sched
            .submit_and_await(Job::new(Request::new(Command::Get).with_key("k")))
            .unwrap()
            .unwrap();
        assert!(matches!(job.outcome(), Some(Ok(Reply::Value(_)))));
    }

    #[test]
    fn test_missing_key_rejected() {
        let sched = scheduler(1);
        let job = Job::new(Request::new(Command::Get));
        assert_eq!(sched.submit_and_await(job).unwrap_err(), CacheError::NotStored);
        assert_eq!(sched.stats().submitted, 0);
    }

    #[test]
    fn test_oversized_value_rejected() {
        let sched = scheduler(1);
        let job = Job::new(
            Request::new(Command::Set)
                .with_key("big")
                .with_value(vec![b'x'; 5000]),
        );
        assert_eq!(sched.submit_and_await(job).unwrap_err(), CacheError::NotStored);
        assert_eq!(sched.store().stats().items, 0);
    }

    #[test]
    fn test_unregistered_rejected_up_front() {
        let sched = Scheduler::new(
            &SchedulerConfig { workers: 1 },
            4096,
            Arc::new(CacheStore::new(4)),
            DispatchTable::empty(),
            Arc::new(Metrics::new()),
        )
        .unwrap();
        let job = Job::new(Request::new(Command::Stat));
        assert_eq!(sched.submit_and_await(job).unwrap_err(), CacheError::NotImplement);
    }

    #[test]
    fn test_submit_after_shutdown() {
        let sched = scheduler(2);
        sched.shutdown();
        let job = Job::new(Request::new(Command::Stat));
        assert_eq!(sched.submit(job).unwrap_err(), CacheError::ShuttingDown);
    }

    #[test]
    fn test_counters_balance() {
        let sched = scheduler(3);
        for i in 0..50u32 {
            let job = Job::new(
                Request::new(Command::Set)
                    .with_key(format!("k{i}"))
                    .with_value("v"),
            );
            sched.submit_and_await(job).unwrap();
        }
        // completion is counted just after the submitter is woken
        sched.shutdown();
        let stats = sched.stats();
        assert_eq!(stats.submitted, 50);
        assert_eq!(stats.completed, 50);
        assert_eq!(stats.in_flight(), 0);
        assert_eq!(sched.store().stats().items, 50);
    }

    #[test]
    fn test_zero_workers_is_an_error() {
        let result = Scheduler::new(
            &SchedulerConfig { workers: 0 },
            4096,
            Arc::new(CacheStore::new(4)),
            DispatchTable::default(),
            Arc::new(Metrics::new()),
        );
        assert!(result.is_err());
    }
}
