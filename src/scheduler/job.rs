//! Jobs: one in-flight command, its result, and its completion signal

use crate::CacheError;
use crate::protocol::Command;
use crate::storage::Fetched;
use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

/// What a job asks the store to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub command: Command,
    pub key: Option<Bytes>,
    /// Body of a store command. Moves into the store when the command succeeds.
    pub value: Option<Bytes>,
    pub flags: u32,
    /// Absolute expiry (store commands) or grace window end (delete)
    pub exptime: u64,
    /// Token checked by `cas`
    pub cas: u64,
    /// Amount for incr/decr
    pub delta: u64,
    pub noreply: bool,
}

impl Request {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            key: None,
            value: None,
            flags: 0,
            exptime: 0,
            cas: 0,
            delta: 0,
            noreply: false,
        }
    }

    pub fn with_key(mut self, key: impl Into<Bytes>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<Bytes>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_exptime(mut self, exptime: u64) -> Self {
        self.exptime = exptime;
        self
    }

    pub fn with_cas(mut self, cas: u64) -> Self {
        self.cas = cas;
        self
    }

    pub fn with_delta(mut self, delta: u64) -> Self {
        self.delta = delta;
        self
    }

    pub fn with_noreply(mut self, noreply: bool) -> Self {
        self.noreply = noreply;
        self
    }

    /// Body length, 0 when no body is attached
    pub fn length(&self) -> usize {
        self.value.as_ref().map_or(0, Bytes::len)
    }
}

/// Successful outcome of a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Stored,
    Value(Fetched),
    Deleted,
    Number(u64),
    /// Informational text from an administrative command
    Message(String),
}

pub type Outcome = Result<Reply, CacheError>;

/// A unit of work travelling from the frontend to a worker and back
#[derive(Debug)]
pub struct Job {
    id: u64,
    request: Request,
    outcome: Option<Outcome>,
    completion: Option<Arc<Completion>>,
}

impl Job {
    pub fn new(request: Request) -> Self {
        Self {
            id: 0,
            request,
            outcome: None,
            completion: None,
        }
    }

    /// Id assigned at submission, 0 before that
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn command(&self) -> Command {
        self.request.command
    }

    pub fn is_noreply(&self) -> bool {
        self.request.noreply
    }

    /// Result written by the worker, `None` until the job has run
    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    pub fn into_outcome(self) -> Option<Outcome> {
        self.outcome
    }

    pub(crate) fn assign(&mut self, id: u64, completion: Option<Arc<Completion>>) {
        self.id = id;
        self.completion = completion;
    }

    pub(crate) fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    pub(crate) fn set_outcome(&mut self, outcome: Outcome) {
        self.outcome = Some(outcome);
    }

    pub(crate) fn take_completion(&mut self) -> Option<Arc<Completion>> {
        self.completion.take()
    }
}

/// Per-job completion flag. The finished job itself is the flag: the worker
/// parks it here and the submitter takes it back.
#[derive(Debug, Default)]
pub struct Completion {
    done: Mutex<Option<Job>>,
    cond: Condvar,
}

impl Completion {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn finish(&self, job: Job) {
        let mut done = self.done.lock();
        *done = Some(job);
        self.cond.notify_one();
    }

    fn wait(&self) -> Job {
        let mut done = self.done.lock();
        loop {
            if let Some(job) = done.take() {
                return job;
            }
            self.cond.wait(&mut done);
        }
    }
}

/// Handle held by a synchronous submitter
#[derive(Debug)]
pub struct Ticket(pub(crate) Arc<Completion>);

impl Ticket {
    /// Block until the worker has run the job, then take it back
    pub fn wait(self) -> Job {
        self.0.wait()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_request_builder() {
        let req = Request::new(Command::Set)
            .with_key("k")
            .with_value("hello")
            .with_flags(3)
            .with_noreply(true);
        assert_eq!(req.key.as_deref(), Some(&b"k"[..]));
        assert_eq!(req.length(), 5);
        assert_eq!(req.flags, 3);
        assert!(req.noreply);
    }

    #[test]
    fn test_ticket_waits_for_finish() {
        let completion = Arc::new(Completion::new());
        let ticket = Ticket(Arc::clone(&completion));

        let handle = thread::spawn(move || {
            let mut job = Job::new(Request::new(Command::Stat));
            job.set_outcome(Ok(Reply::Stored));
            completion.finish(job);
        });

        let job = ticket.wait();
        handle.join().unwrap();
        assert_eq!(job.outcome(), Some(&Ok(Reply::Stored)));
    }
}
