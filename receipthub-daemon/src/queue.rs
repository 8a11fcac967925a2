//! Time-ordered job queue for a single printer.
//!
//! Pending jobs are kept in a min-heap keyed by `(run_at, insertion seq)`, so
//! jobs due at the same instant come out in submission order. All state sits
//! behind one mutex; waiters are woken through a [`Notify`] whenever a job is
//! pushed, which also re-arms the due-time timer when an earlier job arrives.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::Notify;

use receipthub_core::Job;

struct Pending {
    run_at: DateTime<Utc>,
    seq: u64,
    job: Job,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        self.run_at
            .cmp(&other.run_at)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

#[derive(Default)]
struct QueueState {
    pending: BinaryHeap<Reverse<Pending>>,
    next_seq: u64,
}

impl QueueState {
    fn pop_due(&mut self, now: DateTime<Utc>) -> Option<Job> {
        match self.pending.peek() {
            Some(Reverse(head)) if head.run_at <= now => {
                self.pending.pop().map(|Reverse(entry)| entry.job)
            }
            _ => None,
        }
    }

    fn earliest(&self) -> Option<DateTime<Utc>> {
        self.pending.peek().map(|Reverse(head)| head.run_at)
    }
}

/// Pending jobs for one printer. Dequeued jobs are handed over by value; the
/// queue keeps no reference to them.
#[derive(Default)]
pub struct JobQueue {
    state: Mutex<QueueState>,
    wakeup: Notify,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `job` in due-time order and wake any waiting taker.
    pub fn push(&self, job: Job) {
        {
            let mut state = self.state.lock();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.pending.push(Reverse(Pending {
                run_at: job.run_at(),
                seq,
                job,
            }));
        }
        self.wakeup.notify_waiters();
    }

    /// Number of pending jobs.
    pub fn depth(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Non-blocking variant of [`take_next_due`](Self::take_next_due).
    pub fn try_take_due(&self) -> Option<Job> {
        self.state.lock().pop_due(Utc::now())
    }

    /// Wait until the earliest pending job is due and return it.
    ///
    /// An empty queue waits for a push; otherwise the wait is bounded by the
    /// earliest `run_at`, and any push restarts the computation. Dropping the
    /// future never loses a job: removal and return happen in the same poll.
    pub async fn take_next_due(&self) -> Job {
        loop {
            // Register interest before inspecting state so a push between
            // the check and the await still wakes us.
            let notified = self.wakeup.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let wait = {
                let mut state = self.state.lock();
                let now = Utc::now();
                if let Some(job) = state.pop_due(now) {
                    return job;
                }
                state
                    .earliest()
                    .map(|run_at| (run_at - now).to_std().unwrap_or_default())
            };

            match wait {
                None => notified.await,
                Some(delay) => {
                    let _ = tokio::time::timeout(delay, notified).await;
                }
            }
        }
    }
}
