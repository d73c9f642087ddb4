//! # Job queue: ordered job identifiers with an optional ring policy.
//!
//! [`JobQueue`] hands out job identifiers to the process supervisor, one per spawn.
//!
//! ## Dequeue order
//! Jobs are taken from the **tail** of the configured list, so the last listed job runs first:
//! ```text
//! QUEUE = ["j1", "j2", "j3"]
//!
//! loop = false:  next → j3, next → j2, next → j1, next → None (drained)
//! loop = true:   next → j3 [j3 j1 j2], next → j2 [j2 j3 j1], next → j1 [j1 j2 j3], next → j3 ...
//! ```
//!
//! ## Rules
//! - `loop = false`: every identifier is handed out exactly once; length never grows.
//! - `loop = true`: the dequeued identifier is re-inserted at the head, so length and the
//!   set of identifiers never change and `next_job` only returns `None` for an empty queue.
//! - An empty queue is drained from the start, looping or not.

use std::collections::VecDeque;

/// Ordered job identifiers consumed by the coordinator's sequencing step.
#[derive(Debug, Clone)]
pub struct JobQueue {
    jobs: VecDeque<String>,
    looping: bool,
    current: Option<String>,
    dequeued: u64,
}

impl JobQueue {
    /// Creates a queue over `jobs` in their listed order.
    pub fn new<I, S>(jobs: I, looping: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            jobs: jobs.into_iter().map(Into::into).collect(),
            looping,
            current: None,
            dequeued: 0,
        }
    }

    /// Removes the tail identifier and returns it.
    ///
    /// With looping enabled the identifier is pushed back at the head before returning.
    /// Returns `None` when nothing is left; this is not an error.
    pub fn next_job(&mut self) -> Option<String> {
        let job = self.jobs.pop_back()?;
        if self.looping {
            self.jobs.push_front(job.clone());
        }
        self.dequeued += 1;
        self.current = Some(job.clone());
        Some(job)
    }

    /// True iff there is nothing left to hand out.
    ///
    /// A non-empty looping queue is never drained.
    #[inline]
    pub fn is_drained(&self) -> bool {
        self.jobs.is_empty()
    }

    /// The identifier handed out by the last successful [`next_job`](Self::next_job).
    #[inline]
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Puts back the identifier just returned by [`next_job`](Self::next_job), which becomes
    /// the next one handed out again. Used when the spawn for it never happened.
    pub fn requeue(&mut self, job: String) {
        if self.looping && self.jobs.front() == Some(&job) {
            self.jobs.pop_front();
        }
        self.jobs.push_back(job);
        self.dequeued = self.dequeued.saturating_sub(1);
    }

    /// Number of identifiers still in the queue.
    #[inline]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// True if the queue holds no identifiers.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Total successful dequeues over the queue's lifetime.
    #[inline]
    pub fn dequeued(&self) -> u64 {
        self.dequeued
    }
}
