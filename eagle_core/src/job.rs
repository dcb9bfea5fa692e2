// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Prioritized jobs and job queues.
//!
//! A [`Job`] is a shared handle to a unit of work whose execution is driven
//! by whoever owns the [`JobQueue`]. The queue keeps a waiting list (sorted
//! by descending priority, FIFO among equals) and a running list. Every state
//! change fires the job's state signal.
//!
//! Once a job reached a terminal state ([`JobState::Aborted`],
//! [`JobState::Success`], [`JobState::Error`]) the queue only moves it again
//! when it is explicitly re-enqueued.

use core::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::scheduler::{Scheduler, SchedulerHandle, SignalId};

/// Lifecycle state of a [`Job`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JobState {
    /// Never enqueued, or not yet.
    NotEnqueued,
    /// In a queue's waiting list.
    Waiting,
    /// In a queue's running list.
    Running,
    /// Removed by [`JobQueue::abort_job`].
    Aborted,
    /// Finished by [`JobQueue::succeed_job`].
    Success,
    /// Finished by [`JobQueue::fail_job`].
    Error,
}

impl JobState {
    /// Whether the state is final until the job is re-enqueued.
    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Aborted | Self::Success | Self::Error)
    }
}

#[derive(Debug)]
struct QueueShared {
    id: u64,
    unsorted: AtomicBool,
}

#[derive(Debug)]
struct JobData {
    priority: f64,
    state: JobState,
    error_text: String,
    queue: Option<Arc<QueueShared>>,
}

struct JobInner {
    data: Mutex<JobData>,
    signal: SignalId,
    handle: SchedulerHandle,
}

impl Drop for JobInner {
    fn drop(&mut self) {
        self.handle.release_signal(self.signal);
    }
}

/// A cloneable handle to a job. Clones share state.
#[derive(Clone)]
pub struct Job {
    inner: Arc<JobInner>,
}

impl Job {
    /// Creates a job in [`JobState::NotEnqueued`].
    pub fn new(sched: &mut Scheduler, priority: f64) -> Self {
        Self {
            inner: Arc::new(JobInner {
                data: Mutex::new(JobData {
                    priority,
                    state: JobState::NotEnqueued,
                    error_text: String::new(),
                    queue: None,
                }),
                signal: sched.create_signal(),
                handle: sched.handle(),
            }),
        }
    }

    /// Current priority. Higher runs first.
    #[must_use]
    pub fn priority(&self) -> f64 {
        self.inner.data.lock().priority
    }

    /// Changes the priority. A waiting job gets re-sorted on the next
    /// [`JobQueue::start_next_job`].
    pub fn set_priority(&self, priority: f64) {
        let mut data = self.inner.data.lock();
        if data.priority != priority {
            data.priority = priority;
            if data.state == JobState::Waiting {
                if let Some(q) = &data.queue {
                    q.unsorted.store(true, Ordering::Relaxed);
                }
            }
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> JobState {
        self.inner.data.lock().state
    }

    /// Error message of a failed job; empty otherwise.
    #[must_use]
    pub fn error_text(&self) -> String {
        self.inner.data.lock().error_text.clone()
    }

    /// Fired on every state change.
    #[inline]
    #[must_use]
    pub fn state_signal(&self) -> SignalId {
        self.inner.signal
    }

    /// Whether the job is in any queue.
    #[must_use]
    pub fn is_queued(&self) -> bool {
        self.inner.data.lock().queue.is_some()
    }

    /// Whether two handles refer to the same job.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.inner.data.lock();
        f.debug_struct("Job")
            .field("priority", &data.priority)
            .field("state", &data.state)
            .finish_non_exhaustive()
    }
}

static NEXT_QUEUE_ID: AtomicU64 = AtomicU64::new(1);

/// A queue of jobs.
///
/// Dropping the queue aborts every job still in it.
pub struct JobQueue {
    shared: Arc<QueueShared>,
    handle: SchedulerHandle,
    waiting: Vec<Job>,
    running: Vec<Job>,
}

impl JobQueue {
    /// Creates an empty queue whose signals go to `sched`.
    #[must_use]
    pub fn new(sched: &Scheduler) -> Self {
        Self {
            shared: Arc::new(QueueShared {
                id: NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed),
                unsorted: AtomicBool::new(false),
            }),
            handle: sched.handle(),
            waiting: Vec::new(),
            running: Vec::new(),
        }
    }

    /// Appends a job to the waiting list.
    ///
    /// # Panics
    ///
    /// Panics if the job already is in a queue.
    pub fn enqueue_job(&mut self, job: &Job) {
        {
            let mut data = job.inner.data.lock();
            assert!(data.queue.is_none(), "enqueue_job: job already in a queue");
            data.queue = Some(Arc::clone(&self.shared));
            data.state = JobState::Waiting;
            data.error_text.clear();
        }
        self.waiting.push(job.clone());
        self.shared.unsorted.store(true, Ordering::Relaxed);
        self.handle.signal(job.inner.signal);
    }

    /// Starts the waiting job with the highest priority (FIFO among equal
    /// priorities) and returns it.
    pub fn start_next_job(&mut self) -> Option<Job> {
        self.update_sorting();
        let job = self.waiting.first()?.clone();
        self.start_job(&job);
        Some(job)
    }

    /// Moves a job to the running list. A job not in any queue joins this
    /// one. A running job is left alone.
    ///
    /// # Panics
    ///
    /// Panics if the job is in a different queue.
    pub fn start_job(&mut self, job: &Job) {
        {
            let mut data = job.inner.data.lock();
            if data.state == JobState::Running {
                return;
            }
            if let Some(q) = &data.queue {
                assert!(q.id == self.shared.id, "start_job: job is in a different queue");
            } else {
                data.queue = Some(Arc::clone(&self.shared));
            }
            data.state = JobState::Running;
        }
        remove_from(&mut self.waiting, job);
        self.running.push(job.clone());
        self.handle.signal(job.inner.signal);
    }

    /// Aborts a job and removes it from the queue.
    ///
    /// # Panics
    ///
    /// Panics if the job is in a different queue.
    pub fn abort_job(&mut self, job: &Job) {
        self.finish(job, JobState::Aborted, None, "abort_job");
    }

    /// Marks a job successful and removes it from the queue.
    ///
    /// # Panics
    ///
    /// Panics if the job is in a different queue.
    pub fn succeed_job(&mut self, job: &Job) {
        self.finish(job, JobState::Success, None, "succeed_job");
    }

    /// Marks a job failed with `error_text` and removes it from the queue.
    ///
    /// # Panics
    ///
    /// Panics if the job is in a different queue.
    pub fn fail_job(&mut self, job: &Job, error_text: &str) {
        self.finish(job, JobState::Error, Some(error_text), "fail_job");
    }

    /// Fails every running job.
    pub fn fail_all_running_jobs(&mut self, error_text: &str) {
        while let Some(job) = self.running.first().cloned() {
            self.fail_job(&job, error_text);
        }
    }

    /// Fails every job, running ones first.
    pub fn fail_all_jobs(&mut self, error_text: &str) {
        self.fail_all_running_jobs(error_text);
        while let Some(job) = self.waiting.first().cloned() {
            self.fail_job(&job, error_text);
        }
    }

    /// The waiting job that [`start_next_job`](Self::start_next_job) would
    /// pick.
    pub fn first_waiting_job(&mut self) -> Option<&Job> {
        self.update_sorting();
        self.waiting.first()
    }

    /// The job that has been running the longest.
    #[must_use]
    pub fn first_running_job(&self) -> Option<&Job> {
        self.running.first()
    }

    /// Whether no job is waiting or running.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty() && self.running.is_empty()
    }

    /// Number of waiting jobs.
    #[must_use]
    pub fn waiting_count(&self) -> usize {
        self.waiting.len()
    }

    /// Number of running jobs.
    #[must_use]
    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    fn finish(&mut self, job: &Job, state: JobState, error_text: Option<&str>, op: &str) {
        {
            let mut data = job.inner.data.lock();
            match &data.queue {
                Some(q) => assert!(q.id == self.shared.id, "{op}: job is in a different queue"),
                // Terminal states only end with a new enqueue.
                None if data.state.is_terminal() => return,
                None => {}
            }
            data.state = state;
            if let Some(text) = error_text {
                data.error_text = text.to_owned();
            }
            data.queue = None;
        }
        if !remove_from(&mut self.running, job) {
            remove_from(&mut self.waiting, job);
        }
        self.handle.signal(job.inner.signal);
    }

    fn update_sorting(&mut self) {
        if self.shared.unsorted.swap(false, Ordering::Relaxed) {
            // Stable, so equal priorities keep their enqueue order.
            self.waiting
                .sort_by(|a, b| b.priority().total_cmp(&a.priority()));
        }
    }
}

fn remove_from(list: &mut Vec<Job>, job: &Job) -> bool {
    match list.iter().position(|j| Job::ptr_eq(j, job)) {
        Some(i) => {
            list.remove(i);
            true
        }
        None => false,
    }
}

impl Drop for JobQueue {
    fn drop(&mut self) {
        while let Some(job) = self.running.first().cloned() {
            self.abort_job(&job);
        }
        while let Some(job) = self.waiting.first().cloned() {
            self.abort_job(&job);
        }
    }
}

impl fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobQueue")
            .field("waiting", &self.waiting.len())
            .field("running", &self.running.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highest_priority_starts_first() {
        let mut sched = Scheduler::new();
        let mut queue = JobQueue::new(&sched);
        let jobs: Vec<Job> = [1.0, 5.0, 2.0]
            .into_iter()
            .map(|p| Job::new(&mut sched, p))
            .collect();
        for j in &jobs {
            queue.enqueue_job(j);
        }
        assert!(jobs.iter().all(|j| j.state() == JobState::Waiting));

        let first = queue.start_next_job().unwrap();
        assert!(Job::ptr_eq(&first, &jobs[1]), "priority 5.0 starts first");
        assert_eq!(first.state(), JobState::Running);
        let second = queue.start_next_job().unwrap();
        assert!(Job::ptr_eq(&second, &jobs[2]));
        assert_eq!(queue.running_count(), 2);
        assert_eq!(queue.waiting_count(), 1);
    }

    #[test]
    fn equal_priorities_keep_fifo_order() {
        let mut sched = Scheduler::new();
        let mut queue = JobQueue::new(&sched);
        let a = Job::new(&mut sched, 1.0);
        let b = Job::new(&mut sched, 1.0);
        queue.enqueue_job(&a);
        queue.enqueue_job(&b);
        assert!(Job::ptr_eq(queue.first_waiting_job().unwrap(), &a));
        b.set_priority(2.0);
        assert!(Job::ptr_eq(queue.first_waiting_job().unwrap(), &b), "re-sorted");
    }

    #[test]
    fn finishing_removes_and_signals() {
        let mut sched = Scheduler::new();
        let mut queue = JobQueue::new(&sched);
        let job = Job::new(&mut sched, 0.0);
        queue.enqueue_job(&job);
        sched.do_time_slice();
        queue.start_job(&job);
        queue.fail_job(&job, "disk full");
        assert_eq!(job.state(), JobState::Error);
        assert_eq!(job.error_text(), "disk full");
        assert!(!job.is_queued());
        assert!(queue.is_empty());

        // A terminal job is not moved by the queue.
        queue.abort_job(&job);
        assert_eq!(job.state(), JobState::Error);

        // Re-enqueueing starts a fresh life.
        queue.enqueue_job(&job);
        assert_eq!(job.state(), JobState::Waiting);
        assert!(job.error_text().is_empty());
    }

    #[test]
    #[should_panic(expected = "already in a queue")]
    fn double_enqueue_panics() {
        let mut sched = Scheduler::new();
        let mut queue = JobQueue::new(&sched);
        let job = Job::new(&mut sched, 0.0);
        queue.enqueue_job(&job);
        queue.enqueue_job(&job);
    }

    #[test]
    #[should_panic(expected = "different queue")]
    fn starting_in_other_queue_panics() {
        let mut sched = Scheduler::new();
        let mut q1 = JobQueue::new(&sched);
        let mut q2 = JobQueue::new(&sched);
        let job = Job::new(&mut sched, 0.0);
        q1.enqueue_job(&job);
        q2.start_job(&job);
    }

    #[test]
    fn fail_all_and_drop_abort() {
        let mut sched = Scheduler::new();
        let mut queue = JobQueue::new(&sched);
        let a = Job::new(&mut sched, 0.0);
        let b = Job::new(&mut sched, 0.0);
        let c = Job::new(&mut sched, 0.0);
        queue.enqueue_job(&a);
        queue.enqueue_job(&b);
        queue.start_job(&a);
        queue.fail_all_running_jobs("stop");
        assert_eq!(a.state(), JobState::Error);
        assert_eq!(b.state(), JobState::Waiting);
        queue.fail_all_jobs("all");
        assert_eq!(b.error_text(), "all");

        queue.enqueue_job(&c);
        drop(queue);
        assert_eq!(c.state(), JobState::Aborted);
        assert!(!c.is_queued());
    }
}
