// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Property tests for the scheduler and the job queue.
//!
//! 1. Wake-up subscriptions are reference counted: an engine stays
//!    subscribed until every `add_wake_up_signal` is balanced.
//! 2. Engines woken before a slice cycle in priority order.
//! 3. A job the queue has finished is never moved back to waiting or
//!    running, except by enqueueing or starting it again.

use std::cell::RefCell;
use std::rc::Rc;

use eagle_core::job::{Job, JobQueue, JobState};
use eagle_core::scheduler::{Cycle, EngineCtx, EngineId, Priority, Scheduler};
use proptest::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────────

type Log = Rc<RefCell<Vec<usize>>>;

fn logging_engine(sched: &mut Scheduler, log: &Log, tag: usize, priority: Priority) -> EngineId {
    let log = Rc::clone(log);
    sched.create_engine(
        move |_: &mut EngineCtx<'_>| {
            log.borrow_mut().push(tag);
            Cycle::Idle
        },
        priority,
    )
}

fn priority_strategy() -> impl Strategy<Value = Priority> {
    prop_oneof![
        Just(Priority::VeryLow),
        Just(Priority::Low),
        Just(Priority::Default),
        Just(Priority::High),
        Just(Priority::VeryHigh),
    ]
}

#[derive(Clone, Copy, Debug)]
enum JobOp {
    Enqueue,
    StartNext,
    Start,
    Abort,
    Succeed,
    Fail,
    FailAllRunning,
}

fn job_op_strategy() -> impl Strategy<Value = (JobOp, usize)> {
    (
        prop_oneof![
            Just(JobOp::Enqueue),
            Just(JobOp::StartNext),
            Just(JobOp::Start),
            Just(JobOp::Abort),
            Just(JobOp::Succeed),
            Just(JobOp::Fail),
            Just(JobOp::FailAllRunning),
        ],
        0_usize..4,
    )
}

// ═════════════════════════════════════════════════════════════════════════
// 1. Subscriptions are reference counted
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn subscription_survives_until_last_removal(refs in 1_u32..6) {
        let mut sched = Scheduler::new();
        let log = Log::default();
        let signal = sched.create_signal();
        let engine = logging_engine(&mut sched, &log, 0, Priority::Default);

        for _ in 0..refs {
            sched.add_wake_up_signal(engine, signal);
        }
        for _ in 1..refs {
            sched.remove_wake_up_signal(engine, signal);
        }
        prop_assert_eq!(sched.wake_up_signal_refs(engine, signal), 1);
        sched.signal(signal);
        sched.do_time_slice();
        prop_assert_eq!(log.borrow().len(), 1, "still subscribed engine not woken");

        sched.remove_wake_up_signal(engine, signal);
        prop_assert_eq!(sched.wake_up_signal_refs(engine, signal), 0);
        sched.signal(signal);
        sched.do_time_slice();
        prop_assert_eq!(log.borrow().len(), 1, "unsubscribed engine woken");

        sched.destroy_engine(engine);
        sched.destroy_signal(signal);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 2. Priority draining order
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn woken_engines_cycle_by_priority(priorities in prop::collection::vec(priority_strategy(), 1..12)) {
        let mut sched = Scheduler::new();
        let log = Log::default();
        let signal = sched.create_signal();
        let engines: Vec<EngineId> = priorities
            .iter()
            .enumerate()
            .map(|(i, &p)| {
                let e = logging_engine(&mut sched, &log, i, p);
                sched.add_wake_up_signal(e, signal);
                e
            })
            .collect();

        sched.signal(signal);
        sched.do_time_slice();

        let order = log.borrow().clone();
        prop_assert_eq!(order.len(), priorities.len(), "every engine cycles exactly once");
        for pair in order.windows(2) {
            prop_assert!(
                priorities[pair[0]] >= priorities[pair[1]],
                "{:?} cycled before {:?}",
                priorities[pair[0]],
                priorities[pair[1]]
            );
        }

        for e in engines {
            sched.destroy_engine(e);
        }
        sched.destroy_signal(signal);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3. Job lifecycle monotonicity
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn finished_jobs_stay_finished(
        priorities in prop::collection::vec(0.0_f64..10.0, 4),
        ops in prop::collection::vec(job_op_strategy(), 1..40),
    ) {
        let mut sched = Scheduler::new();
        let jobs: Vec<Job> = priorities.iter().map(|&p| Job::new(&mut sched, p)).collect();
        let mut queue = JobQueue::new(&sched);

        for (op, i) in ops {
            let before: Vec<JobState> = jobs.iter().map(Job::state).collect();
            match op {
                JobOp::Enqueue => {
                    if !jobs[i].is_queued() {
                        queue.enqueue_job(&jobs[i]);
                    }
                }
                JobOp::StartNext => {
                    queue.start_next_job();
                }
                JobOp::Start => queue.start_job(&jobs[i]),
                JobOp::Abort => queue.abort_job(&jobs[i]),
                JobOp::Succeed => queue.succeed_job(&jobs[i]),
                JobOp::Fail => queue.fail_job(&jobs[i], "failed"),
                JobOp::FailAllRunning => queue.fail_all_running_jobs("failed"),
            }
            for (j, job) in jobs.iter().enumerate() {
                // Enqueueing or starting a job by hand begins a new life.
                let restarted = matches!(op, JobOp::Enqueue | JobOp::Start) && j == i;
                if before[j].is_terminal() && !restarted {
                    prop_assert_eq!(job.state(), before[j], "job {} left a terminal state", j);
                }
            }
            prop_assert_eq!(
                queue.waiting_count() + queue.running_count(),
                jobs.iter().filter(|j| j.is_queued()).count()
            );
        }

        drop(queue);
        for job in &jobs {
            prop_assert_ne!(job.state(), JobState::Waiting);
            prop_assert_ne!(job.state(), JobState::Running);
        }
    }
}
