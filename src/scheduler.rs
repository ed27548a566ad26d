//! # Scheduler Core
//!
//! The preemptive, priority-based scheduling logic. This module is pure
//! bookkeeping over the [`Scheduler`] value: it decides *which* task runs
//! next, while the instruction-level work of actually switching register
//! frames lives in the `arch` port layer. Keeping the two apart makes the
//! core target-agnostic and unit-testable on the host.
//!
//! ## Scheduling algorithm
//!
//! Every state change funnels into [`Scheduler::check_for_activation`]:
//!
//! 1. **Timer tick** (`tick`): advance the system time, serve the absolute
//!    and delay timers of every suspended task, run the round-robin slice of
//!    the active task, then scan for activation.
//! 2. **Event post** (`post_events`): broadcast the vector into the posted
//!    set of every suspended waiter, then scan for activation.
//! 3. **Suspension** (`suspend_active`): take the caller out of its ready
//!    queue, store its resume condition, and pick the new active task.
//!
//! The active task is always the head of the highest non-empty priority
//! class; the idle task is the fallback when every class is empty. Within a
//! class the queue is strict FIFO of release, so a newly released task never
//! preempts an equal-priority task that is already due.

use crate::arch::avr;
use crate::config::{
    SignedTick, Tick, MAX_TASKS_PER_PRIO_CLASS, MIN_STACK_SIZE, NUM_PRIO_CLASSES, NUM_TASKS,
};
use crate::event::{EventMask, EVT_ABSOLUTE_TIMER, EVT_DELAY_TIMER, TIMER_EVENTS};
use crate::task::{Task, TaskFn};

/// Index of a task in the descriptor array. The descriptor array is tiny,
/// so a byte-sized id keeps the queues compact.
pub type TaskId = u8;

/// The id of the implicit idle task, one past the application tasks.
pub const IDLE_TASK_ID: usize = NUM_TASKS;

// ---------------------------------------------------------------------------
// Scheduler state
// ---------------------------------------------------------------------------

/// The complete kernel state: descriptor store, ready queues, suspended
/// list and the system time. Lives as a single `static mut` in `kernel.rs`;
/// every mutation happens either inside an interrupt service routine (with
/// interrupts already masked by hardware) or inside a critical section.
pub struct Scheduler {
    /// All task descriptors. Index `0..NUM_TASKS` are the application
    /// tasks; the last element is the idle task, of which only the saved
    /// stack pointer is really used.
    pub tasks: [Task; NUM_TASKS + 1],

    /// Per-class ready queues, ordered FIFO by release. The head of the
    /// highest non-empty class is the active task.
    pub due: [[TaskId; MAX_TASKS_PER_PRIO_CLASS]; NUM_PRIO_CLASSES],

    /// Number of due tasks per priority class.
    pub due_count: [u8; NUM_PRIO_CLASSES],

    /// Tasks currently blocked waiting for events or timers.
    pub suspended: [TaskId; NUM_TASKS],

    /// Number of currently suspended tasks.
    pub suspended_count: u8,

    /// The one and only active task; the idle task when nothing is due.
    pub active: TaskId,

    /// The task whose context must be saved by the next stack switch. Set
    /// just before a switch is requested, consumed by the port layer.
    pub outgoing: TaskId,

    /// The cyclic system time. Starts at all-ones so that the very first
    /// tick executes at time zero, which makes task startup timing
    /// predictable for the application.
    pub time: Tick,
}

impl Scheduler {
    /// A scheduler with no tasks configured and the idle task active.
    pub const fn new() -> Self {
        Self {
            tasks: [Task::EMPTY; NUM_TASKS + 1],
            due: [[0; MAX_TASKS_PER_PRIO_CLASS]; NUM_PRIO_CLASSES],
            due_count: [0; NUM_PRIO_CLASSES],
            suspended: [0; NUM_TASKS],
            suspended_count: 0,
            active: IDLE_TASK_ID as TaskId,
            outgoing: IDLE_TASK_ID as TaskId,
            time: Tick::MAX,
        }
    }

    // -----------------------------------------------------------------------
    // Initialization
    // -----------------------------------------------------------------------

    /// Fill in the application-defined part of one task descriptor.
    ///
    /// Called once per task, from the application's `setup` callback. The
    /// start condition is expressed exactly like a later
    /// `wait_for_event`: an event set, the any/all flag and a timeout.
    #[allow(clippy::too_many_arguments)]
    pub fn initialize_task(
        &mut self,
        idx: usize,
        task_fn: TaskFn,
        prio_class: u8,
        #[cfg(feature = "round-robin")] time_round_robin: Tick,
        stack_area: *mut u8,
        stack_size: u16,
        start_event_mask: EventMask,
        start_by_all_events: bool,
        start_timeout: Tick,
    ) {
        assert!(idx < NUM_TASKS);
        assert!((prio_class as usize) < NUM_PRIO_CLASSES);

        let t = &mut self.tasks[idx];
        t.task_fn = Some(task_fn);
        t.stack_area = stack_area;
        t.stack_size = stack_size;
        t.prio_class = prio_class;
        #[cfg(feature = "round-robin")]
        {
            t.time_round_robin = time_round_robin;
        }
        t.cnt_delay = 0;
        t.time_due_at = 0;
        self.store_resume_condition(idx, start_event_mask, start_by_all_events, start_timeout);
    }

    /// Prepare every task for its first activation and suspend them all.
    ///
    /// Builds the initial register frame on each task's stack (so the first
    /// switch into the task looks exactly like any later resume), fills the
    /// unused stack area with the inspection pattern, and moves all tasks
    /// into the suspended list. The idle task descriptor keeps only its
    /// stack pointer slot; everything else stays inert.
    pub fn prepare(&mut self) {
        for idx in 0..NUM_TASKS {
            let t = &mut self.tasks[idx];
            let entry = match t.task_fn {
                Some(f) => f,
                None => panic!("task not initialized"),
            };
            assert!(!t.stack_area.is_null() && t.stack_size >= MIN_STACK_SIZE);

            t.stack_pointer =
                unsafe { avr::prepare_task_stack(t.stack_area, t.stack_size, entry) };

            #[cfg(feature = "round-robin")]
            {
                // Reloaded when the task becomes due; the value until then
                // doesn't matter.
                t.cnt_round_robin = 0;
            }
            t.posted_event_vec = 0;
            t.cnt_overrun = 0;

            self.suspended[idx] = idx as TaskId;
        }
        self.suspended_count = NUM_TASKS as u8;

        // The idle task only ever lends its stack pointer slot to the
        // switch code. Its posted event set must stay zero forever,
        // otherwise a resume of idle would corrupt the stack by pushing a
        // return code nobody expects.
        let idle = &mut self.tasks[IDLE_TASK_ID];
        idle.stack_pointer = 0;
        idle.posted_event_vec = 0;
        idle.event_mask = 0;
        idle.wait_for_any = true;

        for count in self.due_count.iter_mut() {
            *count = 0;
        }
        self.active = IDLE_TASK_ID as TaskId;
        self.outgoing = IDLE_TASK_ID as TaskId;
    }

    // -----------------------------------------------------------------------
    // Activation scan
    // -----------------------------------------------------------------------

    /// Move every released task from the suspended list into the ready
    /// queue of its class, then determine the active task.
    ///
    /// Returns true when the active task changed; the old and new active
    /// ids are then found in `outgoing` and `active` and the caller is
    /// expected to perform the stack switch. `force_rescan` requests the
    /// active-task search even if no task was released (used after a
    /// round-robin rotation).
    pub fn check_for_activation(&mut self, force_rescan: bool) -> bool {
        let mut rescan = force_rescan;

        let mut idx = 0;
        while idx < self.suspended_count as usize {
            let id = self.suspended[idx];
            if self.tasks[id as usize].is_released() {
                let prio = {
                    let t = &mut self.tasks[id as usize];
                    // The mask is spent; the next suspend call reloads it.
                    // The posted set is deliberately kept: the switch code
                    // reads it to tell a first resume from a preemption
                    // resume, and only the switch code clears it.
                    t.event_mask = 0;
                    #[cfg(feature = "round-robin")]
                    t.reload_time_slice();
                    t.prio_class as usize
                };

                let tail = self.due_count[prio] as usize;
                debug_assert!(tail < MAX_TASKS_PER_PRIO_CLASS);
                self.due[prio][tail] = id;
                self.due_count[prio] += 1;

                self.suspended_count -= 1;
                for u in idx..self.suspended_count as usize {
                    self.suspended[u] = self.suspended[u + 1];
                }

                rescan = true;
            } else {
                idx += 1;
            }
        }

        if rescan {
            // The task to return to is the head of the highest non-empty
            // class. A released task may well be of lower priority than the
            // one running, in which case there is no switch after all.
            for prio in (0..NUM_PRIO_CLASSES).rev() {
                if self.due_count[prio] > 0 {
                    let head = self.due[prio][0];
                    if head != self.active {
                        self.outgoing = self.active;
                        self.active = head;
                        return true;
                    }
                    break;
                }
            }
        }
        false
    }

    // -----------------------------------------------------------------------
    // Timer tick
    // -----------------------------------------------------------------------

    /// Advance the system time by one tick and serve all task timers.
    ///
    /// Called from the tick interrupt with interrupts masked. Returns true
    /// when the interrupt must return into a different task.
    pub fn tick(&mut self) -> bool {
        // Cyclic overrun of the time is intended.
        self.time = self.time.wrapping_add(1);
        let now = self.time;

        for idx in 0..self.suspended_count as usize {
            let id = self.suspended[idx] as usize;
            let t = &mut self.tasks[id];

            if now == t.time_due_at {
                // Posting the absolute timer event twice cannot happen: the
                // event is OR-combined in the release condition, so the
                // first post releases the task before the time comes around
                // again.
                t.posted_event_vec |= EVT_ABSOLUTE_TIMER & t.event_mask;
            }

            // The common case is a resting counter of zero.
            if t.cnt_delay > 0 {
                t.cnt_delay -= 1;
                if t.cnt_delay == 0 {
                    t.posted_event_vec |= EVT_DELAY_TIMER & t.event_mask;
                }
            }
        }

        // Round robin applies only to the active task: it can lose the CPU
        // but stays due. On expiry it goes to the back of its class.
        #[cfg(feature = "round-robin")]
        let force_rescan = {
            let active = self.active as usize;
            let mut rotated = false;
            if self.tasks[active].cnt_round_robin > 0 {
                self.tasks[active].cnt_round_robin -= 1;
                if self.tasks[active].cnt_round_robin == 0 {
                    self.tasks[active].reload_time_slice();

                    let prio = self.tasks[active].prio_class as usize;
                    let n = self.due_count[prio] as usize;
                    if n > 1 {
                        for i in 0..n - 1 {
                            self.due[prio][i] = self.due[prio][i + 1];
                        }
                        self.due[prio][n - 1] = self.active;
                        rotated = true;
                    }
                }
            }
            rotated
        };
        #[cfg(not(feature = "round-robin"))]
        let force_rescan = false;

        self.check_for_activation(force_rescan)
    }

    // -----------------------------------------------------------------------
    // Event posting
    // -----------------------------------------------------------------------

    /// Broadcast a set of events to all suspended tasks waiting for them.
    ///
    /// Timer events are kernel-generated and are masked off. Events that no
    /// task is currently waiting for are lost; this is the documented
    /// edge-triggered behavior. Returns true when a released task outranks
    /// the caller and the caller must be descheduled (it stays due).
    pub fn post_events(&mut self, event_vec: EventMask) -> bool {
        let event_vec = event_vec & !TIMER_EVENTS;

        for idx in 0..self.suspended_count as usize {
            let id = self.suspended[idx] as usize;
            let t = &mut self.tasks[id];
            t.posted_event_vec |= event_vec & t.event_mask;
        }

        self.check_for_activation(false)
    }

    // -----------------------------------------------------------------------
    // Suspension
    // -----------------------------------------------------------------------

    /// Suspend the active task until its resume condition is met.
    ///
    /// Removes the caller from the head of its ready queue, stores the
    /// resume condition, appends it to the suspended list and selects the
    /// new active task (idle as fallback). The caller is recorded as
    /// `outgoing`; the port layer performs the actual stack switch
    /// afterwards. Never legal for the idle task.
    pub fn suspend_active(&mut self, event_mask: EventMask, all: bool, timeout: Tick) {
        let id = self.active;
        assert!((id as usize) != IDLE_TASK_ID);

        let prio = self.tasks[id as usize].prio_class as usize;
        debug_assert!(self.due_count[prio] > 0 && self.due[prio][0] == id);
        self.due_count[prio] -= 1;
        let n = self.due_count[prio] as usize;
        for i in 0..n {
            self.due[prio][i] = self.due[prio][i + 1];
        }

        self.store_resume_condition(id as usize, event_mask, all, timeout);

        self.suspended[self.suspended_count as usize] = id;
        self.suspended_count += 1;
        self.outgoing = id;

        // There need not be any due task left; idle is the fallback.
        self.active = IDLE_TASK_ID as TaskId;
        for prio in (0..NUM_PRIO_CLASSES).rev() {
            if self.due_count[prio] > 0 {
                self.active = self.due[prio][0];
                break;
            }
        }
    }

    /// Store the condition under which a task becomes due again.
    ///
    /// The timing parameter addresses one of two timers. The absolute timer
    /// advances the task's due time and detects overruns: if the new due
    /// time is not in the (cyclic) future, the deadline was missed, the
    /// overrun counter is bumped and the task is made due on the very next
    /// tick. The delay timer gets `timeout + 1` ticks, saturating: the call
    /// is not synchronized with the tick, so the extra tick turns the value
    /// into a guaranteed minimum delay.
    fn store_resume_condition(
        &mut self,
        idx: usize,
        event_mask: EventMask,
        all: bool,
        timeout: Tick,
    ) {
        assert!(event_mask != 0);
        // Waiting on both timers at once has no meaning; the timeout
        // parameter can only arm one of them.
        assert!(event_mask & TIMER_EVENTS != TIMER_EVENTS);

        let now = self.time;
        let t = &mut self.tasks[idx];

        if event_mask & EVT_ABSOLUTE_TIMER != 0 {
            t.time_due_at = t.time_due_at.wrapping_add(timeout);
            if (t.time_due_at.wrapping_sub(now) as SignedTick) <= 0 {
                t.record_overrun();
                // The wanted point in time is over. Best possible recovery:
                // become due on the very next tick.
                t.time_due_at = now.wrapping_add(1);
            }
        } else {
            // Reloaded unconditionally: if the delay event is not in the
            // mask the counter just runs down without posting anything.
            t.cnt_delay = timeout.saturating_add(1);
        }

        t.event_mask = event_mask;
        t.wait_for_any = !all;
        t.posted_event_vec = 0;
    }

    // -----------------------------------------------------------------------
    // Port layer interface
    // -----------------------------------------------------------------------

    /// Swap stack pointers for a task switch: file the outgoing task's
    /// stack pointer and hand out the incoming one. Called by the port
    /// layer at the one place that reloads the hardware stack pointer.
    pub fn switch_stacks(&mut self, outgoing_sp: usize) -> usize {
        self.tasks[self.outgoing as usize].stack_pointer = outgoing_sp;
        self.tasks[self.active as usize].stack_pointer
    }

    /// Consume the incoming task's posted event set.
    ///
    /// Nonzero means the task pauses inside a suspend call and the value
    /// must be synthesized into its return-value registers; zero means the
    /// task was preempted and its full frame restores as saved. This is the
    /// only place the posted set of a released task is cleared.
    pub fn take_resume_event(&mut self) -> EventMask {
        let t = &mut self.tasks[self.active as usize];
        let vec = t.posted_event_vec;
        t.posted_event_vec = 0;
        vec
    }

    // -----------------------------------------------------------------------
    // Diagnostics
    // -----------------------------------------------------------------------

    /// Read, and optionally reset, a task's overrun counter.
    pub fn overrun_counter(&mut self, idx: usize, reset: bool) -> u8 {
        let count = self.tasks[idx].cnt_overrun;
        if reset {
            self.tasks[idx].cnt_overrun = 0;
        }
        count
    }

    /// Number of still untouched bytes of a task's stack area.
    ///
    /// Counts the leading fill-pattern bytes from the bottom of the area.
    /// The result is an upper bound: a genuine stack byte may coincide with
    /// the pattern, in which case the count is optimistic by a byte or two.
    pub fn stack_reserve(&self, idx: usize) -> u16 {
        assert!(idx < NUM_TASKS);
        let t = &self.tasks[idx];
        let mut n: u16 = 0;
        // The prepared frame at the top of the area is never made of fill
        // bytes, so the scan terminates within the area.
        while n < t.stack_size {
            if unsafe { *t.stack_area.add(n as usize) } != avr::STACK_FILL_BYTE {
                break;
            }
            n += 1;
        }
        n
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{
        EVT_EVENT_01, EVT_EVENT_02, EVT_EVENT_03, EVT_EVENT_04, EVT_EVENT_11,
    };

    extern "C" fn spin(_: EventMask) -> ! {
        loop {}
    }

    const STACK_SIZE: usize = 64;

    /// Feature-independent task setup helper.
    #[cfg(feature = "round-robin")]
    fn init_task(
        s: &mut Scheduler,
        idx: usize,
        prio: u8,
        round_robin: Tick,
        stack: &mut [u8],
        mask: EventMask,
        all: bool,
        timeout: Tick,
    ) {
        s.initialize_task(
            idx,
            spin,
            prio,
            round_robin,
            stack.as_mut_ptr(),
            stack.len() as u16,
            mask,
            all,
            timeout,
        );
    }

    #[cfg(not(feature = "round-robin"))]
    fn init_task(
        s: &mut Scheduler,
        idx: usize,
        prio: u8,
        _round_robin: Tick,
        stack: &mut [u8],
        mask: EventMask,
        all: bool,
        timeout: Tick,
    ) {
        s.initialize_task(
            idx,
            spin,
            prio,
            stack.as_mut_ptr(),
            stack.len() as u16,
            mask,
            all,
            timeout,
        );
    }

    /// A start condition that never releases: an event nobody posts, with
    /// no timer in the mask.
    fn init_parked(s: &mut Scheduler, idx: usize, prio: u8, stack: &mut [u8]) {
        init_task(s, idx, prio, 0, stack, EVT_EVENT_11, false, 0);
    }

    fn ready_total(s: &Scheduler) -> usize {
        s.due_count.iter().map(|&c| c as usize).sum()
    }

    fn assert_accounting(s: &Scheduler) {
        // Every task is on exactly one list.
        assert_eq!(s.suspended_count as usize + ready_total(s), NUM_TASKS);
        // Suspended tasks always carry a resume condition.
        for idx in 0..s.suspended_count as usize {
            assert_ne!(s.tasks[s.suspended[idx] as usize].event_mask, 0);
        }
    }

    #[test]
    fn first_tick_runs_at_time_zero() {
        let mut s = Scheduler::new();
        let mut stacks = [[0u8; STACK_SIZE]; NUM_TASKS];
        let [s0, s1, s2] = &mut stacks;
        init_task(&mut s, 0, 1, 0, s0, EVT_DELAY_TIMER, false, 0);
        init_parked(&mut s, 1, 0, s1);
        init_parked(&mut s, 2, 0, s2);
        s.prepare();

        assert_eq!(s.active as usize, IDLE_TASK_ID);
        let switched = s.tick();
        assert_eq!(s.time, 0);
        assert!(switched);
        assert_eq!(s.active, 0);
        assert_eq!(s.outgoing as usize, IDLE_TASK_ID);
        assert_eq!(s.take_resume_event(), EVT_DELAY_TIMER);
        assert_accounting(&s);
    }

    #[test]
    fn event_releases_higher_priority_waiter() {
        // A low priority task runs; a high priority task waits on an event
        // with no timeout. Posting the event deschedules the poster.
        let mut s = Scheduler::new();
        let mut stacks = [[0u8; STACK_SIZE]; NUM_TASKS];
        let [s0, s1, s2] = &mut stacks;
        init_task(&mut s, 0, 1, 0, s0, EVT_DELAY_TIMER, false, 0);
        init_task(&mut s, 1, 2, 0, s1, EVT_EVENT_02, false, 0);
        init_parked(&mut s, 2, 0, s2);
        s.prepare();

        s.tick();
        assert_eq!(s.active, 0);
        s.take_resume_event();

        // The poster is task 0; the posted event releases task 1, which
        // outranks it.
        let switched = s.post_events(EVT_EVENT_02);
        assert!(switched);
        assert_eq!(s.active, 1);
        assert_eq!(s.outgoing, 0);
        // Task 0 stays due: not suspended, merely descheduled.
        assert_eq!(s.due[1][0], 0);
        assert_eq!(s.take_resume_event(), EVT_EVENT_02);

        // The released task suspends again; the poster resumes.
        s.suspend_active(EVT_EVENT_02, false, 0);
        assert_eq!(s.active, 0);
        assert_eq!(s.outgoing, 1);
        assert_accounting(&s);
    }

    #[test]
    fn wait_returns_exactly_the_masked_events() {
        let mut s = Scheduler::new();
        let mut stacks = [[0u8; STACK_SIZE]; NUM_TASKS];
        let [s0, s1, s2] = &mut stacks;
        init_task(&mut s, 0, 1, 0, s0, EVT_DELAY_TIMER, false, 0);
        init_task(&mut s, 1, 2, 0, s1, EVT_EVENT_01 | EVT_EVENT_02, true, 0);
        init_parked(&mut s, 2, 0, s2);
        s.prepare();
        s.tick();
        s.take_resume_event();

        // Events outside the waiter's mask are filtered at posting time.
        s.post_events(EVT_EVENT_01 | EVT_EVENT_03);
        assert_eq!(s.tasks[1].posted_event_vec, EVT_EVENT_01);
        assert_eq!(s.active, 0);

        s.post_events(EVT_EVENT_02 | EVT_EVENT_04);
        assert_eq!(s.active, 1);
        assert_eq!(s.take_resume_event(), EVT_EVENT_01 | EVT_EVENT_02);
    }

    #[test]
    fn unawaited_events_are_lost() {
        let mut s = Scheduler::new();
        let mut stacks = [[0u8; STACK_SIZE]; NUM_TASKS];
        let [s0, s1, s2] = &mut stacks;
        init_task(&mut s, 0, 1, 0, s0, EVT_DELAY_TIMER, false, 0);
        init_task(&mut s, 1, 2, 0, s1, EVT_EVENT_02, false, 0);
        init_parked(&mut s, 2, 0, s2);
        s.prepare();
        s.tick();
        s.take_resume_event();

        // Nobody waits for this one; it vanishes.
        assert!(!s.post_events(EVT_EVENT_03));
        for t in s.tasks.iter() {
            assert_eq!(t.posted_event_vec & EVT_EVENT_03, 0);
        }
        // Posting before the wait does not release the later waiter.
        assert_eq!(s.active, 0);
        assert_eq!(s.tasks[1].posted_event_vec, 0);
    }

    #[test]
    fn posting_nothing_changes_nothing() {
        let mut s = Scheduler::new();
        let mut stacks = [[0u8; STACK_SIZE]; NUM_TASKS];
        let [s0, s1, s2] = &mut stacks;
        init_task(&mut s, 0, 1, 0, s0, EVT_DELAY_TIMER, false, 0);
        init_task(&mut s, 1, 2, 0, s1, EVT_EVENT_02, false, 0);
        init_parked(&mut s, 2, 0, s2);
        s.prepare();
        s.tick();
        s.take_resume_event();

        for _ in 0..2 {
            assert!(!s.post_events(0));
            assert_eq!(s.active, 0);
            assert_eq!(s.suspended_count as usize, NUM_TASKS - 1);
            for t in s.tasks.iter() {
                assert_eq!(t.posted_event_vec, 0);
            }
            assert_accounting(&s);
        }
    }

    #[test]
    fn timer_events_cannot_be_posted() {
        let mut s = Scheduler::new();
        let mut stacks = [[0u8; STACK_SIZE]; NUM_TASKS];
        let [s0, s1, s2] = &mut stacks;
        init_task(&mut s, 0, 1, 0, s0, EVT_DELAY_TIMER, false, 0);
        init_task(&mut s, 1, 2, 0, s1, EVT_EVENT_02 | EVT_DELAY_TIMER, false, 10);
        init_parked(&mut s, 2, 0, s2);
        s.prepare();
        s.tick();
        s.take_resume_event();

        s.post_events(TIMER_EVENTS | EVT_EVENT_02);
        assert_eq!(s.active, 1);
        // The forged timer bits were stripped; only the real event remains.
        assert_eq!(s.take_resume_event(), EVT_EVENT_02);
    }

    #[test]
    fn equal_priority_release_goes_to_the_tail() {
        let mut s = Scheduler::new();
        let mut stacks = [[0u8; STACK_SIZE]; NUM_TASKS];
        let [s0, s1, s2] = &mut stacks;
        init_task(&mut s, 0, 1, 0, s0, EVT_DELAY_TIMER, false, 0);
        init_task(&mut s, 1, 1, 0, s1, EVT_EVENT_02, false, 0);
        init_parked(&mut s, 2, 0, s2);
        s.prepare();
        s.tick();
        s.take_resume_event();
        assert_eq!(s.active, 0);

        // Task 1 has equal priority: it becomes due behind the active task
        // and does not preempt it.
        assert!(!s.post_events(EVT_EVENT_02));
        assert_eq!(s.active, 0);
        assert_eq!(s.due_count[1], 2);
        assert_eq!(s.due[1], [0, 1]);

        // Only when the active task suspends does it take over.
        s.suspend_active(EVT_DELAY_TIMER, false, 5);
        assert_eq!(s.active, 1);
        assert_accounting(&s);
    }

    #[cfg(feature = "round-robin")]
    #[test]
    fn round_robin_alternates_equal_priority_tasks() {
        let mut s = Scheduler::new();
        let mut stacks = [[0u8; STACK_SIZE]; NUM_TASKS];
        let [s0, s1, s2] = &mut stacks;
        init_task(&mut s, 0, 1, 5, s0, EVT_DELAY_TIMER, false, 0);
        init_task(&mut s, 1, 1, 5, s1, EVT_DELAY_TIMER, false, 0);
        init_parked(&mut s, 2, 0, s2);
        s.prepare();

        // Both are released on the first tick, FIFO order 0 then 1.
        s.tick();
        assert_eq!(s.active, 0);
        s.take_resume_event();
        assert_eq!(s.tasks[0].cnt_round_robin, 5);

        let expected = [1u8, 0, 1, 0];
        for &next in expected.iter() {
            for _ in 0..4 {
                assert!(!s.tick());
            }
            assert!(s.tick());
            assert_eq!(s.active, next);
            s.take_resume_event();
            // The rotated task got a fresh slice.
            let slice = s.tasks[s.outgoing as usize].cnt_round_robin;
            assert!(slice > 0 && slice <= s.tasks[s.outgoing as usize].time_round_robin);
        }
    }

    #[cfg(feature = "round-robin")]
    #[test]
    fn delay_timer_is_unaffected_by_rotation() {
        let mut s = Scheduler::new();
        let mut stacks = [[0u8; STACK_SIZE]; NUM_TASKS];
        let [s0, s1, s2] = &mut stacks;
        init_task(&mut s, 0, 1, 5, s0, EVT_DELAY_TIMER, false, 0);
        init_task(&mut s, 1, 1, 5, s1, EVT_DELAY_TIMER, false, 0);
        // A waiter below the busy pair, due after at least 10 ticks.
        init_task(&mut s, 2, 0, 0, s2, EVT_DELAY_TIMER, false, 10);
        s.prepare();

        s.tick();
        assert_eq!(s.due_count[0], 0);
        // Released on the 11th tick after arming, rotations notwithstanding.
        for _ in 0..9 {
            s.tick();
            assert_eq!(s.due_count[0], 0);
        }
        s.tick();
        assert_eq!(s.due_count[0], 1);
        assert_eq!(s.due[0][0], 2);
        assert_eq!(s.tasks[2].posted_event_vec, EVT_DELAY_TIMER);
    }

    #[test]
    fn absolute_timer_ticks_a_fixed_grid() {
        let mut s = Scheduler::new();
        let mut stacks = [[0u8; STACK_SIZE]; NUM_TASKS];
        let [s0, s1, s2] = &mut stacks;
        init_task(&mut s, 0, 2, 0, s0, EVT_ABSOLUTE_TIMER, false, 20);
        init_parked(&mut s, 1, 0, s1);
        init_parked(&mut s, 2, 1, s2);
        s.prepare();

        // First activation exactly at time 20.
        while !s.tick() {}
        assert_eq!(s.time, 20);
        assert_eq!(s.active, 0);
        assert_eq!(s.take_resume_event(), EVT_ABSOLUTE_TIMER);

        // Re-arming relative to the due time, not the current time, keeps
        // the task on the 20-tick grid.
        s.suspend_active(EVT_ABSOLUTE_TIMER, false, 20);
        while !s.tick() {}
        assert_eq!(s.time, 40);
        assert_eq!(s.take_resume_event(), EVT_ABSOLUTE_TIMER);
        assert_eq!(s.tasks[0].cnt_overrun, 0);
    }

    #[test]
    fn missed_deadline_is_counted_and_recovered_next_tick() {
        let mut s = Scheduler::new();
        let mut stacks = [[0u8; STACK_SIZE]; NUM_TASKS];
        let [s0, s1, s2] = &mut stacks;
        init_task(&mut s, 0, 2, 0, s0, EVT_ABSOLUTE_TIMER, false, 20);
        init_parked(&mut s, 1, 0, s1);
        init_parked(&mut s, 2, 1, s2);
        s.prepare();

        while !s.tick() {}
        s.take_resume_event();
        assert_eq!(s.time, 20);

        // The task stays busy (or is kept off the CPU) until its next due
        // time has already passed.
        for _ in 0..20 {
            s.tick();
        }
        assert_eq!(s.time, 40);
        s.suspend_active(EVT_ABSOLUTE_TIMER, false, 20);
        assert_eq!(s.tasks[0].cnt_overrun, 1);

        // Best-effort recovery: due on the very next tick.
        assert!(s.tick());
        assert_eq!(s.time, 41);
        assert_eq!(s.active, 0);
        assert_eq!(s.take_resume_event(), EVT_ABSOLUTE_TIMER);
    }

    #[test]
    fn wait_for_all_with_timeout_takes_whichever_comes_first() {
        let mut s = Scheduler::new();
        let mut stacks = [[0u8; STACK_SIZE]; NUM_TASKS];
        let [s0, s1, s2] = &mut stacks;
        init_task(&mut s, 0, 1, 0, s0, EVT_DELAY_TIMER, false, 0);
        init_task(
            &mut s,
            1,
            2,
            0,
            s1,
            EVT_EVENT_01 | EVT_EVENT_02 | EVT_DELAY_TIMER,
            true,
            100,
        );
        init_parked(&mut s, 2, 0, s2);
        s.prepare();
        s.tick();
        s.take_resume_event();

        // Events first: both postable events must arrive.
        s.post_events(EVT_EVENT_01);
        assert_eq!(s.active, 0);
        s.post_events(EVT_EVENT_02);
        assert_eq!(s.active, 1);
        assert_eq!(s.take_resume_event(), EVT_EVENT_01 | EVT_EVENT_02);

        // Timeout first: the delay alone releases the AND waiter.
        s.suspend_active(EVT_EVENT_01 | EVT_EVENT_02 | EVT_DELAY_TIMER, true, 100);
        assert_eq!(s.active, 0);
        s.post_events(EVT_EVENT_01);
        let armed_at = s.time;
        while !s.tick() {}
        assert_eq!(s.time.wrapping_sub(armed_at), 101);
        assert_eq!(s.active, 1);
        assert_eq!(s.take_resume_event(), EVT_EVENT_01 | EVT_DELAY_TIMER);
    }

    #[test]
    fn idle_posts_and_takes_back_over() {
        let mut s = Scheduler::new();
        let mut stacks = [[0u8; STACK_SIZE]; NUM_TASKS];
        let [s0, s1, s2] = &mut stacks;
        init_task(&mut s, 0, 2, 0, s0, EVT_EVENT_03, false, 0);
        init_parked(&mut s, 1, 0, s1);
        init_parked(&mut s, 2, 1, s2);
        s.prepare();

        // Nothing is due; the idle task runs.
        assert!(!s.tick());
        assert_eq!(s.active as usize, IDLE_TASK_ID);

        // Idle posts; the waiter preempts it immediately.
        assert!(s.post_events(EVT_EVENT_03));
        assert_eq!(s.outgoing as usize, IDLE_TASK_ID);
        assert_eq!(s.active, 0);
        assert_eq!(s.take_resume_event(), EVT_EVENT_03);

        // The task is done and suspends; idle resumes.
        s.suspend_active(EVT_EVENT_03, false, 0);
        assert_eq!(s.active as usize, IDLE_TASK_ID);
        assert_eq!(s.outgoing, 0);
        // Idle's posted set is invariantly zero: a resume of idle must
        // never synthesize a return value.
        assert_eq!(s.tasks[IDLE_TASK_ID].posted_event_vec, 0);
    }

    #[test]
    fn posted_set_is_nonzero_only_between_release_and_resume() {
        let mut s = Scheduler::new();
        let mut stacks = [[0u8; STACK_SIZE]; NUM_TASKS];
        let [s0, s1, s2] = &mut stacks;
        init_task(&mut s, 0, 1, 0, s0, EVT_DELAY_TIMER, false, 0);
        init_task(&mut s, 1, 2, 0, s1, EVT_EVENT_02, false, 0);
        init_parked(&mut s, 2, 0, s2);
        s.prepare();
        s.tick();
        s.take_resume_event();

        s.post_events(EVT_EVENT_02);
        // Released, not yet resumed: the set holds the release cause.
        assert_eq!(s.tasks[1].posted_event_vec, EVT_EVENT_02);
        // Consumed by the switch: zero from here on.
        s.take_resume_event();
        assert_eq!(s.tasks[1].posted_event_vec, 0);
        // Preempted-and-resumed tasks never carry a nonzero set.
        assert_eq!(s.tasks[0].posted_event_vec, 0);
    }

    #[test]
    fn overrun_counter_saturates_at_255() {
        let mut s = Scheduler::new();
        s.tasks[0].event_mask = EVT_ABSOLUTE_TIMER;
        for _ in 0..300 {
            s.time = s.time.wrapping_add(1);
            // Arming with a zero increment is always in the past.
            s.store_resume_condition(0, EVT_ABSOLUTE_TIMER, false, 0);
        }
        assert_eq!(s.tasks[0].cnt_overrun, 255);
    }

    #[test]
    fn due_time_half_a_cycle_ahead_is_still_future() {
        let mut s = Scheduler::new();
        s.time = 100;

        s.tasks[0].time_due_at = 100;
        s.store_resume_condition(0, EVT_ABSOLUTE_TIMER, false, 127);
        assert_eq!(s.tasks[0].cnt_overrun, 0);
        assert_eq!(s.tasks[0].time_due_at, 227);

        // One further and the cyclic comparison flips to "past".
        s.tasks[0].time_due_at = 100;
        s.store_resume_condition(0, EVT_ABSOLUTE_TIMER, false, 128);
        assert_eq!(s.tasks[0].cnt_overrun, 1);
        assert_eq!(s.tasks[0].time_due_at, 101);
    }

    #[test]
    fn delay_of_max_ticks_saturates_instead_of_wrapping() {
        let mut s = Scheduler::new();
        s.store_resume_condition(0, EVT_DELAY_TIMER, false, Tick::MAX);
        assert_eq!(s.tasks[0].cnt_delay, Tick::MAX);
    }

    #[test]
    fn system_time_wraps_cleanly() {
        let mut s = Scheduler::new();
        let mut stacks = [[0u8; STACK_SIZE]; NUM_TASKS];
        let [s0, s1, s2] = &mut stacks;
        init_task(&mut s, 0, 2, 0, s0, EVT_ABSOLUTE_TIMER, false, 100);
        init_parked(&mut s, 1, 0, s1);
        init_parked(&mut s, 2, 1, s2);
        s.prepare();

        // Three periods of 100 cross the 8-bit wrap at 256.
        for expected in [100u8, 200, 44] {
            while !s.tick() {}
            assert_eq!(s.time, expected);
            s.take_resume_event();
            s.suspend_active(EVT_ABSOLUTE_TIMER, false, 100);
        }
        assert_eq!(s.tasks[0].cnt_overrun, 0);
    }

    #[test]
    fn stack_reserve_counts_leading_fill_bytes() {
        let mut s = Scheduler::new();
        let mut stacks = [[0u8; STACK_SIZE]; NUM_TASKS];
        let [s0, s1, s2] = &mut stacks;
        init_task(&mut s, 0, 1, 0, s0, EVT_DELAY_TIMER, false, 0);
        init_parked(&mut s, 1, 0, s1);
        init_parked(&mut s, 2, 0, s2);
        s.prepare();

        let untouched = STACK_SIZE as u16 - avr::INITIAL_FRAME_SIZE as u16;
        assert_eq!(s.stack_reserve(0), untouched);
        // Stable under repeated calls.
        assert_eq!(s.stack_reserve(0), untouched);

        // A task that dug 20 bytes into the pattern.
        let depth = STACK_SIZE - avr::INITIAL_FRAME_SIZE - 20;
        unsafe {
            *s.tasks[0].stack_area.add(depth) = 0x00;
        }
        assert_eq!(s.stack_reserve(0) as usize, depth);
    }

    #[test]
    #[should_panic]
    fn waiting_for_nothing_is_rejected() {
        let mut s = Scheduler::new();
        s.store_resume_condition(0, 0, false, 0);
    }

    #[test]
    #[should_panic]
    fn waiting_for_both_timers_is_rejected() {
        let mut s = Scheduler::new();
        s.store_resume_condition(0, TIMER_EVENTS, false, 10);
    }

    #[test]
    #[should_panic]
    fn idle_must_not_suspend() {
        let mut s = Scheduler::new();
        // Fresh scheduler: idle is active.
        s.suspend_active(EVT_DELAY_TIMER, false, 1);
    }
}
