//! # Task Descriptor
//!
//! Defines the task model. A task is a function that never returns, running
//! on its own preallocated stack, scheduled preemptively by priority class.
//! One descriptor exists per task, plus one for the implicit idle task.
//!
//! ## Task states
//!
//! A task's state is not stored in the descriptor; it is encoded by which
//! kernel list the descriptor is currently on:
//!
//! ```text
//!   ┌───────────┐  released by event/timer   ┌──────────────────┐
//!   │ suspended │ ─────────────────────────► │ due (ready tail) │
//!   └───────────┘                            └──────────────────┘
//!        ▲                                            │
//!        │ wait_for_event()        head of highest    │
//!        │                         non-empty class    ▼
//!        │                                   ┌──────────────────┐
//!        └────────────────────────────────── │      active      │
//!                                            └──────────────────┘
//! ```
//!
//! The idle task is active exactly when no other task is due; it is never
//! suspended.

use crate::config::Tick;
use crate::event::{EventMask, TIMER_EVENTS};

// ---------------------------------------------------------------------------
// Task function type
// ---------------------------------------------------------------------------

/// The type of any task function.
///
/// Invoked once and only once, the first time the task becomes active, and
/// must never return. A return statement would hit the zero guard address at
/// the bottom of the prepared stack and reset the controller.
///
/// The parameter is the event set that made the task run the very first
/// time, typically just a timer event. It is delivered through the same
/// mechanism that feeds the return value of
/// `wait_for_event`.
pub type TaskFn = extern "C" fn(EventMask) -> !;

// ---------------------------------------------------------------------------
// Task descriptor
// ---------------------------------------------------------------------------

/// The descriptor of one task: static information like the priority class
/// and dynamic information like received events and timer values.
///
/// Descriptors are stored in a fixed array inside the scheduler; no heap
/// allocation. After [`crate::kernel::init_rtos`] has been entered, the
/// application must never touch a descriptor again.
pub struct Task {
    /// The saved stack pointer of this task whenever it is not active.
    /// Written only by the context switch code (and once at startup, when
    /// the initial register frame is prepared).
    pub stack_pointer: usize,

    /// The priority class this task belongs to. The higher the value the
    /// higher the priority. Static after initialization.
    pub prio_class: u8,

    /// The task function. `None` only for the idle descriptor and for
    /// not-yet-initialized slots.
    pub task_fn: Option<TaskFn>,

    /// The system time at which the task local absolute-timer event fires.
    pub time_due_at: Tick,

    /// The length of this task's time slice. The range is
    /// 1..=`Tick::MAX`; 0 switches round robin off for this task.
    ///
    /// Round-robin behavior emerges only if several tasks in the same
    /// priority class all have a slice configured; otherwise this is just a
    /// cap on the continuous execution time of an individual task.
    #[cfg(feature = "round-robin")]
    pub time_round_robin: Tick,

    /// Base of the preallocated stack area. The area must outlive the
    /// kernel, so it is effectively `'static`.
    pub stack_area: *mut u8,

    /// Size in bytes of the stack area.
    pub stack_size: u16,

    /// Tick-decremented counter triggering the delay-timer event when it
    /// reaches zero. 0 means inactive.
    pub cnt_delay: Tick,

    /// Tick-decremented counter triggering a task rotation in round-robin
    /// mode.
    #[cfg(feature = "round-robin")]
    pub cnt_round_robin: Tick,

    /// The events posted to this task while suspended.
    ///
    /// Doubles as the resume discriminator: a nonzero value at resume time
    /// means the task is pausing inside a suspend call and expects this
    /// value as the call's result; zero means the task was preempted and its
    /// full register frame is on its stack. Only the context switch
    /// primitive clears it after a release.
    pub posted_event_vec: EventMask,

    /// The set of events which will release this task. Nonzero for every
    /// suspended task.
    pub event_mask: EventMask,

    /// If true, the first posted event in the mask releases the task;
    /// otherwise all non-timer events in the mask are required.
    pub wait_for_any: bool,

    /// Count of missed absolute-timer deadlines. Saturates at 255. 8-bit so
    /// that plain reads are atomic on an 8-bit bus.
    pub cnt_overrun: u8,
}

// The raw stack pointer always refers to the task's own statically allocated
// stack area, and descriptors are only ever accessed with interrupts masked.
unsafe impl Send for Task {}
unsafe impl Sync for Task {}

impl Task {
    /// An unconfigured descriptor, used to initialize the static array and
    /// as the idle task's descriptor (of which only `stack_pointer` and the
    /// always-zero `posted_event_vec` are ever used).
    pub const EMPTY: Task = Task {
        stack_pointer: 0,
        prio_class: 0,
        task_fn: None,
        time_due_at: 0,
        #[cfg(feature = "round-robin")]
        time_round_robin: 0,
        stack_area: core::ptr::null_mut(),
        stack_size: 0,
        cnt_delay: 0,
        #[cfg(feature = "round-robin")]
        cnt_round_robin: 0,
        posted_event_vec: 0,
        event_mask: 0,
        wait_for_any: false,
        cnt_overrun: 0,
    };

    /// Does the set of posted events satisfy this task's resume condition?
    ///
    /// The simple and optimally supported case is the OR combination: any
    /// posted event releases the task. The AND combination retains the
    /// timeout character of the timer events: it refers only to the
    /// postable events, while a timer event in the mask still releases on
    /// its own.
    #[inline]
    pub fn is_released(&self) -> bool {
        let posted = self.posted_event_vec;
        if self.wait_for_any {
            posted != 0
        } else {
            ((posted ^ self.event_mask) & !TIMER_EVENTS) == 0
                || (posted & self.event_mask & TIMER_EVENTS) != 0
        }
    }

    /// Record a missed absolute-timer deadline. The counter sticks at 255
    /// rather than wrapping.
    #[inline]
    pub fn record_overrun(&mut self) {
        self.cnt_overrun = self.cnt_overrun.saturating_add(1);
    }

    /// Grant a full new time slice, called when the task becomes due.
    #[cfg(feature = "round-robin")]
    #[inline]
    pub fn reload_time_slice(&mut self) {
        self.cnt_round_robin = self.time_round_robin;
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
