//! # Kernel
//!
//! Top-level kernel startup and the public API. The kernel owns the global
//! scheduler instance and hands the application five entry points: task
//! registration, startup, event posting, suspension, and two diagnostics.
//!
//! ## Startup sequence
//!
//! ```text
//! main()
//!   └─► kernel::init_rtos(&app)          ← never returns
//!         ├─► app.setup()                ← registers tasks via init_task()
//!         ├─► Scheduler::prepare()       ← builds initial stack frames
//!         ├─► app.enable_timer_tick()    ← or the Timer 2 default
//!         ├─► app.enable_irq_user_nn()   ← optional event interrupts
//!         └─► loop { app.idle() }        ← this thread becomes the idle task
//! ```
//!
//! The first timer tick releases the tasks whose start condition is due and
//! switches away from idle; from that point on the system is fully
//! preemptive.

use crate::config::Tick;
use crate::event::EventMask;
use crate::scheduler::Scheduler;
use crate::sync;
use crate::task::TaskFn;

#[cfg(target_arch = "avr")]
use crate::event::EVT_DELAY_TIMER;

// ---------------------------------------------------------------------------
// Global scheduler instance
// ---------------------------------------------------------------------------

/// The one and only scheduler.
///
/// # Safety
/// Accessed through `SCHEDULER_PTR`, which is set at the start of
/// `init_rtos()`. Every later access happens with interrupts masked, either
/// inside an ISR or inside a critical section.
static mut SCHEDULER: Scheduler = Scheduler::new();

/// Raw pointer to the global scheduler for the port layer, whose naked
/// interrupt bodies cannot go through references.
///
/// # Safety
/// Written once, before any interrupt that uses it is enabled.
#[no_mangle]
pub static mut SCHEDULER_PTR: *mut Scheduler = core::ptr::null_mut();

// ---------------------------------------------------------------------------
// Application callbacks
// ---------------------------------------------------------------------------

/// The functions the application plugs into the kernel.
pub struct AppCallbacks {
    /// Runs once before the scheduler starts, in the plain startup context
    /// with interrupts still disabled. Must register every task with
    /// `init_task` and may do any other one-time hardware setup. Must not
    /// post or wait for events.
    pub setup: fn(),

    /// The body of the idle task, called in an endless loop whenever no
    /// task is due. May post events; must never wait for one.
    pub idle: fn(),

    /// Custom system timer setup, for applications that clock the kernel
    /// from another interrupt source. `None` selects the built-in Timer 2
    /// overflow at about 490 Hz. Whatever source is chosen must drive the
    /// kernel's tick vector.
    pub enable_timer_tick: Option<fn()>,

    /// Configures the hardware that raises application interrupt 0.
    #[cfg(feature = "isr-user-00")]
    pub enable_irq_user_00: fn(),

    /// Configures the hardware that raises application interrupt 1.
    #[cfg(feature = "isr-user-01")]
    pub enable_irq_user_01: fn(),
}

// ---------------------------------------------------------------------------
// Task registration
// ---------------------------------------------------------------------------

/// Register one task. To be called from the `setup` callback, once for each
/// of the `NUM_TASKS` task slots; the kernel refuses to start with an
/// unregistered slot.
///
/// # Parameters
/// - `idx`: the task's slot, `0..NUM_TASKS`.
/// - `task_fn`: the task function; invoked once, must never return.
/// - `prio_class`: priority class, higher value runs first.
/// - `time_round_robin`: length of the task's time slice in ticks, 0 for
///   unlimited execution.
/// - `stack`: the task's exclusive stack area, alive for the kernel's whole
///   runtime.
/// - `start_event_mask`, `start_by_all_events`, `start_timeout`: the
///   condition for the first activation, with the same meaning as the
///   parameters of `wait_for_event`.
#[cfg(feature = "round-robin")]
#[allow(clippy::too_many_arguments)]
pub fn init_task(
    idx: usize,
    task_fn: TaskFn,
    prio_class: u8,
    time_round_robin: Tick,
    stack: &'static mut [u8],
    start_event_mask: EventMask,
    start_by_all_events: bool,
    start_timeout: Tick,
) {
    let stack_area = stack.as_mut_ptr();
    let stack_size = stack.len() as u16;
    sync::critical_section(|| unsafe {
        (*SCHEDULER_PTR).initialize_task(
            idx,
            task_fn,
            prio_class,
            time_round_robin,
            stack_area,
            stack_size,
            start_event_mask,
            start_by_all_events,
            start_timeout,
        )
    })
}

/// Register one task. See the `round-robin` variant for the parameters.
#[cfg(not(feature = "round-robin"))]
pub fn init_task(
    idx: usize,
    task_fn: TaskFn,
    prio_class: u8,
    stack: &'static mut [u8],
    start_event_mask: EventMask,
    start_by_all_events: bool,
    start_timeout: Tick,
) {
    let stack_area = stack.as_mut_ptr();
    let stack_size = stack.len() as u16;
    sync::critical_section(|| unsafe {
        (*SCHEDULER_PTR).initialize_task(
            idx,
            task_fn,
            prio_class,
            stack_area,
            stack_size,
            start_event_mask,
            start_by_all_events,
            start_timeout,
        )
    })
}

// ---------------------------------------------------------------------------
// Startup
// ---------------------------------------------------------------------------

/// Start the kernel. **Does not return.**
///
/// Invokes the application's `setup`, prepares all task stacks, starts the
/// system timer and the optional application interrupts, and then turns the
/// calling context into the idle task. The code appears to fork: execution
/// continues both here (as idle) and in every task whose start condition
/// comes due.
pub fn init_rtos(app: &AppCallbacks) -> ! {
    unsafe {
        SCHEDULER_PTR = core::ptr::addr_of_mut!(SCHEDULER);
    }

    // The application registers its tasks. No kernel interrupt is running
    // yet, so no synchronization considerations apply in setup.
    (app.setup)();

    unsafe {
        (*SCHEDULER_PTR).prepare();
    }

    // All data is in place; start clocking the system time.
    match app.enable_timer_tick {
        Some(enable) => enable(),
        #[cfg(target_arch = "avr")]
        None => crate::arch::avr::enable_timer_tick(),
        #[cfg(not(target_arch = "avr"))]
        None => {}
    }

    // Let the application arm its event interrupt sources.
    #[cfg(feature = "isr-user-00")]
    (app.enable_irq_user_00)();
    #[cfg(feature = "isr-user-01")]
    (app.enable_irq_user_01)();

    #[cfg(target_arch = "avr")]
    unsafe {
        avr_device::interrupt::enable();
    }

    // From here on, this thread of execution is the idle task.
    loop {
        (app.idle)();
    }
}

// ---------------------------------------------------------------------------
// System calls
// ---------------------------------------------------------------------------

/// Post a set of events to all suspended tasks waiting for them.
///
/// Events are broadcast and edge-triggered: a bit that no task is currently
/// waiting for is discarded. If the post releases a task of higher priority
/// than the caller, the caller is descheduled on the spot (it stays due and
/// resumes once it is the highest-ranking ready task again); this is why
/// even the idle task may post. The timer events are kernel-generated and
/// cannot be posted.
///
/// Must not be called from `setup`.
#[cfg(target_arch = "avr")]
#[inline(always)]
pub fn set_event(event_vec: EventMask) {
    unsafe { crate::arch::avr::set_event(event_vec) }
}

/// Suspend the calling task until a combination of events occurs; returns
/// the set of events that released it.
///
/// - `event_mask`: the events to wait for; must not be empty. Include
///   `EVT_DELAY_TIMER` or `EVT_ABSOLUTE_TIMER` (not both) for a timeout.
/// - `all`: if false, the first matching event releases the task. If true,
///   all non-timer events of the mask are required; a timer event in the
///   mask still releases on its own, which is what makes it a timeout.
/// - `timeout`: delay in ticks for `EVT_DELAY_TIMER` (the true delay is
///   `timeout..=timeout+1` ticks, the call not being synchronized with the
///   timer), or the increment on the task's due time for
///   `EVT_ABSOLUTE_TIMER`. Pass 0 when the mask has no timer event.
///
/// Must never be called from the idle task, which cannot suspend.
#[cfg(target_arch = "avr")]
#[inline(always)]
pub fn wait_for_event(event_mask: EventMask, all: bool, timeout: Tick) -> EventMask {
    unsafe { crate::arch::avr::wait_for_event(event_mask, all, timeout) }
}

/// Suspend the calling task for at least `ticks` timer ticks.
///
/// Shorthand for waiting on nothing but the delay timer. Even a delay of 0
/// deschedules the caller for an instant and gives other tasks of its
/// priority class a chance to run.
#[cfg(target_arch = "avr")]
#[inline(always)]
pub fn delay(ticks: Tick) -> EventMask {
    wait_for_event(EVT_DELAY_TIMER, false, ticks)
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// Read, and optionally reset, the count of missed absolute-timer deadlines
/// of a task.
///
/// The counter is 8 bit and sticks at 255. For a wider range, read it
/// periodically with `reset` and accumulate; read-and-reset is atomic.
/// Without `reset` this is a plain byte read and needs no locking, so it is
/// safe inside an application critical section.
pub fn get_task_overrun_counter(idx: usize, reset: bool) -> u8 {
    if reset {
        sync::critical_section(|| unsafe { (*SCHEDULER_PTR).overrun_counter(idx, true) })
    } else {
        unsafe { (*SCHEDULER_PTR).overrun_counter(idx, false) }
    }
}

/// Number of never-used bytes of a task's stack.
///
/// Counts the leading fill-pattern bytes of the stack area. Useful after
/// the application has run through all its paths for a while, to trim
/// statically allocated stacks. The scan is linear; call it occasionally
/// from the idle task, not from time-critical code. Subtract a safety
/// margin (a handful of pattern look-alike bytes plus one interrupt frame)
/// before acting on the value.
pub fn get_stack_reserve(idx: usize) -> u16 {
    unsafe { (*SCHEDULER_PTR).stack_reserve(idx) }
}
