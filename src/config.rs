//! # Kernel Configuration
//!
//! Compile-time constants governing the kernel dimensions. All limits are
//! fixed at compile time so that every kernel data structure can be
//! statically allocated. There is no dynamic allocation at runtime.

/// Number of application tasks in the system. Tasks aren't created
/// dynamically; this number of tasks is always existent and alive. The idle
/// task is implicit and not counted here.
pub const NUM_TASKS: usize = 3;

/// Number of distinct task priority classes. Several tasks may share one
/// class, so this is less than or equal to `NUM_TASKS` (and at least 1 if
/// any task is defined).
pub const NUM_PRIO_CLASSES: usize = 3;

/// The maximum number of tasks that may belong to the same priority class.
/// Used to size the per-class ready queues. Set as low as possible; each
/// class reserves this many queue slots.
pub const MAX_TASKS_PER_PRIO_CLASS: usize = 2;

/// Minimum permitted task stack size in bytes. The initial register frame
/// alone takes 37 bytes and any interrupt needs room for another full frame,
/// so anything below this is certain to overflow.
pub const MIN_STACK_SIZE: u16 = 50;

/// The type of the system time, a cyclic unsigned counter of timer ticks.
///
/// The width is a trade-off. A narrower type means less kernel overhead per
/// tick, but it bounds the ratio between the period of the slowest and
/// fastest regular task (half the counter range) and it lowers the
/// probability of recognizing task overruns: an overrun longer than half the
/// counter cycle is mistaken for a future due time. `u8` suits systems whose
/// task periods span no more than two orders of magnitude; choose `u16` when
/// a fast tick and slow tasks must coexist. `u32` is hardly ever useful.
///
/// The alias deliberately does not hide the type; the system time is a plain
/// unsigned integer and is meant to be understood as one.
pub type Tick = u8;

/// Signed companion of [`Tick`], used for the cyclic before/after comparison
/// in overrun detection. Must have the same width as `Tick`.
pub type SignedTick = i8;
