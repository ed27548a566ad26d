//! # Synchronization Primitive
//!
//! The kernel's shared state is one global region, mutated either from
//! interrupt service routines (interrupts already masked by hardware) or
//! from code wrapped in [`critical_section`]. Application code sharing data
//! with anything that can preempt it must use the same primitive.

/// Execute a closure with all interrupts masked, restoring the previous
/// interrupt state on exit.
///
/// Keep the enclosed code short; every cycle spent here adds to the jitter
/// of the system timer tick.
#[cfg(target_arch = "avr")]
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    avr_device::interrupt::free(|_| f())
}

/// Host stand-in: the unit tests are single threaded and have no interrupts
/// to mask.
#[cfg(not(target_arch = "avr"))]
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    f()
}
