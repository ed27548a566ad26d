//! # Event Vocabulary
//!
//! Events are the kernel's only inter-task communication primitive: a 16-bit
//! broadcast bitmask. Twelve bits are freely usable by the application, two
//! bits are claimed by the optional application interrupt service routines,
//! and the two uppermost bits belong to the kernel's timers.
//!
//! Events are edge-triggered, not latched. A posted event reaches exactly
//! the tasks that are suspended waiting for it at the instant of posting;
//! anything else is discarded.

/// A set of events, one bit per event.
pub type EventMask = u16;

/// General purpose event, posted explicitly via `set_event`.
pub const EVT_EVENT_00: EventMask = 0x0001 << 0;
/// General purpose event, posted explicitly via `set_event`.
pub const EVT_EVENT_01: EventMask = 0x0001 << 1;
/// General purpose event, posted explicitly via `set_event`.
pub const EVT_EVENT_02: EventMask = 0x0001 << 2;
/// General purpose event, posted explicitly via `set_event`.
pub const EVT_EVENT_03: EventMask = 0x0001 << 3;
/// General purpose event, posted explicitly via `set_event`.
pub const EVT_EVENT_04: EventMask = 0x0001 << 4;
/// General purpose event, posted explicitly via `set_event`.
pub const EVT_EVENT_05: EventMask = 0x0001 << 5;
/// General purpose event, posted explicitly via `set_event`.
pub const EVT_EVENT_06: EventMask = 0x0001 << 6;
/// General purpose event, posted explicitly via `set_event`.
pub const EVT_EVENT_07: EventMask = 0x0001 << 7;
/// General purpose event, posted explicitly via `set_event`.
pub const EVT_EVENT_08: EventMask = 0x0001 << 8;
/// General purpose event, posted explicitly via `set_event`.
pub const EVT_EVENT_09: EventMask = 0x0001 << 9;
/// General purpose event, posted explicitly via `set_event`.
pub const EVT_EVENT_10: EventMask = 0x0001 << 10;
/// General purpose event, posted explicitly via `set_event`.
pub const EVT_EVENT_11: EventMask = 0x0001 << 11;

/// Event posted by the application defined interrupt service routine 0.
#[cfg(feature = "isr-user-00")]
pub const EVT_ISR_USER_00: EventMask = 0x0001 << 12;
/// General purpose event, posted explicitly via `set_event`.
/// Becomes `EVT_ISR_USER_00` when the `isr-user-00` feature is enabled.
#[cfg(not(feature = "isr-user-00"))]
pub const EVT_EVENT_12: EventMask = 0x0001 << 12;

/// Event posted by the application defined interrupt service routine 1.
#[cfg(feature = "isr-user-01")]
pub const EVT_ISR_USER_01: EventMask = 0x0001 << 13;
/// General purpose event, posted explicitly via `set_event`.
/// Becomes `EVT_ISR_USER_01` when the `isr-user-01` feature is enabled.
#[cfg(not(feature = "isr-user-01"))]
pub const EVT_EVENT_13: EventMask = 0x0001 << 13;

/// The task local absolute timer has reached the task's due time.
///
/// Generated by the timer tick only; masked off from any posted event set.
pub const EVT_ABSOLUTE_TIMER: EventMask = 0x0001 << 14;

/// The task local delay timer has elapsed.
///
/// Generated by the timer tick only; masked off from any posted event set.
pub const EVT_DELAY_TIMER: EventMask = 0x0001 << 15;

/// Both kernel-generated timer events.
pub const TIMER_EVENTS: EventMask = EVT_ABSOLUTE_TIMER | EVT_DELAY_TIMER;
