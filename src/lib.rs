//! # evos
//!
//! An event-driven, preemptive, priority-based RTOS kernel for 8-bit AVR
//! microcontrollers (ATmega2560 class).
//!
//! ## Overview
//!
//! evos multiplexes a small, statically configured set of tasks over one
//! CPU. Tasks suspend themselves waiting for a combination of up to 16
//! events, two of which are task-local timers (an absolute timer for
//! regular real-time tasks and a relative delay timer for timeouts); the
//! rest are posted by other tasks or by application interrupts. Scheduling
//! is strictly by priority class, FIFO within a class, with optional
//! round-robin time slicing among equal-priority tasks.
//!
//! Everything is sized at compile time ([`config`]); the kernel performs no
//! dynamic allocation, keeps no heap, and persists nothing.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │              Application tasks + idle body               │
//! ├──────────────────────────────────────────────────────────┤
//! │                Kernel API (kernel.rs)                    │
//! │   init_task() · init_rtos() · set_event()                │
//! │   wait_for_event() · delay() · diagnostics               │
//! ├───────────────────────────────┬──────────────────────────┤
//! │  Scheduler core (scheduler.rs)│  Sync (sync.rs)          │
//! │  ─ tick()                     │  ─ critical_section()    │
//! │  ─ post_events()              │                          │
//! │  ─ suspend_active()           │                          │
//! │  ─ check_for_activation()     │                          │
//! ├───────────────────────────────┴──────────────────────────┤
//! │        Task model (task.rs) · Events (event.rs)          │
//! ├──────────────────────────────────────────────────────────┤
//! │                AVR port (arch/avr.rs)                    │
//! │  tick ISR · syscall bodies · stack frames · SP swap      │
//! ├──────────────────────────────────────────────────────────┤
//! │              ATmega2560 (AVR, 3-byte PC)                 │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The scheduler core is pure bookkeeping and target-agnostic; only the
//! port layer touches registers and the stack pointer. This split is also
//! what makes the core testable on the host.
//!
//! ## Usage sketch
//!
//! ```ignore
//! use evos::event::EVT_DELAY_TIMER;
//! use evos::kernel::{self, AppCallbacks};
//!
//! static mut STACK_BLINK: [u8; 256] = [0; 256];
//!
//! extern "C" fn blink(_started_by: u16) -> ! {
//!     loop {
//!         // ... toggle a pin ...
//!         kernel::delay(250);            // ~500 ms at the 2 ms tick
//!     }
//! }
//!
//! fn setup() {
//!     kernel::init_task(
//!         0, blink, 1, 0,
//!         unsafe { &mut STACK_BLINK },
//!         EVT_DELAY_TIMER, false, 0,
//!     );
//! }
//!
//! fn background() { /* runs whenever nothing else is due */ }
//!
//! fn main() -> ! {
//!     kernel::init_rtos(&AppCallbacks {
//!         setup,
//!         idle: background,
//!         enable_timer_tick: None,       // Timer 2 default, ~2 ms tick
//!     })
//! }
//! ```
//!
//! ## Memory model
//!
//! - No heap, no `alloc`; all kernel state is one static [`scheduler::Scheduler`]
//! - Task stacks are application-provided static byte arrays
//! - Kernel globals are mutated with interrupts masked only
//! - Stacks are prefilled with a pattern byte for usage diagnosis

#![cfg_attr(not(test), no_std)]
#![cfg_attr(target_arch = "avr", feature(asm_experimental_arch))]

pub mod arch;
pub mod config;
pub mod event;
pub mod kernel;
pub mod scheduler;
pub mod sync;
pub mod task;
