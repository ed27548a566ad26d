//! # AVR Port Layer (ATmega2560)
//!
//! Context switching, interrupt entry points and stack preparation for the
//! 8-bit AVR megaAVR family with a 3-byte program counter.
//!
//! ## Context switch mechanism
//!
//! Switches are symmetric: every point that can leave a task pushes the CPU
//! state onto that task's own stack, and every resume pops the same layout
//! back. Entering a task for the very first time is no special case; its
//! stack is prepared at startup to look exactly like a suspended frame
//! ([`prepare_task_stack`]).
//!
//! Three code paths can switch:
//!
//! - the system timer interrupt (`__vector_15`, Timer 2 overflow),
//! - the two system calls `set_event` and `wait_for_event`, which behave
//!   as software interrupts: they disable interrupts, push the frame and
//!   leave through `reti`,
//! - the optional application interrupts, which reuse the `set_event` body
//!   through a shared entry label.
//!
//! A suspend call saves the frame *without* the r24/r25 pair: that pair is
//! the AVR calling convention's 16-bit return value register, and it is
//! synthesized on the first resume from the task's posted event set. The
//! resume code recognizes this case by the nonzero posted set, pushes the
//! two bytes into the frame slots where r24/r25 live, and clears the set.
//! A preempted task has a full frame and a zero posted set; its frame
//! restores unchanged.
//!
//! The save sequences, the restore sequence and the frame built by
//! [`prepare_task_stack`] are exact mirrors of one another; any change to
//! one of them must be carried through all of them.
//!
//! ## Frame layout
//!
//! ```text
//! high addresses (stack bottom)
//!   0x00 0x00 0x00     guard return address: reset on task return
//!   PC2 PC1 PC0        return address (entry point in a prepared frame)
//!   r0                 scratch register
//!   SREG               0x80 in a prepared frame: interrupts enabled
//!   r1                 zero register
//!   r2 .. r23          (r24, r25 only in a preemption frame)
//!   r26 .. r31
//!   0x29 0x29 ...      fill pattern, stack reserve diagnosis
//! low addresses (stack top, grows downward)
//! ```
//!
//! The kernel never relies on the interrupt flag surviving a switch; every
//! exit is a `reti`, so every resumed context runs with interrupts enabled.

use crate::task::TaskFn;

#[cfg(target_arch = "avr")]
use core::arch::naked_asm;

// ---------------------------------------------------------------------------
// Stack preparation
// ---------------------------------------------------------------------------

/// Pattern byte prefilled into unused stack area. Any value that is not
/// zero and is unlikely to be a genuine stack byte would do.
pub const STACK_FILL_BYTE: u8 = 0x29;

/// Width of the program counter on the ATmega2560. Many smaller AVR types
/// use 2 bytes; this constant and the guard/entry pushes in
/// [`prepare_task_stack`] are the main porting points.
pub const PC_SIZE: usize = 3;

/// Bytes consumed by a prepared initial frame: guard address, entry
/// address, and the 31 register bytes of a suspend-style frame.
pub const INITIAL_FRAME_SIZE: usize = 2 * PC_SIZE + 31;

/// Build the initial register frame on an unused stack area so that the
/// ordinary context restore brings the task to life, and fill the rest of
/// the area with [`STACK_FILL_BYTE`]. Returns the stack pointer value to
/// store in the task descriptor.
///
/// # Safety
/// `stack_area` must point to a writable area of at least `stack_size`
/// bytes that stays reserved for this task for the kernel's lifetime.
pub unsafe fn prepare_task_stack(stack_area: *mut u8, stack_size: u16, entry: TaskFn) -> usize {
    // The pointer is handled the way the CPU handles its stack pointer:
    // it addresses the next free byte and moves downward on push.
    let mut sp = stack_area.add(stack_size as usize - 1);

    // Guard return address 0x00000, the reset vector. A task function that
    // returns restarts the controller instead of crashing haphazardly.
    for _ in 0..PC_SIZE {
        *sp = 0x00;
        sp = sp.sub(1);
    }

    // The task entry address as the frame's return address, low byte at the
    // higher address, as the call instruction pushes it.
    let addr = entry as usize as u32;
    *sp = (addr & 0xff) as u8;
    sp = sp.sub(1);
    *sp = ((addr >> 8) & 0xff) as u8;
    sp = sp.sub(1);
    *sp = ((addr >> 16) & 0xff) as u8;
    sp = sp.sub(1);

    // r0, the compiler's scratch register. The value doesn't matter.
    *sp = 0;
    sp = sp.sub(1);

    // Status register. The arithmetic flags don't matter; the interrupt
    // flag does not either, since every switch exits through reti, but 0x80
    // documents the guarantee that tasks run with interrupts enabled.
    *sp = 0x80;
    sp = sp.sub(1);

    // r1 is the zero register; compiled code requires it to read zero.
    *sp = 0;
    sp = sp.sub(1);

    // r2..r23 and r26..r31, all zero. r24/r25 are deliberately absent: the
    // pair carries the task's start event set, synthesized by the first
    // switch into the task exactly like a suspend call's return value.
    for _ in 0..28 {
        *sp = 0;
        sp = sp.sub(1);
    }

    let prepared_sp = sp as usize;

    // The rest of the area feeds the stack reserve diagnosis.
    loop {
        *sp = STACK_FILL_BYTE;
        if sp == stack_area {
            break;
        }
        sp = sp.sub(1);
    }

    prepared_sp
}

// ---------------------------------------------------------------------------
// Scheduler trampolines
// ---------------------------------------------------------------------------

// Plain functions called from the naked bodies below. Naked code must not
// contain compiler-generated stack frames, so all logic that needs locals
// is delegated here; the C ABI confines these calls to the call-clobbered
// registers and the full frame is already saved at every call site.

#[cfg(target_arch = "avr")]
unsafe extern "C" fn tick_scheduler() -> bool {
    (*crate::kernel::SCHEDULER_PTR).tick()
}

#[cfg(target_arch = "avr")]
unsafe extern "C" fn post_events(event_vec: crate::event::EventMask) -> bool {
    (*crate::kernel::SCHEDULER_PTR).post_events(event_vec)
}

#[cfg(target_arch = "avr")]
unsafe extern "C" fn suspend_current(
    event_mask: crate::event::EventMask,
    all: bool,
    timeout: crate::config::Tick,
) {
    (*crate::kernel::SCHEDULER_PTR).suspend_active(event_mask, all, timeout)
}

#[cfg(target_arch = "avr")]
unsafe extern "C" fn switch_stacks(outgoing_sp: usize) -> usize {
    (*crate::kernel::SCHEDULER_PTR).switch_stacks(outgoing_sp)
}

#[cfg(target_arch = "avr")]
unsafe extern "C" fn take_resume_event() -> crate::event::EventMask {
    (*crate::kernel::SCHEDULER_PTR).take_resume_event()
}

// ---------------------------------------------------------------------------
// System timer interrupt
// ---------------------------------------------------------------------------

// I/O addresses used below: SREG 0x3f, SPH 0x3e, SPL 0x3d.
//
// Every switching body ends with the same tail: read the current stack
// pointer, trade it through the scheduler for the incoming task's one, and
// push the incoming task's posted event set into the r24/r25 frame slots
// when it is resuming out of a suspend call (nonzero set). The restore
// sequence then pops the full frame and reti re-enables interrupts.

/// Timer 2 overflow interrupt: the system timer tick.
///
/// Naked so that no compiler prologue runs before the context is saved and
/// no epilogue after it is restored. Hardware has already cleared the
/// interrupt flag; it stays cleared until the final `reti`, covering the
/// non-atomic stack pointer switch.
///
/// # Safety
/// Entered by the interrupt controller only.
#[cfg(target_arch = "avr")]
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn __vector_15() {
    naked_asm!(
        // Save the full frame of the interrupted task.
        "push r0",
        "in r0, 0x3f",
        "push r0",
        "push r1",
        "push r2",
        "push r3",
        "push r4",
        "push r5",
        "push r6",
        "push r7",
        "push r8",
        "push r9",
        "push r10",
        "push r11",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "push r16",
        "push r17",
        "push r18",
        "push r19",
        "push r20",
        "push r21",
        "push r22",
        "push r23",
        "push r26",
        "push r27",
        "push r28",
        "push r29",
        "push r30",
        "push r31",
        "push r24",
        "push r25",
        // The interrupted code may have r1 temporarily in use; local code
        // runs with the zero register cleared.
        "clr r1",
        "call {tick}",
        "tst r24",
        "breq 1f",
        // Another task becomes active with this tick: swap the stack
        // pointer and deliver a pending suspend-call result.
        "in r24, 0x3d",
        "in r25, 0x3e",
        "call {switch_stacks}",
        "out 0x3d, r24",
        "out 0x3e, r25",
        "call {take_resume_event}",
        "adiw r24, 0",
        "breq 1f",
        "push r24",
        "push r25",
        "1:",
        // Restore the frame of the now active task. With no task change
        // this whole routine was just an ordinary interrupt.
        "pop r25",
        "pop r24",
        "pop r31",
        "pop r30",
        "pop r29",
        "pop r28",
        "pop r27",
        "pop r26",
        "pop r23",
        "pop r22",
        "pop r21",
        "pop r20",
        "pop r19",
        "pop r18",
        "pop r17",
        "pop r16",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop r11",
        "pop r10",
        "pop r9",
        "pop r8",
        "pop r7",
        "pop r6",
        "pop r5",
        "pop r4",
        "pop r3",
        "pop r2",
        "pop r1",
        "pop r0",
        "out 0x3f, r0",
        "pop r0",
        "reti",
        tick = sym tick_scheduler,
        switch_stacks = sym switch_stacks,
        take_resume_event = sym take_resume_event,
    )
}

// ---------------------------------------------------------------------------
// System calls
// ---------------------------------------------------------------------------

/// Post a set of events; the body of `kernel::set_event`.
///
/// A pseudo software interrupt: a true interrupt would have cleared the
/// interrupt flag, so this does it explicitly before saving the frame. The
/// caller's r24/r25 are part of the saved frame and still hold the posted
/// vector when the scheduler is called.
///
/// # Safety
/// Must be invoked by a real `call` from task or idle context, never
/// inlined, so that the return address is on the stack below the frame.
#[cfg(target_arch = "avr")]
#[unsafe(naked)]
pub unsafe extern "C" fn set_event(event_vec: crate::event::EventMask) {
    naked_asm!(
        "cli",
        "push r0",
        "in r0, 0x3f",
        "push r0",
        "push r1",
        "push r2",
        "push r3",
        "push r4",
        "push r5",
        "push r6",
        "push r7",
        "push r8",
        "push r9",
        "push r10",
        "push r11",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "push r16",
        "push r17",
        "push r18",
        "push r19",
        "push r20",
        "push r21",
        "push r22",
        "push r23",
        "push r26",
        "push r27",
        "push r28",
        "push r29",
        "push r30",
        "push r31",
        "push r24",
        "push r25",
        // Entry point for the application interrupts: they arrive here with
        // the frame already saved and their event vector in r24/r25.
        ".global __evos_set_event_entry",
        "__evos_set_event_entry:",
        "call {post}",
        "tst r24",
        "breq 1f",
        // A released task outranks the caller: switch away. The caller
        // stays due and resumes right here later, through the plain
        // restore (its posted set is zero).
        "in r24, 0x3d",
        "in r25, 0x3e",
        "call {switch_stacks}",
        "out 0x3d, r24",
        "out 0x3e, r25",
        "call {take_resume_event}",
        "adiw r24, 0",
        "breq 1f",
        "push r24",
        "push r25",
        "1:",
        "pop r25",
        "pop r24",
        "pop r31",
        "pop r30",
        "pop r29",
        "pop r28",
        "pop r27",
        "pop r26",
        "pop r23",
        "pop r22",
        "pop r21",
        "pop r20",
        "pop r19",
        "pop r18",
        "pop r17",
        "pop r16",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop r11",
        "pop r10",
        "pop r9",
        "pop r8",
        "pop r7",
        "pop r6",
        "pop r5",
        "pop r4",
        "pop r3",
        "pop r2",
        "pop r1",
        "pop r0",
        "out 0x3f, r0",
        "pop r0",
        "reti",
        post = sym post_events,
        switch_stacks = sym switch_stacks,
        take_resume_event = sym take_resume_event,
    )
}

/// Suspend the caller; the body of `kernel::wait_for_event`.
///
/// Saves the frame without r24/r25. The switch is unconditional: the
/// caller leaves the ready queues, so the incoming task is always another
/// one (possibly idle). The suspend call's result reaches the caller when
/// it is resumed later: whatever code path resumes it finds its posted
/// event set nonzero and pushes it into the r24/r25 frame slots.
///
/// # Safety
/// Must be invoked by a real `call` from a task, never from the idle task,
/// never inlined.
#[cfg(target_arch = "avr")]
#[unsafe(naked)]
pub unsafe extern "C" fn wait_for_event(
    event_mask: crate::event::EventMask,
    all: bool,
    timeout: crate::config::Tick,
) -> crate::event::EventMask {
    naked_asm!(
        "cli",
        // Save the frame sans r24/r25; the argument registers r22/r20 are
        // saved but still valid for the call below.
        "push r0",
        "in r0, 0x3f",
        "push r0",
        "push r1",
        "push r2",
        "push r3",
        "push r4",
        "push r5",
        "push r6",
        "push r7",
        "push r8",
        "push r9",
        "push r10",
        "push r11",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "push r16",
        "push r17",
        "push r18",
        "push r19",
        "push r20",
        "push r21",
        "push r22",
        "push r23",
        "push r26",
        "push r27",
        "push r28",
        "push r29",
        "push r30",
        "push r31",
        "call {suspend}",
        "in r24, 0x3d",
        "in r25, 0x3e",
        "call {switch_stacks}",
        "out 0x3d, r24",
        "out 0x3e, r25",
        "call {take_resume_event}",
        "adiw r24, 0",
        "breq 1f",
        "push r24",
        "push r25",
        "1:",
        "pop r25",
        "pop r24",
        "pop r31",
        "pop r30",
        "pop r29",
        "pop r28",
        "pop r27",
        "pop r26",
        "pop r23",
        "pop r22",
        "pop r21",
        "pop r20",
        "pop r19",
        "pop r18",
        "pop r17",
        "pop r16",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop r11",
        "pop r10",
        "pop r9",
        "pop r8",
        "pop r7",
        "pop r6",
        "pop r5",
        "pop r4",
        "pop r3",
        "pop r2",
        "pop r1",
        "pop r0",
        "out 0x3f, r0",
        "pop r0",
        "reti",
        suspend = sym suspend_current,
        switch_stacks = sym switch_stacks,
        take_resume_event = sym take_resume_event,
    )
}

// ---------------------------------------------------------------------------
// Application interrupts
// ---------------------------------------------------------------------------

/// Application interrupt 0 (Timer 3 compare A): posts `EVT_ISR_USER_00`.
///
/// Shares the posting and switching machinery with `set_event` at the
/// machine code level: it saves the frame, loads the fixed event vector
/// and jumps into the syscall body behind its save sequence. Both bodies
/// must be maintained in strict accordance.
///
/// # Safety
/// Entered by the interrupt controller only.
#[cfg(all(target_arch = "avr", feature = "isr-user-00"))]
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn __vector_32() {
    naked_asm!(
        "push r0",
        "in r0, 0x3f",
        "push r0",
        "push r1",
        "push r2",
        "push r3",
        "push r4",
        "push r5",
        "push r6",
        "push r7",
        "push r8",
        "push r9",
        "push r10",
        "push r11",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "push r16",
        "push r17",
        "push r18",
        "push r19",
        "push r20",
        "push r21",
        "push r22",
        "push r23",
        "push r26",
        "push r27",
        "push r28",
        "push r29",
        "push r30",
        "push r31",
        "push r24",
        "push r25",
        "clr r1",
        "ldi r24, {evt_lo}",
        "ldi r25, {evt_hi}",
        "jmp __evos_set_event_entry",
        evt_lo = const crate::event::EVT_ISR_USER_00 & 0xff,
        evt_hi = const crate::event::EVT_ISR_USER_00 >> 8,
    )
}

/// Application interrupt 1 (Timer 3 compare B): posts `EVT_ISR_USER_01`.
///
/// See `__vector_32`.
///
/// # Safety
/// Entered by the interrupt controller only.
#[cfg(all(target_arch = "avr", feature = "isr-user-01"))]
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn __vector_33() {
    naked_asm!(
        "push r0",
        "in r0, 0x3f",
        "push r0",
        "push r1",
        "push r2",
        "push r3",
        "push r4",
        "push r5",
        "push r6",
        "push r7",
        "push r8",
        "push r9",
        "push r10",
        "push r11",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "push r16",
        "push r17",
        "push r18",
        "push r19",
        "push r20",
        "push r21",
        "push r22",
        "push r23",
        "push r26",
        "push r27",
        "push r28",
        "push r29",
        "push r30",
        "push r31",
        "push r24",
        "push r25",
        "clr r1",
        "ldi r24, {evt_lo}",
        "ldi r25, {evt_hi}",
        "jmp __evos_set_event_entry",
        evt_lo = const crate::event::EVT_ISR_USER_01 & 0xff,
        evt_hi = const crate::event::EVT_ISR_USER_01 >> 8,
    )
}

// ---------------------------------------------------------------------------
// Default tick source
// ---------------------------------------------------------------------------

/// Start the interrupt that clocks the system time, unless the application
/// installs its own source.
///
/// Timer 2 in phase correct PWM mode with prescaler 64 counts 0..255 and
/// back down: 16 MHz / 64 / 510 = 490.2 Hz, a tick period of roughly 2 ms.
#[cfg(target_arch = "avr")]
pub fn enable_timer_tick() {
    // Owned exclusively by the kernel; configured before the scheduler
    // starts, so no concurrent access exists yet.
    let tc2 = unsafe { &*avr_device::atmega2560::TC2::ptr() };
    tc2.tccr2a.write(|w| w.wgm2().pwm_phase());
    tc2.tccr2b.write(|w| w.cs2().prescale_64());
    tc2.timsk2.modify(|_, w| w.toie2().set_bit());
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
