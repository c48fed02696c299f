//! # Cortex-M4 Port Layer
//!
//! Hardware-specific code for the ARM Cortex-M4 (Thumb-2) processor:
//! context switching via PendSV, SysTick configuration, exception
//! priorities, and the first-task launch.
//!
//! ## Context Switch Mechanism
//!
//! Tasks run in Thread mode on the process stack (PSP); the kernel and
//! all handlers run on the main stack (MSP). On exception entry the
//! hardware stacks R0–R3, R12, LR, PC, and xPSR onto the interrupted
//! task's PSP; the PendSV handler saves and restores R4–R11 around the
//! scheduling decision, completing the context.
//!
//! ## Exception Priorities
//!
//! - SysTick: 0x80 — outranks PendSV so a tick is never lost behind a
//!   switch in progress.
//! - PendSV: 0xFF (lowest) — tail-chains after every other handler, so a
//!   switch only ever happens with no other ISR active.
//!
//! Because SysTick outranks PendSV, the PendSV handler masks interrupts
//! around its save/pick/restore; the ready index is never seen
//! half-updated.

use core::arch::naked_asm;

use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::{DWT, SYST};

use crate::config::{SYSTEM_CLOCK_HZ, TICK_HZ};
use crate::kernel;

// ---------------------------------------------------------------------------
// System control registers
// ---------------------------------------------------------------------------

/// Interrupt Control and State Register; bit 28 pends PendSV.
const ICSR: *mut u32 = 0xE000_ED04 as *mut u32;
const ICSR_PENDSVSET: u32 = 1 << 28;

/// System Handler Priority Register 3: PendSV in bits [23:16], SysTick
/// in bits [31:24].
const SHPR3: *mut u32 = 0xE000_ED20 as *mut u32;

/// SysTick's reload field is 24 bits wide.
const SYST_RELOAD_MAX: u32 = 0x00FF_FFFF;

// ---------------------------------------------------------------------------
// Tick source and priorities
// ---------------------------------------------------------------------------

/// Configure SysTick to fire at `TICK_HZ` from the core clock. Halts
/// fatally if the derived reload does not fit the 24-bit field.
pub fn configure_systick(syst: &mut SYST) {
    let reload = SYSTEM_CLOCK_HZ / TICK_HZ - 1;
    if reload > SYST_RELOAD_MAX {
        fatal();
    }
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

/// SysTick above PendSV, PendSV at the floor.
pub fn set_exception_priorities() {
    unsafe {
        let value = core::ptr::read_volatile(SHPR3);
        let value = (value & 0x0000_FFFF) | (0xFF << 16) | (0x80 << 24);
        core::ptr::write_volatile(SHPR3, value);
    }
}

/// Request a context switch. PendSV is pended and runs as soon as no
/// higher-priority exception is active.
#[inline]
pub fn trigger_pendsv() {
    unsafe {
        core::ptr::write_volatile(ICSR, ICSR_PENDSVSET);
    }
}

/// Unrecoverable kernel state. Park the CPU with interrupts masked; the
/// external fault infrastructure owns diagnostics.
pub fn fatal() -> ! {
    cortex_m::interrupt::disable();
    loop {
        cortex_m::asm::nop();
    }
}

// ---------------------------------------------------------------------------
// First task launch
// ---------------------------------------------------------------------------

/// Flag the first-ever context switch by clearing PSP; the PendSV
/// handler reads zero as "no outgoing context to save". Must happen
/// before the tick source is enabled — the first tick may pend the
/// switch before [`launch`] gets to.
pub fn prepare_first_switch() {
    unsafe {
        cortex_m::register::psp::write(0);
    }
}

/// Launch the first task. **Does not return.**
///
/// Pends the switch and makes sure interrupts are live; PendSV then
/// fires, restores the first task's synthesized frame, and drops into it
/// in Thread mode on the process stack. The `wfi` loop below is never
/// reached once that happens (and is skipped entirely if a tick already
/// pended the switch).
///
/// # Safety
///
/// Must be called exactly once, from Thread mode on the main stack, after
/// the scheduler has picked a first task and PSP has been cleared.
pub unsafe fn launch() -> ! {
    trigger_pendsv();
    cortex_m::interrupt::enable();
    loop {
        cortex_m::asm::wfi();
    }
}

// ---------------------------------------------------------------------------
// PendSV handler (context switch)
// ---------------------------------------------------------------------------

/// PendSV exception handler — the context switch itself.
///
/// 1. Save R4–R11 onto the outgoing task's process stack and record the
///    resulting stack top in its TCB (skipped when PSP is zero — the
///    first-ever switch has nothing to save).
/// 2. Ask the scheduler for a successor.
/// 3. Restore the successor's R4–R11 and point PSP at its frame.
/// 4. Return with EXC_RETURN selecting Thread mode on the process stack;
///    the hardware unstacks the rest.
///
/// Runs with interrupts masked so the tick handler, which outranks it,
/// cannot observe the ready index mid-update.
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        "cpsid i",
        "mrs r0, psp",
        "cbz r0, 2f", // first switch: no context to save
        "stmdb r0!, {{r4-r11}}",
        "bl {save_context}",
        "2:",
        "bl {switch_context}", // returns the incoming stack top in r0
        "ldmia r0!, {{r4-r11}}",
        "msr psp, r0",
        "ldr r0, =0xFFFFFFFD", // EXC_RETURN: Thread mode, PSP
        "cpsie i",
        "bx r0",
        save_context = sym save_context,
        switch_context = sym switch_context,
    );
}

/// Record the outgoing task's stack top. Called from PendSV with
/// interrupts masked.
unsafe extern "C" fn save_context(stack_top: *mut u32) {
    kernel::scheduler().save_context(stack_top);
}

/// Pick the successor and hand its stack top back to the assembly.
/// Called from PendSV with interrupts masked.
unsafe extern "C" fn switch_context() -> *mut u32 {
    let sched = kernel::scheduler();
    let started = DWT::cycle_count();
    let stack_top = sched.switch_to_next();
    sched.note_pick_cycles(DWT::cycle_count().wrapping_sub(started));
    match stack_top {
        Some(top) => top,
        None => fatal(),
    }
}

// ---------------------------------------------------------------------------
// SysTick handler
// ---------------------------------------------------------------------------

/// SysTick exception handler — one tick of kernel time.
///
/// Advances the tick counter, resumes expired delays and timed-out
/// waits, services the soft timer registry, and unconditionally pends a
/// context switch so any newly readied task preempts promptly.
#[no_mangle]
pub unsafe extern "C" fn SysTick() {
    let sched = kernel::scheduler();
    sched.tick();
    crate::timer::advance();
    trigger_pendsv();
}
