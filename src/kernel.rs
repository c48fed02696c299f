//! # Kernel
//!
//! Top-level kernel state and public API for StratOS.
//!
//! The kernel owns the single [`Scheduler`] instance in statically
//! allocated storage and wraps its operations in critical sections, so
//! tasks, interrupt handlers, and the context-switch exception all see a
//! consistent view.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► kernel::init()          ← Reset kernel state
//!         ├─► kernel::create_task()   ← Register tasks (×N, idle included)
//!         └─► kernel::start()         ← Launch scheduler (no return)
//!               ├─► Exception priorities (tick > PendSV), DWT on
//!               ├─► Pick the first task, clear PSP
//!               ├─► Enable the SysTick tick source
//!               └─► Pend the first context switch
//! ```

use crate::arch;
use crate::scheduler::{CreateError, Scheduler, SwitchStats, TaskId};
use crate::sync;

// ---------------------------------------------------------------------------
// Global scheduler instance
// ---------------------------------------------------------------------------

/// Statically allocated cell holding the scheduler for the program's
/// lifetime. There is no teardown.
struct KernelCell(core::cell::UnsafeCell<Scheduler>);

// Safety: every access goes through `scheduler()` under the rules below.
unsafe impl Sync for KernelCell {}

static KERNEL: KernelCell = KernelCell(core::cell::UnsafeCell::new(Scheduler::new()));

/// Borrow the global scheduler.
///
/// # Safety
///
/// Callers must hold the global interrupt mask (be inside
/// [`sync::critical_section`]) or be the PendSV/SysTick handler, which
/// serialize against masked sections by construction. The borrow must not
/// outlive that window.
pub(crate) unsafe fn scheduler() -> &'static mut Scheduler {
    &mut *KERNEL.0.get()
}

// ---------------------------------------------------------------------------
// Kernel API
// ---------------------------------------------------------------------------

/// Reset the kernel to a pristine state. Call exactly once, before any
/// task is created.
pub fn init() {
    sync::critical_section(|_| unsafe {
        *scheduler() = Scheduler::new();
    });
}

/// Create a task executing `entry` at `priority` (0 = lowest).
///
/// Tasks can only be created before [`start`]; the pool size and stack
/// size are compile-time constants. Register an idle task at priority 0
/// that never blocks — the scheduler relies on something always being
/// runnable.
pub fn create_task(entry: extern "C" fn() -> !, priority: u8) -> Result<TaskId, CreateError> {
    sync::critical_section(|_| unsafe { scheduler().create_task(entry, priority) })
}

/// Start scheduling. **Does not return.**
///
/// Configures the SysTick tick source and exception priorities, enables
/// the DWT cycle counter for switch instrumentation, picks the first
/// task, and pends the first context switch. Halts fatally if no task
/// was ever created.
pub fn start(mut peripherals: cortex_m::Peripherals) -> ! {
    arch::set_exception_priorities();
    peripherals.DCB.enable_trace();
    peripherals.DWT.enable_cycle_counter();

    let first = sync::critical_section(|_| unsafe { scheduler().select_first() });
    if first.is_none() {
        arch::fatal();
    }

    // PSP must be clear before the tick source can pend the first switch:
    // the PendSV handler reads PSP == 0 as "nothing to save".
    arch::prepare_first_switch();
    arch::configure_systick(&mut peripherals.SYST);
    unsafe { arch::launch() }
}

/// Voluntarily hand the CPU to the next runnable task of equal or higher
/// priority. A no-op if the caller is the only such task.
pub fn yield_now() {
    arch::trigger_pendsv();
}

/// Sleep the calling task for at least `ticks` ticks. `0` returns
/// immediately.
pub fn delay(ticks: u32) {
    if ticks == 0 {
        return;
    }
    sync::critical_section(|_| unsafe { scheduler().delay_current(ticks) });
    arch::trigger_pendsv();
}

/// Current kernel time in ticks. Non-decreasing; wraps at 32 bits.
pub fn now() -> u32 {
    sync::critical_section(|_| unsafe { scheduler().now() })
}

/// Context-switch instrumentation: switch count and DWT-measured pick
/// durations.
pub fn switch_stats() -> SwitchStats {
    sync::critical_section(|_| unsafe { scheduler().stats() })
}
