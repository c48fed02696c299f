//! # Soft Timers
//!
//! Periodic callbacks driven by the kernel tick. Timers are statically
//! allocated and linked into an intrusive singly linked registry; the tick
//! handler walks the registry once per tick, decrements each active
//! timer's countdown, and fires the callback on zero before reloading.
//!
//! Callbacks run in interrupt context at tick priority. They must be
//! bounded and must not block; `Semaphore::signal`, `Timer::start`, and
//! `Timer::stop` are fine, anything that can suspend is not.

use core::cell::UnsafeCell;
use core::ptr;

use crate::config::TICK_HZ;
use crate::sync::critical_section;

/// Convert a period in milliseconds to ticks, rounding up so a period
/// never fires early when the tick rate and 1 kHz don't divide evenly.
/// Clamped to one tick minimum.
const fn ticks_for(period_ms: u32, tick_hz: u32) -> u32 {
    let ticks = ((period_ms as u64 * tick_hz as u64 + 999) / 1000) as u32;
    if ticks == 0 {
        1
    } else {
        ticks
    }
}

struct TimerState {
    period_ticks: u32,
    remaining_ticks: u32,
    callback: fn(),
    active: bool,
    /// Once linked into the registry a timer stays there for the life of
    /// the program; `start` must not link it twice.
    linked: bool,
    next: *const Timer,
}

/// A periodic soft timer. Construct as a `static`, then [`start`] it.
///
/// [`start`]: Timer::start
pub struct Timer {
    state: UnsafeCell<TimerState>,
}

// Safety: `state` is only touched inside critical sections or from the
// tick handler, which the critical sections mask out.
unsafe impl Sync for Timer {}

/// Head of the intrusive timer registry.
struct Registry {
    head: UnsafeCell<*const Timer>,
}

unsafe impl Sync for Registry {}

static REGISTRY: Registry = Registry {
    head: UnsafeCell::new(ptr::null()),
};

impl Timer {
    /// A stopped timer firing `callback` every `period_ms` milliseconds
    /// once started. The period is converted to ticks with ceiling
    /// rounding.
    pub const fn new(period_ms: u32, callback: fn()) -> Self {
        let ticks = ticks_for(period_ms, TICK_HZ);
        Self {
            state: UnsafeCell::new(TimerState {
                period_ticks: ticks,
                remaining_ticks: ticks,
                callback,
                active: false,
                linked: false,
                next: ptr::null(),
            }),
        }
    }

    /// Activate the timer, restarting its period from now. Links the
    /// timer into the registry on first use; restarting an already
    /// running timer just reloads the countdown.
    pub fn start(&'static self) {
        critical_section(|_| unsafe {
            let state = &mut *self.state.get();
            state.active = true;
            state.remaining_ticks = state.period_ticks;
            if !state.linked {
                state.next = *REGISTRY.head.get();
                *REGISTRY.head.get() = self as *const Timer;
                state.linked = true;
            }
        });
    }

    /// Deactivate the timer. The countdown freezes; `start` rearms it
    /// from a full period.
    pub fn stop(&'static self) {
        critical_section(|_| unsafe {
            (*self.state.get()).active = false;
        });
    }
}

/// Advance every registered timer by one tick. Called from the tick
/// handler after delays and timeouts have been serviced.
pub fn advance() {
    unsafe { advance_list(*REGISTRY.head.get()) }
}

/// Walk an intrusive timer chain. Callbacks may start further timers;
/// new registrations land ahead of the head we already hold, so the walk
/// stays consistent.
unsafe fn advance_list(mut cursor: *const Timer) {
    while !cursor.is_null() {
        let state = &mut *(*cursor).state.get();
        let next = state.next;
        if state.active {
            state.remaining_ticks -= 1;
            if state.remaining_ticks == 0 {
                state.remaining_ticks = state.period_ticks;
                (state.callback)();
            }
        }
        cursor = next;
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
