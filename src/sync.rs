//! # Synchronization Primitives
//!
//! The blocking primitive family: counting [`Semaphore`], priority-
//! inheritance [`Mutex`], and bounded [`Queue`], plus the critical-section
//! wrapper everything in the kernel uses to serialize against interrupt
//! handlers.
//!
//! All three primitives are designed for static allocation (`const fn`
//! constructors) and follow the same wait protocol: try to acquire under
//! the interrupt mask; otherwise record what we are waiting for in the
//! current task's control block, leave the ready index, and request a
//! context switch. Whoever resumes us — the releasing task or the tick
//! handler's timeout scan — has already stamped `wait_result`, and on
//! anything but a timeout the acquire is *retried*: between the wakeup and
//! our next run, another task of equal or higher priority may have taken
//! the token.
//!
//! Blocking calls are task-context only; `Semaphore::signal` is also safe
//! from interrupt context.

use core::cell::UnsafeCell;

use cortex_m::interrupt::CriticalSection;

use crate::arch;
use crate::config::{QUEUE_DEPTH, WAIT_FOREVER};
use crate::kernel;
use crate::scheduler::TaskId;
use crate::task::{TaskState, WaitChannel, WaitResult};

/// Execute a closure with the global interrupt mask asserted.
///
/// This is the only mechanism for touching shared kernel state. Sections
/// must stay short and must never contain a blocking call.
///
/// On a hosted build (unit tests) there are no interrupts to mask and the
/// test harness is the only execution context, so the closure just runs.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(&CriticalSection) -> R,
{
    #[cfg(all(target_arch = "arm", target_os = "none"))]
    {
        cortex_m::interrupt::free(f)
    }
    #[cfg(not(all(target_arch = "arm", target_os = "none")))]
    {
        f(unsafe { &CriticalSection::new() })
    }
}

/// Error returned when a blocking call's deadline expires. The only error
/// a wait can surface; every other failure mode is either silent by
/// contract or fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeout;

/// What a single masked acquire attempt decided.
enum Claim {
    /// Got the token/lock; the wait is over.
    Got,
    /// `timeout == 0` and the resource is busy; fail without blocking.
    Refused,
    /// The current task is now blocked; switch away and re-evaluate.
    Parked,
}

/// Stamp the current task's `wait_result` for a wait that finished
/// without ever leaving the ready state.
fn stamp_current(sched: &mut crate::scheduler::Scheduler, result: WaitResult) {
    if let Some(current) = sched.current() {
        sched.tasks[current].wait_result = result;
        if result == WaitResult::Ok {
            sched.tasks[current].wait_obj = None;
        }
    }
}

/// True if the current task's wait ended in a timeout. Read after resume.
fn current_timed_out() -> bool {
    critical_section(|_| unsafe {
        let sched = kernel::scheduler();
        match sched.current() {
            Some(current) => sched.tasks[current].wait_result == WaitResult::Timeout,
            None => false,
        }
    })
}

// ---------------------------------------------------------------------------
// Counting semaphore
// ---------------------------------------------------------------------------

/// Counting semaphore. Initialize with `0` or `1` for binary use.
///
/// Wakeup order on `signal` is pool-scan order, not arrival order — the
/// first blocked waiter by task index gets the token.
pub struct Semaphore {
    count: UnsafeCell<u32>,
}

// Safety: `count` is only touched inside critical sections.
unsafe impl Sync for Semaphore {}

impl Semaphore {
    /// A semaphore holding `initial` tokens.
    pub const fn new(initial: u32) -> Self {
        Self {
            count: UnsafeCell::new(initial),
        }
    }

    /// Take a token, blocking without a deadline until one is available.
    pub fn wait(&self) {
        let _ = self.wait_timeout(WAIT_FOREVER);
    }

    /// Take a token, blocking at most `timeout` ticks.
    ///
    /// `timeout == 0` polls: it fails immediately if no token is held.
    /// [`WAIT_FOREVER`] disables the deadline.
    pub fn wait_timeout(&self, timeout: u32) -> Result<(), Timeout> {
        loop {
            let claim = critical_section(|_| unsafe {
                let sched = kernel::scheduler();
                let count = &mut *self.count.get();
                if *count > 0 {
                    *count -= 1;
                    stamp_current(sched, WaitResult::Ok);
                    return Claim::Got;
                }
                if timeout == 0 {
                    stamp_current(sched, WaitResult::Timeout);
                    return Claim::Refused;
                }
                sched.block_current(TaskState::BlockedSem, WaitChannel::of(self), timeout);
                Claim::Parked
            });
            match claim {
                Claim::Got => return Ok(()),
                Claim::Refused => return Err(Timeout),
                Claim::Parked => {
                    arch::trigger_pendsv();
                    if current_timed_out() {
                        return Err(Timeout);
                    }
                    // Signaled — but the token may already be gone again;
                    // go around and retry the acquire.
                }
            }
        }
    }

    /// Release a token and wake the first task blocked on this semaphore,
    /// if any.
    pub fn signal(&self) {
        critical_section(|_| unsafe {
            let sched = kernel::scheduler();
            let count = &mut *self.count.get();
            *count = count.wrapping_add(1);
            sched.wake_first(TaskState::BlockedSem, WaitChannel::of(self));
        });
        arch::trigger_pendsv();
    }
}

// ---------------------------------------------------------------------------
// Priority-inheritance mutex
// ---------------------------------------------------------------------------

struct MutexState {
    locked: bool,
    owner: Option<TaskId>,
    /// Owner's base priority at the moment of acquisition; what unlock
    /// restores the owner's effective priority to.
    saved_base_priority: u8,
}

/// Mutual-exclusion lock with single-level priority inheritance.
///
/// While a task waits on a lock held by a lower-priority owner, the owner
/// runs at the waiter's effective priority, so an unrelated medium-
/// priority task cannot keep the lock held indefinitely. Inheritance is
/// not propagated through chains of mutexes, and unlock restores the
/// owner straight to its base priority even if another held mutex would
/// still warrant a raise.
pub struct Mutex {
    state: UnsafeCell<MutexState>,
}

// Safety: `state` is only touched inside critical sections.
unsafe impl Sync for Mutex {}

impl Mutex {
    /// An unlocked mutex.
    pub const fn new() -> Self {
        Self {
            state: UnsafeCell::new(MutexState {
                locked: false,
                owner: None,
                saved_base_priority: 0,
            }),
        }
    }

    /// Acquire the lock, blocking without a deadline.
    pub fn lock(&self) {
        let _ = self.lock_timeout(WAIT_FOREVER);
    }

    /// Acquire the lock, blocking at most `timeout` ticks. A contended
    /// attempt raises the owner's effective priority to the caller's
    /// before failing or blocking.
    pub fn lock_timeout(&self, timeout: u32) -> Result<(), Timeout> {
        loop {
            let claim = critical_section(|_| unsafe {
                let sched = kernel::scheduler();
                let state = &mut *self.state.get();
                if !state.locked {
                    state.locked = true;
                    state.owner = sched.current();
                    state.saved_base_priority = match state.owner {
                        Some(owner) => sched.tasks[owner].base_priority,
                        None => 0,
                    };
                    stamp_current(sched, WaitResult::Ok);
                    return Claim::Got;
                }
                // Priority inversion: lend the owner our priority for the
                // duration of the hold. Single level only — an owner that
                // is itself blocked on another mutex is not chased.
                if let (Some(current), Some(owner)) = (sched.current(), state.owner) {
                    let wanted = sched.tasks[current].effective_priority;
                    if wanted > sched.tasks[owner].effective_priority {
                        sched.set_effective_priority(owner, wanted);
                    }
                }
                if timeout == 0 {
                    stamp_current(sched, WaitResult::Timeout);
                    return Claim::Refused;
                }
                sched.block_current(TaskState::BlockedMutex, WaitChannel::of(self), timeout);
                Claim::Parked
            });
            match claim {
                Claim::Got => return Ok(()),
                Claim::Refused => return Err(Timeout),
                Claim::Parked => {
                    arch::trigger_pendsv();
                    if current_timed_out() {
                        return Err(Timeout);
                    }
                }
            }
        }
    }

    /// Release the lock, drop any inherited priority, and wake the first
    /// task blocked on it.
    ///
    /// Calling this without owning the lock is a contract violation and is
    /// silently ignored.
    pub fn unlock(&self) {
        critical_section(|_| unsafe {
            let sched = kernel::scheduler();
            let state = &mut *self.state.get();
            if !state.locked || state.owner != sched.current() {
                return;
            }
            if let Some(owner) = state.owner {
                sched.set_effective_priority(owner, state.saved_base_priority);
            }
            state.locked = false;
            state.owner = None;
            sched.wake_first(TaskState::BlockedMutex, WaitChannel::of(self));
        });
        arch::trigger_pendsv();
    }
}

// ---------------------------------------------------------------------------
// Bounded message queue
// ---------------------------------------------------------------------------

/// Bounded FIFO of `QUEUE_DEPTH` 32-bit messages.
///
/// Two counting semaphores encode occupancy — free slots and available
/// messages — and a priority-inheritance mutex guards the ring indices,
/// so the indices can never run past the buffer. Messages come out in
/// slot-acquisition order; concurrent senders or receivers are ordered by
/// the semaphores' wakeup policy.
pub struct Queue {
    slots: UnsafeCell<[u32; QUEUE_DEPTH]>,
    /// Next write position.
    head: UnsafeCell<usize>,
    /// Next read position.
    tail: UnsafeCell<usize>,
    free_slots: Semaphore,
    available: Semaphore,
    lock: Mutex,
}

// Safety: the ring and its indices are only touched while `lock` is held.
unsafe impl Sync for Queue {}

impl Queue {
    /// An empty queue.
    pub const fn new() -> Self {
        Self {
            slots: UnsafeCell::new([0; QUEUE_DEPTH]),
            head: UnsafeCell::new(0),
            tail: UnsafeCell::new(0),
            free_slots: Semaphore::new(QUEUE_DEPTH as u32),
            available: Semaphore::new(0),
            lock: Mutex::new(),
        }
    }

    /// Enqueue `msg`, blocking without a deadline while the queue is full.
    pub fn send(&self, msg: u32) {
        let _ = self.send_timeout(msg, WAIT_FOREVER);
    }

    /// Enqueue `msg`, waiting at most `timeout` ticks for a free slot.
    pub fn send_timeout(&self, msg: u32, timeout: u32) -> Result<(), Timeout> {
        self.free_slots.wait_timeout(timeout)?;
        self.lock.lock();
        unsafe {
            let head = &mut *self.head.get();
            (*self.slots.get())[*head] = msg;
            *head = (*head + 1) % QUEUE_DEPTH;
        }
        self.lock.unlock();
        self.available.signal();
        Ok(())
    }

    /// Dequeue the oldest message, blocking without a deadline while the
    /// queue is empty.
    pub fn receive(&self) -> u32 {
        loop {
            // An unarmed deadline cannot expire, so this returns on the
            // first pass; the loop just keeps the contract visible.
            if let Ok(msg) = self.receive_timeout(WAIT_FOREVER) {
                return msg;
            }
        }
    }

    /// Dequeue the oldest message, waiting at most `timeout` ticks for one
    /// to arrive.
    pub fn receive_timeout(&self, timeout: u32) -> Result<u32, Timeout> {
        self.available.wait_timeout(timeout)?;
        self.lock.lock();
        let msg = unsafe {
            let tail = &mut *self.tail.get();
            let msg = (*self.slots.get())[*tail];
            *tail = (*tail + 1) % QUEUE_DEPTH;
            msg
        };
        self.lock.unlock();
        self.free_slots.signal();
        Ok(msg)
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
//
// These run against the one global kernel cell, serialized by
// `kernel_lock` and reset through `kernel::init` per test. Semaphore and
// Queue blocking hand-offs are thin pass-throughs to `block_current`/
// `wake_first` and are covered at the scheduler level; the mutex's own
// priority-inheritance decisions are exercised here with real task
// identities.
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::{Mutex as StdMutex, MutexGuard};

    use super::*;
    use crate::config::QUEUE_DEPTH;

    static KERNEL_GUARD: StdMutex<()> = StdMutex::new(());

    /// Every test here goes through the global kernel cell; hold this for
    /// the test's duration so they don't interleave.
    fn kernel_lock() -> MutexGuard<'static, ()> {
        KERNEL_GUARD
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    extern "C" fn spin() -> ! {
        loop {}
    }

    #[test]
    fn binary_semaphore_polls() {
        let _serial = kernel_lock();
        kernel::init();
        let sem = Semaphore::new(1);
        assert_eq!(sem.wait_timeout(0), Ok(()));
        assert_eq!(sem.wait_timeout(0), Err(Timeout));
        sem.signal();
        assert_eq!(sem.wait_timeout(0), Ok(()));
    }

    #[test]
    fn counting_semaphore_hands_out_every_token() {
        let _serial = kernel_lock();
        kernel::init();
        let sem = Semaphore::new(3);
        for _ in 0..3 {
            assert_eq!(sem.wait_timeout(0), Ok(()));
        }
        assert_eq!(sem.wait_timeout(0), Err(Timeout));
    }

    #[test]
    fn mutex_is_not_reentrant() {
        let _serial = kernel_lock();
        kernel::init();
        let mx = Mutex::new();
        assert_eq!(mx.lock_timeout(0), Ok(()));
        assert_eq!(mx.lock_timeout(0), Err(Timeout));
        mx.unlock();
        assert_eq!(mx.lock_timeout(0), Ok(()));
    }

    #[test]
    fn contended_lock_lends_waiter_priority_to_owner() {
        let _serial = kernel_lock();
        kernel::init();
        let mx = Mutex::new();

        let (low, high) = critical_section(|_| unsafe {
            let sched = kernel::scheduler();
            let low = sched.create_task(spin, 1).unwrap();
            let high = sched.create_task(spin, 5).unwrap();
            sched.set_current(Some(low));
            (low, high)
        });

        // Low takes the lock uncontended; nothing to inherit yet.
        assert_eq!(mx.lock_timeout(0), Ok(()));
        critical_section(|_| unsafe {
            assert_eq!(kernel::scheduler().tasks[low].effective_priority, 1);
        });

        // High contends while Low holds it. Even a failed poll lends
        // High's priority to Low for the rest of the hold.
        critical_section(|_| unsafe { kernel::scheduler().set_current(Some(high)) });
        assert_eq!(mx.lock_timeout(0), Err(Timeout));
        critical_section(|_| unsafe {
            let sched = kernel::scheduler();
            assert_eq!(sched.tasks[low].effective_priority, 5);
            assert_eq!(sched.tasks[low].base_priority, 1);
        });

        // Unlock by the owner sheds the inherited priority.
        critical_section(|_| unsafe { kernel::scheduler().set_current(Some(low)) });
        mx.unlock();
        critical_section(|_| unsafe {
            let sched = kernel::scheduler();
            assert_eq!(
                sched.tasks[low].effective_priority,
                sched.tasks[low].base_priority
            );
        });

        // And the lock is free for High to take.
        critical_section(|_| unsafe { kernel::scheduler().set_current(Some(high)) });
        assert_eq!(mx.lock_timeout(0), Ok(()));
    }

    #[test]
    fn unlock_wakes_blocked_waiter_and_restores_owner() {
        let _serial = kernel_lock();
        kernel::init();
        let mx = Mutex::new();

        let (low, high) = critical_section(|_| unsafe {
            let sched = kernel::scheduler();
            let low = sched.create_task(spin, 1).unwrap();
            let high = sched.create_task(spin, 5).unwrap();
            sched.set_current(Some(low));
            (low, high)
        });

        assert_eq!(mx.lock_timeout(0), Ok(()));

        // High contends — the failed attempt raises Low — then parks on
        // the mutex the way a blocking lock_timeout does before it
        // switches away.
        critical_section(|_| unsafe { kernel::scheduler().set_current(Some(high)) });
        assert_eq!(mx.lock_timeout(0), Err(Timeout));
        critical_section(|_| unsafe {
            let sched = kernel::scheduler();
            sched.block_current(TaskState::BlockedMutex, WaitChannel::of(&mx), WAIT_FOREVER);
            sched.set_current(Some(low));
            assert_eq!(sched.tasks[low].effective_priority, 5);
        });

        mx.unlock();
        critical_section(|_| unsafe {
            let sched = kernel::scheduler();
            assert_eq!(sched.tasks[high].state, TaskState::Ready);
            assert_eq!(sched.tasks[high].wait_result, WaitResult::Ok);
            assert_eq!(sched.tasks[high].wait_obj, None);
            assert_eq!(sched.tasks[low].effective_priority, 1);
        });
    }

    #[test]
    fn queue_is_fifo() {
        let _serial = kernel_lock();
        kernel::init();
        let q = Queue::new();
        for msg in [100, 101, 102] {
            q.send_timeout(msg, 0).unwrap();
        }
        assert_eq!(q.receive_timeout(0), Ok(100));
        assert_eq!(q.receive_timeout(0), Ok(101));
        assert_eq!(q.receive_timeout(0), Ok(102));
        assert_eq!(q.receive_timeout(0), Err(Timeout));
    }

    #[test]
    fn queue_enforces_capacity() {
        let _serial = kernel_lock();
        kernel::init();
        let q = Queue::new();
        for msg in 0..QUEUE_DEPTH as u32 {
            assert_eq!(q.send_timeout(msg, 0), Ok(()));
        }
        assert_eq!(q.send_timeout(99, 0), Err(Timeout));
        assert_eq!(q.receive_timeout(0), Ok(0));
        assert_eq!(q.send_timeout(99, 0), Ok(()));
    }

    #[test]
    fn queue_ring_wraps() {
        let _serial = kernel_lock();
        kernel::init();
        let q = Queue::new();
        for round in 0..3u32 {
            for i in 0..QUEUE_DEPTH as u32 {
                q.send_timeout(round * 100 + i, 0).unwrap();
            }
            for i in 0..QUEUE_DEPTH as u32 {
                assert_eq!(q.receive_timeout(0), Ok(round * 100 + i));
            }
        }
    }
}
