//! # Task Control Block
//!
//! Defines the task model for StratOS: the per-task state machine, the
//! wait/wakeup bookkeeping fields, and the task control block itself.
//! TCBs live in a fixed pool inside the scheduler — no heap allocation.

use crate::config::STACK_WORDS;

// ---------------------------------------------------------------------------
// Task state machine
// ---------------------------------------------------------------------------

/// Scheduling state of a task.
///
/// ```text
///   ┌─────────┐  delay()   ┌──────────┐
///   │  Ready  │ ─────────► │ Delayed  │
///   └─────────┘            └──────────┘
///        │  ▲                    │
///        │  └────────────────────┘ deadline reached
///        │
///        │ wait()/lock()/send()/receive()   ┌────────────┐
///        └────────────────────────────────► │ Blocked*   │
///                                           └────────────┘
///                 signal()/unlock()/timeout       │
///        ◄────────────────────────────────────────┘
/// ```
///
/// A `Ready` task sits on the ready list of its effective priority; the
/// scheduler may run it at any time. There is no separate `Running` state —
/// the current task stays `Ready` and remains on its list, which is what
/// makes round-robin rotation work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Eligible to run; on the ready list of its effective priority.
    Ready,
    /// Sleeping until an absolute tick; on the delay list.
    Delayed,
    /// Waiting on a semaphore token.
    BlockedSem,
    /// Waiting for a mutex to be released.
    BlockedMutex,
    /// Waiting on a message queue endpoint.
    BlockedQueue,
}

impl TaskState {
    /// True for every `Blocked*` variant. Blocked tasks are the ones the
    /// tick handler scans for expired timeouts.
    #[inline]
    pub fn is_blocked(self) -> bool {
        matches!(
            self,
            TaskState::BlockedSem | TaskState::BlockedMutex | TaskState::BlockedQueue
        )
    }
}

/// Outcome of a blocking call, written by whoever resumes the task and
/// consumed by the task after it runs again.
///
/// A blocked task leaves its wait with exactly one of `Ok` or `Timeout`:
/// the transition out of `Pending` happens once, under the interrupt mask,
/// either in the wakeup path or in the tick handler — never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    /// Still waiting; the deadline scan only touches tasks in this state.
    Pending,
    /// The awaited event arrived (token, mutex hand-off, or delay expiry).
    Ok,
    /// The deadline passed first.
    Timeout,
}

// ---------------------------------------------------------------------------
// Wait-channel identity
// ---------------------------------------------------------------------------

/// Identity of the primitive a task is blocked on, compared by address.
///
/// Primitives are statically allocated and never move, so their address is
/// a stable identity for the lifetime of the program. The pointer is never
/// dereferenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitChannel(*const ());

impl WaitChannel {
    /// Channel identity of `obj`.
    #[inline]
    pub fn of<T>(obj: &T) -> Self {
        WaitChannel(obj as *const T as *const ())
    }
}

// ---------------------------------------------------------------------------
// Task Control Block
// ---------------------------------------------------------------------------

/// Per-task stack memory. Aligned to 8 bytes as required by the AAPCS.
#[repr(align(8))]
pub struct TaskStack(pub [u32; STACK_WORDS]);

/// Task Control Block (TCB) — everything the kernel needs to schedule,
/// block, and context-switch one task.
///
/// TCBs are pool-allocated inside the scheduler and linked into at most
/// one list at a time: the circular ready list of their effective priority,
/// or the sorted delay list. The `link` field is the intrusive next index
/// into the pool for whichever list currently holds the task.
pub struct TaskControlBlock {
    /// Saved top of this task's private stack (PSP). Updated on every
    /// context switch; points into `self.stack`.
    pub stack_top: *mut u32,

    /// Priority assigned at creation. Never changes.
    pub base_priority: u8,

    /// Priority the scheduler actually uses. Equal to `base_priority`
    /// except while raised by priority inheritance.
    pub effective_priority: u8,

    /// Current position in the task state machine.
    pub state: TaskState,

    /// Absolute tick at which a delay or blocking timeout expires.
    /// `0` means no deadline is armed. Comparisons use signed tick
    /// differences, so the 32-bit counter may wrap.
    pub wake_tick: u32,

    /// The primitive this task is blocked on, if any.
    pub wait_obj: Option<WaitChannel>,

    /// Outcome of the wait in progress (or most recently finished).
    pub wait_result: WaitResult,

    /// Intrusive next index for the ready circular list or the delay list.
    pub link: Option<usize>,

    /// Private stack for this task.
    pub stack: TaskStack,
}

impl TaskControlBlock {
    /// An unallocated pool slot. Used to const-initialize the task pool.
    pub const EMPTY: Self = Self {
        stack_top: core::ptr::null_mut(),
        base_priority: 0,
        effective_priority: 0,
        state: TaskState::Ready,
        wake_tick: 0,
        wait_obj: None,
        wait_result: WaitResult::Pending,
        link: None,
        stack: TaskStack([0; STACK_WORDS]),
    };
}
