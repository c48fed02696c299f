//! # Scheduler
//!
//! Fixed-priority preemptive scheduling with round-robin among equal
//! priorities. This module owns all process-wide scheduling state: the
//! task pool, the ready index, the delay list, the current-task reference,
//! and the tick counter.
//!
//! ## Ready index
//!
//! Runnable tasks live on one circular singly linked list per priority
//! level, threaded through the pool by index. A 32-bit `active_mask`
//! summarizes which levels are non-empty, so the highest runnable priority
//! falls out of a single count-leading-zeros. Each level's head pointer
//! rotates to the task most recently picked, so the next pick at that
//! level starts from its successor — that is the whole round-robin
//! mechanism.
//!
//! ## Delay list
//!
//! Sleeping tasks sit on a singly linked list sorted by ascending
//! `wake_tick`. The tick handler only ever has to look at the head.
//! Deadline comparisons use signed 32-bit differences, so the tick counter
//! is free to wrap.
//!
//! ## Caller contract
//!
//! Every `&mut self` operation here assumes the global interrupt mask is
//! asserted (or that interrupts have not been enabled yet). The public
//! wrappers in [`crate::kernel`] and [`crate::sync`] take care of that;
//! the PendSV and SysTick handlers run masked or at a priority that
//! serializes them.

use crate::config::{MAX_PRIORITIES, MAX_TASKS, STACK_WORDS, WAIT_FOREVER};
use crate::task::{TaskControlBlock, TaskState, WaitChannel, WaitResult};

/// Index of a task in the pool. Handed back by `create_task`.
pub type TaskId = usize;

/// xPSR value for a task that has never run: just the Thumb bit.
const INITIAL_XPSR: u32 = 0x0100_0000;

/// Why `create_task` refused to allocate a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateError {
    /// The fixed task pool is full.
    PoolExhausted,
    /// `priority` is not below `MAX_PRIORITIES`.
    PriorityOutOfRange,
    /// The scheduler has already been started; the task set is sealed.
    AlreadyStarted,
}

/// Coarse context-switch instrumentation, read through
/// [`crate::kernel::switch_stats`]. Pick durations are DWT cycle counts
/// measured around the scheduling decision, not the full exception.
#[derive(Debug, Clone, Copy)]
pub struct SwitchStats {
    /// Total context switches since start.
    pub switches: u32,
    /// Cycles spent in the most recent pick.
    pub last_pick_cycles: u32,
    /// Worst pick observed so far.
    pub max_pick_cycles: u32,
}

impl SwitchStats {
    pub const fn new() -> Self {
        Self {
            switches: 0,
            last_pick_cycles: 0,
            max_pick_cycles: 0,
        }
    }
}

/// The central scheduler state, stored in statically allocated storage by
/// [`crate::kernel`].
pub struct Scheduler {
    /// Fixed task pool. Slots at index `>= task_count` are unallocated.
    pub tasks: [TaskControlBlock; MAX_TASKS],

    /// Number of allocated tasks.
    task_count: usize,

    /// Set by `select_first`; seals the task set.
    started: bool,

    /// Head of the circular ready list per priority level, `None` when
    /// the level is empty.
    ready_heads: [Option<TaskId>; MAX_PRIORITIES],

    /// Bit `p` set exactly when `ready_heads[p]` is `Some`.
    active_mask: u32,

    /// Head of the delay list, sorted by ascending `wake_tick`.
    delay_head: Option<TaskId>,

    /// The task whose context is (or is about to be) on the CPU.
    current: Option<TaskId>,

    /// Monotonic tick counter; wraps at 32 bits.
    tick_count: u32,

    /// Context-switch instrumentation.
    stats: SwitchStats,
}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            tasks: [TaskControlBlock::EMPTY; MAX_TASKS],
            task_count: 0,
            started: false,
            ready_heads: [None; MAX_PRIORITIES],
            active_mask: 0,
            delay_head: None,
            current: None,
            tick_count: 0,
            stats: SwitchStats::new(),
        }
    }

    /// Current tick count.
    #[inline]
    pub fn now(&self) -> u32 {
        self.tick_count
    }

    /// The task whose context is on the CPU, if the scheduler has picked
    /// one yet.
    #[inline]
    pub fn current(&self) -> Option<TaskId> {
        self.current
    }

    /// Test hook: force the current task, standing in for the context
    /// switch a real port would perform.
    #[cfg(test)]
    pub(crate) fn set_current(&mut self, current: Option<TaskId>) {
        self.current = current;
    }

    /// Switch instrumentation snapshot.
    #[inline]
    pub fn stats(&self) -> SwitchStats {
        self.stats
    }

    // -----------------------------------------------------------------------
    // Task creation
    // -----------------------------------------------------------------------

    /// Allocate the next free descriptor, synthesize its initial stack
    /// frame, and insert it into the ready index at `priority`.
    ///
    /// Callable only before `start`; equal priorities are fine — the
    /// scheduler round-robins them.
    pub fn create_task(
        &mut self,
        entry: extern "C" fn() -> !,
        priority: u8,
    ) -> Result<TaskId, CreateError> {
        if self.started {
            return Err(CreateError::AlreadyStarted);
        }
        if priority as usize >= MAX_PRIORITIES {
            return Err(CreateError::PriorityOutOfRange);
        }
        if self.task_count >= MAX_TASKS {
            return Err(CreateError::PoolExhausted);
        }

        let id = self.task_count;
        let tcb = &mut self.tasks[id];
        tcb.base_priority = priority;
        tcb.effective_priority = priority;
        tcb.state = TaskState::Ready;
        tcb.wake_tick = 0;
        tcb.wait_obj = None;
        tcb.wait_result = WaitResult::Pending;
        tcb.link = None;
        init_task_stack(tcb, entry);

        self.task_count += 1;
        self.ready_insert(id);
        Ok(id)
    }

    /// Seal the task set and pick the first task to run. Called once from
    /// `kernel::start` before interrupts are enabled.
    pub(crate) fn select_first(&mut self) -> Option<TaskId> {
        self.started = true;
        if let Some(first) = self.pick_next() {
            self.current = Some(first);
        }
        self.current
    }

    // -----------------------------------------------------------------------
    // Ready index
    // -----------------------------------------------------------------------

    /// Insert a task at the tail of its effective-priority level.
    ///
    /// The new node is spliced in right behind the head and the head is
    /// rotated onto it, so the next pick at this level scans the new node
    /// last.
    pub(crate) fn ready_insert(&mut self, id: TaskId) {
        let prio = self.tasks[id].effective_priority as usize;
        match self.ready_heads[prio] {
            None => {
                self.tasks[id].link = Some(id);
            }
            Some(head) => {
                self.tasks[id].link = self.tasks[head].link;
                self.tasks[head].link = Some(id);
            }
        }
        self.ready_heads[prio] = Some(id);
        self.active_mask |= 1 << prio;
    }

    /// Unlink a task from the ready list of its effective priority.
    /// Clears the level's mask bit when the list empties. No-op if the
    /// task is not on that list.
    pub(crate) fn ready_remove(&mut self, id: TaskId) {
        let prio = self.tasks[id].effective_priority as usize;
        let head = match self.ready_heads[prio] {
            Some(h) => h,
            None => return,
        };

        // Walk the circle to the predecessor of `id`.
        let mut prev = head;
        loop {
            let next = self.tasks[prev].link.unwrap_or(head);
            if next == id {
                break;
            }
            if next == head {
                return; // not on this list
            }
            prev = next;
        }

        if prev == id {
            // Sole node on the level.
            self.ready_heads[prio] = None;
            self.active_mask &= !(1 << prio);
        } else {
            self.tasks[prev].link = self.tasks[id].link;
            if head == id {
                self.ready_heads[prio] = Some(prev);
            }
        }
        self.tasks[id].link = None;
    }

    /// Move a task to a new effective priority. If it is on a ready list
    /// the task migrates between levels; otherwise only the field changes.
    /// Used by priority inheritance in both directions.
    pub(crate) fn set_effective_priority(&mut self, id: TaskId, priority: u8) {
        if self.tasks[id].effective_priority == priority {
            return;
        }
        if self.tasks[id].state == TaskState::Ready {
            self.ready_remove(id);
            self.tasks[id].effective_priority = priority;
            self.ready_insert(id);
        } else {
            self.tasks[id].effective_priority = priority;
        }
    }

    /// Pick the next task to run: highest non-empty priority level first,
    /// round-robin within the level.
    ///
    /// The scan starts at the successor of the level's head and rotates
    /// the head onto the picked task. A level whose list holds no `Ready`
    /// node (a transient wakeup window) is skipped via a local mask copy.
    /// Returns `None` only when nothing anywhere is runnable — a state
    /// the required idle task is there to prevent.
    pub(crate) fn pick_next(&mut self) -> Option<TaskId> {
        let mut mask = self.active_mask;
        while mask != 0 {
            let prio = 31 - mask.leading_zeros() as usize;
            if let Some(head) = self.ready_heads[prio] {
                let start = self.tasks[head].link.unwrap_or(head);
                let mut candidate = start;
                loop {
                    if self.tasks[candidate].state == TaskState::Ready {
                        self.ready_heads[prio] = Some(candidate);
                        return Some(candidate);
                    }
                    candidate = self.tasks[candidate].link.unwrap_or(head);
                    if candidate == start {
                        break;
                    }
                }
            }
            mask &= !(1 << prio);
        }
        None
    }

    // -----------------------------------------------------------------------
    // Context-switch hooks (the PendSV handler's half of the protocol)
    // -----------------------------------------------------------------------

    /// Record the outgoing task's stack top, as left by the exception
    /// entry plus the software-saved registers. Port-layer hook.
    pub fn save_context(&mut self, stack_top: *mut u32) {
        if let Some(current) = self.current {
            self.tasks[current].stack_top = stack_top;
        }
    }

    /// Pick a successor, make it current, and hand back its stack top.
    /// Keeps the current task if nothing else is runnable. `None` means
    /// the scheduler has no task at all — fatal in the port layer.
    /// Port-layer hook.
    pub fn switch_to_next(&mut self) -> Option<*mut u32> {
        if let Some(next) = self.pick_next() {
            self.current = Some(next);
        }
        self.stats.switches = self.stats.switches.wrapping_add(1);
        self.current.map(|id| self.tasks[id].stack_top)
    }

    /// Fold one pick duration into the instrumentation. Port-layer hook.
    pub fn note_pick_cycles(&mut self, cycles: u32) {
        self.stats.last_pick_cycles = cycles;
        if cycles > self.stats.max_pick_cycles {
            self.stats.max_pick_cycles = cycles;
        }
    }

    // -----------------------------------------------------------------------
    // Delay list
    // -----------------------------------------------------------------------

    /// Put the current task to sleep for `ticks > 0` ticks.
    pub(crate) fn delay_current(&mut self, ticks: u32) {
        let current = match self.current {
            Some(c) => c,
            None => return,
        };
        self.tasks[current].state = TaskState::Delayed;
        self.tasks[current].wake_tick = self.tick_count.wrapping_add(ticks);
        self.ready_remove(current);
        self.delay_insert(current);
    }

    /// Splice a `Delayed` task into the delay list, keeping it sorted by
    /// ascending `wake_tick`. Stable: equal deadlines keep arrival order.
    fn delay_insert(&mut self, id: TaskId) {
        let wake = self.tasks[id].wake_tick;
        let mut prev: Option<TaskId> = None;
        let mut cursor = self.delay_head;
        while let Some(c) = cursor {
            if self.tasks[c].wake_tick.wrapping_sub(wake) as i32 > 0 {
                break;
            }
            prev = Some(c);
            cursor = self.tasks[c].link;
        }
        self.tasks[id].link = cursor;
        match prev {
            None => self.delay_head = Some(id),
            Some(p) => self.tasks[p].link = Some(id),
        }
    }

    // -----------------------------------------------------------------------
    // Wait/wakeup engine
    // -----------------------------------------------------------------------

    /// Transition the current task into a blocked state on `channel`.
    ///
    /// `timeout_ticks` of [`WAIT_FOREVER`] leaves the deadline unarmed
    /// (`wake_tick = 0`); anything else arms an absolute deadline relative
    /// to the current tick. The caller is responsible for not passing `0`
    /// — a zero timeout means "don't block" and never reaches here.
    pub(crate) fn block_current(
        &mut self,
        state: TaskState,
        channel: WaitChannel,
        timeout_ticks: u32,
    ) {
        let current = match self.current {
            Some(c) => c,
            None => return,
        };
        self.tasks[current].state = state;
        self.tasks[current].wait_obj = Some(channel);
        self.tasks[current].wait_result = WaitResult::Pending;
        self.tasks[current].wake_tick = if timeout_ticks == WAIT_FOREVER {
            0
        } else {
            self.tick_count.wrapping_add(timeout_ticks)
        };
        self.ready_remove(current);
    }

    /// Wake the first pool-order task blocked in `state` on `channel`.
    ///
    /// Wakeup order is pool-scan order, not arrival order; with the small
    /// compile-time task count this is O(T) and good enough. Returns
    /// whether a waiter was found. A task whose timeout already fired has
    /// left the blocked state and is never touched here.
    pub(crate) fn wake_first(&mut self, state: TaskState, channel: WaitChannel) -> bool {
        for id in 0..self.task_count {
            if self.tasks[id].state == state && self.tasks[id].wait_obj == Some(channel) {
                self.tasks[id].state = TaskState::Ready;
                self.tasks[id].wait_obj = None;
                self.tasks[id].wait_result = WaitResult::Ok;
                self.ready_insert(id);
                return true;
            }
        }
        false
    }

    // -----------------------------------------------------------------------
    // Tick advancement
    // -----------------------------------------------------------------------

    /// One tick of kernel time: advance the counter, resume expired
    /// delays, and time out expired waits. Runs in the SysTick handler;
    /// the caller then services soft timers and pends a context switch.
    pub fn tick(&mut self) {
        self.tick_count = self.tick_count.wrapping_add(1);

        // Delay expiries. The list is sorted, so stop at the first head
        // still in the future.
        while let Some(head) = self.delay_head {
            if self.tasks[head].wake_tick.wrapping_sub(self.tick_count) as i32 > 0 {
                break;
            }
            self.delay_head = self.tasks[head].link;
            self.tasks[head].link = None;
            self.tasks[head].state = TaskState::Ready;
            self.tasks[head].wait_result = WaitResult::Ok;
            self.ready_insert(head);
        }

        // Timeout expiries. Bounded scan of the pool for blocked tasks
        // with an armed deadline that has passed. The Pending check makes
        // the Pending → Timeout transition exclusive with a wakeup.
        for id in 0..self.task_count {
            let tcb = &self.tasks[id];
            if !tcb.state.is_blocked()
                || tcb.wake_tick == 0
                || tcb.wait_result != WaitResult::Pending
            {
                continue;
            }
            if (self.tick_count.wrapping_sub(tcb.wake_tick) as i32) < 0 {
                continue;
            }
            self.tasks[id].wait_obj = None;
            self.tasks[id].wait_result = WaitResult::Timeout;
            self.tasks[id].state = TaskState::Ready;
            self.ready_insert(id);
        }
    }
}

// ---------------------------------------------------------------------------
// Initial stack frame
// ---------------------------------------------------------------------------

/// Synthesize the stack frame a task needs to be "resumed" for the first
/// time.
///
/// The Cortex-M pushes an 8-word exception frame on interrupt entry; we
/// pre-populate one at the top of the task's stack so the first PendSV
/// return drops straight into the entry function, and leave 8 zeroed words
/// below it for the software-saved R4–R11.
///
/// ```text
/// [top of stack, growing down]
///   xPSR  (Thumb bit set)
///   PC    (entry, Thumb bit set)
///   LR    (task_exit trap)
///   R12, R3, R2, R1, R0  (0)
///   R11 … R4             (0)   <- stack_top after init
/// ```
fn init_task_stack(tcb: &mut TaskControlBlock, entry: extern "C" fn() -> !) {
    let frame = STACK_WORDS - 16;
    let stack = &mut tcb.stack.0;
    for word in &mut stack[frame..] {
        *word = 0;
    }
    stack[STACK_WORDS - 1] = INITIAL_XPSR;
    stack[STACK_WORDS - 2] = entry as usize as u32 | 1;
    stack[STACK_WORDS - 3] = task_exit as usize as u32 | 1;
    tcb.stack_top = stack[frame..].as_mut_ptr();
}

/// Trap for tasks that return. Entry functions are `fn() -> !`, so this
/// is unreachable unless a task breaks that contract; park it instead of
/// letting it run off into whatever follows the entry function.
extern "C" fn task_exit() -> ! {
    loop {
        #[cfg(all(target_arch = "arm", target_os = "none"))]
        cortex_m::asm::wfi();
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn spin() -> ! {
        loop {}
    }

    fn sched_with(priorities: &[u8]) -> Scheduler {
        let mut s = Scheduler::new();
        for &p in priorities {
            s.create_task(spin, p).unwrap();
        }
        s
    }

    #[test]
    fn mask_tracks_nonempty_levels() {
        let mut s = sched_with(&[0, 1, 1, 4]);
        assert_eq!(s.active_mask, (1 << 0) | (1 << 1) | (1 << 4));

        s.ready_remove(3);
        assert_eq!(s.active_mask, (1 << 0) | (1 << 1));

        // Level 1 holds two tasks; removing one must keep the bit.
        s.ready_remove(1);
        assert_eq!(s.active_mask, (1 << 0) | (1 << 1));
        s.ready_remove(2);
        assert_eq!(s.active_mask, 1 << 0);
    }

    #[test]
    fn create_task_rejects_bad_requests() {
        let mut s = Scheduler::new();
        assert_eq!(
            s.create_task(spin, MAX_PRIORITIES as u8),
            Err(CreateError::PriorityOutOfRange)
        );
        for _ in 0..MAX_TASKS {
            s.create_task(spin, 1).unwrap();
        }
        assert_eq!(s.create_task(spin, 1), Err(CreateError::PoolExhausted));

        let mut s = sched_with(&[0]);
        s.select_first();
        assert_eq!(s.create_task(spin, 1), Err(CreateError::AlreadyStarted));
    }

    #[test]
    fn highest_priority_wins() {
        let mut s = sched_with(&[0, 2, 1]);
        assert_eq!(s.select_first(), Some(1));

        // Block the high task; the middle one takes over, then idle.
        s.block_current(TaskState::BlockedSem, WaitChannel::of(&()), WAIT_FOREVER);
        assert_eq!(s.pick_next(), Some(2));
        s.current = Some(2);
        s.block_current(TaskState::BlockedSem, WaitChannel::of(&()), WAIT_FOREVER);
        assert_eq!(s.pick_next(), Some(0));
    }

    #[test]
    fn equal_priorities_round_robin() {
        let mut s = sched_with(&[0, 3, 3, 3]);
        let mut order = [0usize; 6];
        for slot in order.iter_mut() {
            *slot = s.pick_next().unwrap();
        }
        assert_eq!(order, [1, 2, 3, 1, 2, 3]);
    }

    #[test]
    fn pick_falls_through_empty_levels() {
        let mut s = sched_with(&[0, 5]);
        s.ready_remove(1);
        assert_eq!(s.pick_next(), Some(0));
    }

    #[test]
    fn nothing_runnable_keeps_current() {
        let mut s = sched_with(&[2]);
        assert_eq!(s.select_first(), Some(0));
        s.block_current(TaskState::BlockedMutex, WaitChannel::of(&()), WAIT_FOREVER);
        assert!(s.pick_next().is_none());
        let top = s.tasks[0].stack_top;
        assert_eq!(s.switch_to_next(), Some(top));
        assert_eq!(s.current(), Some(0));
    }

    #[test]
    fn effective_priority_change_migrates_ready_task() {
        let mut s = sched_with(&[0, 1, 3]);
        s.set_effective_priority(1, 5);
        assert_eq!(s.tasks[1].effective_priority, 5);
        assert_eq!(s.active_mask, (1 << 0) | (1 << 3) | (1 << 5));
        assert_eq!(s.pick_next(), Some(1));

        // Back down again: level 5 empties, level 1 repopulates.
        s.set_effective_priority(1, 1);
        assert_eq!(s.active_mask, (1 << 0) | (1 << 1) | (1 << 3));
        assert_eq!(s.pick_next(), Some(2));
    }

    #[test]
    fn effective_priority_change_on_blocked_task_touches_no_list() {
        let token = 0u32;
        let chan = WaitChannel::of(&token);
        let mut s = sched_with(&[0, 1]);
        s.current = Some(1);
        s.block_current(TaskState::BlockedMutex, chan, WAIT_FOREVER);
        s.set_effective_priority(1, 7);
        assert_eq!(s.tasks[1].effective_priority, 7);
        assert_eq!(s.active_mask, 1 << 0);
        // Woken later, it surfaces at the raised level.
        assert!(s.wake_first(TaskState::BlockedMutex, chan));
        assert_eq!(s.active_mask, (1 << 0) | (1 << 7));
    }

    #[test]
    fn delayed_tasks_resume_in_deadline_order() {
        let mut s = sched_with(&[0, 1, 1]);
        assert_eq!(s.select_first(), Some(1));
        s.delay_current(10);
        s.current = Some(2);
        s.delay_current(5);

        assert_eq!(s.delay_head, Some(2));
        assert_eq!(s.tasks[2].link, Some(1));

        for _ in 0..4 {
            s.tick();
        }
        assert_eq!(s.tasks[2].state, TaskState::Delayed);
        s.tick();
        assert_eq!(s.tasks[2].state, TaskState::Ready);
        assert_eq!(s.tasks[2].wait_result, WaitResult::Ok);
        assert_eq!(s.tasks[1].state, TaskState::Delayed);
        for _ in 0..5 {
            s.tick();
        }
        assert_eq!(s.tasks[1].state, TaskState::Ready);
        assert!(s.delay_head.is_none());
    }

    #[test]
    fn equal_deadlines_keep_arrival_order() {
        let mut s = sched_with(&[0, 1, 1]);
        s.current = Some(1);
        s.delay_current(5);
        s.current = Some(2);
        s.delay_current(5);
        assert_eq!(s.delay_head, Some(1));
        assert_eq!(s.tasks[1].link, Some(2));
    }

    #[test]
    fn delay_survives_tick_wraparound() {
        let mut s = sched_with(&[0, 1]);
        s.tick_count = u32::MAX - 2;
        s.current = Some(1);
        s.delay_current(5);
        for _ in 0..4 {
            s.tick();
            assert_eq!(s.tasks[1].state, TaskState::Delayed);
        }
        s.tick();
        assert_eq!(s.tasks[1].state, TaskState::Ready);
    }

    #[test]
    fn blocked_timeout_fires_once_and_only_once() {
        let token = 0u32;
        let chan = WaitChannel::of(&token);
        let mut s = sched_with(&[0, 2]);
        s.current = Some(1);
        s.block_current(TaskState::BlockedSem, chan, 3);
        assert_eq!(s.tasks[1].wake_tick, 3);

        s.tick();
        s.tick();
        assert_eq!(s.tasks[1].wait_result, WaitResult::Pending);
        s.tick();
        assert_eq!(s.tasks[1].state, TaskState::Ready);
        assert_eq!(s.tasks[1].wait_result, WaitResult::Timeout);
        assert_eq!(s.tasks[1].wait_obj, None);

        // A later signal must not find (or touch) the timed-out task.
        assert!(!s.wake_first(TaskState::BlockedSem, chan));
        assert_eq!(s.tasks[1].wait_result, WaitResult::Timeout);
    }

    #[test]
    fn forever_waits_never_time_out() {
        let token = 0u32;
        let mut s = sched_with(&[0, 2]);
        s.current = Some(1);
        s.block_current(TaskState::BlockedSem, WaitChannel::of(&token), WAIT_FOREVER);
        assert_eq!(s.tasks[1].wake_tick, 0);
        for _ in 0..1000 {
            s.tick();
        }
        assert_eq!(s.tasks[1].state, TaskState::BlockedSem);
    }

    #[test]
    fn wakeup_scans_in_pool_order() {
        let token = 0u32;
        let chan = WaitChannel::of(&token);
        let mut s = sched_with(&[0, 1, 1]);
        s.current = Some(2);
        s.block_current(TaskState::BlockedSem, chan, WAIT_FOREVER);
        s.current = Some(1);
        s.block_current(TaskState::BlockedSem, chan, WAIT_FOREVER);

        // Task 1 blocked last but sits earlier in the pool.
        assert!(s.wake_first(TaskState::BlockedSem, chan));
        assert_eq!(s.tasks[1].state, TaskState::Ready);
        assert_eq!(s.tasks[2].state, TaskState::BlockedSem);
        assert!(s.wake_first(TaskState::BlockedSem, chan));
        assert!(!s.wake_first(TaskState::BlockedSem, chan));
    }

    #[test]
    fn wakeup_matches_channel_and_kind() {
        let a = 0u32;
        let b = 0u32;
        let mut s = sched_with(&[0, 1, 1]);
        s.current = Some(1);
        s.block_current(TaskState::BlockedSem, WaitChannel::of(&a), WAIT_FOREVER);
        s.current = Some(2);
        s.block_current(TaskState::BlockedMutex, WaitChannel::of(&b), WAIT_FOREVER);

        assert!(!s.wake_first(TaskState::BlockedSem, WaitChannel::of(&b)));
        assert!(!s.wake_first(TaskState::BlockedMutex, WaitChannel::of(&a)));
        assert!(s.wake_first(TaskState::BlockedMutex, WaitChannel::of(&b)));
        assert_eq!(s.tasks[1].state, TaskState::BlockedSem);
    }

    #[test]
    fn initial_frame_enters_task_in_thumb_mode() {
        let mut s = Scheduler::new();
        let id = s.create_task(spin, 1).unwrap();
        let stack = &s.tasks[id].stack.0;
        assert_eq!(stack[STACK_WORDS - 1], INITIAL_XPSR);
        assert_eq!(stack[STACK_WORDS - 2], spin as usize as u32 | 1);
        assert_eq!(stack[STACK_WORDS - 2] & 1, 1);
        // Callee-saved area below the hardware frame is zeroed.
        for &word in &stack[STACK_WORDS - 16..STACK_WORDS - 8] {
            assert_eq!(word, 0);
        }
        assert_eq!(
            s.tasks[id].stack_top,
            s.tasks[id].stack.0[STACK_WORDS - 16..].as_ptr() as *mut u32
        );
    }

    #[test]
    fn save_context_updates_current_stack_top() {
        let mut s = sched_with(&[0]);
        s.select_first();
        let mut word = 0u32;
        s.save_context(&mut word);
        assert_eq!(s.tasks[0].stack_top, &mut word as *mut u32);
        assert_eq!(s.switch_to_next(), Some(&mut word as *mut u32));
        assert_eq!(s.stats().switches, 1);
    }

    #[test]
    fn pick_cycle_stats_track_maximum() {
        let mut s = Scheduler::new();
        s.note_pick_cycles(40);
        s.note_pick_cycles(90);
        s.note_pick_cycles(10);
        assert_eq!(s.stats().last_pick_cycles, 10);
        assert_eq!(s.stats().max_pick_cycles, 90);
    }
}
