//! # StratOS — Stratified Operating System
//!
//! A fixed-priority preemptive RTOS kernel for ARM Cortex-M4
//! microcontrollers.
//!
//! ## Overview
//!
//! StratOS schedules a compile-time-fixed set of tasks across 32 priority
//! strata with round-robin rotation inside each stratum:
//!
//! - **Preemptive, O(1) selection** — a per-priority ready bitmask plus
//!   count-leading-zeros finds the highest runnable stratum instantly
//! - **Blocking primitives** — counting semaphore, priority-inheritance
//!   mutex, and bounded message queue, each with optional tick timeouts
//! - **Time services** — monotonic tick counter, tick-based sleep, and
//!   soft periodic timers fired from the tick handler
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                   Application Tasks                     │
//! ├────────────────────────────────────────────────────────┤
//! │                Kernel API (kernel.rs)                   │
//! │   init() · create_task() · start() · delay() · now()   │
//! ├──────────────┬────────────────────┬────────────────────┤
//! │  Scheduler   │  Sync Primitives   │   Soft Timers      │
//! │  scheduler.rs│  sync.rs           │   timer.rs         │
//! │  ─ ready idx │  ─ Semaphore       │   ─ Timer          │
//! │  ─ delay list│  ─ Mutex (PI)      │   ─ tick-driven    │
//! │  ─ tick()    │  ─ Queue           │     callbacks      │
//! ├──────────────┴────────────────────┴────────────────────┤
//! │              Task Model (task.rs)                       │
//! │     TCB · TaskState · WaitResult · WaitChannel          │
//! ├────────────────────────────────────────────────────────┤
//! │           Arch Port (arch/cortex_m4.rs)                 │
//! │     PendSV · SysTick · Launch · Priorities              │
//! ├────────────────────────────────────────────────────────┤
//! │          ARM Cortex-M4 Hardware (Thumb-2)               │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Scheduling Model
//!
//! The scheduler always runs the `Ready` task with the highest effective
//! priority; equal priorities rotate round-robin, re-evaluated on every
//! tick and at every blocking call. A task's effective priority equals
//! its creation-time base priority except while raised by mutex priority
//! inheritance. Timeouts and delays share one clock: the SysTick-driven
//! tick counter, compared with signed differences so 32-bit wrap is
//! harmless.
//!
//! Applications must register an idle task at priority 0 that never
//! blocks, so the scheduler always has something to run.
//!
//! ## Memory Model
//!
//! - **No heap**: all kernel state is statically allocated
//! - **No `alloc`**: pure `core` only
//! - **Fixed task pool**: `[TaskControlBlock; MAX_TASKS]`, stacks inline
//! - **Critical sections**: `cortex_m::interrupt::free` around every
//!   touch of shared scheduler state

#![no_std]

#[cfg(test)]
extern crate std;

pub mod arch;
pub mod config;
pub mod kernel;
pub mod scheduler;
pub mod sync;
pub mod task;
pub mod timer;
