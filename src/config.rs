//! # StratOS Configuration
//!
//! Compile-time constants governing the kernel. All limits are fixed at
//! compile time — no dynamic allocation.

/// Maximum number of tasks the system can manage. This bounds the static
/// task pool. Increase with care — each task carries `STACK_WORDS` words
/// of stack RAM.
pub const MAX_TASKS: usize = 6;

/// Number of distinct scheduling priorities, 0 (lowest) to
/// `MAX_PRIORITIES - 1` (highest).
pub const MAX_PRIORITIES: usize = 32;

const _: () = assert!(MAX_PRIORITIES <= 32, "ready bitmask is 32 bits wide");

/// SysTick frequency in Hz. One tick is the kernel's time quantum for
/// delays, timeouts, and soft timers.
pub const TICK_HZ: u32 = 1_000;

/// System clock frequency in Hz (STM32F4 on the 16 MHz HSI by default).
/// The SysTick reload value derived from this must fit the timer's
/// 24-bit reload field.
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

/// Per-task stack size in 32-bit words. Must cover the deepest call chain
/// plus the 8-word hardware exception frame and the 8-word software-saved
/// context.
pub const STACK_WORDS: usize = 512;

/// Capacity of a bounded message queue, in 32-bit messages.
pub const QUEUE_DEPTH: usize = 8;

/// Timeout sentinel: block with no deadline. Passing this to any
/// `_timeout` call skips deadline arming entirely.
pub const WAIT_FOREVER: u32 = u32::MAX;
