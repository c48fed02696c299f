//! # StratOS Demo Firmware
//!
//! Exercises the kernel end to end on a Cortex-M4 target:
//!
//! | Task | Priority | Behavior |
//! |------|----------|----------|
//! | `idle_task` | 0 | `wfi` loop; runs when nothing else can |
//! | `producer_task` | 2 | Sends a counter into the queue every 20 ticks |
//! | `consumer_task` | 3 | Blocks on the queue, records each message |
//!
//! Two soft timers bump heartbeat counters at 1 Hz and 2 Hz from the tick
//! handler. Watch `SECONDS`, `HALF_SECONDS`, and `LAST_MESSAGE` in a
//! debugger to see the system breathe: the consumer outranks the
//! producer, so every message is picked up the moment it lands and
//! `LAST_MESSAGE` trails the producer's counter by at most one.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(target_os = "none")]
mod firmware {
    use core::sync::atomic::{AtomicU32, Ordering};

    use cortex_m_rt::entry;
    use panic_halt as _;

    use stratos::kernel;
    use stratos::sync::Queue;
    use stratos::timer::Timer;

    static EVENTS: Queue = Queue::new();

    static HEARTBEAT_1000MS: Timer = Timer::new(1000, || {
        SECONDS.fetch_add(1, Ordering::Relaxed);
    });
    static HEARTBEAT_500MS: Timer = Timer::new(500, || {
        HALF_SECONDS.fetch_add(1, Ordering::Relaxed);
    });

    static SECONDS: AtomicU32 = AtomicU32::new(0);
    static HALF_SECONDS: AtomicU32 = AtomicU32::new(0);
    static LAST_MESSAGE: AtomicU32 = AtomicU32::new(0);

    /// Lowest-priority fallback; the scheduler requires one task that
    /// never blocks.
    extern "C" fn idle_task() -> ! {
        loop {
            cortex_m::asm::wfi();
        }
    }

    /// Feeds the queue with an incrementing counter, 50 messages/second.
    extern "C" fn producer_task() -> ! {
        let mut next = 100u32;
        loop {
            EVENTS.send(next);
            next = next.wrapping_add(1);
            kernel::delay(20);
        }
    }

    /// Drains the queue as fast as messages arrive.
    extern "C" fn consumer_task() -> ! {
        loop {
            let msg = EVENTS.receive();
            LAST_MESSAGE.store(msg, Ordering::Relaxed);
        }
    }

    #[entry]
    fn main() -> ! {
        let peripherals = cortex_m::Peripherals::take().unwrap();

        kernel::init();

        kernel::create_task(idle_task, 0).expect("failed to create idle task");
        kernel::create_task(producer_task, 2).expect("failed to create producer task");
        kernel::create_task(consumer_task, 3).expect("failed to create consumer task");

        HEARTBEAT_1000MS.start();
        HEARTBEAT_500MS.start();

        kernel::start(peripherals)
    }
}

#[cfg(not(target_os = "none"))]
fn main() {}
