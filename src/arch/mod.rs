//! # Architecture Abstraction Layer
//!
//! Hardware boundary for the kernel: triggering the context-switch
//! exception, configuring the tick source and exception priorities, and
//! launching the first task. The Cortex-M4 port is the real thing; the
//! hosted fallback satisfies the same signatures so the scheduler logic
//! can be unit-tested on the build host.

#[cfg(all(target_arch = "arm", target_os = "none"))]
mod cortex_m4;
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub use cortex_m4::*;

#[cfg(not(all(target_arch = "arm", target_os = "none")))]
mod hosted;
#[cfg(not(all(target_arch = "arm", target_os = "none")))]
pub use hosted::*;
