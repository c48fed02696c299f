//! Hosted stand-ins for the Cortex-M4 port, compiled for `cargo test` on
//! the build host. Context switching and the tick source have no meaning
//! there; the stubs keep the portable kernel code building unchanged.

pub fn configure_systick(_syst: &mut cortex_m::peripheral::SYST) {}

pub fn set_exception_priorities() {}

pub fn prepare_first_switch() {}

#[inline]
pub fn trigger_pendsv() {}

pub fn fatal() -> ! {
    unimplemented!("fatal halt is only meaningful on the target")
}

/// # Safety
///
/// Never actually launches anything off-target.
pub unsafe fn launch() -> ! {
    unimplemented!("task launch is only meaningful on the target")
}
