//! Language items and default exception handlers

// When defmt feature is enabled on ARM targets, use defmt_rtt and panic_probe
#[cfg(all(feature = "defmt", target_arch = "arm"))]
use defmt_rtt as _;

#[cfg(all(feature = "defmt", target_arch = "arm"))]
use panic_probe as _;

// Defmt panic handler
#[cfg(all(feature = "defmt", target_arch = "arm"))]
#[defmt::panic_handler]
fn defmt_panic() -> ! {
    cortex_m::asm::udf()
}

// Panic handler when defmt is disabled
#[cfg(all(not(feature = "defmt"), target_arch = "arm"))]
#[panic_handler]
fn panic(_: &core::panic::PanicInfo) -> ! {
    loop { cortex_m::asm::udf(); }
}

// HardFault trampoline: captures every registered task's register bank
// (substituting the authoritative exception frame for whichever task
// actually faulted), emits an ELF core to the persistent-RAM sink, then
// halts. Matches §4.3/§4.6-4.8: the fault path never attempts to return.
#[cfg(all(feature = "coredump", target_arch = "arm"))]
#[cortex_m_rt::exception]
unsafe fn HardFault(ef: &cortex_m_rt::ExceptionFrame) -> ! {
    let regs = crate::port::cortex_m4::build_fault_regset(ef);
    unsafe { crate::port::cortex_m4::run_fault_coredump(regs) };
    loop { cortex_m::asm::udf(); }
}

#[cfg(all(not(feature = "coredump"), target_arch = "arm"))]
#[cortex_m_rt::exception]
unsafe fn HardFault(_ef: &cortex_m_rt::ExceptionFrame) -> ! {
    loop { cortex_m::asm::udf(); }
}

// Defmt timestamp
#[cfg(all(feature = "defmt", target_arch = "arm"))]
defmt::timestamp!("{=u32}", crate::core::kernel::KERNEL.tick_get());
