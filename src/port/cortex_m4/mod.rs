//! Cortex-M4 port implementation
//!
//! Provides context switching via PendSV exception handler.

#![allow(named_asm_labels)]

use core::arch::{asm, naked_asm};

use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;
use crate::task::OsTaskFn;
use crate::types::{OsOpt, OsStkElement};

/// Interrupt stack for MSP
#[no_mangle]
static mut INTERRUPT_STACK: [u64; 256] = [0xDEADBEEF_DEADBEEF; 256];

/// Backing buffer for the persistent-RAM coredump sink (§8 "persistent
/// round-trip"). Real ports place this in a linker section excluded from
/// startup zero-init so a warm reset doesn't wipe a just-captured fault;
/// the `link_section` below names that convention without depending on a
/// concrete linker script from this crate.
#[cfg(feature = "coredump")]
#[no_mangle]
#[cfg_attr(target_arch = "arm", link_section = ".uninit.COREDUMP_RAM")]
static mut COREDUMP_RAM_BUFFER: [u8; crate::config::CFG_COREDUMP_RAM_BUF_SIZE] =
    [0; crate::config::CFG_COREDUMP_RAM_BUF_SIZE];

/// Build an authoritative [`CoreRegSet`](crate::core::coredump::regs::CoreRegSet)
/// from the hardware exception frame `cortex-m-rt` hands the `HardFault`
/// trampoline, recovering r4..r11 from the eight words below it when that
/// range falls inside the known RAM window (§4.3).
#[cfg(feature = "coredump")]
pub fn build_fault_regset(
    frame: &cortex_m_rt::ExceptionFrame,
) -> crate::core::coredump::regs::CoreRegSet {
    use crate::core::coredump::regs::{fill_from_exception_frame, ExceptionFrame};

    let words: [u32; 8] = [
        frame.r0(),
        frame.r1(),
        frame.r2(),
        frame.r3(),
        frame.r12(),
        frame.lr(),
        frame.pc(),
        frame.xpsr(),
    ];
    let base_addr = frame as *const _ as u32;
    let ef = ExceptionFrame::new(&words, base_addr);
    fill_from_exception_frame(&ef, crate::config::CFG_RAM_WINDOW_START, crate::config::CFG_RAM_WINDOW_END)
}

/// Run the fault-path coredump pipeline: capture every registered task
/// (substituting the authoritative fault register set for whichever task
/// was actually running), emit an ELF core, and stream it to the
/// persistent-RAM sink. Called from the `HardFault` trampoline with
/// interrupts already disabled by hardware exception entry.
///
/// # Safety
/// Must only be called from `HardFault` context; reads the static
/// [`COREDUMP_RAM_BUFFER`] without synchronization, which is sound only
/// because no other context can be running concurrently with a fault.
#[cfg(feature = "coredump")]
#[allow(static_mut_refs)]
pub unsafe fn run_fault_coredump(fault_regs: crate::core::coredump::regs::CoreRegSet) {
    use crate::core::coredump::{ops::MemArea, os_coredump_fault_dump, sink::RamSink};

    let faulting_task = unsafe { crate::kernel::tcb_cur_ptr() };
    let regions = [MemArea {
        start: crate::config::CFG_RAM_WINDOW_START,
        len: crate::config::CFG_RAM_WINDOW_END - crate::config::CFG_RAM_WINDOW_START,
    }];
    let mut sink = RamSink::new(unsafe { &mut COREDUMP_RAM_BUFFER });
    let _ = os_coredump_fault_dump(faulting_task, fault_regs, &regions, &mut sink);
}

/// Initialize SysTick timer for system tick generation
///
/// # Arguments
/// * `cnts` - Reload value
///
/// # Example
/// For 16MHz clock with 1000Hz tick rate: cnts = 16_000_000 / 1000 = 16_000
pub fn os_cpu_systick_init(cnts: u32) {
    let mut p = unsafe { cortex_m::Peripherals::steal() };
    
    // Configure SysTick timer
    p.SYST.set_reload(cnts - 1);
    p.SYST.clear_current();
    p.SYST.set_clock_source(SystClkSource::Core);
    p.SYST.enable_interrupt();
    p.SYST.enable_counter();
}

/// Start the highest priority ready task
#[no_mangle]
#[allow(static_mut_refs)]
pub unsafe extern "C" fn os_start_high_rdy() {
    unsafe {
        let mut scb = cortex_m::Peripherals::steal().SCB;
        
        // PendSV at the numerically highest value (lowest priority) so it
        // never preempts a task-related ISR; SysTick strictly above it so
        // the tick always reaps delays and pends PendSV promptly (§5).
        scb.set_priority(SystemHandler::PendSV, 0xF0);
        scb.set_priority(SystemHandler::SysTick, 0xE0);

        // Switch MSP to dedicated interrupt stack
        let msp_top = &INTERRUPT_STACK as *const _ as u32 + core::mem::size_of_val(&INTERRUPT_STACK) as u32;
        
        asm!("msr msp, {0}", in(reg) msp_top,);
        asm!("msr psp, {0}", in(reg) 0);

        crate::kernel::CPU_STATE.tcb_cur = core::ptr::null_mut();

        cortex_m::interrupt::enable();
        cortex_m::peripheral::SCB::set_pendsv();
    }
}

/// Trigger context switch from task level
#[inline(always)]
pub fn os_ctx_sw() {
    cortex_m::peripheral::SCB::set_pendsv();
}

/// Trigger context switch from interrupt level
#[inline(always)]
pub fn os_int_ctx_sw() {
    cortex_m::peripheral::SCB::set_pendsv();
}

/// Context structure stored on stack
#[repr(C, align(4))]
struct UcStk {
    r4: u32,
    r5: u32,
    r6: u32,
    r7: u32,
    r8: u32,
    r9: u32,
    r10: u32,
    r11: u32,
    exc_return: u32,  // LR value for exception return
    r0: u32,
    r1: u32,
    r2: u32,
    r3: u32,
    r12: u32,
    lr: u32,
    pc: u32,
    xpsr: u32,
}
const CONTEXT_STACK_SIZE: usize = 17;

/// Initialize task stack
pub unsafe fn os_task_stk_init(
    task_fn: OsTaskFn,
    arg: *mut (),
    stk_base: *mut OsStkElement,
    stk_size: usize,
    _opt: OsOpt,
) -> *mut OsStkElement {
    unsafe {
        let stk_top = stk_base.add(stk_size);
        let stk_aligned = ((stk_top as usize) & !7) as *mut u32;
        
        let frame_ptr = stk_aligned.sub(CONTEXT_STACK_SIZE) as *mut UcStk;
        
        (*frame_ptr) = UcStk {
            r4: 0x04040404,
            r5: 0x05050505,
            r6: 0x06060606,
            r7: 0x07070707,
            r8: 0x08080808,
            r9: 0x09090909,
            r10: 0x10101010,
            r11: 0x11111111,
            exc_return: 0xFFFF_FFFD,
            r0: arg as u32,
            r1: 0,
            r2: 0,
            r3: 0,
            r12: 0,
            lr: os_task_return as *const () as u32,
            pc: (task_fn as usize as u32) | 1,
            xpsr: 0x0100_0000,
        };
        
        // Return pointer 4 bytes before frame to match PendSV's "add r0, r0, #4"
        (frame_ptr as *mut u32).sub(1) as *mut OsStkElement
    }
}

/// Helper function called from PendSV to perform TCB switching
/// Returns new task's stack pointer
#[inline(never)]
#[no_mangle]
unsafe extern "C" fn pendsv_switch_context(cur_sp: *mut u32) -> *mut u32 {
    unsafe {
        let cur_tcb_ptr = crate::kernel::CPU_STATE.tcb_cur;
        
        if !cur_tcb_ptr.is_null() {
            (*cur_tcb_ptr).stk_ptr = cur_sp;
        }
        
        crate::kernel::CPU_STATE.tcb_cur = crate::kernel::CPU_STATE.tcb_high_rdy;
        crate::kernel::CPU_STATE.prio_cur = crate::kernel::CPU_STATE.prio_high_rdy;
        
        let new_tcb_ptr = crate::kernel::CPU_STATE.tcb_cur;
        
        if new_tcb_ptr.is_null() {
            core::ptr::null_mut()
        } else {
            (*new_tcb_ptr).stk_ptr
        }
    }
}

/// PendSV exception handler - performs full context switch
///
/// 1. Validate PSP lies within the known RAM window (§4.3); a task whose
///    stack pointer has wandered outside it is trampolined to the
///    stack-corruption coredump path instead of being pushed onto.
/// 2. Save R4-R11, LR to current task's PSP (skip if first task)
/// 3. Call switch_context to swap TCB pointers
/// 4. Restore R4-R11, LR from new task's stack
/// 5. Exception return
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    use crate::kernel::CPU_STATE;
    use crate::config::{CFG_RAM_WINDOW_START, CFG_RAM_WINDOW_END};

    naked_asm!(
        "cpsid i",
        "dsb",
        "isb",

        "mrs r0, psp",

        "ldr r1, ={cpu_state}",
        "ldr r1, [r1]",
        "cbz r1, 1f",

        // PSP range check: r2 = low bound, r3 = high bound.
        "ldr r2, ={ram_start}",
        "cmp r0, r2",
        "blo 3f",
        "ldr r3, ={ram_end}",
        "cmp r0, r3",
        "bhs 3f",

        "stmdb r0!, {{r4-r11, lr}}",

        "sub r0, r0, #4",

        "1:",
        "bl pendsv_switch_context",

        "cbz r0, 2f",
        "add r0, r0, #4",
        "ldmia r0!, {{r4-r11, lr}}",

        "msr psp, r0",

        "2:",
        "cpsie i",
        "dsb",
        "isb",

        "bx lr",

        "3:",
        "bl pendsv_stack_corrupt",
        "b 3b",

        cpu_state = sym CPU_STATE,
        ram_start = const CFG_RAM_WINDOW_START,
        ram_end = const CFG_RAM_WINDOW_END,
    );
}

/// Reached when [`PendSV`]'s range check finds the about-to-be-saved PSP
/// outside the RAM window — the invariant breach §7 calls out ("stack
/// outside the RAM window during context switch"). `psp` is whatever the
/// corrupted pointer actually was; only it and the faulting task's identity
/// are trustworthy, so the rest of the register bank is reported zeroed
/// rather than read through a pointer already known to be bad.
#[cfg(feature = "coredump")]
#[no_mangle]
unsafe extern "C" fn pendsv_stack_corrupt(psp: u32) -> ! {
    let mut regs = crate::core::coredump::regs::CoreRegSet::zeroed();
    regs.sp = psp;
    unsafe { run_fault_coredump(regs) };
    loop { cortex_m::asm::udf(); }
}

#[cfg(not(feature = "coredump"))]
#[no_mangle]
unsafe extern "C" fn pendsv_stack_corrupt(_psp: u32) -> ! {
    loop { cortex_m::asm::udf(); }
}

/// Reconstruct a non-running task's register bank from the `UcStk` frame
/// `os_task_stk_init`/`PendSV` leave at the top of its saved stack.
///
/// # Safety
/// `stk_ptr` must be a stack pointer this port last saved via `PendSV`
/// (or the creation-time frame, if the task never ran).
#[cfg(feature = "coredump")]
pub unsafe fn reconstruct_regs_from_saved_stack(
    stk_ptr: *mut OsStkElement,
) -> crate::core::coredump::regs::CoreRegSet {
    use crate::core::coredump::regs::CoreRegSet;

    let mut regs = CoreRegSet::zeroed();
    if stk_ptr.is_null() {
        return regs;
    }

    // PendSV leaves the frame pointer 4 bytes before the saved context,
    // to match its own "add r0, r0, #4" before the ldmia restore.
    let frame = unsafe { &*(stk_ptr.add(1) as *const UcStk) };

    regs.r4 = frame.r4;
    regs.r5 = frame.r5;
    regs.r6 = frame.r6;
    regs.r7 = frame.r7;
    regs.r8 = frame.r8;
    regs.r9 = frame.r9;
    regs.r10 = frame.r10;
    regs.r11 = frame.r11;
    regs.r0 = frame.r0;
    regs.r1 = frame.r1;
    regs.r2 = frame.r2;
    regs.r3 = frame.r3;
    regs.r12 = frame.r12;
    regs.lr = frame.lr;
    regs.pc = frame.pc;
    regs.xpsr = frame.xpsr;
    regs.sp = (stk_ptr.add(1) as usize + CONTEXT_STACK_SIZE * 4) as u32;

    regs
}

/// Task switch hook
#[no_mangle]
fn os_task_sw_hook() {}

/// Task return handler
#[no_mangle]
fn os_task_return() -> ! {
    loop {
        cortex_m::asm::wfi();
    }
}
