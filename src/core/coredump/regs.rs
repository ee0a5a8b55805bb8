//! ARMv7-M register bank types
//!
//! Mirrors the layout a standard debugger expects inside an `NT_PRSTATUS`
//! / `NT_PRFPREG` note: a fixed field order, not whatever order the port
//! happens to push registers onto the stack in.

/// General-purpose + control register bank, field order r0..r12,sp,lr,pc,xpsr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(C)]
pub struct CoreRegSet {
    pub r0: u32,
    pub r1: u32,
    pub r2: u32,
    pub r3: u32,
    pub r4: u32,
    pub r5: u32,
    pub r6: u32,
    pub r7: u32,
    pub r8: u32,
    pub r9: u32,
    pub r10: u32,
    pub r11: u32,
    pub r12: u32,
    pub sp: u32,
    pub lr: u32,
    pub pc: u32,
    pub xpsr: u32,
}

/// Register count in [`CoreRegSet`]; used to size the `NT_PRSTATUS` copy.
pub const CORE_REGSET_WORDS: usize = 17;

impl CoreRegSet {
    pub const fn zeroed() -> Self {
        CoreRegSet {
            r0: 0, r1: 0, r2: 0, r3: 0, r4: 0, r5: 0, r6: 0, r7: 0,
            r8: 0, r9: 0, r10: 0, r11: 0, r12: 0, sp: 0, lr: 0, pc: 0, xpsr: 0,
        }
    }

    /// Registers in fixed note order, for a single `memcpy`-equivalent.
    pub fn as_words(&self) -> [u32; CORE_REGSET_WORDS] {
        [
            self.r0, self.r1, self.r2, self.r3, self.r4, self.r5, self.r6, self.r7,
            self.r8, self.r9, self.r10, self.r11, self.r12, self.sp, self.lr, self.pc,
            self.xpsr,
        ]
    }
}

/// VFPv2/VFPv3-D16 register bank: d0..d15 plus FPSCR.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[repr(C)]
pub struct FpRegSet {
    pub d: [u64; 16],
    pub fpscr: u32,
}

impl FpRegSet {
    pub const fn zeroed() -> Self {
        FpRegSet { d: [0; 16], fpscr: 0 }
    }
}

/// Read-only view over the eight words a Cortex-M exception automatically
/// pushes (r0,r1,r2,r3,r12,lr,pc,xpsr), as delivered to the hard-fault
/// trampoline. Deliberately does not know how to get *to* that memory —
/// the port layer hands it an already-validated slice.
#[derive(Debug, Clone, Copy)]
pub struct ExceptionFrame<'a> {
    words: &'a [u32; 8],
    base_addr: u32,
}

impl<'a> ExceptionFrame<'a> {
    pub fn new(words: &'a [u32; 8], base_addr: u32) -> Self {
        ExceptionFrame { words, base_addr }
    }

    #[inline] pub fn r0(&self) -> u32 { self.words[0] }
    #[inline] pub fn r1(&self) -> u32 { self.words[1] }
    #[inline] pub fn r2(&self) -> u32 { self.words[2] }
    #[inline] pub fn r3(&self) -> u32 { self.words[3] }
    #[inline] pub fn r12(&self) -> u32 { self.words[4] }
    #[inline] pub fn lr(&self) -> u32 { self.words[5] }
    #[inline] pub fn pc(&self) -> u32 { self.words[6] }
    #[inline] pub fn xpsr(&self) -> u32 { self.words[7] }

    /// Stack pointer at the moment of the fault: the exception frame is the
    /// top 32 bytes of the faulting stack, so `sp` is just past it.
    #[inline]
    pub fn sp_before_fault(&self) -> u32 {
        self.base_addr.wrapping_add(32)
    }

    #[inline]
    pub fn base_addr(&self) -> u32 {
        self.base_addr
    }
}

/// Fill a [`CoreRegSet`] authoritatively from a hard-fault exception frame,
/// then tentatively recover r4..r11 from the eight words immediately below
/// it, gated on those words falling inside `[ram_start, ram_end)`.
pub fn fill_from_exception_frame(
    frame: &ExceptionFrame<'_>,
    ram_start: u32,
    ram_end: u32,
) -> CoreRegSet {
    let mut regs = CoreRegSet::zeroed();

    regs.r0 = frame.r0();
    regs.r1 = frame.r1();
    regs.r2 = frame.r2();
    regs.r3 = frame.r3();
    regs.r12 = frame.r12();
    regs.lr = frame.lr();
    regs.pc = frame.pc();
    regs.xpsr = frame.xpsr();
    regs.sp = frame.sp_before_fault();

    let candidate = frame.base_addr().wrapping_sub(32);
    if candidate >= ram_start && candidate.wrapping_add(32) <= ram_end && candidate < ram_end {
        // SAFETY: caller-validated RAM window; reads eight words below the
        // exception frame, which the port layer only offers when plausible.
        let words = unsafe { core::slice::from_raw_parts(candidate as *const u32, 8) };
        regs.r4 = words[0];
        regs.r5 = words[1];
        regs.r6 = words[2];
        regs.r7 = words[3];
        regs.r8 = words[4];
        regs.r9 = words[5];
        regs.r10 = words[6];
        regs.r11 = words[7];
    }

    regs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exception_frame_accessors_match_field_order() {
        let words: [u32; 8] = [1, 2, 3, 4, 12, 0xFFFF_FFFE, 0x0800_1235, 0x6100_0000];
        let frame = ExceptionFrame::new(&words, 0x2000_1000);
        assert_eq!(frame.r0(), 1);
        assert_eq!(frame.r3(), 4);
        assert_eq!(frame.r12(), 12);
        assert_eq!(frame.pc(), 0x0800_1235);
        assert_eq!(frame.sp_before_fault(), 0x2000_1020);
    }

    #[test]
    fn fill_from_exception_frame_recovers_r4_11_when_in_window() {
        let mut backing = [0u32; 16];
        // r4..r11 live directly below the frame base.
        for (i, w) in backing[0..8].iter_mut().enumerate() {
            *w = 0x1000 + i as u32;
        }
        let frame_base = backing.as_ptr() as u32 + 32;
        let words: [u32; 8] = [0, 0, 0, 0, 0, 0xFFFF_FFFE, 0x0800_0100, 0x0100_0000];
        let frame = ExceptionFrame::new(&words, frame_base);

        let regs = fill_from_exception_frame(&frame, 0, u32::MAX);
        assert_eq!(regs.r4, 0x1000);
        assert_eq!(regs.r11, 0x1007);
        assert_eq!(regs.pc, 0x0800_0100);
    }

    #[test]
    fn fill_from_exception_frame_leaves_r4_11_zero_outside_window() {
        let words: [u32; 8] = [0; 8];
        let frame = ExceptionFrame::new(&words, 0x2000_0020);
        let regs = fill_from_exception_frame(&frame, 0x3000_0000, 0x3001_0000);
        assert_eq!(regs.r4, 0);
        assert_eq!(regs.r11, 0);
    }
}
