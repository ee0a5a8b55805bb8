//! Thread-info capability set
//!
//! Replaces the C `struct thread_info_ops` function-pointer table with a
//! trait the emitter is generic over: `{threads_count, current_thread_index,
//! thread_regset, memarea_count, memarea}`. Live dump (one task) and fault
//! dump (every registered task) are two concrete implementations of the
//! same trait rather than two code paths through a vtable.

use crate::task::{registry, OsTcb};
use core::ptr::NonNull;

use super::capture;
use super::regs::{CoreRegSet, FpRegSet};

/// Upper bound on how many memory regions a single coredump reports.
/// Sized generously above the original's two hardcoded regions (current
/// stack, main SRAM) to leave room for an application-supplied region.
pub const MAX_MEMORY_REGIONS: usize = 4;

/// Upper bound on how many tasks a single coredump reports registers for.
/// Kept as its own constant rather than reusing [`MAX_MEMORY_REGIONS`],
/// since the task count and the region count are unrelated quantities —
/// a system with more tasks than memory regions must not have its extra
/// tasks silently dropped from a fault dump.
pub const MAX_THREADS: usize = 16;

/// A contiguous range of readable memory to embed as a `PT_LOAD` segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemArea {
    pub start: u32,
    pub len: u32,
}

/// The capability set a coredump run needs from the kernel: how many
/// threads exist, which one is current, how to fetch a thread's register
/// bank, and which memory regions to embed.
pub trait ThreadInfoOps {
    fn threads_count(&self) -> usize;
    fn current_thread_index(&self) -> usize;
    fn thread_regset(&self, index: usize) -> Option<(u32, CoreRegSet, Option<FpRegSet>)>;
    fn memarea_count(&self) -> usize;
    fn memarea(&self, index: usize) -> Option<MemArea>;
}

/// Fixed-capacity list of memory regions, set by the application through
/// [`MultiDumpOps::new`] / [`MiniDumpOps::new`] rather than hardcoded.
#[derive(Clone, Copy)]
pub struct MemAreas {
    areas: [MemArea; MAX_MEMORY_REGIONS],
    count: usize,
}

impl MemAreas {
    pub fn from_slice(regions: &[MemArea]) -> Self {
        let mut areas = [MemArea { start: 0, len: 0 }; MAX_MEMORY_REGIONS];
        let count = regions.len().min(MAX_MEMORY_REGIONS);
        areas[..count].copy_from_slice(&regions[..count]);
        MemAreas { areas, count }
    }

    fn count(&self) -> usize {
        self.count
    }

    fn get(&self, index: usize) -> Option<MemArea> {
        self.areas.get(index).copied()
    }
}

/// Walks the registry list (every live task, any scheduling state) — the
/// capability set used by a hard-fault-triggered full dump.
pub struct MultiDumpOps {
    faulting_task: Option<NonNull<OsTcb>>,
    fault_regs: Option<CoreRegSet>,
    regions: MemAreas,
}

impl MultiDumpOps {
    /// `faulting_task`/`fault_regs`: when a hard fault is what triggered
    /// the dump, the faulting task's register bank is already known and
    /// authoritative; it is substituted for that task's entry instead of
    /// being reconstructed from its (stale) saved stack pointer.
    pub fn new(
        faulting_task: Option<NonNull<OsTcb>>,
        fault_regs: Option<CoreRegSet>,
        regions: &[MemArea],
    ) -> Self {
        MultiDumpOps {
            faulting_task,
            fault_regs,
            regions: MemAreas::from_slice(regions),
        }
    }
}

impl ThreadInfoOps for MultiDumpOps {
    fn threads_count(&self) -> usize {
        // SAFETY: called with the kernel critical section held by the caller.
        unsafe { registry().len() }
    }

    fn current_thread_index(&self) -> usize {
        let cur = unsafe { crate::kernel::tcb_cur_ptr() };
        match cur {
            Some(tcb) => unsafe { registry().index_of(tcb) }.unwrap_or(0),
            None => 0,
        }
    }

    fn thread_regset(&self, index: usize) -> Option<(u32, CoreRegSet, Option<FpRegSet>)> {
        let tcb_ptr = unsafe { registry().nth(index) }?;
        let tcb = unsafe { tcb_ptr.as_ref() };

        let regs = if self.faulting_task == Some(tcb_ptr) {
            self.fault_regs.unwrap_or_else(CoreRegSet::zeroed)
        } else {
            unsafe { capture::capture_task_regset(tcb_ptr) }
        };

        Some((tcb.task_id, regs, None))
    }

    fn memarea_count(&self) -> usize {
        self.regions.count()
    }

    fn memarea(&self, index: usize) -> Option<MemArea> {
        self.regions.get(index)
    }
}

/// Captures only the currently running task — the capability set used by
/// an on-demand "mini" (single-task) dump.
pub struct MiniDumpOps {
    regions: MemAreas,
}

impl MiniDumpOps {
    pub fn new(regions: &[MemArea]) -> Self {
        MiniDumpOps { regions: MemAreas::from_slice(regions) }
    }
}

impl ThreadInfoOps for MiniDumpOps {
    fn threads_count(&self) -> usize {
        1
    }

    fn current_thread_index(&self) -> usize {
        0
    }

    fn thread_regset(&self, index: usize) -> Option<(u32, CoreRegSet, Option<FpRegSet>)> {
        if index != 0 {
            return None;
        }
        let tcb_ptr = unsafe { crate::kernel::tcb_cur_ptr() }?;
        let tcb = unsafe { tcb_ptr.as_ref() };
        let regs = unsafe { capture::capture_task_regset(tcb_ptr) };
        Some((tcb.task_id, regs, None))
    }

    fn memarea_count(&self) -> usize {
        self.regions.count()
    }

    fn memarea(&self, index: usize) -> Option<MemArea> {
        self.regions.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_areas_clamps_to_capacity() {
        let regions: [MemArea; 6] = [MemArea { start: 0, len: 1 }; 6];
        let areas = MemAreas::from_slice(&regions);
        assert_eq!(areas.count(), MAX_MEMORY_REGIONS);
    }

    #[test]
    fn mini_dump_reports_single_thread() {
        let ops = MiniDumpOps::new(&[MemArea { start: 0x2000_0000, len: 256 }]);
        assert_eq!(ops.threads_count(), 1);
        assert_eq!(ops.current_thread_index(), 0);
        assert_eq!(ops.memarea_count(), 1);
        assert_eq!(ops.memarea(0), Some(MemArea { start: 0x2000_0000, len: 256 }));
        assert_eq!(ops.memarea(1), None);
    }
}
