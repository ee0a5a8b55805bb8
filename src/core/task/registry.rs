//! Task registry list
//!
//! Every TCB, regardless of scheduling state, is linked into this list at
//! creation and unlinked at deletion. The ready set, delay lists, and wait
//! sets each hold only a state-filtered subset of live TCBs; the registry
//! is the one structure that always holds all of them, which is what the
//! coredump thread-enumeration capability walks.

use core::ptr::NonNull;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::core::cs_cell::CsCell;
use crate::task::OsTcb;

static NEXT_TASK_ID: AtomicU32 = AtomicU32::new(1);

/// Allocate the next monotonically increasing task identity.
pub(crate) fn next_task_id() -> u32 {
    NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed)
}

/// Doubly linked list of every live TCB, in creation order.
#[derive(Debug)]
pub struct RegistryList {
    head: Option<NonNull<OsTcb>>,
    tail: Option<NonNull<OsTcb>>,
    count: usize,
}

impl RegistryList {
    pub const fn new() -> Self {
        RegistryList {
            head: None,
            tail: None,
            count: 0,
        }
    }

    pub fn init(&mut self) {
        self.head = None;
        self.tail = None;
        self.count = 0;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    pub fn head(&self) -> Option<NonNull<OsTcb>> {
        self.head
    }

    /// Link a newly created TCB at the tail of the registry.
    ///
    /// # Safety
    /// Caller must ensure `tcb` is valid and not already registered.
    pub fn insert_tail(&mut self, tcb: NonNull<OsTcb>) {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };
        tcb_ref.registry_next_ptr = None;
        tcb_ref.registry_prev_ptr = self.tail;

        match self.tail {
            Some(tail) => unsafe { (*tail.as_ptr()).registry_next_ptr = Some(tcb) },
            None => self.head = Some(tcb),
        }

        self.tail = Some(tcb);
        self.count += 1;
    }

    /// Unlink a TCB at task delete time.
    ///
    /// # Safety
    /// Caller must ensure `tcb` is currently registered.
    pub fn remove(&mut self, tcb: NonNull<OsTcb>) {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };

        match tcb_ref.registry_prev_ptr {
            Some(prev) => unsafe { (*prev.as_ptr()).registry_next_ptr = tcb_ref.registry_next_ptr },
            None => self.head = tcb_ref.registry_next_ptr,
        }

        match tcb_ref.registry_next_ptr {
            Some(next) => unsafe { (*next.as_ptr()).registry_prev_ptr = tcb_ref.registry_prev_ptr },
            None => self.tail = tcb_ref.registry_prev_ptr,
        }

        tcb_ref.registry_next_ptr = None;
        tcb_ref.registry_prev_ptr = None;
        self.count = self.count.saturating_sub(1);
    }

    /// The `index`-th TCB in registry order (0-based).
    ///
    /// O(n) — only ever called while walking threads for a coredump, never
    /// on a scheduling hot path.
    pub fn nth(&self, index: usize) -> Option<NonNull<OsTcb>> {
        let mut current = self.head;
        let mut i = 0usize;
        while let Some(tcb) = current {
            if i == index {
                return Some(tcb);
            }
            current = unsafe { tcb.as_ref().registry_next_ptr };
            i += 1;
        }
        None
    }

    /// Registry-order index of `target`, if it is currently registered.
    pub fn index_of(&self, target: NonNull<OsTcb>) -> Option<usize> {
        let mut current = self.head;
        let mut i = 0usize;
        while let Some(tcb) = current {
            if tcb == target {
                return Some(i);
            }
            current = unsafe { tcb.as_ref().registry_next_ptr };
            i += 1;
        }
        None
    }
}

impl Default for RegistryList {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: only ever touched from within a critical section.
unsafe impl Send for RegistryList {}
unsafe impl Sync for RegistryList {}

/// Global registry of every live TCB, independent of scheduling state.
pub(crate) static REGISTRY: CsCell<RegistryList> = CsCell::new(RegistryList::new());

/// Access the global registry list.
///
/// # Safety
/// Caller must hold the kernel critical section (all call sites already do).
#[inline]
pub(crate) unsafe fn registry() -> &'static mut RegistryList {
    unsafe { REGISTRY.get_unchecked() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_ids_are_monotonic() {
        let a = next_task_id();
        let b = next_task_id();
        assert!(b > a);
    }
}
