//! Delay list - wake-tick-ordered wait set for the tick engine
//!
//! A `DelayList` is an intrusive doubly-linked list of TCBs ordered
//! ascending by `tick_wake`, reusing the TCB's own `tick_next_ptr`/
//! `tick_prev_ptr` links. The kernel keeps two of these (see
//! `SchedState::delay_lists`): the *primary* list holds tasks whose wake
//! tick is still ahead of now, the *overflow* list holds tasks whose wake
//! tick already wrapped past `u32::MAX`. Swapping which array slot plays
//! which role on tick wrap is an index flip, not a data migration.

use core::ptr::NonNull;

use crate::task::OsTcb;

/// Ordered (by `tick_wake`) list of delayed/timed-out-pending tasks.
#[derive(Debug)]
pub struct DelayList {
    head: Option<NonNull<OsTcb>>,
    tail: Option<NonNull<OsTcb>>,
}

impl DelayList {
    pub const fn new() -> Self {
        DelayList { head: None, tail: None }
    }

    pub fn init(&mut self) {
        self.head = None;
        self.tail = None;
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    #[inline(always)]
    pub fn head(&self) -> Option<NonNull<OsTcb>> {
        self.head
    }

    /// Insert `tcb` keeping the list ordered ascending by `tick_wake`.
    /// `slot` is the array index (0 or 1) this list instance currently
    /// occupies; stamped onto the TCB so removal doesn't need to know
    /// which list it came from.
    pub fn insert(&mut self, tcb: NonNull<OsTcb>, slot: u8) {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };
        let wake = tcb_ref.tick_wake;
        tcb_ref.delay_slot = slot;

        let mut current = self.head;
        let mut prev: Option<NonNull<OsTcb>> = None;

        while let Some(cur_ptr) = current {
            let cur_ref = unsafe { cur_ptr.as_ref() };
            if wake < cur_ref.tick_wake {
                break;
            }
            prev = current;
            current = cur_ref.tick_next_ptr;
        }

        tcb_ref.tick_prev_ptr = prev;
        tcb_ref.tick_next_ptr = current;

        match prev {
            Some(p) => unsafe { (*p.as_ptr()).tick_next_ptr = Some(tcb) },
            None => self.head = Some(tcb),
        }

        match current {
            Some(c) => unsafe { (*c.as_ptr()).tick_prev_ptr = Some(tcb) },
            None => self.tail = Some(tcb),
        }
    }

    /// Remove `tcb` from this list.
    pub fn remove(&mut self, tcb: NonNull<OsTcb>) {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };

        match tcb_ref.tick_prev_ptr {
            Some(prev) => unsafe { (*prev.as_ptr()).tick_next_ptr = tcb_ref.tick_next_ptr },
            None => self.head = tcb_ref.tick_next_ptr,
        }

        match tcb_ref.tick_next_ptr {
            Some(next) => unsafe { (*next.as_ptr()).tick_prev_ptr = tcb_ref.tick_prev_ptr },
            None => self.tail = tcb_ref.tick_prev_ptr,
        }

        tcb_ref.tick_prev_ptr = None;
        tcb_ref.tick_next_ptr = None;
    }
}

impl Default for DelayList {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Send for DelayList {}
unsafe impl Sync for DelayList {}

#[cfg(test)]
mod tests {
    use super::*;

    fn tcb_waking_at(wake: u32) -> OsTcb {
        let mut t = OsTcb::new();
        t.tick_wake = wake;
        t
    }

    #[test]
    fn insert_keeps_ascending_wake_order() {
        // Three tasks call delay(50), delay(30), delay(40) at tick 0
        // (§8 "Delay ordering"): the list must reap them 30, 40, 50.
        let mut wakes_50 = tcb_waking_at(50);
        let mut wakes_30 = tcb_waking_at(30);
        let mut wakes_40 = tcb_waking_at(40);
        let mut list = DelayList::new();

        list.insert(NonNull::from(&mut wakes_50), 0);
        list.insert(NonNull::from(&mut wakes_30), 0);
        list.insert(NonNull::from(&mut wakes_40), 0);

        let first = list.head().unwrap();
        assert!(core::ptr::eq(first.as_ptr(), &mut wakes_30 as *mut _));
        let second = unsafe { first.as_ref().tick_next_ptr }.unwrap();
        assert!(core::ptr::eq(second.as_ptr(), &mut wakes_40 as *mut _));
        let third = unsafe { second.as_ref().tick_next_ptr }.unwrap();
        assert!(core::ptr::eq(third.as_ptr(), &mut wakes_50 as *mut _));
    }

    #[test]
    fn remove_head_reveals_next_due() {
        let mut soon = tcb_waking_at(10);
        let mut later = tcb_waking_at(20);
        let mut list = DelayList::new();

        let soon_ptr = NonNull::from(&mut soon);
        list.insert(soon_ptr, 0);
        list.insert(NonNull::from(&mut later), 0);

        list.remove(soon_ptr);

        assert!(core::ptr::eq(list.head().unwrap().as_ptr(), &mut later as *mut _));
    }

    #[test]
    fn stamps_slot_for_removal_without_knowing_list_identity() {
        let mut t = tcb_waking_at(5);
        let mut list = DelayList::new();

        list.insert(NonNull::from(&mut t), 1);

        assert_eq!(t.delay_slot, 1);
    }
}
