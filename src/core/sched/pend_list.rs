//! Pend list - priority-ordered wait set for a kernel object
//!
//! Every synchronization primitive (semaphore, mutex, queue) embeds one or
//! more of these as its wait set. Lives in `core::sched` rather than any one
//! primitive's module because the tick engine needs to remove a timed-out
//! waiter from whichever object's wait set it sits in without knowing the
//! concrete owner type (see `OsTcb::pend_list_ptr`).

use core::ptr::NonNull;

use crate::task::OsTcb;

/// Pend list for tasks waiting on a kernel object
#[derive(Debug)]
pub struct PendList {
    head: Option<NonNull<OsTcb>>,
    tail: Option<NonNull<OsTcb>>,
    #[cfg(feature = "defmt")]
    count: usize,
}

impl PendList {
    /// Create a new empty pend list
    pub const fn new() -> Self {
        PendList {
            head: None,
            tail: None,
            #[cfg(feature = "defmt")]
            count: 0,
        }
    }

    /// Initialize the pend list
    pub fn init(&mut self) {
        self.head = None;
        self.tail = None;
        #[cfg(feature = "defmt")]
        {
            self.count = 0;
        }
    }

    /// Check if list is empty
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Get head of list
    #[inline(always)]
    pub fn head(&self) -> Option<NonNull<OsTcb>> {
        self.head
    }

    /// Get tail of list
    #[inline(always)]
    pub fn tail(&self) -> Option<NonNull<OsTcb>> {
        self.tail
    }

    /// Insert TCB at tail
    pub fn insert(&mut self, tcb: NonNull<OsTcb>) {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };

        tcb_ref.pend_next_ptr = None;
        tcb_ref.pend_prev_ptr = self.tail;

        match self.tail {
            Some(tail) => {
                unsafe { (*tail.as_ptr()).pend_next_ptr = Some(tcb) };
            }
            None => {
                self.head = Some(tcb);
            }
        }

        self.tail = Some(tcb);

        #[cfg(feature = "defmt")]
        {
            self.count += 1;
        }
    }

    /// Insert in priority order, highest priority number first.
    pub fn insert_by_prio(&mut self, tcb: NonNull<OsTcb>) {
        let tcb_ref = unsafe { tcb.as_ref() };
        let prio = tcb_ref.prio;

        let mut current = self.head;
        let mut prev: Option<NonNull<OsTcb>> = None;

        while let Some(cur_ptr) = current {
            let cur_ref = unsafe { cur_ptr.as_ref() };
            if prio > cur_ref.prio {
                break;
            }
            prev = current;
            current = cur_ref.pend_next_ptr;
        }

        let tcb_mut = unsafe { &mut *tcb.as_ptr() };
        tcb_mut.pend_prev_ptr = prev;
        tcb_mut.pend_next_ptr = current;

        match prev {
            Some(p) => {
                unsafe { (*p.as_ptr()).pend_next_ptr = Some(tcb) };
            }
            None => {
                self.head = Some(tcb);
            }
        }

        match current {
            Some(c) => {
                unsafe { (*c.as_ptr()).pend_prev_ptr = Some(tcb) };
            }
            None => {
                self.tail = Some(tcb);
            }
        }

        #[cfg(feature = "defmt")]
        {
            self.count += 1;
        }
    }

    /// Remove specific TCB from list
    pub fn remove(&mut self, tcb: NonNull<OsTcb>) {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };

        match tcb_ref.pend_prev_ptr {
            Some(prev) => {
                unsafe { (*prev.as_ptr()).pend_next_ptr = tcb_ref.pend_next_ptr };
            }
            None => {
                self.head = tcb_ref.pend_next_ptr;
            }
        }

        match tcb_ref.pend_next_ptr {
            Some(next) => {
                unsafe { (*next.as_ptr()).pend_prev_ptr = tcb_ref.pend_prev_ptr };
            }
            None => {
                self.tail = tcb_ref.pend_prev_ptr;
            }
        }

        tcb_ref.pend_prev_ptr = None;
        tcb_ref.pend_next_ptr = None;

        #[cfg(feature = "defmt")]
        {
            self.count = self.count.saturating_sub(1);
        }
    }
}

impl Default for PendList {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Send for PendList {}
unsafe impl Sync for PendList {}

#[cfg(test)]
mod tests {
    use super::*;

    fn tcb_at(prio: crate::types::OsPrio) -> OsTcb {
        let mut t = OsTcb::new();
        t.prio = prio;
        t
    }

    #[test]
    fn priority_order_highest_first() {
        let mut low = tcb_at(1);
        let mut mid = tcb_at(5);
        let mut high = tcb_at(10);
        let mut list = PendList::new();

        list.insert_by_prio(NonNull::from(&mut low));
        list.insert_by_prio(NonNull::from(&mut mid));
        list.insert_by_prio(NonNull::from(&mut high));

        let first = list.head().unwrap();
        assert!(core::ptr::eq(first.as_ptr(), &mut high as *mut _));
        let second = unsafe { first.as_ref().pend_next_ptr }.unwrap();
        assert!(core::ptr::eq(second.as_ptr(), &mut mid as *mut _));
        let third = unsafe { second.as_ref().pend_next_ptr }.unwrap();
        assert!(core::ptr::eq(third.as_ptr(), &mut low as *mut _));
    }

    #[test]
    fn same_priority_waiters_stay_fifo() {
        // Two tasks of equal priority must come out in the order they
        // blocked (§8 "Queue FIFO within priority").
        let mut first_blocked = tcb_at(7);
        let mut second_blocked = tcb_at(7);
        let mut list = PendList::new();

        list.insert_by_prio(NonNull::from(&mut first_blocked));
        list.insert_by_prio(NonNull::from(&mut second_blocked));

        let head = list.head().unwrap();
        assert!(core::ptr::eq(head.as_ptr(), &mut first_blocked as *mut _));
        let next = unsafe { head.as_ref().pend_next_ptr }.unwrap();
        assert!(core::ptr::eq(next.as_ptr(), &mut second_blocked as *mut _));
    }

    #[test]
    fn remove_middle_relinks_neighbors() {
        let mut a = tcb_at(3);
        let mut b = tcb_at(2);
        let mut c = tcb_at(1);
        let mut list = PendList::new();

        let a_ptr = NonNull::from(&mut a);
        let b_ptr = NonNull::from(&mut b);
        let c_ptr = NonNull::from(&mut c);
        list.insert_by_prio(a_ptr);
        list.insert_by_prio(b_ptr);
        list.insert_by_prio(c_ptr);

        list.remove(b_ptr);

        let head = list.head().unwrap();
        assert!(core::ptr::eq(head.as_ptr(), &mut a as *mut _));
        let next = unsafe { head.as_ref().pend_next_ptr }.unwrap();
        assert!(core::ptr::eq(next.as_ptr(), &mut c as *mut _));
        assert!(core::ptr::eq(list.tail().unwrap().as_ptr(), &mut c as *mut _));
    }
}
