//! Fixed-capacity typed message queue
//!
//! A generic ring buffer over a `Copy` item type with const-generic
//! capacity. Blocked senders and receivers each wait in their own
//! priority-ordered pend list (the same list type the semaphore/mutex
//! layer uses) and retry their operation from scratch on wakeup.

use core::mem::MaybeUninit;

use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::kernel;
use crate::sched::{self, PendList};
use crate::time::{delay_cancel, delay_schedule};
use crate::types::{OsObjType, OsOpt, OsPendOn, OsPendStatus, OsTaskState, OsTick, opt};

/// Fixed-capacity queue of `T`, `CAP` slots deep.
pub struct OsQueue<T: Copy, const CAP: usize> {
    obj_type: OsObjType,
    buf: [MaybeUninit<T>; CAP],
    /// Index of the next slot to read
    head: usize,
    /// Index of the next slot to write
    tail: usize,
    /// Number of occupied slots
    count: usize,
    /// Tasks blocked in `recv()` because the queue was empty
    recv_pend_list: PendList,
    /// Tasks blocked in `send()` because the queue was full
    send_pend_list: PendList,
    #[cfg(feature = "defmt")]
    name: &'static str,
}

impl<T: Copy, const CAP: usize> OsQueue<T, CAP> {
    /// Create a new, empty queue. `CAP` must be nonzero.
    pub const fn new() -> Self {
        OsQueue {
            obj_type: OsObjType::Queue,
            // An array of `MaybeUninit` never needs element initialization.
            buf: unsafe { MaybeUninit::uninit().assume_init() },
            head: 0,
            tail: 0,
            count: 0,
            recv_pend_list: PendList::new(),
            send_pend_list: PendList::new(),
            #[cfg(feature = "defmt")]
            name: "",
        }
    }

    /// Initialize/create the queue.
    pub fn create(&mut self, _name: &'static str) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::CreateIsr);
        }

        critical_section(|_cs| {
            self.obj_type = OsObjType::Queue;
            self.head = 0;
            self.tail = 0;
            self.count = 0;
            self.recv_pend_list.init();
            self.send_pend_list.init();
            #[cfg(feature = "defmt")]
            {
                self.name = _name;
            }
            Ok(())
        })
    }

    #[inline(always)]
    fn is_full(&self) -> bool {
        self.count == CAP
    }

    #[inline(always)]
    fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn push_unchecked(&mut self, item: T) {
        self.buf[self.tail].write(item);
        self.tail = (self.tail + 1) % CAP;
        self.count += 1;
    }

    fn pop_unchecked(&mut self) -> T {
        let item = unsafe { self.buf[self.head].assume_init_read() };
        self.head = (self.head + 1) % CAP;
        self.count -= 1;
        item
    }

    /// Wake the highest-priority waiter in `list`. Returns whether a task
    /// was actually woken, so ISR-path callers know whether to request a
    /// reschedule.
    fn wake_one(list: &mut PendList) -> bool {
        let Some(tcb_ptr) = list.head() else {
            return false;
        };
        let tcb = unsafe { &mut *tcb_ptr.as_ptr() };

        list.remove(tcb_ptr);

        unsafe { delay_cancel(tcb_ptr) };

        tcb.pend_on = OsPendOn::Nothing;
        tcb.pend_status = OsPendStatus::Ok;
        tcb.pend_list_ptr = None;
        tcb.tick_remain = 0;
        tcb.task_state = OsTaskState::Ready;

        unsafe { sched::os_rdy_list_insert(tcb_ptr) };
        true
    }

    /// Block the current task on `list`, pending on this queue.
    fn block_current(&mut self, list_is_send: bool, timeout: OsTick) -> OsResult<()> {
        let cur_tcb_ptr = unsafe { kernel::tcb_cur_ptr() }.ok_or(OsError::TcbInvalid)?;

        unsafe {
            let cur_tcb = &mut *cur_tcb_ptr.as_ptr();

            sched::os_rdy_list_remove(cur_tcb_ptr);

            cur_tcb.pend_on = OsPendOn::Queue;
            cur_tcb.pend_status = OsPendStatus::Ok;
            cur_tcb.tick_remain = timeout;
            cur_tcb.task_state = if timeout > 0 {
                OsTaskState::PendTimeout
            } else {
                OsTaskState::Pend
            };

            if list_is_send {
                cur_tcb.pend_list_ptr = Some(core::ptr::NonNull::from(&mut self.send_pend_list));
                self.send_pend_list.insert_by_prio(cur_tcb_ptr);
            } else {
                cur_tcb.pend_list_ptr = Some(core::ptr::NonNull::from(&mut self.recv_pend_list));
                self.recv_pend_list.insert_by_prio(cur_tcb_ptr);
            }

            if timeout > 0 {
                delay_schedule(cur_tcb_ptr, timeout);
            }
        }

        Ok(())
    }

    /// Send `item`, blocking up to `timeout` ticks (0 = forever) if full.
    ///
    /// On wakeup the whole operation is retried: a wakeup from a peer
    /// `recv()` retries and succeeds, a wakeup from the tick engine reaping
    /// the wait returns `OsError::Timeout`.
    pub fn send(&mut self, item: T, timeout: OsTick, post_opt: OsOpt) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::PendIsr);
        }
        if !kernel::KERNEL.is_running() {
            return Err(OsError::OsNotRunning);
        }
        if self.obj_type != OsObjType::Queue {
            return Err(OsError::ObjType);
        }

        loop {
            let blocked = critical_section(|_cs| -> OsResult<bool> {
                if !self.is_full() {
                    self.push_unchecked(item);
                    Self::wake_one(&mut self.recv_pend_list);
                    if post_opt & opt::POST_NO_SCHED == 0 {
                        sched::os_sched();
                    }
                    return Ok(false);
                }

                if post_opt & opt::PEND_NON_BLOCKING != 0 {
                    return Err(OsError::PendWouldBlock);
                }
                if kernel::KERNEL.sched_lock_nesting() > 0 {
                    return Err(OsError::SchedLocked);
                }

                self.block_current(true, timeout)?;
                Ok(true)
            })?;

            if !blocked {
                return Ok(());
            }

            sched::os_sched();

            match Self::current_pend_status() {
                Some(OsPendStatus::Ok) => continue,
                Some(OsPendStatus::Timeout) => return Err(OsError::Timeout),
                Some(OsPendStatus::Abort) => return Err(OsError::PendAbort),
                Some(OsPendStatus::Del) => return Err(OsError::ObjDel),
                None => return Err(OsError::TcbInvalid),
            }
        }
    }

    /// Receive an item, blocking up to `timeout` ticks (0 = forever) if empty.
    pub fn recv(&mut self, timeout: OsTick, pend_opt: OsOpt) -> OsResult<T> {
        if is_isr_context() {
            return Err(OsError::PendIsr);
        }
        if !kernel::KERNEL.is_running() {
            return Err(OsError::OsNotRunning);
        }
        if self.obj_type != OsObjType::Queue {
            return Err(OsError::ObjType);
        }

        loop {
            let outcome = critical_section(|_cs| -> OsResult<Option<T>> {
                if !self.is_empty() {
                    let item = self.pop_unchecked();
                    if Self::wake_one(&mut self.send_pend_list) {
                        sched::os_sched();
                    }
                    return Ok(Some(item));
                }

                if pend_opt & opt::PEND_NON_BLOCKING != 0 {
                    return Err(OsError::PendWouldBlock);
                }
                if kernel::KERNEL.sched_lock_nesting() > 0 {
                    return Err(OsError::SchedLocked);
                }

                self.block_current(false, timeout)?;
                Ok(None)
            })?;

            let Some(item) = outcome else {
                sched::os_sched();

                match Self::current_pend_status() {
                    Some(OsPendStatus::Ok) => continue,
                    Some(OsPendStatus::Timeout) => return Err(OsError::Timeout),
                    Some(OsPendStatus::Abort) => return Err(OsError::PendAbort),
                    Some(OsPendStatus::Del) => return Err(OsError::ObjDel),
                    None => return Err(OsError::TcbInvalid),
                }
            };

            return Ok(item);
        }
    }

    /// Send from ISR context. Never blocks; returns whether a
    /// higher-priority task was woken so the ISR epilogue can request a
    /// context switch.
    pub fn send_from_isr(&mut self, item: T) -> OsResult<bool> {
        if self.obj_type != OsObjType::Queue {
            return Err(OsError::ObjType);
        }

        critical_section(|_cs| {
            if self.is_full() {
                return Err(OsError::QFull);
            }
            self.push_unchecked(item);
            Ok(Self::wake_one(&mut self.recv_pend_list))
        })
    }

    /// Receive from ISR context. Never blocks.
    pub fn recv_from_isr(&mut self) -> OsResult<(T, bool)> {
        if self.obj_type != OsObjType::Queue {
            return Err(OsError::ObjType);
        }

        critical_section(|_cs| {
            if self.is_empty() {
                return Err(OsError::QEmpty);
            }
            let item = self.pop_unchecked();
            let woke = Self::wake_one(&mut self.send_pend_list);
            Ok((item, woke))
        })
    }

    /// Number of items currently queued.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline(always)]
    pub fn is_full_pub(&self) -> bool {
        self.is_full()
    }

    fn current_pend_status() -> Option<OsPendStatus> {
        unsafe { kernel::tcb_cur_ptr() }.map(|p| unsafe { p.as_ref().pend_status })
    }
}

impl<T: Copy, const CAP: usize> Default for OsQueue<T, CAP> {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl<T: Copy, const CAP: usize> Send for OsQueue<T, CAP> {}
unsafe impl<T: Copy, const CAP: usize> Sync for OsQueue<T, CAP> {}

impl<T: Copy, const CAP: usize> Drop for OsQueue<T, CAP> {
    fn drop(&mut self) {
        while !self.is_empty() {
            self.pop_unchecked();
        }
    }
}

// ============ Safe Wrapper ============

use core::cell::UnsafeCell;

/// `Sync`/`Send` wrapper suitable for a `static` binding, mirroring
/// `Semaphore`/`Mutex`.
pub struct Queue<T: Copy, const CAP: usize> {
    inner: UnsafeCell<OsQueue<T, CAP>>,
}

unsafe impl<T: Copy, const CAP: usize> Sync for Queue<T, CAP> {}
unsafe impl<T: Copy, const CAP: usize> Send for Queue<T, CAP> {}

impl<T: Copy, const CAP: usize> Queue<T, CAP> {
    pub const fn new() -> Self {
        Queue {
            inner: UnsafeCell::new(OsQueue::new()),
        }
    }

    pub fn create(&self, name: &'static str) -> OsResult<()> {
        unsafe { (*self.inner.get()).create(name) }
    }

    pub fn send(&self, item: T, timeout: OsTick, opt: OsOpt) -> OsResult<()> {
        unsafe { (*self.inner.get()).send(item, timeout, opt) }
    }

    pub fn recv(&self, timeout: OsTick, opt: OsOpt) -> OsResult<T> {
        unsafe { (*self.inner.get()).recv(timeout, opt) }
    }

    pub fn send_from_isr(&self, item: T) -> OsResult<bool> {
        unsafe { (*self.inner.get()).send_from_isr(item) }
    }

    pub fn recv_from_isr(&self) -> OsResult<(T, bool)> {
        unsafe { (*self.inner.get()).recv_from_isr() }
    }

    #[inline]
    pub fn len(&self) -> usize {
        unsafe { (*self.inner.get()).len() }
    }
}

impl<T: Copy, const CAP: usize> Default for Queue<T, CAP> {
    fn default() -> Self {
        Self::new()
    }
}
