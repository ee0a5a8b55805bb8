//! Semaphore implementation
//!
//! Counting semaphores for task synchronization and resource counting.

use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::kernel;
use crate::sched::{self, PendList};
use crate::time::{delay_cancel, delay_schedule};
use crate::types::{OsObjType, OsOpt, OsPendOn, OsPendStatus, OsSemCtr, OsTaskState, OsTick, opt};

/// Counting semaphore
pub struct OsSem {
    /// Object type marker
    obj_type: OsObjType,
    /// List of tasks waiting on this semaphore
    pend_list: PendList,
    /// Current count
    count: OsSemCtr,
    /// Name for debugging
    #[cfg(feature = "defmt")]
    name: &'static str,
}

impl OsSem {
    /// Create a new semaphore
    ///
    /// # Arguments
    /// * `count` - Initial count value
    /// * `name` - Semaphore name
    pub const fn new(count: OsSemCtr) -> Self {
        OsSem {
            obj_type: OsObjType::Sem,
            pend_list: PendList::new(),
            count,
            #[cfg(feature = "defmt")]
            name: "",
        }
    }

    /// Initialize/create the semaphore
    pub fn create(&mut self, count: OsSemCtr, _name: &'static str) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::CreateIsr);
        }

        critical_section(|_cs| {
            self.obj_type = OsObjType::Sem;
            self.pend_list.init();
            self.count = count;
            #[cfg(feature = "defmt")]
            {
                self.name = _name;
            }
            Ok(())
        })
    }

    /// Wait on (pend) the semaphore
    ///
    /// # Arguments
    /// * `timeout` - Maximum ticks to wait (0 = forever)
    /// * `opt` - Pend options
    ///
    /// # Returns
    /// * `Ok(count)` - Semaphore acquired, returns current count
    /// * `Err(OsError::Timeout)` - Timeout expired
    /// * `Err(OsError::PendWouldBlock)` - Non-blocking and not available
    pub fn pend(&mut self, timeout: OsTick, pend_opt: OsOpt) -> OsResult<OsSemCtr> {
        if is_isr_context() {
            return Err(OsError::PendIsr);
        }

        if !kernel::KERNEL.is_running() {
            return Err(OsError::OsNotRunning);
        }

        if self.obj_type != OsObjType::Sem {
            return Err(OsError::ObjType);
        }

        critical_section(|_cs| {
            if self.count > 0 {
                self.count -= 1;
                return Ok(self.count);
            }

            if pend_opt & opt::PEND_NON_BLOCKING != 0 {
                return Err(OsError::PendWouldBlock);
            }

            if kernel::KERNEL.sched_lock_nesting() > 0 {
                return Err(OsError::SchedLocked);
            }

            // Block current task
            unsafe {
                if let Some(cur_tcb_ptr) = kernel::tcb_cur_ptr() {
                    let cur_tcb = &mut *cur_tcb_ptr.as_ptr();

                    sched::os_rdy_list_remove(cur_tcb_ptr);

                    cur_tcb.pend_on = OsPendOn::Semaphore;
                    cur_tcb.pend_status = OsPendStatus::Ok;
                    cur_tcb.pend_list_ptr = Some(core::ptr::NonNull::from(&mut self.pend_list));
                    cur_tcb.tick_remain = timeout;

                    if timeout > 0 {
                        cur_tcb.task_state = OsTaskState::PendTimeout;
                        delay_schedule(cur_tcb_ptr, timeout);
                    } else {
                        cur_tcb.task_state = OsTaskState::Pend;
                    }

                    self.pend_list.insert_by_prio(cur_tcb_ptr);
                }
            }

            sched::os_sched();

            unsafe {
                if let Some(cur_tcb_ptr) = kernel::tcb_cur_ptr() {
                    let cur_tcb = cur_tcb_ptr.as_ref();
                    
                    match cur_tcb.pend_status {
                        OsPendStatus::Ok => Ok(self.count),
                        OsPendStatus::Timeout => Err(OsError::Timeout),
                        OsPendStatus::Abort => Err(OsError::PendAbort),
                        OsPendStatus::Del => Err(OsError::ObjDel),
                    }
                } else {
                    Err(OsError::TcbInvalid)
                }
            }
        })
    }

    /// Signal (post) the semaphore
    ///
    /// # Arguments
    /// * `opt` - Post options
    ///
    /// # Returns
    /// * `Ok(count)` - New count after post
    /// * `Err(OsError::SemOvf)` - Counter overflow
    pub fn post(&mut self, post_opt: OsOpt) -> OsResult<OsSemCtr> {
        if self.obj_type != OsObjType::Sem {
            return Err(OsError::ObjType);
        }

        critical_section(|_cs| {
            if let Some(tcb_ptr) = self.pend_list.head() {
                let tcb = unsafe { &mut *tcb_ptr.as_ptr() };

                self.pend_list.remove(tcb_ptr);

                unsafe { delay_cancel(tcb_ptr) };

                tcb.pend_on = OsPendOn::Nothing;
                tcb.pend_status = OsPendStatus::Ok;
                tcb.pend_list_ptr = None;
                tcb.tick_remain = 0;
                tcb.task_state = OsTaskState::Ready;

                unsafe { sched::os_rdy_list_insert(tcb_ptr) };

                if post_opt & opt::POST_NO_SCHED == 0 && !is_isr_context() {
                    sched::os_sched();
                }

                Ok(self.count)
            } else {
                if self.count == OsSemCtr::MAX {
                    return Err(OsError::SemOvf);
                }
                self.count += 1;
                Ok(self.count)
            }
        })
    }

    /// Get current semaphore count
    #[inline(always)]
    pub fn count(&self) -> OsSemCtr {
        self.count
    }

    /// Set semaphore count
    pub fn set(&mut self, count: OsSemCtr) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::AcceptIsr);
        }

        critical_section(|_cs| {
            self.count = count;
            Ok(())
        })
    }
}

impl Default for OsSem {
    fn default() -> Self {
        Self::new(0)
    }
}

// ============ Safe Wrapper ============

use core::cell::UnsafeCell;

pub struct Semaphore {
    inner: UnsafeCell<OsSem>,
}

unsafe impl Sync for Semaphore {}
unsafe impl Send for Semaphore {}

impl Semaphore {
    pub const fn new(count: OsSemCtr) -> Self {
        Semaphore {
            inner: UnsafeCell::new(OsSem::new(count)),
        }
    }

    pub fn create(&self, count: OsSemCtr, name: &'static str) -> OsResult<()> {
        unsafe { (*self.inner.get()).create(count, name) }
    }

    pub fn wait(&self, timeout: OsTick, opt: OsOpt) -> OsResult<OsSemCtr> {
        unsafe { (*self.inner.get()).pend(timeout, opt) }
    }

    pub fn signal(&self, opt: OsOpt) -> OsResult<OsSemCtr> {
        unsafe { (*self.inner.get()).post(opt) }
    }

    #[inline]
    pub fn count(&self) -> OsSemCtr {
        unsafe { (*self.inner.get()).count() }
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new(0)
    }
}
