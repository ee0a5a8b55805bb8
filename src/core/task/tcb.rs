//! Task Control Block (TCB) definition
//!
//! The TCB contains all the information needed to manage a task.

use core::ptr::NonNull;

use crate::sched::PendList;
use crate::types::{
    OsNestingCtr, OsOpt, OsPendOn, OsPendStatus,
    OsPrio, OsStkElement, OsTaskState, OsTick,
};

/// Task Control Block
#[repr(C)]
pub struct OsTcb {
    // ============ Stack pointer ============
    /// Current stack pointer
    pub stk_ptr: *mut OsStkElement,

    // ============ Stack information ============
    /// Base of stack
    pub stk_base: *mut OsStkElement,
    /// Stack limit pointer
    pub stk_limit: *mut OsStkElement,
    /// Stack size in words
    pub stk_size: usize,

    // ============ Task identification ============
    /// Task name
    pub name: &'static str,

    // ============ Ready list links ============
    /// Next TCB in ready list
    pub next_ptr: Option<NonNull<OsTcb>>,
    /// Previous TCB in ready list
    pub prev_ptr: Option<NonNull<OsTcb>>,

    // ============ Pend list links ============
    /// Next TCB in pend list
    pub pend_next_ptr: Option<NonNull<OsTcb>>,
    /// Previous TCB in pend list
    pub pend_prev_ptr: Option<NonNull<OsTcb>>,
    /// The wait set (on whichever object) this task is linked into, type-erased
    /// so the tick engine can unlink a timed-out waiter without knowing the
    /// concrete owner (semaphore, mutex, or queue).
    pub pend_list_ptr: Option<NonNull<PendList>>,
    /// What type of object the task is pending on
    pub pend_on: OsPendOn,
    /// Result of pend operation
    pub pend_status: OsPendStatus,

    // ============ Tick list links ============
    /// Next TCB in the delay list (primary or overflow)
    pub tick_next_ptr: Option<NonNull<OsTcb>>,
    /// Previous TCB in the delay list
    pub tick_prev_ptr: Option<NonNull<OsTcb>>,
    /// Remaining ticks, retained for `OsTick` diagnostics/backwards queries
    pub tick_remain: OsTick,
    /// Absolute tick at which this task becomes due
    pub tick_wake: OsTick,
    /// Which of the two delay lists (0 or 1) this task is linked into.
    /// Stable across a primary/overflow role swap, since the swap only
    /// flips which array index is "primary" - it never moves nodes.
    pub delay_slot: u8,
    /// Whether this task is currently linked into a delay list. Lets the
    /// generic pend-timeout-cancel path no-op for a task that pended with
    /// an infinite timeout instead of having to track it another way.
    pub in_delay_list: bool,

    // ============ Priority ============
    /// Current priority
    pub prio: OsPrio,
    /// Base priority
    pub base_prio: OsPrio,

    // ============ State ============
    /// Current task state
    pub task_state: OsTaskState,
    /// Task options
    pub opt: OsOpt,

    // ============ Suspend ============
    /// Suspend nesting counter
    pub suspend_ctr: OsNestingCtr,

    // ============ Time slicing ============
    /// Time quanta for this task
    pub time_quanta: OsTick,
    /// Remaining time quanta
    pub time_quanta_ctr: OsTick,

    // ============ Registry (coredump enumeration) ============
    /// Monotonically increasing task identity; becomes `pr_pid` in the
    /// coredump's `NT_PRSTATUS` note. Assigned once at creation.
    pub task_id: u32,
    /// Next TCB in the registry list (every live TCB, any state)
    pub registry_next_ptr: Option<NonNull<OsTcb>>,
    /// Previous TCB in the registry list
    pub registry_prev_ptr: Option<NonNull<OsTcb>>,
}

impl OsTcb {
    /// Create a new, uninitialized TCB
    pub const fn new() -> Self {
        OsTcb {
            stk_ptr: core::ptr::null_mut(),
            stk_base: core::ptr::null_mut(),
            stk_limit: core::ptr::null_mut(),
            stk_size: 0,
            
            name: "",
            
            next_ptr: None,
            prev_ptr: None,
            
            pend_next_ptr: None,
            pend_prev_ptr: None,
            pend_list_ptr: None,
            pend_on: OsPendOn::Nothing,
            pend_status: OsPendStatus::Ok,

            tick_next_ptr: None,
            tick_prev_ptr: None,
            tick_remain: 0,
            tick_wake: 0,
            delay_slot: 0,
            in_delay_list: false,
            
            prio: 0,
            base_prio: 0,
            
            task_state: OsTaskState::Ready,
            opt: 0,
            
            suspend_ctr: 0,
            
            time_quanta: 0,
            time_quanta_ctr: 0,

            task_id: 0,
            registry_next_ptr: None,
            registry_prev_ptr: None,
        }
    }

    /// Initialize TCB to default values
    pub fn init(&mut self) {
        *self = Self::new();
    }

    /// Check if task is ready to run
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.task_state == OsTaskState::Ready
    }

    /// Check if task is pending
    #[inline]
    pub fn is_pending(&self) -> bool {
        matches!(
            self.task_state,
            OsTaskState::Pend | OsTaskState::PendTimeout |
            OsTaskState::PendSuspended | OsTaskState::PendTimeoutSuspended
        )
    }

    /// Check if task is suspended
    #[inline]
    pub fn is_suspended(&self) -> bool {
        matches!(
            self.task_state,
            OsTaskState::Suspended | OsTaskState::DelayedSuspended |
            OsTaskState::PendSuspended | OsTaskState::PendTimeoutSuspended
        )
    }

    /// Check if task is delayed
    #[inline]
    pub fn is_delayed(&self) -> bool {
        matches!(
            self.task_state,
            OsTaskState::Delayed | OsTaskState::DelayedSuspended
        )
    }
}

impl Default for OsTcb {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Send for OsTcb {}
unsafe impl Sync for OsTcb {}
