//! Time management module
//!
//! Provides tick handling, time delays, and timeout management via a pair
//! of wake-tick-ordered delay lists (see [`delay_list`]) rather than a
//! hashed tick wheel: insertion stays ordered ascending by wake tick, and a
//! tick-counter wrap is handled by flipping which list is "primary" instead
//! of recomputing every pending deadline.

pub mod delay_list;

use core::ptr::NonNull;

use crate::config::CFG_TICK_RATE_HZ;
use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::kernel;
use crate::sched;
use crate::task::OsTcb;
use crate::types::{OsPendOn, OsPendStatus, OsTaskState, OsTick};

/// Time delay in ticks
///
/// Delays the calling task for the specified number of system ticks.
/// The task is removed from the ready list and linked into the primary
/// or overflow delay list (whichever its wake tick falls into). When the
/// delay expires, the tick handler moves the task back to ready.
///
/// # Arguments
/// * `ticks` - Number of ticks to delay (0 = no delay)
///
/// # Returns
/// * `Ok(())` - Delay completed
/// * `Err(OsError::TimeDlyIsr)` - Cannot delay from ISR
/// * `Err(OsError::SchedLocked)` - Scheduler is locked
pub fn os_time_dly(ticks: OsTick) -> OsResult<()> {
    if !kernel::KERNEL.is_running() {
        return Err(OsError::OsNotRunning);
    }

    if is_isr_context() {
        return Err(OsError::TimeDlyIsr);
    }

    if kernel::KERNEL.sched_lock_nesting() > 0 {
        return Err(OsError::SchedLocked);
    }

    if ticks == 0 {
        return Ok(());
    }

    critical_section(|_cs| {
        unsafe {
            if let Some(cur_tcb) = kernel::tcb_cur_ptr() {
                let tcb = &mut *cur_tcb.as_ptr();

                let now = kernel::KERNEL.tick_get();
                let wake = now.wrapping_add(ticks);

                tcb.tick_remain = ticks;
                tcb.tick_wake = wake;
                tcb.task_state = OsTaskState::Delayed;

                kernel::delay_insert(cur_tcb, wake, now);

                sched::os_rdy_list_remove(cur_tcb);
            }
        }
    });

    sched::os_sched();

    Ok(())
}

/// Time delay in hours, minutes, seconds, milliseconds
///
/// # Arguments
/// * `hours` - Hours (0-999)
/// * `minutes` - Minutes (0-59)
/// * `seconds` - Seconds (0-59)
/// * `milliseconds` - Milliseconds (0-999)
pub fn os_time_dly_hmsm(
    hours: u16,
    minutes: u8,
    seconds: u8,
    milliseconds: u16,
) -> OsResult<()> {
    if minutes > 59 {
        return Err(OsError::StateInvalid);
    }
    if seconds > 59 {
        return Err(OsError::StateInvalid);
    }
    if milliseconds > 999 {
        return Err(OsError::StateInvalid);
    }

    let total_ms = (hours as u32) * 3600_000
        + (minutes as u32) * 60_000
        + (seconds as u32) * 1000
        + (milliseconds as u32);

    let ticks = (total_ms * CFG_TICK_RATE_HZ) / 1000;

    os_time_dly(ticks)
}

/// Resume a delayed task before its delay expires
pub fn os_time_dly_resume(tcb: NonNull<OsTcb>) -> OsResult<()> {
    if !kernel::KERNEL.is_running() {
        return Err(OsError::OsNotRunning);
    }

    if is_isr_context() {
        return Err(OsError::TimeDlyIsr);
    }

    critical_section(|_cs| {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };

        if !tcb_ref.is_delayed() {
            return Err(OsError::TaskNotDly);
        }

        unsafe { kernel::delay_remove(tcb) };
        tcb_ref.tick_remain = 0;

        match tcb_ref.task_state {
            OsTaskState::Delayed => {
                tcb_ref.task_state = OsTaskState::Ready;
                unsafe { sched::os_rdy_list_insert(tcb) };
            }
            OsTaskState::DelayedSuspended => {
                tcb_ref.task_state = OsTaskState::Suspended;
            }
            _ => {}
        }

        sched::os_sched();

        Ok(())
    })
}

/// Get current tick count
#[inline]
pub fn os_time_get() -> OsTick {
    kernel::KERNEL.tick_get()
}

/// Link a blocked task's timeout into the delay engine. Called by the
/// semaphore/mutex/queue pend paths right after they've computed a
/// nonzero `timeout` and set `task_state` to `PendTimeout`; lets the tick
/// engine reap the wait generically without any of those primitives
/// knowing about delay lists themselves.
///
/// # Safety
/// `tcb` must be the currently-running task, already unlinked from its
/// ready list and linked into the object's pend list.
pub(crate) unsafe fn delay_schedule(tcb: NonNull<OsTcb>, timeout: OsTick) {
    let now = kernel::KERNEL.tick_get();
    let wake = now.wrapping_add(timeout);
    unsafe {
        (*tcb.as_ptr()).tick_wake = wake;
        kernel::delay_insert(tcb, wake, now);
    }
}

/// Unlink `tcb` from the delay engine. A no-op if it was never linked
/// (e.g. it pended with an infinite timeout). Called whenever a waiter is
/// woken by something other than its own timeout expiring, so a stale
/// delay-list entry can't fire later against a task that has moved on.
///
/// # Safety
/// `tcb` must point to a live `OsTcb`.
pub(crate) unsafe fn delay_cancel(tcb: NonNull<OsTcb>) {
    unsafe { kernel::delay_remove(tcb) };
}

/// Tick handler
pub fn os_tick_handler() {
    if !kernel::KERNEL.is_running() {
        return;
    }

    kernel::KERNEL.int_enter();

    let _tick = kernel::KERNEL.tick_increment();

    critical_section(|_cs| {
        // Process delayed/timed-out tasks
        process_delayed_tasks();
        // Round-robin time slicing
        sched::os_sched_round_robin();
    });

    kernel::os_int_exit();
}

/// Reap every task in the primary delay list whose wake tick has arrived,
/// swapping the primary/overflow roles exactly once if the tick counter
/// just wrapped.
fn process_delayed_tasks() {
    let now = kernel::KERNEL.tick_get();

    // `tick_increment` just wrapped the counter back to 0: every task that
    // was in the overflow list is now current, and the stale primary list
    // (full of ticks from before the wrap) becomes the new overflow list.
    if now == 0 {
        unsafe { kernel::delay_swap() };
    }

    unsafe {
        loop {
            let Some(tcb_ptr) = kernel::delay_primary_head() else {
                break;
            };
            let tcb = &mut *tcb_ptr.as_ptr();

            if tcb.tick_wake > now {
                break;
            }

            kernel::delay_remove(tcb_ptr);
            tcb.tick_remain = 0;

            match tcb.task_state {
                OsTaskState::Delayed => {
                    tcb.task_state = OsTaskState::Ready;
                    sched::os_rdy_list_insert(tcb_ptr);
                }
                OsTaskState::DelayedSuspended => {
                    tcb.task_state = OsTaskState::Suspended;
                }
                OsTaskState::PendTimeout | OsTaskState::PendTimeoutSuspended => {
                    // The timeout won the race against a post/send from a
                    // peer: unlink from whichever object's wait set this
                    // task was sitting in, without needing to know which
                    // concrete primitive owns it.
                    if let Some(mut pend_list) = tcb.pend_list_ptr {
                        pend_list.as_mut().remove(tcb_ptr);
                    }
                    tcb.pend_on = OsPendOn::Nothing;
                    tcb.pend_list_ptr = None;
                    tcb.pend_status = OsPendStatus::Timeout;

                    if tcb.task_state == OsTaskState::PendTimeout {
                        tcb.task_state = OsTaskState::Ready;
                        sched::os_rdy_list_insert(tcb_ptr);
                    } else {
                        tcb.task_state = OsTaskState::Suspended;
                    }
                }
                _ => {}
            }
        }
    }
}

/// SysTick interrupt handler
#[no_mangle]
pub extern "C" fn SysTick() {
    os_tick_handler();
}
