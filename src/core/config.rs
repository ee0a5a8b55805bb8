//! Compile-time configuration for Corvus
//!
//! These constants control the behavior and resource limits of the RTOS.

/// Maximum number of priority levels. The spec's own stated default (32) fits
/// in a single bitmap word; kept at 64 here instead so the priority table's
/// multi-word CLZ-chaining path (`PrioTable::get_highest`'s loop across
/// `PRIO_TBL_SIZE > 1` words) is the one actually exercised by default rather
/// than a code path only a non-default build would ever run.
pub const CFG_PRIO_MAX: usize = 64;

/// System tick rate in Hz
pub const CFG_TICK_RATE_HZ: u32 = 1000;

/// Default time quanta for round-robin scheduling
pub const CFG_TIME_QUANTA_DEFAULT: u32 = 10;

/// Minimum task stack size, in words
pub const CFG_STK_SIZE_MIN: usize = 128;

/// Maximum message queue size
pub const CFG_MSG_POOL_SIZE: usize = 32;

/// Enable round-robin scheduling for same-priority tasks
pub const CFG_SCHED_ROUND_ROBIN_EN: bool = true;

/// Idle task priority. Priority 0 is the lowest band; the idle task lives
/// there so every created task outranks it.
pub const CFG_PRIO_IDLE: u8 = 0;

/// Maximum task name length, including the terminating byte
pub const CFG_MAX_NAME_LEN: usize = 16;

/// Allow a mutex owner to re-acquire the same mutex without deadlocking.
/// When `false`, a self re-acquire is a contract violation (`OsError::MutexNesting`)
/// instead of nesting.
pub const CFG_USE_RECURSIVE_MUTEX: bool = true;

/// Capacity in bytes of the persistent-RAM coredump sink's backing buffer
pub const CFG_COREDUMP_RAM_BUF_SIZE: usize = 4096;

/// Filename prefix used by the filesystem coredump sink
pub const CFG_COREDUMP_FILE_PREFIX: &str = "core_";

/// Lowest and highest addresses of the RAM window PSP/MSP must fall within
/// for a stack pointer to be trusted during context switch validation or
/// hard-fault register recovery.
pub const CFG_RAM_WINDOW_START: u32 = 0x2000_0000;
pub const CFG_RAM_WINDOW_END: u32 = 0x2020_0000;
