//! Debug assertion macros for the stream handshake invariants.
//!
//! These macros check the slot invariants of the shared stream state after
//! every transition. They are only active in debug builds
//! (`#[cfg(debug_assertions)]`), so there is zero overhead in release builds.

// =============================================================================
// Lock Cleared On Read
// =============================================================================

/// Assert that registering a read released the producer lock.
///
/// **Invariant**: `read registered → producer_lock.is_none()`
///
/// Used in: `State::register_read()` after a new pending read is stored
macro_rules! debug_assert_lock_released {
    ($read_registered:expr, $lock_held:expr) => {
        debug_assert!(
            !$read_registered || !$lock_held,
            "lock invariant violated: a read was registered while the producer lock is still held"
        )
    };
}

// =============================================================================
// Single Value In Flight
// =============================================================================

/// Assert that at most one value is in flight.
///
/// **Invariant**: `parked.is_some() → pending_read.is_none() ∧ producer_lock.is_some()`
///
/// A parked value is a write whose read was abandoned; the producer must be
/// held at its gate until that value has been delivered.
///
/// Used in: `State::accept_write()`, `State::register_read()`
macro_rules! debug_assert_single_in_flight {
    ($parked:expr, $read_pending:expr, $lock_held:expr) => {
        debug_assert!(
            !$parked || (!$read_pending && $lock_held),
            "in-flight invariant violated: parked={}, read_pending={}, lock_held={}",
            $parked,
            $read_pending,
            $lock_held
        )
    };
}

// =============================================================================
// Closed Means Quiescent
// =============================================================================

/// Assert that a closed stream holds no outstanding read or lock.
///
/// **Invariant**: `closed → pending_read.is_none() ∧ producer_lock.is_none()`
///
/// Used in: `State::terminate()`, `State::close()`
macro_rules! debug_assert_quiescent {
    ($closed:expr, $read_pending:expr, $lock_held:expr) => {
        debug_assert!(
            !$closed || (!$read_pending && !$lock_held),
            "closed invariant violated: read_pending={}, lock_held={}",
            $read_pending,
            $lock_held
        )
    };
}

// =============================================================================
// Write Consumes The Read
// =============================================================================

/// Assert that an accepted write consumed the pending read.
///
/// **Invariant**: `write accepted → pending_read.is_none() ∧ producer_lock.is_some()`
///
/// Used in: `State::accept_write()`
macro_rules! debug_assert_read_consumed {
    ($read_pending:expr, $lock_held:expr) => {
        debug_assert!(
            !$read_pending && $lock_held,
            "write invariant violated: read_pending={}, lock_held={}",
            $read_pending,
            $lock_held
        )
    };
}

// =============================================================================
// Re-exports for crate-internal use
// =============================================================================

pub(crate) use debug_assert_lock_released;
pub(crate) use debug_assert_quiescent;
pub(crate) use debug_assert_read_consumed;
pub(crate) use debug_assert_single_in_flight;
