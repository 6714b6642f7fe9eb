//! Exit code constants for the trinity CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, invalid state)
//! - 2: Run finished with failed or blocked items
//! - 3: State failure (persistence unavailable or corrupt state)

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments, uninitialized project, or invalid input.
pub const USER_ERROR: i32 = 1;

/// The run loop completed but left items in Failed or Blocked state.
pub const RUN_INCOMPLETE: i32 = 2;

/// State failure: persistence unavailable, corrupt state on load, or a
/// violated state-machine invariant.
pub const STATE_FAILURE: i32 = 3;
