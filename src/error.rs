//! Error types for the trinity CLI.
//!
//! Uses thiserror for derive macros and provides user-actionable error messages.

use crate::backlog::ItemState;
use crate::exit_codes;
use thiserror::Error;

/// Main error type for trinity operations.
///
/// Each variant maps to a specific exit code. Agent outcomes (failure,
/// timeout, crash) are never errors; they are handled by the retry policy
/// inside the run loop and only surface here as `RunIncomplete` when items
/// end up failed or blocked.
#[derive(Error, Debug)]
pub enum TrinityError {
    /// User provided invalid arguments or the system is in an invalid state.
    #[error("{0}")]
    UserError(String),

    /// Persistence is unavailable (write or sync failed).
    ///
    /// Retried with backoff at the run-session level; fatal once retries
    /// are exhausted.
    #[error("persistence failed: {0}")]
    IoFailure(String),

    /// Persisted state failed invariant checks on load.
    ///
    /// Fatal; surfaced to the operator with the violated invariant.
    /// There is no automatic repair.
    #[error("state corrupt: {0}")]
    CorruptState(String),

    /// A state transition outside the work-item state machine was requested.
    ///
    /// This is a programming invariant violation and should never occur in
    /// correct operation.
    #[error("invalid transition for {item}: {from} -> {to}")]
    InvalidTransition {
        item: String,
        from: ItemState,
        to: ItemState,
    },

    /// The run finished but left items in Failed or Blocked state.
    #[error("run incomplete: {0} item(s) ended failed or blocked")]
    RunIncomplete(usize),
}

impl TrinityError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            TrinityError::UserError(_) => exit_codes::USER_ERROR,
            TrinityError::RunIncomplete(_) => exit_codes::RUN_INCOMPLETE,
            TrinityError::IoFailure(_) => exit_codes::STATE_FAILURE,
            TrinityError::CorruptState(_) => exit_codes::STATE_FAILURE,
            TrinityError::InvalidTransition { .. } => exit_codes::STATE_FAILURE,
        }
    }
}

/// Result type alias for trinity operations.
pub type Result<T> = std::result::Result<T, TrinityError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_error_has_correct_exit_code() {
        let err = TrinityError::UserError("bad argument".to_string());
        assert_eq!(err.exit_code(), exit_codes::USER_ERROR);
    }

    #[test]
    fn run_incomplete_has_correct_exit_code() {
        let err = TrinityError::RunIncomplete(2);
        assert_eq!(err.exit_code(), exit_codes::RUN_INCOMPLETE);
    }

    #[test]
    fn state_errors_have_correct_exit_code() {
        let err = TrinityError::IoFailure("disk full".to_string());
        assert_eq!(err.exit_code(), exit_codes::STATE_FAILURE);

        let err = TrinityError::CorruptState("duplicate id".to_string());
        assert_eq!(err.exit_code(), exit_codes::STATE_FAILURE);

        let err = TrinityError::InvalidTransition {
            item: "ITEM-001".to_string(),
            from: ItemState::Succeeded,
            to: ItemState::Pending,
        };
        assert_eq!(err.exit_code(), exit_codes::STATE_FAILURE);
    }

    #[test]
    fn error_messages_are_descriptive() {
        let err = TrinityError::CorruptState("duplicate item id 'ITEM-001'".to_string());
        assert_eq!(err.to_string(), "state corrupt: duplicate item id 'ITEM-001'");

        let err = TrinityError::RunIncomplete(3);
        assert_eq!(
            err.to_string(),
            "run incomplete: 3 item(s) ended failed or blocked"
        );
    }
}
