#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! Request lifecycle state machine.
//!
//! Status is monotonic along
//! `Open -> InProgress -> PendingCompletion -> Completed`, with
//! `Cancelled` reachable from any non-terminal state. There is no
//! reopen: terminal states have no outgoing edges.

use crate::error::{NeighborlyError, Result};
use crate::types::RequestStatus;

/// Valid target statuses from a given current status.
#[must_use]
pub const fn allowed_transitions(from: RequestStatus) -> &'static [RequestStatus] {
    match from {
        RequestStatus::Open => &[RequestStatus::InProgress, RequestStatus::Cancelled],
        RequestStatus::InProgress => &[
            RequestStatus::PendingCompletion,
            RequestStatus::Cancelled,
        ],
        RequestStatus::PendingCompletion => {
            &[RequestStatus::Completed, RequestStatus::Cancelled]
        }
        RequestStatus::Completed | RequestStatus::Cancelled => &[],
    }
}

/// Validate a requested status change.
///
/// # Errors
/// Returns `InvalidTransition` naming both states when the edge is not
/// part of the lifecycle. A same-state request is also rejected here;
/// the coordinator treats it as a no-op before consulting this check.
pub fn validate_transition(from: RequestStatus, to: RequestStatus) -> Result<()> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(NeighborlyError::InvalidTransition { from, to })
    }
}

/// Completed and cancelled requests accept no further mutations.
#[must_use]
pub const fn is_terminal(status: RequestStatus) -> bool {
    matches!(status, RequestStatus::Completed | RequestStatus::Cancelled)
}

/// Whether a request in this status may receive new offers.
#[must_use]
pub const fn accepts_offers(status: RequestStatus) -> bool {
    !is_terminal(status)
}

/// Status a request moves to when its first offer arrives.
///
/// The first offer on an Open request auto-advances it to InProgress.
/// This signals "someone is working on this" without requiring an
/// explicit accept; see DESIGN.md for the stakeholder note.
#[must_use]
pub const fn status_after_offer(current: RequestStatus) -> RequestStatus {
    match current {
        RequestStatus::Open => RequestStatus::InProgress,
        other => other,
    }
}
