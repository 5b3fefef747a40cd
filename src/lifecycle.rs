//! Per-operation lifecycle tracking.
//!
//! ```text
//! Unplanned -> Creating -> (Polling) -> Ready -> Updating -> Ready
//!                                         |
//!                                      Deleting -> Deleted
//!
//! Creating | Polling | Updating | Deleting -> Failed
//! ```
//!
//! `Deleted` and `Failed` are terminal.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ProviderError;

/// Where a resource is in its managed lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Declared but never created.
    Unplanned,
    /// Create request in flight.
    Creating,
    /// Created, waiting for the remote status to converge.
    Polling,
    /// Exists remotely and matches the last applied state.
    Ready,
    /// In-place update in flight.
    Updating,
    /// Delete request in flight.
    Deleting,
    /// Removed remotely.
    Deleted,
    /// An operation failed.
    Failed,
}

impl LifecycleState {
    /// Whether `next` is a legal successor of this state.
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Unplanned, Creating)
                | (Creating, Polling | Ready | Failed)
                | (Polling, Ready | Failed)
                | (Ready, Updating | Deleting)
                | (Updating, Ready | Failed)
                | (Deleting, Deleted | Failed)
        )
    }

    /// No transition leaves this state.
    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleState::Deleted | LifecycleState::Failed)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Unplanned => "unplanned",
            LifecycleState::Creating => "creating",
            LifecycleState::Polling => "polling",
            LifecycleState::Ready => "ready",
            LifecycleState::Updating => "updating",
            LifecycleState::Deleting => "deleting",
            LifecycleState::Deleted => "deleted",
            LifecycleState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Tracks one resource through a single orchestrated operation.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    resource_type: String,
    state: LifecycleState,
    history: Vec<LifecycleState>,
}

impl Lifecycle {
    /// Start from [`LifecycleState::Unplanned`], for a create.
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self::starting_at(resource_type, LifecycleState::Unplanned)
    }

    /// Start from [`LifecycleState::Ready`], for a resource that already
    /// exists.
    pub fn existing(resource_type: impl Into<String>) -> Self {
        Self::starting_at(resource_type, LifecycleState::Ready)
    }

    fn starting_at(resource_type: impl Into<String>, state: LifecycleState) -> Self {
        Self {
            resource_type: resource_type.into(),
            state,
            history: vec![state],
        }
    }

    /// Current state.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Every state visited, oldest first.
    pub fn history(&self) -> &[LifecycleState] {
        &self.history
    }

    /// Move to `next`, rejecting illegal transitions.
    pub fn advance(&mut self, next: LifecycleState) -> Result<(), ProviderError> {
        if !self.state.can_transition_to(next) {
            warn!(
                resource_type = %self.resource_type,
                from = %self.state,
                to = %next,
                "illegal lifecycle transition"
            );
            return Err(ProviderError::FailedPrecondition(format!(
                "{}: cannot move from {} to {}",
                self.resource_type, self.state, next
            )));
        }
        debug!(
            resource_type = %self.resource_type,
            from = %self.state,
            to = %next,
            "lifecycle transition"
        );
        self.state = next;
        self.history.push(next);
        Ok(())
    }

    /// Record a failure of the in-flight operation.
    ///
    /// A no-op from states that cannot fail (not yet started, or already
    /// terminal).
    pub fn fail(&mut self) {
        if self.state.can_transition_to(LifecycleState::Failed) {
            self.state = LifecycleState::Failed;
            self.history.push(LifecycleState::Failed);
            warn!(resource_type = %self.resource_type, "operation failed");
        }
    }
}
