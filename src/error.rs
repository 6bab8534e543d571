use thiserror::Error;

/// Terminal outcome of anything awaiting a workflow that is not a result.
///
/// Outcomes are replayed to every awaiter of an instance, so the error is `Clone` and carries
/// rendered context rather than the original error value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    /// No launcher was registered for the requested type. Signals a setup bug.
    #[error("no launcher registered for workflow type {workflow_type}")]
    Unregistered { workflow_type: String },

    /// The instance was abandoned (or the pool torn down) before it finished.
    #[error("workflow {id} was cancelled")]
    Cancelled { id: String },

    /// An error escaped the reactor's `on_react` step.
    #[error("reactor {reactor} failed for workflow {id} in state {state}: {message}")]
    ReactorFailed {
        reactor: String,
        id: String,
        state: String,
        message: String,
    },
}

impl WorkflowError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, WorkflowError::Cancelled { .. })
    }

    pub(crate) fn cancelled(id: impl ToString) -> Self {
        WorkflowError::Cancelled { id: id.to_string() }
    }
}
