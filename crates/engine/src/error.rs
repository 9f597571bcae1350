//! The closed error taxonomy (§7). Every fallible public function in this
//! crate returns `Result<_, EngineError>`; solver outcomes such as
//! `INFEASIBLE` are ordinary values (see [`crate::solver::SolverStatus`]),
//! never an `Err`.

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("validation failed for field '{field}': {reason}")]
    Validation { field: String, reason: String },

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// Reserved for the natural-language-parsing external collaborator this
    /// crate never calls directly; kept so a caller wiring that collaborator
    /// in front of the engine can reuse this error currency.
    #[error("external service unavailable: {0}")]
    ExternalUnavailable(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
