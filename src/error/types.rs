use thiserror::Error;

use crate::solver::SolverError;

/// Unified result type for the constraint layout crate.
pub type Result<T> = std::result::Result<T, LayoutError>;

/// Errors surfaced by parsing, model construction, and sizing passes.
#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("syntax error in constraint `{text}` at offset {offset}: {message}")]
    Syntax {
        text: String,
        offset: usize,
        message: String,
    },
    #[error("unsupported expression in constraint `{text}`: {reason}")]
    UnsupportedExpression { text: String, reason: String },
    #[error("constraint `{text}` conflicts with the constraint system: {reason}")]
    ConstraintConflict { text: String, reason: String },
    #[error("region `{0}` not found")]
    NotFound(String),
    #[error("no region is registered for handle {0}")]
    UnknownHandle(i32),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("constraint setup has not completed")]
    SetupIncomplete,
    #[error("solver error: {0}")]
    Solver(#[from] SolverError),
    #[error("layout state poisoned")]
    Poisoned,
    #[error("setup worker panicked")]
    SetupPanicked,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl LayoutError {
    /// True for the failures that abort a setup attempt because of the
    /// constraint text itself rather than the environment.
    pub fn is_constraint_error(&self) -> bool {
        matches!(
            self,
            LayoutError::Syntax { .. }
                | LayoutError::UnsupportedExpression { .. }
                | LayoutError::ConstraintConflict { .. }
        )
    }
}
