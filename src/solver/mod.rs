//! Incremental linear-arithmetic solver used by the constraint model.
//!
//! An implementation of the Cassowary algorithm: required constraints are kept
//! feasible by the primal simplex, non-required ones are weighted into the
//! objective, and edit variables are moved with the dual simplex so a resize
//! only touches the rows that depend on the edited value.

mod core;
mod expression;
mod row;
pub mod strength;

pub use self::core::{Solver, SolverError};
pub use expression::{Constraint, Expression, RelationalOperator, Term, Variable};
