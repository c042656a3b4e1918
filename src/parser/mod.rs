//! Constraint statement parsing.
//!
//! Text such as `green.x >= blue.x + blue.width + 10dp` is parsed into an
//! [`ParsedConstraint`] tree, then lowered into a [`LinearRelation`] once the
//! density is known.

mod ast;
mod grammar;
mod linear;

pub use ast::{
    Attribute, AttributeRef, BinaryOp, Comparator, Expr, ParsedConstraint, Strength, Unit,
};
pub use grammar::parse;
pub use linear::{LinearExpr, LinearRelation};

use crate::error::Result;

/// Parse and lower one statement in a single step.
pub fn parse_relation(text: &str, density: f64) -> Result<LinearRelation> {
    parse(text)?.lower(density)
}
