use std::collections::BTreeMap;
use std::fmt;

use super::ast::{AttributeRef, BinaryOp, Comparator, Expr, ParsedConstraint, Strength};
use crate::error::{LayoutError, Result};

const COEFFICIENT_EPSILON: f64 = 1.0e-12;

/// `sum(coefficient * attribute) + constant`, with units already applied.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LinearExpr {
    pub terms: BTreeMap<AttributeRef, f64>,
    pub constant: f64,
}

impl LinearExpr {
    pub fn constant(value: f64) -> Self {
        Self {
            terms: BTreeMap::new(),
            constant: value,
        }
    }

    pub fn attribute(reference: AttributeRef) -> Self {
        let mut terms = BTreeMap::new();
        terms.insert(reference, 1.0);
        Self {
            terms,
            constant: 0.0,
        }
    }

    pub fn is_constant(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn coefficient(&self, reference: &AttributeRef) -> f64 {
        self.terms.get(reference).copied().unwrap_or(0.0)
    }

    fn add(mut self, other: LinearExpr, sign: f64) -> Self {
        for (reference, coefficient) in other.terms {
            let entry = self.terms.entry(reference.clone()).or_insert(0.0);
            *entry += coefficient * sign;
            if entry.abs() < COEFFICIENT_EPSILON {
                self.terms.remove(&reference);
            }
        }
        self.constant += other.constant * sign;
        self
    }

    fn scale(mut self, factor: f64) -> Self {
        for coefficient in self.terms.values_mut() {
            *coefficient *= factor;
        }
        self.terms.retain(|_, coefficient| coefficient.abs() >= COEFFICIENT_EPSILON);
        self.constant *= factor;
        self
    }
}

impl fmt::Display for LinearExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::with_capacity(self.terms.len() + 1);
        for (reference, coefficient) in &self.terms {
            if *coefficient == 1.0 {
                parts.push(reference.to_string());
            } else {
                parts.push(format!("{reference} * {coefficient}"));
            }
        }
        if self.constant != 0.0 || parts.is_empty() {
            parts.push(format!("{}px", self.constant));
        }
        f.write_str(&parts.join(" + "))
    }
}

/// A constraint in solver-ready form: `target <comparator> rhs` at `strength`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearRelation {
    pub source: String,
    pub target: AttributeRef,
    pub comparator: Comparator,
    pub rhs: LinearExpr,
    pub strength: Strength,
}

impl LinearRelation {
    /// Canonical text; parsing it yields an equal relation at any density.
    pub fn canonical(&self) -> String {
        self.to_string()
    }

    /// Every attribute the relation touches, target first.
    pub fn attributes(&self) -> impl Iterator<Item = &AttributeRef> {
        std::iter::once(&self.target).chain(self.rhs.terms.keys())
    }

    /// Same comparator, strength, and normalized coefficients.
    pub fn same_relation(&self, other: &LinearRelation) -> bool {
        self.target == other.target
            && self.comparator == other.comparator
            && self.strength == other.strength
            && self.rhs == other.rhs
    }
}

impl fmt::Display for LinearRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.target, self.comparator, self.rhs)?;
        if self.strength != Strength::Required {
            write!(f, " !{}", self.strength.name())?;
        }
        Ok(())
    }
}

impl ParsedConstraint {
    /// Apply units (each literal scaled exactly once) and flatten into a linear relation.
    pub fn lower(&self, density: f64) -> Result<LinearRelation> {
        let rhs = lower_expr(self, &self.expr, density)?;
        Ok(LinearRelation {
            source: self.text.clone(),
            target: self.target.clone(),
            comparator: self.comparator,
            rhs,
            strength: self.strength,
        })
    }
}

fn lower_expr(parsed: &ParsedConstraint, expr: &Expr, density: f64) -> Result<LinearExpr> {
    match expr {
        Expr::Literal { value, unit } => Ok(LinearExpr::constant(value * unit.scale(density))),
        Expr::Attribute(reference) => Ok(LinearExpr::attribute(reference.clone())),
        Expr::Neg(inner) => Ok(lower_expr(parsed, inner, density)?.scale(-1.0)),
        Expr::Binary { op, lhs, rhs } => {
            let lhs = lower_expr(parsed, lhs, density)?;
            let rhs = lower_expr(parsed, rhs, density)?;
            match op {
                BinaryOp::Add => Ok(lhs.add(rhs, 1.0)),
                BinaryOp::Sub => Ok(lhs.add(rhs, -1.0)),
                BinaryOp::Mul if lhs.is_constant() => Ok(rhs.scale(lhs.constant)),
                BinaryOp::Mul if rhs.is_constant() => Ok(lhs.scale(rhs.constant)),
                BinaryOp::Mul => Err(unsupported(parsed, "multiplying two attribute terms")),
                BinaryOp::Div if !rhs.is_constant() => {
                    Err(unsupported(parsed, "dividing by an attribute term"))
                }
                BinaryOp::Div if rhs.constant == 0.0 => {
                    Err(unsupported(parsed, "division by zero"))
                }
                BinaryOp::Div => Ok(lhs.scale(1.0 / rhs.constant)),
            }
        }
    }
}

fn unsupported(parsed: &ParsedConstraint, reason: &str) -> LayoutError {
    LayoutError::UnsupportedExpression {
        text: parsed.text.clone(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{Attribute, parse};

    fn lower(text: &str, density: f64) -> LinearRelation {
        parse(text).unwrap().lower(density).unwrap()
    }

    fn blue(attribute: Attribute) -> AttributeRef {
        AttributeRef::new("blue", attribute)
    }

    #[test]
    fn dp_literals_scale_by_density() {
        let relation = lower("blue.width == 120dp", 2.0);
        assert!(relation.rhs.is_constant());
        assert_eq!(relation.rhs.constant, 240.0);
    }

    #[test]
    fn px_coefficients_are_not_rescaled() {
        let relation = lower("blue.height == (blue.width + 200dp) / 2px", 2.0);
        assert_eq!(relation.rhs.coefficient(&blue(Attribute::Width)), 0.5);
        assert_eq!(relation.rhs.constant, 200.0);

        let relation = lower("red.width == blue.width * 2px", 3.0);
        assert_eq!(relation.rhs.coefficient(&blue(Attribute::Width)), 2.0);
        assert_eq!(relation.rhs.constant, 0.0);
    }

    #[test]
    fn dp_coefficient_scales_once() {
        // `2dp` is a literal like any other: density applies to it once.
        let relation = lower("red.width == blue.width * 2dp + 1dp", 1.5);
        assert_eq!(relation.rhs.coefficient(&blue(Attribute::Width)), 3.0);
        assert_eq!(relation.rhs.constant, 1.5);
    }

    #[test]
    fn nested_units_are_not_compounded() {
        let relation = lower("a.left == ((b.left + 10dp) * 2px + 4dp) / 2", 2.0);
        let b_left = AttributeRef::new("b", Attribute::Left);
        assert_eq!(relation.rhs.coefficient(&b_left), 1.0);
        assert_eq!(relation.rhs.constant, 24.0);
    }

    #[test]
    fn cancelling_terms_are_dropped() {
        let relation = lower("a.left == b.left - b.left + 5", 1.0);
        assert!(relation.rhs.is_constant());
        assert_eq!(relation.rhs.constant, 5.0);
    }

    #[test]
    fn division_by_zero_is_unsupported() {
        let err = parse("a.width == b.width / (2 - 2)")
            .unwrap()
            .lower(1.0)
            .unwrap_err();
        assert!(matches!(err, LayoutError::UnsupportedExpression { .. }));
    }

    #[test]
    fn canonical_form_round_trips() {
        for text in [
            "blue.height == (blue.width + 200dp) / 2px",
            "green.x >= blue.x + blue.width + 10dp",
            "red.y <= -(green.height * 0.25) - 3dp !strong",
            "c.centerX == parent.width / 3",
            "a.width == 0",
        ] {
            let original = lower(text, 2.0);
            let reparsed = lower(&original.canonical(), 7.0);
            assert!(
                original.same_relation(&reparsed),
                "{text} -> {} -> {}",
                original.canonical(),
                reparsed.canonical()
            );
        }
    }

    #[test]
    fn canonical_text_is_readable() {
        let relation = lower("blue.height == (blue.width + 200dp) / 2px", 2.0);
        assert_eq!(relation.canonical(), "blue.height == blue.width * 0.5 + 200px");
    }
}
