use std::ops::{Add, Div, Mul, Neg, Sub};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_VARIABLE: AtomicU64 = AtomicU64::new(1);
static NEXT_CONSTRAINT: AtomicU64 = AtomicU64::new(1);

/// Opaque handle for a value owned by a [`Solver`](super::Solver).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Variable(u64);

impl Variable {
    pub fn new() -> Self {
        Self(NEXT_VARIABLE.fetch_add(1, Ordering::Relaxed))
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl Default for Variable {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Term {
    pub variable: Variable,
    pub coefficient: f64,
}

impl Term {
    pub fn new(variable: Variable, coefficient: f64) -> Self {
        Self {
            variable,
            coefficient,
        }
    }
}

/// Linear expression `sum(coefficient * variable) + constant`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Expression {
    pub terms: Vec<Term>,
    pub constant: f64,
}

impl Expression {
    pub fn new(terms: Vec<Term>, constant: f64) -> Self {
        Self { terms, constant }
    }

    pub fn from_constant(constant: f64) -> Self {
        Self::new(Vec::new(), constant)
    }

    pub fn from_term(term: Term) -> Self {
        Self::new(vec![term], 0.0)
    }

    pub fn from_variable(variable: Variable) -> Self {
        Self::from_term(Term::new(variable, 1.0))
    }

    pub fn is_constant(&self) -> bool {
        self.terms.iter().all(|term| term.coefficient == 0.0)
    }
}

impl From<Variable> for Expression {
    fn from(variable: Variable) -> Self {
        Expression::from_variable(variable)
    }
}

impl From<f64> for Expression {
    fn from(constant: f64) -> Self {
        Expression::from_constant(constant)
    }
}

impl Add for Expression {
    type Output = Expression;

    fn add(mut self, rhs: Expression) -> Expression {
        self.terms.extend(rhs.terms);
        self.constant += rhs.constant;
        self
    }
}

impl Add<f64> for Expression {
    type Output = Expression;

    fn add(mut self, rhs: f64) -> Expression {
        self.constant += rhs;
        self
    }
}

impl Add<Variable> for Expression {
    type Output = Expression;

    fn add(mut self, rhs: Variable) -> Expression {
        self.terms.push(Term::new(rhs, 1.0));
        self
    }
}

impl Sub for Expression {
    type Output = Expression;

    fn sub(self, rhs: Expression) -> Expression {
        self + (-rhs)
    }
}

impl Sub<f64> for Expression {
    type Output = Expression;

    fn sub(mut self, rhs: f64) -> Expression {
        self.constant -= rhs;
        self
    }
}

impl Sub<Variable> for Expression {
    type Output = Expression;

    fn sub(mut self, rhs: Variable) -> Expression {
        self.terms.push(Term::new(rhs, -1.0));
        self
    }
}

impl Mul<f64> for Expression {
    type Output = Expression;

    fn mul(mut self, rhs: f64) -> Expression {
        for term in &mut self.terms {
            term.coefficient *= rhs;
        }
        self.constant *= rhs;
        self
    }
}

impl Div<f64> for Expression {
    type Output = Expression;

    fn div(self, rhs: f64) -> Expression {
        self * (1.0 / rhs)
    }
}

impl Neg for Expression {
    type Output = Expression;

    fn neg(self) -> Expression {
        self * -1.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationalOperator {
    LessOrEqual,
    Equal,
    GreaterOrEqual,
}

impl RelationalOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            RelationalOperator::LessOrEqual => "<=",
            RelationalOperator::Equal => "==",
            RelationalOperator::GreaterOrEqual => ">=",
        }
    }
}

impl std::fmt::Display for RelationalOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

/// `expression <op> 0` at a given strength.
///
/// Identity is the constraint id: clones refer to the same solver row, two
/// separately built constraints with equal expressions do not.
#[derive(Debug, Clone)]
pub struct Constraint {
    id: u64,
    expression: Expression,
    op: RelationalOperator,
    strength: f64,
}

impl Constraint {
    pub fn new(expression: Expression, op: RelationalOperator, strength: f64) -> Self {
        Self {
            id: NEXT_CONSTRAINT.fetch_add(1, Ordering::Relaxed),
            expression,
            op,
            strength: super::strength::clip(strength),
        }
    }

    /// Build `lhs <op> rhs` by moving everything to the left-hand side.
    pub fn relation(
        lhs: impl Into<Expression>,
        op: RelationalOperator,
        rhs: impl Into<Expression>,
        strength: f64,
    ) -> Self {
        Self::new(lhs.into() - rhs.into(), op, strength)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    pub fn op(&self) -> RelationalOperator {
        self.op
    }

    pub fn strength(&self) -> f64 {
        self.strength
    }
}

impl PartialEq for Constraint {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Constraint {}
