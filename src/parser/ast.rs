use std::fmt;

use crate::solver::{RelationalOperator, strength};

/// Geometry attribute of a region that a constraint can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Attribute {
    Left,
    Top,
    Width,
    Height,
    CenterX,
    CenterY,
    IntrinsicWidth,
    IntrinsicHeight,
}

impl Attribute {
    /// Primary attributes exist on every node.
    pub const PRIMARY: [Attribute; 4] = [
        Attribute::Left,
        Attribute::Top,
        Attribute::Width,
        Attribute::Height,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "left" | "x" => Some(Attribute::Left),
            "top" | "y" => Some(Attribute::Top),
            "width" => Some(Attribute::Width),
            "height" => Some(Attribute::Height),
            "centerX" => Some(Attribute::CenterX),
            "centerY" => Some(Attribute::CenterY),
            "intrinsicWidth" => Some(Attribute::IntrinsicWidth),
            "intrinsicHeight" => Some(Attribute::IntrinsicHeight),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Attribute::Left => "left",
            Attribute::Top => "top",
            Attribute::Width => "width",
            Attribute::Height => "height",
            Attribute::CenterX => "centerX",
            Attribute::CenterY => "centerY",
            Attribute::IntrinsicWidth => "intrinsicWidth",
            Attribute::IntrinsicHeight => "intrinsicHeight",
        }
    }

    pub fn is_primary(&self) -> bool {
        Self::PRIMARY.contains(self)
    }

    pub fn is_center(&self) -> bool {
        matches!(self, Attribute::CenterX | Attribute::CenterY)
    }

    pub fn is_intrinsic(&self) -> bool {
        matches!(self, Attribute::IntrinsicWidth | Attribute::IntrinsicHeight)
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `region.attribute`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttributeRef {
    pub region: String,
    pub attribute: Attribute,
}

impl AttributeRef {
    pub fn new(region: impl Into<String>, attribute: Attribute) -> Self {
        Self {
            region: region.into(),
            attribute,
        }
    }
}

impl fmt::Display for AttributeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.region, self.attribute)
    }
}

/// Unit attached to a numeric literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    /// Density-independent pixels, scaled by the active density.
    Dp,
    /// Raw pixels.
    Px,
    /// Bare number.
    None,
}

impl Unit {
    pub fn scale(&self, density: f64) -> f64 {
        match self {
            Unit::Dp => density,
            Unit::Px | Unit::None => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Equal,
    GreaterOrEqual,
    LessOrEqual,
}

impl Comparator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Comparator::Equal => "==",
            Comparator::GreaterOrEqual => ">=",
            Comparator::LessOrEqual => "<=",
        }
    }

    pub fn operator(&self) -> RelationalOperator {
        match self {
            Comparator::Equal => RelationalOperator::Equal,
            Comparator::GreaterOrEqual => RelationalOperator::GreaterOrEqual,
            Comparator::LessOrEqual => RelationalOperator::LessOrEqual,
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strength {
    #[default]
    Required,
    Strong,
    Medium,
    Weak,
}

impl Strength {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "required" => Some(Strength::Required),
            "strong" => Some(Strength::Strong),
            "medium" => Some(Strength::Medium),
            "weak" => Some(Strength::Weak),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Strength::Required => "required",
            Strength::Strong => "strong",
            Strength::Medium => "medium",
            Strength::Weak => "weak",
        }
    }

    pub fn value(&self) -> f64 {
        match self {
            Strength::Required => strength::REQUIRED,
            Strength::Strong => strength::STRONG,
            Strength::Medium => strength::MEDIUM,
            Strength::Weak => strength::WEAK,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Expression tree as written, before units and density are applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal { value: f64, unit: Unit },
    Attribute(AttributeRef),
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// True when no attribute appears anywhere in the tree.
    pub fn is_constant(&self) -> bool {
        match self {
            Expr::Literal { .. } => true,
            Expr::Attribute(_) => false,
            Expr::Neg(inner) => inner.is_constant(),
            Expr::Binary { lhs, rhs, .. } => lhs.is_constant() && rhs.is_constant(),
        }
    }

    /// Visit every attribute reference in declaration order.
    pub fn for_each_attribute<'a>(&'a self, visit: &mut impl FnMut(&'a AttributeRef)) {
        match self {
            Expr::Literal { .. } => {}
            Expr::Attribute(reference) => visit(reference),
            Expr::Neg(inner) => inner.for_each_attribute(visit),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.for_each_attribute(visit);
                rhs.for_each_attribute(visit);
            }
        }
    }
}

/// One parsed constraint statement: `target <comparator> expr [!strength]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedConstraint {
    pub text: String,
    pub target: AttributeRef,
    pub comparator: Comparator,
    pub expr: Expr,
    pub strength: Strength,
}

impl ParsedConstraint {
    /// Every attribute referenced by the statement, target first.
    pub fn attributes(&self) -> Vec<&AttributeRef> {
        let mut refs = vec![&self.target];
        self.expr.for_each_attribute(&mut |reference| refs.push(reference));
        refs
    }
}
