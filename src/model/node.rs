use std::collections::{BTreeMap, BTreeSet};

use crate::parser::{Attribute, LinearRelation};
use crate::solver::Variable;

/// Reserved region name of the container node.
pub const CONTAINER_NAME: &str = "parent";

/// Layout axis, used to pair a size attribute with its intrinsic counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Horizontal,
    Vertical,
}

impl Axis {
    pub fn size(&self) -> Attribute {
        match self {
            Axis::Horizontal => Attribute::Width,
            Axis::Vertical => Attribute::Height,
        }
    }

    pub fn intrinsic(&self) -> Attribute {
        match self {
            Axis::Horizontal => Attribute::IntrinsicWidth,
            Axis::Vertical => Attribute::IntrinsicHeight,
        }
    }
}

/// Solver variables for one region.
///
/// `left`, `top`, `width` and `height` always exist. Center and intrinsic
/// variables exist only when some constraint referenced them.
#[derive(Debug, Clone)]
pub struct Node {
    name: String,
    variables: BTreeMap<Attribute, Variable>,
}

impl Node {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        let variables = Attribute::PRIMARY
            .iter()
            .map(|attribute| (*attribute, Variable::new()))
            .collect();
        Self {
            name: name.into(),
            variables,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_container(&self) -> bool {
        self.name == CONTAINER_NAME
    }

    pub fn variable(&self, attribute: Attribute) -> Option<Variable> {
        self.variables.get(&attribute).copied()
    }

    pub fn has_variable(&self, attribute: Attribute) -> bool {
        self.variables.contains_key(&attribute)
    }

    pub fn has_intrinsic(&self, axis: Axis) -> bool {
        self.has_variable(axis.intrinsic())
    }

    pub fn has_intrinsic_width(&self) -> bool {
        self.has_intrinsic(Axis::Horizontal)
    }

    pub fn has_intrinsic_height(&self) -> bool {
        self.has_intrinsic(Axis::Vertical)
    }

    pub fn attributes(&self) -> impl Iterator<Item = Attribute> + '_ {
        self.variables.keys().copied()
    }

    pub(crate) fn variables(&self) -> impl Iterator<Item = Variable> + '_ {
        self.variables.values().copied()
    }

    /// Create the variable for `attribute` if missing; returns it and whether it is new.
    pub(crate) fn ensure(&mut self, attribute: Attribute) -> (Variable, bool) {
        if let Some(variable) = self.variables.get(&attribute) {
            return (*variable, false);
        }
        let variable = Variable::new();
        self.variables.insert(attribute, variable);
        (variable, true)
    }
}

/// Which (region, attribute) pairs a batch of relations needs, collected
/// before any solver call so node creation is deterministic.
#[derive(Debug, Clone, Default)]
pub struct AttributeRegistry {
    entries: BTreeMap<String, BTreeSet<Attribute>>,
}

impl AttributeRegistry {
    pub fn from_relations<'a>(relations: impl IntoIterator<Item = &'a LinearRelation>) -> Self {
        let mut registry = Self::default();
        for relation in relations {
            for reference in relation.attributes() {
                registry.insert(&reference.region, reference.attribute);
            }
        }
        registry
    }

    pub fn insert(&mut self, region: &str, attribute: Attribute) {
        self.entries
            .entry(region.to_string())
            .or_default()
            .insert(attribute);
    }

    pub fn contains(&self, region: &str, attribute: Attribute) -> bool {
        self.entries
            .get(region)
            .map(|attributes| attributes.contains(&attribute))
            .unwrap_or(false)
    }

    pub fn regions(&self) -> impl Iterator<Item = (&str, &BTreeSet<Attribute>)> {
        self.entries
            .iter()
            .map(|(region, attributes)| (region.as_str(), attributes))
    }
}
