use std::collections::{BTreeMap, HashMap};

use crate::error::{LayoutError, Result};
use crate::parser::{self, Attribute, AttributeRef, LinearRelation};
use crate::solver::{
    Constraint, Expression, RelationalOperator, Solver, SolverError, Term, Variable, strength,
};

use super::node::{AttributeRegistry, Axis, CONTAINER_NAME, Node};

/// Runtime binding installed on a variable by the sizing protocol.
#[derive(Debug, Clone)]
enum Binding {
    Exact,
    AtMost { constraint: Constraint, value: f64 },
}

/// Resolved geometry of one node after the last [`ConstraintModel::solve`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeGeometry {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
    pub center_x: f64,
    pub center_y: f64,
    pub intrinsic_width: Option<f64>,
    pub intrinsic_height: Option<f64>,
}

/// Owns the node set and the solver session for one container.
#[derive(Debug)]
pub struct ConstraintModel {
    density: f64,
    solver: Solver,
    container: Node,
    nodes: BTreeMap<String, Node>,
    bindings: HashMap<Variable, Binding>,
    values: HashMap<Variable, f64>,
    relations: Vec<LinearRelation>,
    source: blake3::Hasher,
    solves: u64,
}

impl ConstraintModel {
    /// Empty model holding only the container node, pinned to the origin.
    pub fn new(density: f64) -> Result<Self> {
        if !density.is_finite() || density <= 0.0 {
            return Err(LayoutError::Configuration(format!(
                "density must be a positive number, got {density}"
            )));
        }
        let mut model = Self {
            density,
            solver: Solver::new(),
            container: Node::new(CONTAINER_NAME),
            nodes: BTreeMap::new(),
            bindings: HashMap::new(),
            values: HashMap::new(),
            relations: Vec::new(),
            source: blake3::Hasher::new(),
            solves: 0,
        };
        let container = model.container.clone();
        model.install_node_invariants(&container)?;
        for attribute in [Attribute::Left, Attribute::Top] {
            let variable = model.require_variable(&container, attribute)?;
            model.add_internal(Constraint::relation(
                variable,
                RelationalOperator::Equal,
                0.0,
                strength::REQUIRED,
            ))?;
        }
        model.solve();
        Ok(model)
    }

    /// Build a fully populated model from a constraint source.
    pub fn build<S: AsRef<str>>(constraints: Option<&[S]>, density: f64) -> Result<Self> {
        let mut model = Self::new(density)?;
        model.add_constraints(constraints)?;
        Ok(model)
    }

    pub fn density(&self) -> f64 {
        self.density
    }

    /// Parse every statement, create the nodes they reference, then add the
    /// relations in declaration order. Nothing reaches the solver unless the
    /// whole batch parses.
    pub fn add_constraints<S: AsRef<str>>(&mut self, constraints: Option<&[S]>) -> Result<()> {
        let constraints = constraints.ok_or_else(|| {
            LayoutError::Configuration("no constraint source was supplied".to_string())
        })?;

        let relations = constraints
            .iter()
            .map(|text| parser::parse_relation(text.as_ref(), self.density))
            .collect::<Result<Vec<_>>>()?;

        let registry = AttributeRegistry::from_relations(&relations);
        self.materialize(&registry)?;

        for relation in relations {
            let constraint = self.relation_constraint(&relation)?;
            self.solver
                .add_constraint(&constraint)
                .map_err(|err| conflict(&relation.source, err))?;
            self.source.update(relation.source.as_bytes());
            self.source.update(b"\n");
            self.relations.push(relation);
        }

        self.solve();
        Ok(())
    }

    /// Refresh the resolved values of every node variable.
    pub fn solve(&mut self) {
        let variables: Vec<Variable> = self
            .nodes
            .values()
            .chain(std::iter::once(&self.container))
            .flat_map(|node| node.variables())
            .collect();
        for variable in variables {
            self.values.insert(variable, self.solver.value(variable));
        }
        self.solves = self.solves.saturating_add(1);
    }

    pub fn solve_count(&self) -> u64 {
        self.solves
    }

    pub fn node_by_name(&self, name: &str) -> Result<&Node> {
        if name == CONTAINER_NAME {
            return Ok(&self.container);
        }
        self.nodes
            .get(name)
            .ok_or_else(|| LayoutError::NotFound(name.to_string()))
    }

    pub fn container(&self) -> &Node {
        &self.container
    }

    /// Region nodes, excluding the container.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn relations(&self) -> &[LinearRelation] {
        &self.relations
    }

    /// blake3 digest of the accepted constraint statements.
    pub fn fingerprint(&self) -> blake3::Hash {
        self.source.finalize()
    }

    /// Value of `attribute` as of the last solve.
    pub fn value(&self, name: &str, attribute: Attribute) -> Result<f64> {
        let node = self.node_by_name(name)?;
        let variable = self.require_variable(node, attribute)?;
        Ok(self.value_of(variable))
    }

    pub fn geometry(&self, name: &str) -> Result<NodeGeometry> {
        let node = self.node_by_name(name)?;
        let read = |attribute: Attribute| node.variable(attribute).map(|v| self.value_of(v));
        let left = read(Attribute::Left).unwrap_or(0.0);
        let top = read(Attribute::Top).unwrap_or(0.0);
        let width = read(Attribute::Width).unwrap_or(0.0);
        let height = read(Attribute::Height).unwrap_or(0.0);
        Ok(NodeGeometry {
            left,
            top,
            width,
            height,
            center_x: read(Attribute::CenterX).unwrap_or(left + width / 2.0),
            center_y: read(Attribute::CenterY).unwrap_or(top + height / 2.0),
            intrinsic_width: read(Attribute::IntrinsicWidth),
            intrinsic_height: read(Attribute::IntrinsicHeight),
        })
    }

    /// Pin `attribute` to `value` through a strong edit variable.
    pub fn set_variable_to_value(&mut self, name: &str, attribute: Attribute, value: f64) -> Result<()> {
        let variable = self.bindable_variable(name, attribute)?;
        if let Some(Binding::AtMost { constraint, .. }) = self.bindings.get(&variable) {
            let constraint = constraint.clone();
            self.solver.remove_constraint(&constraint)?;
            self.bindings.remove(&variable);
        }
        if !self.solver.has_edit_variable(variable) {
            self.solver.add_edit_variable(variable, strength::STRONG)?;
        }
        self.bindings.insert(variable, Binding::Exact);
        self.solver.suggest_value(variable, value)?;
        Ok(())
    }

    /// Bound `attribute` from above with a strong `<=` relation.
    pub fn set_variable_to_at_most(&mut self, name: &str, attribute: Attribute, value: f64) -> Result<()> {
        let variable = self.bindable_variable(name, attribute)?;
        match self.bindings.get(&variable) {
            Some(Binding::AtMost { value: current, .. }) if *current == value => return Ok(()),
            Some(Binding::AtMost { constraint, .. }) => {
                let constraint = constraint.clone();
                self.solver.remove_constraint(&constraint)?;
            }
            Some(Binding::Exact) => self.solver.remove_edit_variable(variable)?,
            None => {}
        }
        let constraint = Constraint::relation(
            variable,
            RelationalOperator::LessOrEqual,
            value,
            strength::STRONG,
        );
        self.solver.add_constraint(&constraint)?;
        self.bindings
            .insert(variable, Binding::AtMost { constraint, value });
        Ok(())
    }

    /// Drop any binding on `attribute`, leaving it to the declared constraints.
    pub fn release_variable(&mut self, name: &str, attribute: Attribute) -> Result<()> {
        let variable = self.bindable_variable(name, attribute)?;
        match self.bindings.remove(&variable) {
            Some(Binding::Exact) => self.solver.remove_edit_variable(variable)?,
            Some(Binding::AtMost { constraint, .. }) => self.solver.remove_constraint(&constraint)?,
            None => {}
        }
        Ok(())
    }

    /// Feed a measured size into the intrinsic variable for `axis`.
    /// Returns `false` when the last solved value already matches.
    pub fn set_intrinsic(&mut self, name: &str, axis: Axis, measured: i32) -> Result<bool> {
        let node = self.node_by_name(name)?;
        let attribute = axis.intrinsic();
        let variable = node
            .variable(attribute)
            .ok_or_else(|| LayoutError::NotFound(format!("{name}.{attribute}")))?;
        if self.value_of(variable).round() as i32 == measured {
            return Ok(false);
        }
        self.solver.suggest_value(variable, f64::from(measured))?;
        Ok(true)
    }

    fn value_of(&self, variable: Variable) -> f64 {
        self.values.get(&variable).copied().unwrap_or(0.0)
    }

    fn require_variable(&self, node: &Node, attribute: Attribute) -> Result<Variable> {
        node.variable(attribute)
            .ok_or_else(|| LayoutError::NotFound(format!("{}.{attribute}", node.name())))
    }

    fn bindable_variable(&self, name: &str, attribute: Attribute) -> Result<Variable> {
        let node = self.node_by_name(name)?;
        self.require_variable(node, attribute)
    }

    fn resolve(&self, reference: &AttributeRef) -> Result<Variable> {
        let node = self.node_by_name(&reference.region)?;
        self.require_variable(node, reference.attribute)
    }

    fn relation_constraint(&self, relation: &LinearRelation) -> Result<Constraint> {
        let mut terms = vec![Term::new(self.resolve(&relation.target)?, 1.0)];
        for (reference, coefficient) in &relation.rhs.terms {
            terms.push(Term::new(self.resolve(reference)?, -coefficient));
        }
        Ok(Constraint::new(
            Expression::new(terms, -relation.rhs.constant),
            relation.comparator.operator(),
            relation.strength.value(),
        ))
    }

    fn add_internal(&mut self, constraint: Constraint) -> Result<()> {
        self.solver.add_constraint(&constraint)?;
        Ok(())
    }

    fn install_node_invariants(&mut self, node: &Node) -> Result<()> {
        for attribute in [Attribute::Width, Attribute::Height] {
            let variable = self.require_variable(node, attribute)?;
            self.add_internal(Constraint::relation(
                variable,
                RelationalOperator::GreaterOrEqual,
                0.0,
                strength::REQUIRED,
            ))?;
        }
        Ok(())
    }

    /// Create nodes, derived center relations and intrinsic edit variables
    /// for everything the registry lists.
    fn materialize(&mut self, registry: &AttributeRegistry) -> Result<()> {
        for (region, attributes) in registry.regions() {
            if region != CONTAINER_NAME && !self.nodes.contains_key(region) {
                let node = Node::new(region);
                self.install_node_invariants(&node)?;
                self.nodes.insert(region.to_string(), node);
            }

            for attribute in attributes.iter().filter(|a| !a.is_primary()) {
                let node = if region == CONTAINER_NAME {
                    &mut self.container
                } else {
                    self.nodes
                        .get_mut(region)
                        .ok_or_else(|| LayoutError::NotFound(region.to_string()))?
                };
                let (variable, created) = node.ensure(*attribute);
                if !created {
                    continue;
                }
                let node = node.clone();
                match attribute {
                    Attribute::CenterX | Attribute::CenterY => {
                        self.install_center(&node, *attribute, variable)?
                    }
                    Attribute::IntrinsicWidth | Attribute::IntrinsicHeight => {
                        self.solver.add_edit_variable(variable, strength::STRONG)?;
                        self.solver.suggest_value(variable, 0.0)?;
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn install_center(&mut self, node: &Node, attribute: Attribute, center: Variable) -> Result<()> {
        let (origin, extent) = if attribute == Attribute::CenterX {
            (Attribute::Left, Attribute::Width)
        } else {
            (Attribute::Top, Attribute::Height)
        };
        let origin = self.require_variable(node, origin)?;
        let extent = self.require_variable(node, extent)?;
        self.add_internal(Constraint::new(
            Expression::new(
                vec![
                    Term::new(center, 1.0),
                    Term::new(origin, -1.0),
                    Term::new(extent, -0.5),
                ],
                0.0,
            ),
            RelationalOperator::Equal,
            strength::REQUIRED,
        ))
    }
}

fn conflict(text: &str, err: SolverError) -> LayoutError {
    match err {
        SolverError::UnsatisfiableConstraint | SolverError::DuplicateConstraint => {
            LayoutError::ConstraintConflict {
                text: text.to_string(),
                reason: err.to_string(),
            }
        }
        other => LayoutError::Solver(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEMO: [&str; 12] = [
        "blue.left >= 100dp",
        "blue.top >= 10dp",
        "blue.width == 120dp",
        "blue.height == (blue.width + 200dp) / 2px",
        "green.x >= blue.x + blue.width + 10dp",
        "green.y >= 10dp",
        "green.width == blue.width",
        "green.height == blue.height",
        "red.width == blue.width * 2px",
        "red.height == blue.height * 2px",
        "red.x >= 10dp",
        "red.y >= green.y + green.height + 10dp",
    ];

    #[test]
    fn dp_and_px_literals_resolve_with_density() {
        let model = ConstraintModel::build(
            Some(&["blue.width == 120dp", "blue.height == (blue.width + 200dp) / 2px"][..]),
            2.0,
        )
        .unwrap();
        assert_eq!(model.value("blue", Attribute::Width).unwrap(), 240.0);
        assert_eq!(model.value("blue", Attribute::Height).unwrap(), 320.0);
    }

    #[test]
    fn px_coefficient_doubles_width() {
        let model = ConstraintModel::build(
            Some(&["blue.width == 100", "red.width == blue.width * 2px"][..]),
            3.0,
        )
        .unwrap();
        assert_eq!(model.value("red", Attribute::Width).unwrap(), 200.0);
    }

    #[test]
    fn demo_constraints_solve_to_consistent_geometry() {
        let model = ConstraintModel::build(Some(&DEMO[..]), 1.0).unwrap();
        let blue = model.geometry("blue").unwrap();
        let green = model.geometry("green").unwrap();
        let red = model.geometry("red").unwrap();

        assert!(blue.left >= 100.0);
        assert_eq!(blue.width, 120.0);
        assert_eq!(blue.height, 160.0);
        assert!(green.left >= blue.left + blue.width + 10.0 - 1e-9);
        assert_eq!(red.width, 240.0);
        assert_eq!(red.height, 320.0);
        assert!(red.top >= green.top + green.height + 10.0 - 1e-9);
    }

    #[test]
    fn solve_is_idempotent() {
        let mut model = ConstraintModel::build(Some(&DEMO[..]), 1.5).unwrap();
        let snapshot = |model: &ConstraintModel| -> Vec<u64> {
            ["blue", "green", "red"]
                .iter()
                .flat_map(|name| {
                    let g = model.geometry(name).unwrap();
                    [g.left, g.top, g.width, g.height]
                })
                .map(f64::to_bits)
                .collect()
        };
        let first = snapshot(&model);
        model.solve();
        model.solve();
        assert_eq!(first, snapshot(&model));
    }

    #[test]
    fn sizes_never_go_negative() {
        let model = ConstraintModel::build(
            Some(&["a.width <= 50", "a.height == b.height - 40 !weak", "b.height <= 10"][..]),
            1.0,
        )
        .unwrap();
        for node in model.nodes() {
            let geometry = model.geometry(node.name()).unwrap();
            assert!(geometry.width >= 0.0, "{} width", node.name());
            assert!(geometry.height >= 0.0, "{} height", node.name());
        }
    }

    #[test]
    fn negative_required_size_is_a_conflict() {
        let err = ConstraintModel::build(Some(&["a.width == -10"][..]), 1.0).unwrap_err();
        assert!(matches!(err, LayoutError::ConstraintConflict { .. }));
    }

    #[test]
    fn contradictory_constraints_conflict() {
        let err = ConstraintModel::build(
            Some(&["a.width == 10", "a.width >= 20"][..]),
            1.0,
        )
        .unwrap_err();
        match err {
            LayoutError::ConstraintConflict { text, .. } => assert_eq!(text, "a.width >= 20"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn missing_source_is_a_configuration_error() {
        let err = ConstraintModel::build::<&str>(None, 1.0).unwrap_err();
        assert!(matches!(err, LayoutError::Configuration(_)));
    }

    #[test]
    fn syntax_error_leaves_solver_untouched() {
        let mut model = ConstraintModel::new(1.0).unwrap();
        let err = model
            .add_constraints(Some(&["a.width == 10", "a.width ==== 3"][..]))
            .unwrap_err();
        assert!(matches!(err, LayoutError::Syntax { .. }));
        assert!(matches!(model.node_by_name("a"), Err(LayoutError::NotFound(_))));
        assert!(model.relations().is_empty());
    }

    #[test]
    fn unreferenced_region_is_not_found() {
        let model = ConstraintModel::build(Some(&DEMO[..]), 1.0).unwrap();
        assert!(matches!(
            model.node_by_name("purple"),
            Err(LayoutError::NotFound(name)) if name == "purple"
        ));
        assert!(model.node_by_name(CONTAINER_NAME).unwrap().is_container());
    }

    #[test]
    fn centers_are_derived_lazily() {
        let model = ConstraintModel::build(
            Some(&[
                "box.width == 40",
                "box.centerX == parent.centerX",
                "parent.width == 200",
            ][..]),
            1.0,
        )
        .unwrap();
        let node = model.node_by_name("box").unwrap();
        assert!(node.has_variable(Attribute::CenterX));
        assert!(!node.has_variable(Attribute::CenterY));
        let geometry = model.geometry("box").unwrap();
        assert_eq!(geometry.center_x, 100.0);
        assert_eq!(geometry.left, 80.0);
    }

    #[test]
    fn container_bindings_switch_between_exact_and_at_most() {
        let mut model = ConstraintModel::build(
            Some(&["a.width == parent.width / 2", "a.left == 0"][..]),
            1.0,
        )
        .unwrap();

        model
            .set_variable_to_value(CONTAINER_NAME, Attribute::Width, 500.0)
            .unwrap();
        model.solve();
        assert_eq!(model.value("a", Attribute::Width).unwrap(), 250.0);

        model
            .set_variable_to_at_most(CONTAINER_NAME, Attribute::Width, 300.0)
            .unwrap();
        model
            .set_variable_to_at_most(CONTAINER_NAME, Attribute::Width, 300.0)
            .unwrap();
        model.solve();
        assert!(model.value(CONTAINER_NAME, Attribute::Width).unwrap() <= 300.0);

        model
            .set_variable_to_value(CONTAINER_NAME, Attribute::Width, 120.0)
            .unwrap();
        model.solve();
        assert_eq!(model.value("a", Attribute::Width).unwrap(), 60.0);

        model
            .release_variable(CONTAINER_NAME, Attribute::Width)
            .unwrap();
        model.solve();
        assert!(model.value(CONTAINER_NAME, Attribute::Width).unwrap() >= 0.0);
    }

    #[test]
    fn values_refresh_only_on_solve() {
        let mut model = ConstraintModel::build(Some(&["a.width == parent.width"][..]), 1.0).unwrap();
        model
            .set_variable_to_value(CONTAINER_NAME, Attribute::Width, 80.0)
            .unwrap();
        assert_eq!(model.value("a", Attribute::Width).unwrap(), 0.0);
        model.solve();
        assert_eq!(model.value("a", Attribute::Width).unwrap(), 80.0);
    }

    #[test]
    fn intrinsic_updates_only_on_change() {
        let mut model = ConstraintModel::build(
            Some(&["label.width == label.intrinsicWidth", "other.width == label.width + 10"][..]),
            1.0,
        )
        .unwrap();
        let node = model.node_by_name("label").unwrap();
        assert!(node.has_intrinsic_width());
        assert!(!node.has_intrinsic_height());

        assert!(model.set_intrinsic("label", Axis::Horizontal, 150).unwrap());
        model.solve();
        assert!(!model.set_intrinsic("label", Axis::Horizontal, 150).unwrap());
        assert_eq!(model.value("label", Attribute::Width).unwrap(), 150.0);
        assert_eq!(model.value("other", Attribute::Width).unwrap(), 160.0);

        assert!(matches!(
            model.set_intrinsic("label", Axis::Vertical, 10),
            Err(LayoutError::NotFound(_))
        ));
    }

    #[test]
    fn fingerprint_tracks_source() {
        let a = ConstraintModel::build(Some(&DEMO[..]), 1.0).unwrap();
        let b = ConstraintModel::build(Some(&DEMO[..]), 2.0).unwrap();
        let c = ConstraintModel::build(Some(&DEMO[..6]), 1.0).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn invalid_density_is_rejected() {
        assert!(matches!(
            ConstraintModel::new(0.0),
            Err(LayoutError::Configuration(_))
        ));
    }
}
