use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

use super::expression::{Constraint, Expression, RelationalOperator, Term, Variable};
use super::row::{Row, Symbol, SymbolKind, near_zero};
use super::strength;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolverError {
    #[error("constraint has already been added")]
    DuplicateConstraint,
    #[error("required constraint cannot be satisfied")]
    UnsatisfiableConstraint,
    #[error("constraint is not part of the solver")]
    UnknownConstraint,
    #[error("variable is already an edit variable")]
    DuplicateEditVariable,
    #[error("variable is not an edit variable")]
    UnknownEditVariable,
    #[error("edit variables cannot be required")]
    BadRequiredStrength,
    #[error("internal solver error: {0}")]
    Internal(&'static str),
}

#[derive(Debug, Clone, Copy)]
struct Tag {
    marker: Symbol,
    other: Symbol,
}

#[derive(Debug, Clone)]
struct EditInfo {
    tag: Tag,
    constraint: Constraint,
    constant: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Objective {
    Primary,
    Artificial,
}

/// Incremental Cassowary solver.
///
/// Every mutation leaves the tableau optimal, so reading a value is a lookup.
/// All state is owned, which keeps the solver `Send` for off-thread setup.
#[derive(Debug, Default)]
pub struct Solver {
    constraints: HashMap<u64, (Tag, Constraint)>,
    rows: BTreeMap<Symbol, Row>,
    vars: HashMap<Variable, Symbol>,
    edits: HashMap<Variable, EditInfo>,
    infeasible_rows: Vec<Symbol>,
    objective: Row,
    artificial: Option<Row>,
    id_tick: usize,
}

impl Solver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_constraint(&mut self, constraint: &Constraint) -> Result<(), SolverError> {
        if self.constraints.contains_key(&constraint.id()) {
            return Err(SolverError::DuplicateConstraint);
        }

        let (mut row, tag) = self.create_row(constraint);
        let mut subject = Self::choose_subject(&row, &tag);

        if subject.is_invalid() && Self::all_dummies(&row) {
            if !near_zero(row.constant) {
                self.discard_objective_terms(constraint, tag);
                return Err(SolverError::UnsatisfiableConstraint);
            }
            subject = tag.marker;
        }

        if subject.is_invalid() {
            if !self.add_with_artificial_variable(&row)? {
                self.discard_objective_terms(constraint, tag);
                return Err(SolverError::UnsatisfiableConstraint);
            }
        } else {
            row.solve_for(subject);
            self.substitute(subject, &row);
            self.rows.insert(subject, row);
        }

        self.constraints
            .insert(constraint.id(), (tag, constraint.clone()));
        self.optimize(Objective::Primary)
    }

    pub fn add_constraints<'a, I>(&mut self, constraints: I) -> Result<(), SolverError>
    where
        I: IntoIterator<Item = &'a Constraint>,
    {
        for constraint in constraints {
            self.add_constraint(constraint)?;
        }
        Ok(())
    }

    pub fn remove_constraint(&mut self, constraint: &Constraint) -> Result<(), SolverError> {
        let (tag, stored) = self
            .constraints
            .remove(&constraint.id())
            .ok_or(SolverError::UnknownConstraint)?;

        self.discard_objective_terms(&stored, tag);

        if self.rows.remove(&tag.marker).is_none() {
            let (leaving, mut row) = self
                .take_marker_leaving_row(tag.marker)
                .ok_or(SolverError::Internal("failed to find leaving row"))?;
            row.solve_for_pair(leaving, tag.marker);
            self.substitute(tag.marker, &row);
        }

        self.optimize(Objective::Primary)
    }

    pub fn has_constraint(&self, constraint: &Constraint) -> bool {
        self.constraints.contains_key(&constraint.id())
    }

    pub fn add_edit_variable(&mut self, variable: Variable, strength: f64) -> Result<(), SolverError> {
        if self.edits.contains_key(&variable) {
            return Err(SolverError::DuplicateEditVariable);
        }
        let strength = strength::clip(strength);
        if strength::is_required(strength) {
            return Err(SolverError::BadRequiredStrength);
        }

        let constraint = Constraint::new(
            Expression::from_term(Term::new(variable, 1.0)),
            RelationalOperator::Equal,
            strength,
        );
        self.add_constraint(&constraint)?;
        let tag = self
            .constraints
            .get(&constraint.id())
            .map(|(tag, _)| *tag)
            .ok_or(SolverError::Internal("edit constraint missing after insert"))?;
        self.edits.insert(
            variable,
            EditInfo {
                tag,
                constraint,
                constant: 0.0,
            },
        );
        Ok(())
    }

    pub fn remove_edit_variable(&mut self, variable: Variable) -> Result<(), SolverError> {
        let info = self
            .edits
            .remove(&variable)
            .ok_or(SolverError::UnknownEditVariable)?;
        self.remove_constraint(&info.constraint)
    }

    pub fn has_edit_variable(&self, variable: Variable) -> bool {
        self.edits.contains_key(&variable)
    }

    /// Move an edit variable towards `value`, re-optimising with the dual simplex.
    pub fn suggest_value(&mut self, variable: Variable, value: f64) -> Result<(), SolverError> {
        let info = self
            .edits
            .get_mut(&variable)
            .ok_or(SolverError::UnknownEditVariable)?;
        let delta = value - info.constant;
        info.constant = value;
        let tag = info.tag;

        if let Some(row) = self.rows.get_mut(&tag.marker) {
            if row.add(-delta) < 0.0 {
                self.infeasible_rows.push(tag.marker);
            }
            return self.dual_optimize();
        }

        if let Some(row) = self.rows.get_mut(&tag.other) {
            if row.add(delta) < 0.0 {
                self.infeasible_rows.push(tag.other);
            }
            return self.dual_optimize();
        }

        for (symbol, row) in self.rows.iter_mut() {
            let coefficient = row.coefficient_for(tag.marker);
            if coefficient != 0.0 && row.add(delta * coefficient) < 0.0 && !symbol.is_external() {
                self.infeasible_rows.push(*symbol);
            }
        }
        self.dual_optimize()
    }

    /// Current value of `variable`; unknown variables read as zero.
    pub fn value(&self, variable: Variable) -> f64 {
        self.vars
            .get(&variable)
            .and_then(|symbol| self.rows.get(symbol))
            .map(|row| row.constant)
            .unwrap_or(0.0)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn next_symbol(&mut self, kind: SymbolKind) -> Symbol {
        self.id_tick += 1;
        Symbol::new(self.id_tick, kind)
    }

    fn var_symbol(&mut self, variable: Variable) -> Symbol {
        if let Some(symbol) = self.vars.get(&variable) {
            return *symbol;
        }
        let symbol = self.next_symbol(SymbolKind::External);
        self.vars.insert(variable, symbol);
        symbol
    }

    fn create_row(&mut self, constraint: &Constraint) -> (Row, Tag) {
        let expression = constraint.expression();
        let mut row = Row::new(expression.constant);

        for term in &expression.terms {
            if near_zero(term.coefficient) {
                continue;
            }
            let symbol = self.var_symbol(term.variable);
            match self.rows.get(&symbol) {
                Some(basic) => row.insert_row(basic, term.coefficient),
                None => row.insert_symbol(symbol, term.coefficient),
            }
        }

        let strength = constraint.strength();
        let required = strength::is_required(strength);
        let mut tag = Tag {
            marker: Symbol::invalid(),
            other: Symbol::invalid(),
        };

        match constraint.op() {
            RelationalOperator::LessOrEqual | RelationalOperator::GreaterOrEqual => {
                let coefficient = if constraint.op() == RelationalOperator::LessOrEqual {
                    1.0
                } else {
                    -1.0
                };
                let slack = self.next_symbol(SymbolKind::Slack);
                tag.marker = slack;
                row.insert_symbol(slack, coefficient);
                if !required {
                    let error = self.next_symbol(SymbolKind::Error);
                    tag.other = error;
                    row.insert_symbol(error, -coefficient);
                    self.objective.insert_symbol(error, strength);
                }
            }
            RelationalOperator::Equal => {
                if required {
                    let dummy = self.next_symbol(SymbolKind::Dummy);
                    tag.marker = dummy;
                    row.insert_symbol(dummy, 1.0);
                } else {
                    let plus = self.next_symbol(SymbolKind::Error);
                    let minus = self.next_symbol(SymbolKind::Error);
                    tag.marker = plus;
                    tag.other = minus;
                    row.insert_symbol(plus, -1.0);
                    row.insert_symbol(minus, 1.0);
                    self.objective.insert_symbol(plus, strength);
                    self.objective.insert_symbol(minus, strength);
                }
            }
        }

        if row.constant < 0.0 {
            row.reverse_sign();
        }
        (row, tag)
    }

    fn choose_subject(row: &Row, tag: &Tag) -> Symbol {
        if let Some(symbol) = row.cells.keys().find(|symbol| symbol.is_external()) {
            return *symbol;
        }
        if tag.marker.is_pivotable() && row.coefficient_for(tag.marker) < 0.0 {
            return tag.marker;
        }
        if tag.other.is_pivotable() && row.coefficient_for(tag.other) < 0.0 {
            return tag.other;
        }
        Symbol::invalid()
    }

    fn all_dummies(row: &Row) -> bool {
        row.cells.keys().all(|symbol| symbol.is_dummy())
    }

    fn add_with_artificial_variable(&mut self, row: &Row) -> Result<bool, SolverError> {
        let art = self.next_symbol(SymbolKind::Slack);
        self.rows.insert(art, row.clone());
        self.artificial = Some(row.clone());

        self.optimize(Objective::Artificial)?;
        let success = self
            .artificial
            .take()
            .map(|artificial| near_zero(artificial.constant))
            .unwrap_or(false);

        // A failed artificial row is still basic, so dropping it restores the tableau.
        if let Some(mut basic) = self.rows.remove(&art) {
            if !success || basic.cells.is_empty() {
                return Ok(success);
            }
            let entering = Self::any_pivotable_symbol(&basic);
            if entering.is_invalid() {
                return Ok(false);
            }
            basic.solve_for_pair(art, entering);
            self.substitute(entering, &basic);
            self.rows.insert(entering, basic);
        }

        for basic in self.rows.values_mut() {
            basic.remove(art);
        }
        self.objective.remove(art);
        Ok(success)
    }

    fn any_pivotable_symbol(row: &Row) -> Symbol {
        row.cells
            .keys()
            .find(|symbol| symbol.is_pivotable())
            .copied()
            .unwrap_or_else(Symbol::invalid)
    }

    fn substitute(&mut self, symbol: Symbol, row: &Row) {
        for (basic, other) in self.rows.iter_mut() {
            other.substitute(symbol, row);
            if !basic.is_external() && other.constant < 0.0 {
                self.infeasible_rows.push(*basic);
            }
        }
        self.objective.substitute(symbol, row);
        if let Some(artificial) = self.artificial.as_mut() {
            artificial.substitute(symbol, row);
        }
    }

    fn objective_row(&self, objective: Objective) -> Option<&Row> {
        match objective {
            Objective::Primary => Some(&self.objective),
            Objective::Artificial => self.artificial.as_ref(),
        }
    }

    fn optimize(&mut self, objective: Objective) -> Result<(), SolverError> {
        loop {
            let entering = match self.objective_row(objective) {
                Some(row) => Self::entering_symbol(row),
                None => return Ok(()),
            };
            if entering.is_invalid() {
                return Ok(());
            }
            let (leaving, mut row) = self
                .take_leaving_row(entering)
                .ok_or(SolverError::Internal("the objective is unbounded"))?;
            row.solve_for_pair(leaving, entering);
            self.substitute(entering, &row);
            self.rows.insert(entering, row);
        }
    }

    fn dual_optimize(&mut self) -> Result<(), SolverError> {
        while let Some(leaving) = self.infeasible_rows.pop() {
            let needs_pivot = self
                .rows
                .get(&leaving)
                .map(|row| row.constant < 0.0 && !near_zero(row.constant))
                .unwrap_or(false);
            if !needs_pivot {
                continue;
            }
            let Some(mut row) = self.rows.remove(&leaving) else {
                continue;
            };
            let entering = self.dual_entering_symbol(&row);
            if entering.is_invalid() {
                self.rows.insert(leaving, row);
                return Err(SolverError::Internal("dual optimize failed"));
            }
            row.solve_for_pair(leaving, entering);
            self.substitute(entering, &row);
            self.rows.insert(entering, row);
        }
        Ok(())
    }

    fn entering_symbol(objective: &Row) -> Symbol {
        objective
            .cells
            .iter()
            .find(|(symbol, value)| !symbol.is_dummy() && **value < 0.0)
            .map(|(symbol, _)| *symbol)
            .unwrap_or_else(Symbol::invalid)
    }

    fn dual_entering_symbol(&self, row: &Row) -> Symbol {
        let mut entering = Symbol::invalid();
        let mut ratio = f64::MAX;
        for (symbol, value) in &row.cells {
            if *value > 0.0 && !symbol.is_dummy() {
                let candidate = self.objective.coefficient_for(*symbol) / value;
                if candidate < ratio {
                    ratio = candidate;
                    entering = *symbol;
                }
            }
        }
        entering
    }

    fn take_leaving_row(&mut self, entering: Symbol) -> Option<(Symbol, Row)> {
        let mut ratio = f64::MAX;
        let mut found = None;
        for (symbol, row) in &self.rows {
            if symbol.is_external() {
                continue;
            }
            let coefficient = row.coefficient_for(entering);
            if coefficient < 0.0 {
                let candidate = -row.constant / coefficient;
                if candidate < ratio {
                    ratio = candidate;
                    found = Some(*symbol);
                }
            }
        }
        let symbol = found?;
        self.rows.remove(&symbol).map(|row| (symbol, row))
    }

    fn take_marker_leaving_row(&mut self, marker: Symbol) -> Option<(Symbol, Row)> {
        let mut first_ratio = f64::MAX;
        let mut second_ratio = f64::MAX;
        let mut first = None;
        let mut second = None;
        let mut third = None;

        for (symbol, row) in &self.rows {
            let coefficient = row.coefficient_for(marker);
            if coefficient == 0.0 {
                continue;
            }
            if symbol.is_external() {
                third = Some(*symbol);
            } else if coefficient < 0.0 {
                let candidate = -row.constant / coefficient;
                if candidate < first_ratio {
                    first_ratio = candidate;
                    first = Some(*symbol);
                }
            } else {
                let candidate = row.constant / coefficient;
                if candidate < second_ratio {
                    second_ratio = candidate;
                    second = Some(*symbol);
                }
            }
        }

        let symbol = first.or(second).or(third)?;
        self.rows.remove(&symbol).map(|row| (symbol, row))
    }

    /// Undo the objective contributions of a constraint's error markers.
    fn discard_objective_terms(&mut self, constraint: &Constraint, tag: Tag) {
        let strength = constraint.strength();
        for marker in [tag.marker, tag.other] {
            if marker.kind() != SymbolKind::Error {
                continue;
            }
            match self.rows.get(&marker) {
                Some(row) => {
                    let row = row.clone();
                    self.objective.insert_row(&row, -strength);
                }
                None => self.objective.insert_symbol(marker, -strength),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::strength::{REQUIRED, STRONG, WEAK};

    fn eq(lhs: impl Into<Expression>, rhs: impl Into<Expression>) -> Constraint {
        Constraint::relation(lhs, RelationalOperator::Equal, rhs, REQUIRED)
    }

    fn ge(lhs: impl Into<Expression>, rhs: impl Into<Expression>) -> Constraint {
        Constraint::relation(lhs, RelationalOperator::GreaterOrEqual, rhs, REQUIRED)
    }

    fn le(lhs: impl Into<Expression>, rhs: impl Into<Expression>) -> Constraint {
        Constraint::relation(lhs, RelationalOperator::LessOrEqual, rhs, REQUIRED)
    }

    #[test]
    fn required_equalities_resolve() {
        let mut solver = Solver::new();
        let width = Variable::new();
        let height = Variable::new();

        solver.add_constraint(&eq(width, 240.0)).unwrap();
        solver
            .add_constraint(&eq(height, (Expression::from(width) + 400.0) / 2.0))
            .unwrap();

        assert_eq!(solver.value(width), 240.0);
        assert_eq!(solver.value(height), 320.0);
    }

    #[test]
    fn inequality_pushes_variable_past_bound() {
        let mut solver = Solver::new();
        let x = Variable::new();
        solver.add_constraint(&ge(x, 230.0)).unwrap();
        assert!(solver.value(x) >= 230.0);
    }

    #[test]
    fn conflicting_required_constraints_are_rejected() {
        let mut solver = Solver::new();
        let x = Variable::new();
        solver.add_constraint(&eq(x, 10.0)).unwrap();
        let err = solver.add_constraint(&eq(x, 20.0)).unwrap_err();
        assert_eq!(err, SolverError::UnsatisfiableConstraint);
        assert_eq!(solver.value(x), 10.0);
    }

    #[test]
    fn infeasible_inequalities_are_rejected() {
        let mut solver = Solver::new();
        let x = Variable::new();
        solver.add_constraint(&ge(x, 50.0)).unwrap();
        let err = solver.add_constraint(&le(x, 10.0)).unwrap_err();
        assert_eq!(err, SolverError::UnsatisfiableConstraint);
        assert_eq!(solver.value(x), 50.0);
    }

    #[test]
    fn duplicate_constraint_is_an_error() {
        let mut solver = Solver::new();
        let x = Variable::new();
        let constraint = ge(x, 0.0);
        solver.add_constraint(&constraint).unwrap();
        assert_eq!(
            solver.add_constraint(&constraint).unwrap_err(),
            SolverError::DuplicateConstraint
        );
    }

    #[test]
    fn edit_variables_follow_suggestions_within_required_bounds() {
        let mut solver = Solver::new();
        let width = Variable::new();
        let child = Variable::new();
        solver.add_constraint(&ge(width, 0.0)).unwrap();
        solver
            .add_constraint(&eq(child, Expression::from(width) / 2.0))
            .unwrap();
        solver.add_edit_variable(width, STRONG).unwrap();

        solver.suggest_value(width, 500.0).unwrap();
        assert_eq!(solver.value(width), 500.0);
        assert_eq!(solver.value(child), 250.0);

        solver.suggest_value(width, 120.0).unwrap();
        assert_eq!(solver.value(child), 60.0);

        // The required lower bound wins over the strong suggestion.
        solver.suggest_value(width, -40.0).unwrap();
        assert_eq!(solver.value(width), 0.0);
    }

    #[test]
    fn required_edit_strength_is_refused() {
        let mut solver = Solver::new();
        let x = Variable::new();
        assert_eq!(
            solver.add_edit_variable(x, REQUIRED).unwrap_err(),
            SolverError::BadRequiredStrength
        );
        assert_eq!(
            solver.suggest_value(x, 1.0).unwrap_err(),
            SolverError::UnknownEditVariable
        );
    }

    #[test]
    fn removing_a_constraint_releases_the_variable() {
        let mut solver = Solver::new();
        let x = Variable::new();
        let pin = eq(x, 42.0);
        solver
            .add_constraint(&Constraint::relation(
                x,
                RelationalOperator::Equal,
                7.0,
                WEAK,
            ))
            .unwrap();
        solver.add_constraint(&pin).unwrap();
        assert_eq!(solver.value(x), 42.0);

        solver.remove_constraint(&pin).unwrap();
        assert!(!solver.has_constraint(&pin));
        assert_eq!(solver.value(x), 7.0);
    }

    #[test]
    fn weak_preference_yields_to_strong() {
        let mut solver = Solver::new();
        let x = Variable::new();
        solver
            .add_constraint(&Constraint::relation(x, RelationalOperator::Equal, 10.0, WEAK))
            .unwrap();
        solver
            .add_constraint(&Constraint::relation(x, RelationalOperator::Equal, 90.0, STRONG))
            .unwrap();
        assert_eq!(solver.value(x), 90.0);
    }

    #[test]
    fn reading_twice_is_stable() {
        let mut solver = Solver::new();
        let a = Variable::new();
        let b = Variable::new();
        solver.add_constraint(&ge(a, 100.0)).unwrap();
        solver
            .add_constraint(&ge(b, Expression::from(a) + 130.0))
            .unwrap();
        let first = (solver.value(a).to_bits(), solver.value(b).to_bits());
        let second = (solver.value(a).to_bits(), solver.value(b).to_bits());
        assert_eq!(first, second);
        assert!(solver.value(b) >= 230.0);
    }
}
