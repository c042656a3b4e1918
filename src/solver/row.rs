use std::collections::BTreeMap;

const EPSILON: f64 = 1.0e-8;

pub(crate) fn near_zero(value: f64) -> bool {
    value.abs() < EPSILON
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) enum SymbolKind {
    Invalid,
    External,
    Slack,
    Error,
    Dummy,
}

/// Tableau symbol. Ordering is by id so row iteration is deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Symbol {
    id: usize,
    kind: SymbolKind,
}

impl Symbol {
    pub(crate) fn new(id: usize, kind: SymbolKind) -> Self {
        Self { id, kind }
    }

    pub(crate) fn invalid() -> Self {
        Self::new(0, SymbolKind::Invalid)
    }

    pub(crate) fn kind(&self) -> SymbolKind {
        self.kind
    }

    pub(crate) fn is_invalid(&self) -> bool {
        self.kind == SymbolKind::Invalid
    }

    pub(crate) fn is_external(&self) -> bool {
        self.kind == SymbolKind::External
    }

    pub(crate) fn is_dummy(&self) -> bool {
        self.kind == SymbolKind::Dummy
    }

    /// Slack and error symbols may be chosen as a row subject.
    pub(crate) fn is_pivotable(&self) -> bool {
        matches!(self.kind, SymbolKind::Slack | SymbolKind::Error)
    }
}

impl PartialOrd for Symbol {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Symbol {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id).then(self.kind.cmp(&other.kind))
    }
}

/// One tableau row: `constant + sum(coefficient * symbol)`.
#[derive(Debug, Clone, Default)]
pub(crate) struct Row {
    pub(crate) cells: BTreeMap<Symbol, f64>,
    pub(crate) constant: f64,
}

impl Row {
    pub(crate) fn new(constant: f64) -> Self {
        Self {
            cells: BTreeMap::new(),
            constant,
        }
    }

    /// Add `value` to the constant, returning the new constant.
    pub(crate) fn add(&mut self, value: f64) -> f64 {
        self.constant += value;
        self.constant
    }

    pub(crate) fn insert_symbol(&mut self, symbol: Symbol, coefficient: f64) {
        let entry = self.cells.entry(symbol).or_insert(0.0);
        *entry += coefficient;
        if near_zero(*entry) {
            self.cells.remove(&symbol);
        }
    }

    pub(crate) fn insert_row(&mut self, other: &Row, coefficient: f64) {
        self.constant += other.constant * coefficient;
        for (symbol, value) in &other.cells {
            self.insert_symbol(*symbol, value * coefficient);
        }
    }

    pub(crate) fn remove(&mut self, symbol: Symbol) {
        self.cells.remove(&symbol);
    }

    pub(crate) fn reverse_sign(&mut self) {
        self.constant = -self.constant;
        for value in self.cells.values_mut() {
            *value = -*value;
        }
    }

    /// Rewrite `0 = row` as `symbol = row'`.
    pub(crate) fn solve_for(&mut self, symbol: Symbol) {
        let Some(current) = self.cells.remove(&symbol) else {
            return;
        };
        let coefficient = -1.0 / current;
        self.constant *= coefficient;
        for value in self.cells.values_mut() {
            *value *= coefficient;
        }
    }

    /// Rewrite `lhs = row` (with `rhs` in the row) as `rhs = row'`.
    pub(crate) fn solve_for_pair(&mut self, lhs: Symbol, rhs: Symbol) {
        self.insert_symbol(lhs, -1.0);
        self.solve_for(rhs);
    }

    pub(crate) fn coefficient_for(&self, symbol: Symbol) -> f64 {
        self.cells.get(&symbol).copied().unwrap_or(0.0)
    }

    pub(crate) fn substitute(&mut self, symbol: Symbol, row: &Row) {
        if let Some(coefficient) = self.cells.remove(&symbol) {
            self.insert_row(row, coefficient);
        }
    }
}
