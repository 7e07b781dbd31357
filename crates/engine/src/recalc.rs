//! Derived-variable recomputation and reporting.
//!
//! A variable with a formula has its value recomputed from the rest of the
//! catalog. Chains of derived variables are evaluated in dependency order in
//! a single pass, so running it twice on an unchanged catalog changes
//! nothing the second time.
//!
//! Evaluation is strict: a reference that no longer resolves, or a formula
//! that fails, leaves the previous value in place. Variables on a cycle are
//! never evaluated.

use std::time::Instant;

use rustc_hash::FxHashSet;

use crate::catalog::{FormulaRef, ProductRef, VariableRef};
use crate::dep_graph::DepGraph;
use crate::formula::eval::{try_evaluate, ValueTable};
use crate::formula::Resolution;

/// Report from a derived-variable recompute.
#[derive(Debug, Clone, Default)]
pub struct RecalcReport {
    /// Time taken in milliseconds.
    pub duration_ms: u64,
    /// Derived variables that were evaluated, in evaluation order.
    pub recomputed: Vec<String>,
    /// Ids whose value changed.
    pub changed: Vec<String>,
    /// Ids whose evaluation failed; their previous value was kept.
    pub stale: Vec<String>,
    /// Set when derived variables reference each other in a loop.
    pub cycle: Option<CycleReport>,
}

impl RecalcReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn had_cycles(&self) -> bool {
        self.cycle.is_some()
    }

    /// Concise one-line summary for logging.
    pub fn summary(&self) -> String {
        format!(
            "{} derived in {}ms, changed={}, stale={}, cycles={}",
            self.recomputed.len(),
            self.duration_ms,
            self.changed.len(),
            self.stale.len(),
            self.cycle.as_ref().map_or(0, |c| c.ids.len()),
        )
    }
}

/// Details of a cycle among derived variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Variables participating in the cycle, sorted.
    pub ids: Vec<String>,
    /// Human-readable description of the cycle.
    pub message: String,
}

impl CycleReport {
    pub fn new(ids: Vec<String>, message: impl Into<String>) -> Self {
        Self { ids, message: message.into() }
    }

    pub fn self_reference(id: &str) -> Self {
        Self {
            ids: vec![id.to_string()],
            message: format!("Variable {} references itself", id),
        }
    }

    pub fn cycle(ids: Vec<String>) -> Self {
        let message = match (ids.first(), ids.last()) {
            (Some(first), Some(last)) if ids.len() > 5 => format!(
                "Circular reference involving {} variables: {} → ... → {}",
                ids.len(),
                first,
                last
            ),
            _ => format!("Circular reference: {}", ids.join(" → ")),
        };
        Self { ids, message }
    }
}

impl std::fmt::Display for CycleReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CycleReport {}

/// Recompute every derived variable against the other variables.
pub fn recompute_derived(variables: &mut [VariableRef]) -> RecalcReport {
    recompute_derived_with(variables, &[])
}

/// `recompute_derived` where formulas may also reference products, priced
/// from `products`.
pub fn recompute_derived_with(variables: &mut [VariableRef], products: &[ProductRef]) -> RecalcReport {
    let start = Instant::now();
    let mut report = RecalcReport::new();

    let graph = DepGraph::from_variables(variables);
    if graph.derived_count() == 0 {
        return report;
    }

    let members = graph.find_cycle_members();
    if !members.is_empty() {
        let cycle = match members.as_slice() {
            [only] if graph.precedents(only).any(|p| p == only) => CycleReport::self_reference(only),
            _ => CycleReport::cycle(members.clone()),
        };
        log::warn!("{}; keeping current values", cycle);
        report.cycle = Some(cycle);
    }
    let skip: FxHashSet<String> = members.into_iter().collect();

    let order = match graph.topo_order(&skip) {
        Ok(order) => order,
        Err(left) => {
            log::warn!("Could not order derived variables {:?}", left);
            report.cycle.get_or_insert_with(|| CycleReport::cycle(left));
            return report;
        }
    };

    let prices: Vec<FormulaRef> = products.iter().map(|p| FormulaRef::product(p.id.clone(), p.price)).collect();

    for id in order {
        let Some(idx) = variables.iter().position(|v| v.id == id) else {
            continue;
        };
        let Some(formula) = variables[idx].derived_formula().map(str::to_string) else {
            continue;
        };

        let result = {
            let table = ValueTable::new(variables, Some(prices.as_slice()), Resolution::Snapshot);
            try_evaluate(&formula, &table, true)
        };

        match result {
            Ok(value) => {
                if value != variables[idx].value {
                    log::debug!("Derived {} = {} (was {})", id, value, variables[idx].value);
                    variables[idx].value = value;
                    report.changed.push(id.clone());
                }
            }
            Err(e) => {
                log::debug!("Derived {} left stale at {}: {}", id, variables[idx].value, e);
                report.stale.push(id.clone());
            }
        }
        report.recomputed.push(id);
    }

    report.duration_ms = start.elapsed().as_millis() as u64;
    report
}
