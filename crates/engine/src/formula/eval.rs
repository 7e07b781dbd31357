//! Formula evaluation.
//!
//! References are resolved to numbers and the arithmetic is computed by a
//! small tree walker over the parsed AST. Nothing here executes code: the
//! only inputs are numeric literals, reference spans and `+ - * / ^ ( )`.

use rustc_hash::FxHashMap;

use crate::catalog::{FormulaRef, VariableRef};
use crate::error::FormulaError;

use super::parser::{self, Expr, Op};
use super::refs;

/// Which values a reference resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Resolution {
    /// Side-table snapshot first, then the live catalog.
    #[default]
    Snapshot,
    /// Live catalog only; side-table entries are ignored.
    Live,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    /// The formula string is not a well-formed expression.
    Parse(String),
    /// A reference resolved against nothing (strict mode only).
    UnresolvedReference(String),
    /// Division by zero, overflow, or an undefined power.
    NonFinite,
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvalError::Parse(msg) => write!(f, "Parse error: {}", msg),
            EvalError::UnresolvedReference(id) => write!(f, "Unresolved reference {{{}}}", id),
            EvalError::NonFinite => write!(f, "Result is not a finite number"),
        }
    }
}

impl std::error::Error for EvalError {}

/// Reference values for one evaluation.
///
/// Built once per call from explicit inputs; never cached across calls.
pub struct ValueTable<'a> {
    variables: FxHashMap<&'a str, f64>,
    snapshot: FxHashMap<&'a str, f64>,
}

impl<'a> ValueTable<'a> {
    pub fn new(
        variables: &'a [VariableRef],
        formula_refs: Option<&'a [FormulaRef]>,
        resolution: Resolution,
    ) -> Self {
        let variables = variables.iter().map(|v| (v.id.as_str(), v.value)).collect();
        let snapshot = match (resolution, formula_refs) {
            (Resolution::Snapshot, Some(refs)) => refs
                .iter()
                .filter(|r| !r.id.is_empty())
                .map(|r| (r.id.as_str(), r.amount()))
                .collect(),
            _ => FxHashMap::default(),
        };
        Self { variables, snapshot }
    }

    /// Snapshot entry, then catalog variable.
    pub fn lookup(&self, id: &str) -> Option<f64> {
        self.snapshot.get(id).or_else(|| self.variables.get(id)).copied()
    }
}

/// Evaluate a stored formula.
///
/// Each `{id}` resolves, in order, to a matching `formula_refs` entry, the
/// matching catalog variable, or `0`. Returns `None` for an empty or
/// malformed formula and for non-finite results (e.g. division by zero).
pub fn evaluate(
    formula: &str,
    variables: &[VariableRef],
    formula_refs: Option<&[FormulaRef]>,
) -> Option<f64> {
    evaluate_with(formula, variables, formula_refs, Resolution::Snapshot)
}

/// `evaluate` with an explicit resolution mode.
pub fn evaluate_with(
    formula: &str,
    variables: &[VariableRef],
    formula_refs: Option<&[FormulaRef]>,
    resolution: Resolution,
) -> Option<f64> {
    if formula.trim().is_empty() {
        return None;
    }
    let table = ValueTable::new(variables, formula_refs, resolution);
    match try_evaluate(formula, &table, false) {
        Ok(value) => Some(value),
        Err(e) => {
            log::debug!("Formula {:?} did not evaluate: {}", formula, e);
            None
        }
    }
}

/// Evaluate against a prepared value table.
///
/// In strict mode an unresolved reference is an error instead of `0`.
pub fn try_evaluate(formula: &str, table: &ValueTable<'_>, strict: bool) -> Result<f64, EvalError> {
    let expr = parser::parse(formula).map_err(EvalError::Parse)?;
    eval_expr(&expr, &|id| match table.lookup(id) {
        Some(v) => Ok(v),
        None if strict => Err(EvalError::UnresolvedReference(id.to_string())),
        None => Ok(0.0),
    })
}

/// Evaluate an AST with a caller-supplied reference resolver.
pub fn eval_expr<F>(expr: &Expr, resolve: &F) -> Result<f64, EvalError>
where
    F: Fn(&str) -> Result<f64, EvalError>,
{
    let value = match expr {
        Expr::Number(n) => *n,
        Expr::Ref(id) => resolve(id)?,
        Expr::Neg(inner) => -eval_expr(inner, resolve)?,
        Expr::BinaryOp { op, left, right } => {
            let l = eval_expr(left, resolve)?;
            let r = eval_expr(right, resolve)?;
            match op {
                Op::Add => l + r,
                Op::Sub => l - r,
                Op::Mul => l * r,
                Op::Div => {
                    if r == 0.0 {
                        return Err(EvalError::NonFinite);
                    }
                    l / r
                }
                Op::Pow => l.powf(r),
            }
        }
    };
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EvalError::NonFinite)
    }
}

/// References that resolve against nothing under `table`, in first-seen
/// order. Evaluation treats them as `0`; callers may want to flag them.
pub fn unresolved_references(formula: &str, table: &ValueTable<'_>) -> Vec<FormulaError> {
    refs::referenced_ids(formula)
        .into_iter()
        .filter(|id| table.lookup(id).is_none())
        .map(|id| FormulaError::UnresolvedReference { id })
        .collect()
}
