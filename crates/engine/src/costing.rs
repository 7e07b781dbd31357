//! Element cost computation.
//!
//! An element prices its material and labor either from a formula or from a
//! stored cost. Formula results get the element's markup applied; stored
//! costs already include it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::catalog::{FormulaRef, ProductRef, RefKind, VariableRef};
use crate::formula::{evaluate_with, Resolution};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Element {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub material_cost_formula: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labor_cost_formula: Option<String>,
    pub material_formula_variables: Vec<FormulaRef>,
    pub labor_formula_variables: Vec<FormulaRef>,
    /// Percentage, e.g. `15` for 15%.
    pub markup: f64,
    /// Stored material cost, markup included.
    pub material_cost: f64,
    /// Stored labor cost, markup included.
    pub labor_cost: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ElementCost {
    pub material: f64,
    pub labor: f64,
    pub total: f64,
}

/// Refresh product entries of a side-table with current catalog prices.
///
/// Variable entries and products missing from the catalog are left as
/// they are.
pub fn merge_current_prices(side_table: &[FormulaRef], products: &[ProductRef]) -> Vec<FormulaRef> {
    side_table
        .iter()
        .map(|entry| {
            if entry.kind != RefKind::Product {
                return entry.clone();
            }
            match products.iter().find(|p| p.id == entry.id) {
                Some(product) => FormulaRef {
                    id: entry.id.clone(),
                    kind: RefKind::Product,
                    value: Some(product.price),
                    cost: Some(product.price),
                },
                None => entry.clone(),
            }
        })
        .collect()
}

/// Cost of one element with side-table snapshots taking precedence.
pub fn element_cost(element: &Element, variables: &[VariableRef], products: &[ProductRef]) -> ElementCost {
    element_cost_with(element, variables, products, Resolution::Snapshot)
}

pub fn element_cost_with(
    element: &Element,
    variables: &[VariableRef],
    products: &[ProductRef],
    resolution: Resolution,
) -> ElementCost {
    let multiplier = 1.0 + element.markup / 100.0;

    let part = |formula: Option<&String>, side_table: &[FormulaRef], stored: f64| match formula
        .map(String::as_str)
        .filter(|f| !f.trim().is_empty())
    {
        Some(formula) => {
            let refs = merge_current_prices(side_table, products);
            let base = evaluate_with(formula, variables, Some(refs.as_slice()), resolution).unwrap_or_else(|| {
                log::debug!("Element {} formula {:?} did not evaluate, using 0", element.id, formula);
                0.0
            });
            base * multiplier
        }
        None => stored,
    };

    let material = part(
        element.material_cost_formula.as_ref(),
        &element.material_formula_variables,
        element.material_cost,
    );
    let labor = part(
        element.labor_cost_formula.as_ref(),
        &element.labor_formula_variables,
        element.labor_cost,
    );

    ElementCost { material, labor, total: material + labor }
}

/// Costs for every element, keyed by element id.
pub fn element_costs(
    elements: &[Element],
    variables: &[VariableRef],
    products: &[ProductRef],
    resolution: Resolution,
) -> BTreeMap<String, ElementCost> {
    elements
        .iter()
        .map(|e| (e.id.clone(), element_cost_with(e, variables, products, resolution)))
        .collect()
}
