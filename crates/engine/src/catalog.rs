//! Catalog entities referenced by formulas.
//!
//! Variables and products come from the surrounding application (fetched,
//! paginated, cached elsewhere). The engine only ever sees flat snapshots and
//! never holds on to them between calls.

use serde::{Deserialize, Serialize};

/// Case-insensitive name equality, ignoring surrounding whitespace.
///
/// Uses full Unicode lowercasing, the same folding suggestion matching uses.
pub fn names_equal(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim(), b.trim());
    a == b || a.to_lowercase() == b.to_lowercase()
}

/// Where a variable came from. Only affects suggestion filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableOrigin {
    #[default]
    Original,
    Derived,
}

/// A named numeric variable.
///
/// When `formula` is non-empty the `value` is derived: it is recomputed from
/// the formula against the rest of the catalog (see `recalc`). On failure the
/// last good value stays in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableRef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    #[serde(default)]
    pub is_global: bool,
    #[serde(default)]
    pub origin: VariableOrigin,
}

impl VariableRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            value,
            formula: None,
            is_global: false,
            origin: VariableOrigin::Original,
        }
    }

    /// Attach a formula; the value becomes derived.
    pub fn with_formula(mut self, formula: impl Into<String>) -> Self {
        self.formula = Some(formula.into());
        self
    }

    pub fn global(mut self) -> Self {
        self.is_global = true;
        self
    }

    pub fn derived(mut self) -> Self {
        self.origin = VariableOrigin::Derived;
        self
    }

    /// The nested formula, if it has any content.
    pub fn derived_formula(&self) -> Option<&str> {
        self.formula.as_deref().filter(|f| !f.trim().is_empty())
    }

    pub fn name_matches(&self, name: &str) -> bool {
        names_equal(&self.name, name)
    }
}

/// A catalog product. Read-only operand priced live from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRef {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub price: f64,
}

impl ProductRef {
    pub fn new(id: impl Into<String>, title: impl Into<String>, price: f64) -> Self {
        Self { id: id.into(), title: title.into(), price }
    }

    pub fn title_matches(&self, title: &str) -> bool {
        names_equal(&self.title, title)
    }
}

/// Kind tag of a side-table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefKind {
    #[default]
    Variable,
    Product,
}

/// Snapshot of a referenced value stored alongside a formula.
///
/// Older records carry `variable_id` / `product_id` instead of `id`, and
/// products carry `cost` instead of `value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawFormulaRef")]
pub struct FormulaRef {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: RefKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
}

/// Wire shape of a side-table entry; `id` wins over the legacy keys.
#[derive(Deserialize)]
struct RawFormulaRef {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    variable_id: Option<String>,
    #[serde(default)]
    product_id: Option<String>,
    #[serde(default, rename = "type")]
    kind: RefKind,
    #[serde(default)]
    value: Option<f64>,
    #[serde(default)]
    cost: Option<f64>,
}

impl From<RawFormulaRef> for FormulaRef {
    fn from(raw: RawFormulaRef) -> Self {
        let id = raw.id.or(raw.variable_id).or(raw.product_id).unwrap_or_default();
        Self { id, kind: raw.kind, value: raw.value, cost: raw.cost }
    }
}

impl FormulaRef {
    pub fn variable(id: impl Into<String>, value: f64) -> Self {
        Self { id: id.into(), kind: RefKind::Variable, value: Some(value), cost: None }
    }

    pub fn product(id: impl Into<String>, cost: f64) -> Self {
        Self { id: id.into(), kind: RefKind::Product, value: None, cost: Some(cost) }
    }

    /// The numeric amount this entry contributes: `value`, else `cost`, else 0.
    ///
    /// A zero `value` counts as absent, so a product entry whose value was
    /// never filled in still prices at its `cost`.
    pub fn amount(&self) -> f64 {
        let present = |n: &f64| *n != 0.0 && !n.is_nan();
        self.value.filter(present).or(self.cost.filter(present)).unwrap_or(0.0)
    }
}

/// A reference that accompanies one specific formula, used when the entity
/// is not part of the currently loaded catalog page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtraRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub is_product: bool,
}

impl ExtraRef {
    pub fn variable(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self { id: id.into(), name: Some(name.into()), is_product: false }
    }

    pub fn product(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self { id: id.into(), name: Some(title.into()), is_product: true }
    }
}

/// A snapshot of the variables and products known to the editing context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub variables: Vec<VariableRef>,
    #[serde(default)]
    pub products: Vec<ProductRef>,
}

impl Catalog {
    pub fn new(variables: Vec<VariableRef>, products: Vec<ProductRef>) -> Self {
        Self { variables, products }
    }

    pub fn variable_by_id(&self, id: &str) -> Option<&VariableRef> {
        self.variables.iter().find(|v| v.id == id)
    }

    /// Case-insensitive exact name lookup.
    pub fn variable_by_name(&self, name: &str) -> Option<&VariableRef> {
        self.variables.iter().find(|v| v.name_matches(name))
    }

    pub fn product_by_id(&self, id: &str) -> Option<&ProductRef> {
        self.products.iter().find(|p| p.id == id)
    }

    pub fn product_by_title(&self, title: &str) -> Option<&ProductRef> {
        self.products.iter().find(|p| p.title_matches(title))
    }

    /// Variables plus every product priced as an operand, so product
    /// references resolve live when no stored snapshot covers them.
    pub fn operands(&self) -> Vec<VariableRef> {
        self.variables
            .iter()
            .cloned()
            .chain(self.products.iter().map(|p| VariableRef::new(p.id.clone(), p.title.clone(), p.price)))
            .collect()
    }

    /// Add a variable unless one with the same id is already present.
    ///
    /// Returns true if the catalog changed.
    pub fn apply_import(&mut self, variable: VariableRef) -> bool {
        if self.variables.iter().any(|v| v.id == variable.id) {
            return false;
        }
        log::debug!("Imported variable {:?} ({}) into catalog", variable.name, variable.id);
        self.variables.push(variable);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formula_ref_amount_precedence() {
        assert_eq!(FormulaRef::variable("a", 3.0).amount(), 3.0);
        assert_eq!(FormulaRef::product("p", 7.5).amount(), 7.5);
        let empty = FormulaRef { id: "x".into(), kind: RefKind::Variable, value: None, cost: None };
        assert_eq!(empty.amount(), 0.0);
    }

    #[test]
    fn test_formula_ref_zero_value_falls_back_to_cost() {
        let r = FormulaRef { id: "p".into(), kind: RefKind::Product, value: Some(0.0), cost: Some(12.0) };
        assert_eq!(r.amount(), 12.0);
        let r = FormulaRef { id: "v".into(), kind: RefKind::Variable, value: Some(0.0), cost: None };
        assert_eq!(r.amount(), 0.0);
    }

    #[test]
    fn test_formula_ref_accepts_legacy_ids() {
        let json = r#"[
            {"variable_id": "v1", "type": "variable", "value": 4},
            {"product_id": "p1", "type": "product", "cost": 12.5}
        ]"#;
        let refs: Vec<FormulaRef> = serde_json::from_str(json).unwrap();
        assert_eq!(refs[0].id, "v1");
        assert_eq!(refs[0].amount(), 4.0);
        assert_eq!(refs[1].id, "p1");
        assert_eq!(refs[1].kind, RefKind::Product);
        assert_eq!(refs[1].amount(), 12.5);
    }

    #[test]
    fn test_formula_ref_prefers_id_over_legacy_keys() {
        let json = r#"{"id": "p9", "product_id": "old", "type": "product", "value": 2, "cost": 3}"#;
        let r: FormulaRef = serde_json::from_str(json).unwrap();
        assert_eq!(r.id, "p9");
        assert_eq!(r.amount(), 2.0);
    }

    #[test]
    fn test_variable_defaults_from_json() {
        let v: VariableRef = serde_json::from_str(r#"{"id": "v1", "name": "Wall"}"#).unwrap();
        assert_eq!(v.value, 0.0);
        assert!(v.formula.is_none());
        assert!(!v.is_global);
        assert_eq!(v.origin, VariableOrigin::Original);
    }

    #[test]
    fn test_derived_formula_ignores_blank() {
        let v = VariableRef::new("v", "V", 1.0).with_formula("   ");
        assert!(v.derived_formula().is_none());
        let v = VariableRef::new("v", "V", 1.0).with_formula("{a}*2");
        assert_eq!(v.derived_formula(), Some("{a}*2"));
    }

    #[test]
    fn test_catalog_lookup_case_insensitive() {
        let catalog = Catalog::new(
            vec![VariableRef::new("v1", "Wall Area", 10.0)],
            vec![ProductRef::new("p1", "Drywall Sheet", 14.0)],
        );
        assert_eq!(catalog.variable_by_name("wall area").map(|v| v.id.as_str()), Some("v1"));
        assert_eq!(catalog.product_by_title("DRYWALL SHEET").map(|p| p.id.as_str()), Some("p1"));
        assert!(catalog.variable_by_name("Wall").is_none());
    }

    #[test]
    fn test_catalog_lookup_non_ascii_names() {
        let catalog = Catalog::new(
            vec![VariableRef::new("v1", "Fläche", 10.0)],
            vec![ProductRef::new("p1", "Größe Ü", 4.0)],
        );
        assert_eq!(catalog.variable_by_name("FLÄCHE").map(|v| v.id.as_str()), Some("v1"));
        assert_eq!(catalog.product_by_title(" größe ü ").map(|p| p.id.as_str()), Some("p1"));
        assert!(names_equal("ÉTAGE", "étage"));
        assert!(!names_equal("Fläche", "Flache"));
    }

    #[test]
    fn test_operands_include_products() {
        let catalog = Catalog::new(
            vec![VariableRef::new("v1", "Wall Area", 10.0)],
            vec![ProductRef::new("p1", "Paint", 38.0)],
        );
        let ops = catalog.operands();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[1].id, "p1");
        assert_eq!(ops[1].value, 38.0);
    }

    #[test]
    fn test_apply_import_dedups_by_id() {
        let mut catalog = Catalog::default();
        assert!(catalog.apply_import(VariableRef::new("v1", "Wall", 0.0)));
        assert!(!catalog.apply_import(VariableRef::new("v1", "Wall", 5.0)));
        assert_eq!(catalog.variables.len(), 1);
    }
}
