//! Suggestions for a partially typed reference.
//!
//! Order is fixed:
//!
//! 1. "Add as variable" affordance, when the text is long enough, is not a
//!    number or operator, and names nothing that already exists
//! 2. Context variables (global or derived) whose name contains the text
//! 3. Global catalog variables
//! 4. Non-global catalog variables
//! 5. Products, unless excluded for this formula slot
//!
//! Matching is case-insensitive substring. Names already used in the formula
//! are never suggested again.

use serde::Serialize;

use crate::catalog::{names_equal, ProductRef, VariableOrigin, VariableRef};
use crate::formula::Operator;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestOptions {
    /// Minimum trimmed length before the create affordance appears.
    pub min_create_len: usize,
    pub include_products: bool,
    /// The variable whose own formula is being edited; never offered.
    pub exclude_variable_name: Option<String>,
    pub limit: Option<usize>,
}

impl Default for SuggestOptions {
    fn default() -> Self {
        Self {
            min_create_len: 2,
            include_products: true,
            exclude_variable_name: None,
            limit: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionKind {
    Create,
    Variable,
    Product,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuggestionItem {
    pub kind: SuggestionKind,
    pub id: String,
    pub name: String,
    pub label: String,
    pub is_global: bool,
}

impl SuggestionItem {
    fn create(name: &str) -> Self {
        Self {
            kind: SuggestionKind::Create,
            id: format!("create-{}", name),
            name: name.to_string(),
            label: format!("Add \"{}\" as variable", name),
            is_global: false,
        }
    }

    fn variable(v: &VariableRef) -> Self {
        Self {
            kind: SuggestionKind::Variable,
            id: v.id.clone(),
            name: v.name.clone(),
            label: v.name.clone(),
            is_global: v.is_global,
        }
    }

    fn product(p: &ProductRef) -> Self {
        Self {
            kind: SuggestionKind::Product,
            id: p.id.clone(),
            name: p.title.clone(),
            label: p.title.clone(),
            is_global: false,
        }
    }

    pub fn is_create(&self) -> bool {
        self.kind == SuggestionKind::Create
    }
}

/// True if the text starts like a number (sign, digits, or `.digit`).
pub fn looks_numeric(text: &str) -> bool {
    let text = text.trim();
    let unsigned = text.strip_prefix(['+', '-']).unwrap_or(text);
    let mut chars = unsigned.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() => true,
        Some('.') => chars.next().is_some_and(|c| c.is_ascii_digit()),
        _ => false,
    }
}

/// Whether typed text may become a brand new variable.
pub fn can_create(
    partial: &str,
    known: &[&[VariableRef]],
    used_names: &[String],
    options: &SuggestOptions,
) -> bool {
    let name = partial.trim();
    name.chars().count() >= options.min_create_len
        && !looks_numeric(name)
        && Operator::from_text(name).is_none()
        && !known.iter().any(|vars| vars.iter().any(|v| v.name_matches(name)))
        && !used_names.iter().any(|u| names_equal(u, name))
}

/// Ranked suggestions for `partial`.
///
/// `context_variables` are the variables attached to the thing being edited;
/// only the global and derived ones are offered in the context group.
/// `catalog_variables` and `products` are the current catalog matches.
pub fn suggest(
    partial: &str,
    context_variables: &[VariableRef],
    catalog_variables: &[VariableRef],
    products: &[ProductRef],
    used_names: &[String],
    options: &SuggestOptions,
) -> Vec<SuggestionItem> {
    let text = partial.trim();
    if text.is_empty() || looks_numeric(text) || Operator::from_text(text).is_some() {
        return Vec::new();
    }

    let needle = text.to_lowercase();
    let used: Vec<String> = used_names.iter().map(|n| n.to_lowercase()).collect();
    let excluded = options.exclude_variable_name.as_deref().map(str::to_lowercase);

    let offerable = |name: &str| {
        let lower = name.to_lowercase();
        lower.contains(&needle) && !used.contains(&lower) && excluded.as_deref() != Some(lower.as_str())
    };

    let mut items = Vec::new();

    if can_create(text, &[context_variables, catalog_variables], used_names, options) {
        items.push(SuggestionItem::create(text));
    }

    let context_matches: Vec<&VariableRef> = context_variables
        .iter()
        .filter(|v| v.is_global || v.origin == VariableOrigin::Derived)
        .filter(|v| offerable(&v.name))
        .collect();

    let catalog_matches: Vec<&VariableRef> = catalog_variables
        .iter()
        .filter(|v| offerable(&v.name))
        .filter(|v| !context_matches.iter().any(|c| names_equal(&c.name, &v.name)))
        .collect();

    items.extend(context_matches.iter().map(|v| SuggestionItem::variable(v)));
    items.extend(catalog_matches.iter().filter(|v| v.is_global).map(|v| SuggestionItem::variable(v)));
    items.extend(catalog_matches.iter().filter(|v| !v.is_global).map(|v| SuggestionItem::variable(v)));

    if options.include_products {
        items.extend(
            products
                .iter()
                .filter(|p| {
                    let lower = p.title.to_lowercase();
                    lower.contains(&needle) && !used.contains(&lower)
                })
                .map(SuggestionItem::product),
        );
    }

    if let Some(limit) = options.limit {
        items.truncate(limit);
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Vec<VariableRef> {
        vec![
            VariableRef::new("v1", "Wall Area", 100.0),
            VariableRef::new("v2", "Wall Height", 8.0).global(),
            VariableRef::new("v3", "Wallpaper Rolls", 4.0).derived(),
            VariableRef::new("v4", "Floor Area", 50.0),
        ]
    }

    fn products() -> Vec<ProductRef> {
        vec![ProductRef::new("p1", "Wall Anchor", 0.4), ProductRef::new("p2", "Paint", 30.0)]
    }

    fn kinds(items: &[SuggestionItem]) -> Vec<(SuggestionKind, &str)> {
        items.iter().map(|i| (i.kind, i.name.as_str())).collect()
    }

    #[test]
    fn test_order_of_groups() {
        let vars = catalog();
        let items = suggest("wall", &vars, &vars, &products(), &[], &SuggestOptions::default());
        assert_eq!(
            kinds(&items),
            vec![
                (SuggestionKind::Create, "wall"),
                (SuggestionKind::Variable, "Wall Height"),
                (SuggestionKind::Variable, "Wallpaper Rolls"),
                (SuggestionKind::Variable, "Wall Area"),
                (SuggestionKind::Product, "Wall Anchor"),
            ]
        );
        assert_eq!(items[0].label, "Add \"wall\" as variable");
        assert!(items[1].is_global);
    }

    #[test]
    fn test_global_catalog_before_local() {
        let catalog = vec![VariableRef::new("a", "Trim Local", 1.0), VariableRef::new("b", "Trim Global", 1.0).global()];
        let items = suggest("trim", &[], &catalog, &[], &[], &SuggestOptions::default());
        assert_eq!(
            kinds(&items),
            vec![
                (SuggestionKind::Create, "trim"),
                (SuggestionKind::Variable, "Trim Global"),
                (SuggestionKind::Variable, "Trim Local"),
            ]
        );
    }

    #[test]
    fn test_no_create_on_exact_match() {
        let vars = catalog();
        let items = suggest("wall area", &vars, &vars, &[], &[], &SuggestOptions::default());
        assert!(items.iter().all(|i| !i.is_create()));
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_no_create_on_exact_match_non_ascii() {
        let vars = vec![VariableRef::new("f1", "Fläche", 12.0)];
        let items = suggest("FLÄCHE", &vars, &vars, &[], &[], &SuggestOptions::default());
        assert_eq!(kinds(&items), vec![(SuggestionKind::Variable, "Fläche")]);
        assert!(!can_create("fläche", &[&vars], &[], &SuggestOptions::default()));
        assert!(!can_create("ÉTAGE", &[], &["étage".to_string()], &SuggestOptions::default()));
    }

    #[test]
    fn test_no_create_for_short_input() {
        let items = suggest("W", &[], &[], &[], &[], &SuggestOptions::default());
        assert!(items.is_empty());
        let opts = SuggestOptions { min_create_len: 1, ..Default::default() };
        assert_eq!(suggest("W", &[], &[], &[], &[], &opts).len(), 1);
    }

    #[test]
    fn test_early_exit_numeric_and_operator() {
        let vars = catalog();
        for text in ["", "  ", "12", "3.5", ".5", "2x", "-4", "+", "(", "^"] {
            assert!(suggest(text, &vars, &vars, &products(), &[], &SuggestOptions::default()).is_empty(), "{:?}", text);
        }
    }

    #[test]
    fn test_used_names_excluded() {
        let vars = catalog();
        let used = vec!["wall height".to_string(), "Wall Anchor".to_string()];
        let items = suggest("wall", &vars, &vars, &products(), &used, &SuggestOptions::default());
        assert!(!items.iter().any(|i| i.name == "Wall Height" || i.name == "Wall Anchor"));
        let items = suggest("Wall Height", &vars, &vars, &[], &used, &SuggestOptions::default());
        assert!(items.is_empty());
    }

    #[test]
    fn test_exclude_self_and_products() {
        let vars = catalog();
        let opts = SuggestOptions {
            include_products: false,
            exclude_variable_name: Some("WALL AREA".into()),
            ..Default::default()
        };
        let items = suggest("wall", &vars, &vars, &products(), &[], &opts);
        assert!(!items.iter().any(|i| i.name == "Wall Area"));
        assert!(!items.iter().any(|i| i.kind == SuggestionKind::Product));
    }

    #[test]
    fn test_limit() {
        let vars = catalog();
        let opts = SuggestOptions { limit: Some(2), ..Default::default() };
        assert_eq!(suggest("wall", &vars, &vars, &products(), &[], &opts).len(), 2);
    }

    #[test]
    fn test_looks_numeric() {
        assert!(looks_numeric("42"));
        assert!(looks_numeric(" .5"));
        assert!(looks_numeric("-1"));
        assert!(!looks_numeric("."));
        assert!(!looks_numeric("x1"));
    }
}
