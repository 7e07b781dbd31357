//! Name/id conversion for formula strings.
//!
//! Formulas are persisted with ids (`{3f2a...}`) and edited with names
//! (`{Wall Area}`). Both directions are plain rewrites of brace spans; an
//! unresolved span is always left exactly as written.

use crate::catalog::{names_equal, Catalog, ExtraRef, VariableRef};

use super::refs;
use super::token::{self, FormulaSequence, Token, TokenKind};

/// Replace `{name}` spans that match a known variable (case-insensitive,
/// exact) with `{id}`.
///
/// Spans that already hold a known id pass through, which makes the
/// conversion idempotent. Unmatched spans are left as-is.
pub fn names_to_ids(formula: &str, variables: &[VariableRef]) -> String {
    refs::rewrite_spans(formula, |inner| {
        if variables.iter().any(|v| v.id == inner) {
            return None;
        }
        variables
            .iter()
            .find(|v| v.name_matches(inner))
            .map(|v| v.id.clone())
    })
}

/// Replace `{id}` spans with `{name}`, looking in `variables` first and then
/// in `extra_refs`. Unknown ids stay visible as the literal id.
pub fn ids_to_names(formula: &str, variables: &[VariableRef], extra_refs: &[ExtraRef]) -> String {
    refs::rewrite_spans(formula, |inner| {
        if let Some(v) = variables.iter().find(|v| v.id == inner) {
            return Some(v.name.clone());
        }
        extra_name(extra_refs, inner).map(str::to_string)
    })
}

/// `ids_to_names` that also renders product ids as product titles.
pub fn ids_to_display(formula: &str, catalog: &Catalog, extra_refs: &[ExtraRef]) -> String {
    refs::rewrite_spans(formula, |inner| {
        if let Some(v) = catalog.variable_by_id(inner) {
            return Some(v.name.clone());
        }
        if let Some(p) = catalog.product_by_id(inner) {
            return Some(p.title.clone());
        }
        extra_name(extra_refs, inner).map(str::to_string)
    })
}

/// Rewrite a display formula to its stored form in place.
///
/// Variable names, product titles and extra-ref names become ids. Text
/// outside the spans is kept byte for byte, so arithmetic that does not
/// parse still does not parse afterwards.
pub fn display_to_stored(formula: &str, catalog: &Catalog, extra_refs: &[ExtraRef]) -> String {
    refs::rewrite_spans(formula, |inner| {
        if catalog.variable_by_id(inner).is_some()
            || catalog.product_by_id(inner).is_some()
            || extra_refs.iter().any(|r| r.id == inner)
        {
            return None;
        }
        if let Some(v) = catalog.variable_by_name(inner) {
            return Some(v.id.clone());
        }
        if let Some(p) = catalog.product_by_title(inner) {
            return Some(p.id.clone());
        }
        extra_refs
            .iter()
            .find(|r| r.name.as_deref().is_some_and(|n| names_equal(n, inner)))
            .map(|r| r.id.clone())
    })
}

fn extra_name<'a>(extra_refs: &'a [ExtraRef], id: &str) -> Option<&'a str> {
    extra_refs
        .iter()
        .find(|r| r.id == id)
        .and_then(|r| r.name.as_deref())
}

/// Build a token sequence from a display or stored formula.
///
/// Every reference token ends up with its id as raw text and its name as
/// display text whenever the entity can be found in the catalog or in
/// `extra_refs`. Extra refs flagged as products become product tokens.
/// References that resolve nowhere keep their text on both sides.
pub fn hydrate(formula: &str, catalog: &Catalog, extra_refs: &[ExtraRef]) -> FormulaSequence {
    let parsed = token::parse(formula, &catalog.products);
    let tokens = parsed
        .iter()
        .map(|t| match t.kind {
            TokenKind::Variable => resolve_reference(&t.raw_text, catalog, extra_refs)
                .unwrap_or_else(|| t.clone()),
            _ => t.clone(),
        })
        .collect();
    FormulaSequence::from_tokens(tokens)
}

fn resolve_reference(text: &str, catalog: &Catalog, extra_refs: &[ExtraRef]) -> Option<Token> {
    if let Some(v) = catalog.variable_by_id(text).or_else(|| catalog.variable_by_name(text)) {
        return Some(Token::variable(v.id.clone(), v.name.clone()));
    }
    let extra = extra_refs.iter().find(|r| {
        r.id == text || r.name.as_deref().is_some_and(|n| names_equal(n, text))
    })?;
    let name = extra.name.clone().unwrap_or_else(|| extra.id.clone());
    Some(if extra.is_product {
        Token::product(extra.id.clone(), name)
    } else {
        Token::variable(extra.id.clone(), name)
    })
}
