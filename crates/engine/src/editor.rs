//! Live formula editing.
//!
//! `FormulaEditor` owns the token sequence being built, the text input
//! buffer, and at most one outstanding variable-creation request. Every
//! append goes through the validation gate, so the committed sequence never
//! holds an invalid adjacency. Catalog snapshots are passed into each call;
//! the editor keeps no reference to them.
//!
//! Creating a variable is asynchronous from the editor's point of view: the
//! injected `VariableCreator` is asked for it, and the result is delivered
//! later through `on_variable_created` or `on_variable_creation_failed`.

use crate::catalog::{names_equal, Catalog, ExtraRef, FormulaRef, ProductRef, VariableRef};
use crate::error::FormulaError;
use crate::events::{EditorEvent, EventCollector, InputOutcome, TokenAccepted};
use crate::formula::{self, FormulaSequence, Operator, Token, TokenId, TokenKind};
use crate::suggest::{self, SuggestOptions, SuggestionItem, SuggestionKind};
use crate::validation::{self, ValidationVerdict, Violation};

/// Collaborator that creates variables on request.
///
/// The request is fire-and-forget; the created variable (or the failure)
/// comes back through the editor's callbacks.
pub trait VariableCreator {
    fn request_variable(&mut self, name: &str);
}

impl<F: FnMut(&str)> VariableCreator for F {
    fn request_variable(&mut self, name: &str) {
        self(name)
    }
}

#[derive(Debug, Default)]
pub struct FormulaEditor {
    sequence: FormulaSequence,
    input: String,
    pending: Option<String>,
    options: SuggestOptions,
    events: EventCollector,
}

impl FormulaEditor {
    pub fn new(options: SuggestOptions) -> Self {
        Self { options, ..Default::default() }
    }

    /// Start from an existing display or stored formula.
    pub fn load(formula: &str, catalog: &Catalog, extra_refs: &[ExtraRef], options: SuggestOptions) -> Self {
        Self {
            sequence: formula::hydrate(formula, catalog, extra_refs),
            options,
            ..Default::default()
        }
    }

    pub fn sequence(&self) -> &FormulaSequence {
        &self.sequence
    }

    pub fn options(&self) -> &SuggestOptions {
        &self.options
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    /// Name of the outstanding creation request, if any.
    pub fn pending_creation(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    /// Drain the activity log.
    pub fn take_events(&mut self) -> Vec<EditorEvent> {
        self.events.take()
    }

    // =========================================================================
    // Appending
    // =========================================================================

    /// Append a token through the validation gate.
    ///
    /// On rejection the input buffer is cleared and the sequence is left
    /// unchanged. A bare token carries no entity, so it never produces a
    /// catalog import; use `accept_variable` for that.
    pub fn append(&mut self, token: Token, context: &[VariableRef]) -> Result<TokenAccepted, FormulaError> {
        self.commit(token, None, context)
    }

    /// Append a reference to `variable`. If the editing context does not hold
    /// it yet, the returned event asks the caller to import it.
    pub fn accept_variable(
        &mut self,
        variable: &VariableRef,
        context: &[VariableRef],
    ) -> Result<TokenAccepted, FormulaError> {
        let token = Token::variable(variable.id.clone(), variable.name.clone());
        self.commit(token, Some(variable), context)
    }

    pub fn accept_product(&mut self, product: &ProductRef) -> Result<TokenAccepted, FormulaError> {
        self.commit(Token::product(product.id.clone(), product.title.clone()), None, &[])
    }

    /// Pick a suggestion (Tab). The create affordance issues a creation
    /// request instead of appending.
    pub fn accept_suggestion(
        &mut self,
        item: &SuggestionItem,
        catalog: &Catalog,
        context: &[VariableRef],
        creator: &mut dyn VariableCreator,
    ) -> Result<InputOutcome, FormulaError> {
        let accepted = match item.kind {
            SuggestionKind::Create => return self.request_creation(&item.name, creator),
            SuggestionKind::Variable => {
                let found = context
                    .iter()
                    .find(|v| v.id == item.id)
                    .or_else(|| catalog.variable_by_id(&item.id));
                match found {
                    Some(v) => self.accept_variable(v, context),
                    None => self.append(Token::variable(item.id.clone(), item.name.clone()), context),
                }
            }
            SuggestionKind::Product => match catalog.product_by_id(&item.id) {
                Some(p) => self.accept_product(p),
                None => self.append(Token::product(item.id.clone(), item.name.clone()), context),
            },
        };
        accepted.map(InputOutcome::Accepted)
    }

    /// Commit the input buffer (Enter).
    ///
    /// Operators and numbers become tokens directly. Otherwise an exact,
    /// case-insensitive name match wins: context variables, then catalog
    /// variables, then products, then a reference already in the formula.
    /// With no match the text becomes a creation request.
    pub fn commit_input(
        &mut self,
        catalog: &Catalog,
        context: &[VariableRef],
        creator: &mut dyn VariableCreator,
    ) -> Result<InputOutcome, FormulaError> {
        let text = self.input.trim().to_string();
        if text.is_empty() {
            return Ok(InputOutcome::Ignored);
        }

        if let Some(op) = Operator::from_text(&text) {
            return self.append(Token::operator(op), context).map(InputOutcome::Accepted);
        }

        if suggest::looks_numeric(&text) {
            if !is_number_literal(&text) {
                let token = Token::number(text);
                return Err(self.reject(&token, Violation::InvalidExpression));
            }
            return self.append(Token::number(text), context).map(InputOutcome::Accepted);
        }

        if let Some(variable) = self.find_variable(&text, catalog, context) {
            return self.accept_variable(variable, context).map(InputOutcome::Accepted);
        }

        if self.options.include_products {
            if let Some(product) = catalog.product_by_title(&text) {
                return self.accept_product(product).map(InputOutcome::Accepted);
            }
        }

        let reused = self
            .sequence
            .iter()
            .find(|t| t.kind.is_reference() && names_equal(&t.display_text, &text))
            .map(|t| t.with_display(t.display_text.clone()));
        if let Some(token) = reused {
            return self.append(token, context).map(InputOutcome::Accepted);
        }

        let known: [&[VariableRef]; 2] = [context, &catalog.variables];
        if !suggest::can_create(&text, &known, &self.used_names(), &self.options) {
            log::debug!("Input {:?} matches nothing and cannot become a variable", text);
            return Ok(InputOutcome::Ignored);
        }

        self.request_creation(&text, creator)
    }

    fn find_variable<'a>(&self, name: &str, catalog: &'a Catalog, context: &'a [VariableRef]) -> Option<&'a VariableRef> {
        let excluded = self.options.exclude_variable_name.as_deref();
        context
            .iter()
            .chain(catalog.variables.iter())
            .filter(|v| !excluded.is_some_and(|e| v.name_matches(e)))
            .find(|v| v.name_matches(name))
    }

    fn request_creation(&mut self, name: &str, creator: &mut dyn VariableCreator) -> Result<InputOutcome, FormulaError> {
        if let Some(pending) = &self.pending {
            log::debug!("Creation of {:?} still pending, ignoring {:?}", pending, name);
            return Ok(InputOutcome::CreationPending { name: pending.clone() });
        }

        // Gate the eventual token now so no request goes out for a reference
        // that could never be appended here
        let placeholder = Token::variable(name, name);
        if let Err(violation) = validation::check_append(self.sequence.tokens(), &placeholder) {
            return Err(self.reject(&placeholder, violation));
        }

        self.input.clear();
        self.pending = Some(name.to_string());
        log::debug!("Requesting creation of variable {:?}", name);
        self.events.push(EditorEvent::CreationRequested { name: name.to_string() });
        creator.request_variable(name);
        Ok(InputOutcome::CreationRequested { name: name.to_string() })
    }

    /// Deliver the variable created for the pending request and append it.
    ///
    /// Returns `Ok(None)` when nothing is pending or the name does not match
    /// the pending request (a stale callback).
    pub fn on_variable_created(
        &mut self,
        variable: VariableRef,
        context: &[VariableRef],
    ) -> Result<Option<TokenAccepted>, FormulaError> {
        let Some(pending) = self.pending.take() else {
            log::warn!("Variable {:?} created with no pending request", variable.name);
            return Ok(None);
        };
        if !variable.name_matches(&pending) {
            log::warn!("Created variable {:?} does not match pending {:?}", variable.name, pending);
            self.pending = Some(pending);
            return Ok(None);
        }

        log::debug!("Variable {:?} created as {}", variable.name, variable.id);
        self.events.push(EditorEvent::CreationResolved { name: pending, id: variable.id.clone() });
        self.accept_variable(&variable, context).map(Some)
    }

    /// The pending creation failed. The typed name goes back into the input
    /// buffer so the user can retry.
    pub fn on_variable_creation_failed(&mut self, reason: impl Into<String>) -> Option<FormulaError> {
        let name = self.pending.take()?;
        let reason = reason.into();
        log::debug!("Creation of variable {:?} failed: {}", name, reason);
        self.input = name.clone();
        self.events.push(EditorEvent::CreationFailed { name: name.clone(), reason: reason.clone() });
        Some(FormulaError::CreateVariableFailure { name, reason })
    }

    fn commit(
        &mut self,
        token: Token,
        source: Option<&VariableRef>,
        context: &[VariableRef],
    ) -> Result<TokenAccepted, FormulaError> {
        if let Err(violation) = validation::check_append(self.sequence.tokens(), &token) {
            return Err(self.reject(&token, violation));
        }

        let catalog_import = source
            .filter(|v| token.kind == TokenKind::Variable && !context.iter().any(|c| c.id == v.id))
            .cloned();

        log::debug!("Accepted {:?} token {:?}", token.kind, token.display_text);
        self.input.clear();
        self.events.push(EditorEvent::Accepted {
            token: token.id,
            import: catalog_import.as_ref().map(|v| v.id.clone()),
        });
        self.sequence.push(token.clone());
        Ok(TokenAccepted { token, catalog_import })
    }

    fn reject(&mut self, token: &Token, violation: Violation) -> FormulaError {
        log::debug!("Rejected {:?} token {:?}: {}", token.kind, token.display_text, violation);
        self.input.clear();
        self.events.push(EditorEvent::Rejected { message: violation.to_string() });
        violation.into()
    }

    // =========================================================================
    // Editing and output
    // =========================================================================

    /// Remove a token. Not gated; `complete` re-checks the whole sequence.
    pub fn remove(&mut self, id: TokenId) -> bool {
        let removed = self.sequence.remove(id).is_some();
        if removed {
            self.events.push(EditorEvent::Removed { token: id });
        }
        removed
    }

    pub fn clear(&mut self) {
        self.sequence.clear();
        self.input.clear();
    }

    /// Completion verdict for the current sequence.
    pub fn complete(&self) -> ValidationVerdict {
        validation::validate_complete(self.sequence.tokens())
    }

    /// `complete` as a result.
    pub fn check(&self) -> Result<(), FormulaError> {
        validation::check_complete(self.sequence.tokens()).map_err(FormulaError::from)
    }

    pub fn to_storage_string(&self) -> String {
        self.sequence.to_storage_string()
    }

    pub fn to_display_string(&self) -> String {
        self.sequence.to_display_string()
    }

    /// Display names of every reference in the formula.
    pub fn used_names(&self) -> Vec<String> {
        self.sequence
            .iter()
            .filter(|t| t.kind.is_reference())
            .map(|t| t.display_text.clone())
            .collect()
    }

    /// Suggestions for the current input.
    pub fn suggestions(&self, catalog: &Catalog, context: &[VariableRef]) -> Vec<SuggestionItem> {
        suggest::suggest(
            &self.input,
            context,
            &catalog.variables,
            &catalog.products,
            &self.used_names(),
            &self.options,
        )
    }

    /// Preview value of the current formula. Products are priced from the
    /// catalog unless `formula_refs` holds a snapshot for them.
    pub fn preview(&self, catalog: &Catalog, formula_refs: Option<&[FormulaRef]>) -> Option<f64> {
        formula::evaluate(&self.to_storage_string(), &catalog.operands(), formula_refs)
    }
}

fn is_number_literal(text: &str) -> bool {
    text.chars().all(|c| c.is_ascii_digit() || c == '.') && text.parse::<f64>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        Catalog::new(
            vec![
                VariableRef::new("v1", "Wall Area", 120.0),
                VariableRef::new("v2", "Coats", 2.0).global(),
            ],
            vec![ProductRef::new("p1", "Paint", 30.0)],
        )
    }

    fn no_creator() -> impl FnMut(&str) {
        |name: &str| panic!("unexpected creation request for {}", name)
    }

    fn type_and_enter(editor: &mut FormulaEditor, text: &str, catalog: &Catalog) -> Result<InputOutcome, FormulaError> {
        editor.set_input(text);
        editor.commit_input(catalog, &catalog.variables, &mut no_creator())
    }

    #[test]
    fn test_enter_builds_formula() {
        let catalog = catalog();
        let mut editor = FormulaEditor::default();
        for text in ["wall area", "/", "350", "*", "Coats", "*", "paint"] {
            let outcome = type_and_enter(&mut editor, text, &catalog).unwrap();
            assert!(matches!(outcome, InputOutcome::Accepted(_)), "{}", text);
        }
        assert_eq!(editor.to_storage_string(), "{v1}/350*{v2}*{p1}");
        assert_eq!(editor.to_display_string(), "{Wall Area}/350*{Coats}*{Paint}");
        assert!(editor.complete().ok);
        let expected = 120.0 / 350.0 * 2.0 * 30.0;
        let value = editor.preview(&catalog, None).unwrap();
        assert!((value - expected).abs() < 1e-9, "{}", value);
    }

    #[test]
    fn test_preview_snapshot_overrides_product_price() {
        let catalog = catalog();
        let mut editor = FormulaEditor::default();
        for text in ["Wall Area", "*", "Paint"] {
            type_and_enter(&mut editor, text, &catalog).unwrap();
        }
        assert_eq!(editor.preview(&catalog, None), Some(3600.0));
        let side_table = vec![FormulaRef::product("p1", 25.0)];
        assert_eq!(editor.preview(&catalog, Some(side_table.as_slice())), Some(3000.0));
    }

    #[test]
    fn test_enter_matches_non_ascii_name_case_insensitively() {
        let catalog = Catalog::new(vec![VariableRef::new("f1", "Fläche", 12.0)], vec![]);
        let mut editor = FormulaEditor::default();
        let outcome = type_and_enter(&mut editor, "FLÄCHE", &catalog).unwrap();
        assert!(matches!(outcome, InputOutcome::Accepted(_)));
        assert_eq!(editor.to_storage_string(), "{f1}");
        editor.set_input("fläche");
        assert!(editor.suggestions(&catalog, &catalog.variables).iter().all(|s| !s.is_create()));
    }

    #[test]
    fn test_rejected_append_leaves_sequence_and_clears_input() {
        let catalog = catalog();
        let mut editor = FormulaEditor::default();
        type_and_enter(&mut editor, "Coats", &catalog).unwrap();
        editor.set_input("2");
        let err = editor.commit_input(&catalog, &catalog.variables, &mut no_creator()).unwrap_err();
        assert!(matches!(err, FormulaError::Structural(Violation::ConsecutiveOperands { .. })));
        assert_eq!(editor.sequence().len(), 1);
        assert_eq!(editor.input(), "");
        assert!(editor
            .take_events()
            .iter()
            .any(|e| matches!(e, EditorEvent::Rejected { .. })));
    }

    #[test]
    fn test_malformed_number_rejected() {
        let mut editor = FormulaEditor::default();
        let err = type_and_enter(&mut editor, "1.2.3", &Catalog::default()).unwrap_err();
        assert_eq!(err, FormulaError::Syntax);
        assert!(editor.sequence().is_empty());
    }

    #[test]
    fn test_catalog_import_only_when_missing_from_context() {
        let catalog = catalog();
        let mut editor = FormulaEditor::default();
        let context = vec![catalog.variables[1].clone()];

        let accepted = editor.accept_variable(&catalog.variables[0], &context).unwrap();
        assert_eq!(accepted.catalog_import.map(|v| v.id), Some("v1".to_string()));

        editor.append(Token::operator(Operator::Add), &context).unwrap();
        let accepted = editor.accept_variable(&catalog.variables[1], &context).unwrap();
        assert!(accepted.catalog_import.is_none());
    }

    #[test]
    fn test_rejected_token_does_not_import() {
        let catalog = catalog();
        let mut editor = FormulaEditor::default();
        editor.append(Token::number("3"), &[]).unwrap();
        assert!(editor.accept_variable(&catalog.variables[0], &[]).is_err());
        assert_eq!(editor.sequence().len(), 1);
    }

    #[test]
    fn test_creation_flow() {
        let catalog = catalog();
        let mut requested = Vec::new();
        let mut editor = FormulaEditor::default();

        editor.set_input("Wall");
        let suggestions = editor.suggestions(&catalog, &catalog.variables);
        assert_eq!(suggestions[0].label, "Add \"Wall\" as variable");

        let outcome = editor
            .commit_input(&catalog, &catalog.variables, &mut |n: &str| requested.push(n.to_string()))
            .unwrap();
        assert_eq!(outcome, InputOutcome::CreationRequested { name: "Wall".into() });
        assert_eq!(requested, vec!["Wall".to_string()]);
        assert_eq!(editor.pending_creation(), Some("Wall"));
        assert_eq!(editor.input(), "");

        let accepted = editor
            .on_variable_created(VariableRef::new("v9", "Wall", 0.0), &catalog.variables)
            .unwrap()
            .unwrap();
        assert_eq!(accepted.token.raw_text, "v9");
        assert_eq!(accepted.token.display_text, "Wall");
        assert!(accepted.catalog_import.is_some());
        assert_eq!(editor.to_storage_string(), "{v9}");
        assert!(editor.pending_creation().is_none());
    }

    #[test]
    fn test_only_one_pending_creation() {
        let catalog = catalog();
        let mut count = 0;
        let mut editor = FormulaEditor::default();
        editor.set_input("Trim");
        editor.commit_input(&catalog, &[], &mut |_: &str| count += 1).unwrap();
        editor.set_input("Height");
        let outcome = editor.commit_input(&catalog, &[], &mut |_: &str| count += 1).unwrap();
        assert_eq!(outcome, InputOutcome::CreationPending { name: "Trim".into() });
        assert_eq!(count, 1);
        assert_eq!(editor.input(), "Height");
    }

    #[test]
    fn test_creation_failure_restores_input() {
        let mut editor = FormulaEditor::default();
        editor.set_input("Trim");
        editor.commit_input(&Catalog::default(), &[], &mut |_: &str| {}).unwrap();
        let err = editor.on_variable_creation_failed("network down").unwrap();
        assert_eq!(
            err,
            FormulaError::CreateVariableFailure { name: "Trim".into(), reason: "network down".into() }
        );
        assert_eq!(editor.input(), "Trim");
        assert!(editor.sequence().is_empty());
        assert!(editor.on_variable_creation_failed("again").is_none());
    }

    #[test]
    fn test_stale_creation_callback_ignored() {
        let mut editor = FormulaEditor::default();
        assert_eq!(editor.on_variable_created(VariableRef::new("x", "X", 0.0), &[]), Ok(None));
        editor.set_input("Trim");
        editor.commit_input(&Catalog::default(), &[], &mut |_: &str| {}).unwrap();
        assert_eq!(editor.on_variable_created(VariableRef::new("x", "Other", 0.0), &[]), Ok(None));
        assert_eq!(editor.pending_creation(), Some("Trim"));
    }

    #[test]
    fn test_no_creation_request_when_gate_would_reject() {
        let mut editor = FormulaEditor::default();
        editor.append(Token::number("2"), &[]).unwrap();
        editor.set_input("Trim");
        let err = editor
            .commit_input(&Catalog::default(), &[], &mut no_creator())
            .unwrap_err();
        assert!(matches!(err, FormulaError::Structural(_)));
        assert!(editor.pending_creation().is_none());
    }

    #[test]
    fn test_short_unknown_input_ignored() {
        let mut editor = FormulaEditor::default();
        assert_eq!(type_and_enter(&mut editor, "x", &Catalog::default()).unwrap(), InputOutcome::Ignored);
        assert_eq!(editor.input(), "x");
    }

    #[test]
    fn test_reuse_reference_already_in_formula() {
        let catalog = Catalog::default();
        let extra = vec![ExtraRef::variable("v7", "Trim")];
        let mut editor = FormulaEditor::load("{v7}+", &catalog, &extra, SuggestOptions::default());
        let outcome = type_and_enter(&mut editor, "trim", &catalog).unwrap();
        assert!(matches!(outcome, InputOutcome::Accepted(_)));
        assert_eq!(editor.to_storage_string(), "{v7}+{v7}");
    }

    #[test]
    fn test_excluded_variable_not_matched() {
        let catalog = catalog();
        let options = SuggestOptions { exclude_variable_name: Some("Coats".into()), ..Default::default() };
        let mut editor = FormulaEditor::new(options);
        assert_eq!(type_and_enter(&mut editor, "coats", &catalog).unwrap(), InputOutcome::Ignored);
        assert!(editor.sequence().is_empty());
    }

    #[test]
    fn test_accept_suggestion_variants() {
        let catalog = catalog();
        let mut editor = FormulaEditor::default();
        editor.set_input("coa");
        let items = editor.suggestions(&catalog, &catalog.variables);
        let coats = items.iter().find(|i| i.name == "Coats").unwrap();
        editor
            .accept_suggestion(coats, &catalog, &catalog.variables, &mut no_creator())
            .unwrap();
        editor.append(Token::operator(Operator::Mul), &[]).unwrap();

        editor.set_input("pai");
        let items = editor.suggestions(&catalog, &catalog.variables);
        let paint = items.iter().find(|i| i.kind == SuggestionKind::Product).unwrap();
        editor
            .accept_suggestion(paint, &catalog, &catalog.variables, &mut no_creator())
            .unwrap();
        assert_eq!(editor.to_storage_string(), "{v2}*{p1}");
        assert_eq!(editor.used_names(), vec!["Coats".to_string(), "Paint".to_string()]);
    }

    #[test]
    fn test_remove_then_complete_rechecks() {
        let mut editor = FormulaEditor::default();
        editor.append(Token::number("2"), &[]).unwrap();
        let plus = editor.append(Token::operator(Operator::Add), &[]).unwrap();
        editor.append(Token::number("3"), &[]).unwrap();
        assert!(editor.complete().ok);

        assert!(editor.remove(plus.token.id));
        assert!(!editor.remove(plus.token.id));
        let verdict = editor.complete();
        assert!(!verdict.ok);
        assert!(verdict.display_message().unwrap().starts_with("Syntax error:"));
    }
}
