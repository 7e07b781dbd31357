// Error taxonomy for formula editing and evaluation

use crate::validation::{normalize_message, Violation};

/// Every failure a formula operation can report.
///
/// None of these are fatal: a structural or syntax error means the offending
/// token was not committed, an unresolved reference evaluates as zero unless
/// the caller asked for strict evaluation, and a failed variable creation
/// leaves the typed name in the input buffer for a retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormulaError {
    /// A validator rejected the sequence or the candidate token.
    Structural(Violation),
    /// Completion-time trial parse failed.
    Syntax,
    /// A reference span resolved against nothing.
    UnresolvedReference { id: String },
    /// The variable-creation collaborator reported a failure.
    CreateVariableFailure { name: String, reason: String },
}

impl std::fmt::Display for FormulaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormulaError::Structural(v) => write!(f, "{}", v),
            FormulaError::Syntax => write!(f, "{}", Violation::InvalidExpression),
            FormulaError::UnresolvedReference { id } => write!(f, "Unresolved reference {{{}}}", id),
            FormulaError::CreateVariableFailure { name, reason } => {
                write!(f, "Could not create variable \"{}\": {}", name, reason)
            }
        }
    }
}

impl std::error::Error for FormulaError {}

impl From<Violation> for FormulaError {
    fn from(v: Violation) -> Self {
        if v.is_syntax() {
            FormulaError::Syntax
        } else {
            FormulaError::Structural(v)
        }
    }
}

impl FormulaError {
    /// Message for display, passed through the shared normalizer table.
    pub fn user_message(&self) -> String {
        normalize_message(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_violation_maps_to_syntax() {
        assert_eq!(FormulaError::from(Violation::InvalidExpression), FormulaError::Syntax);
        assert_eq!(
            FormulaError::from(Violation::EmptyParentheses),
            FormulaError::Structural(Violation::EmptyParentheses)
        );
    }

    #[test]
    fn test_syntax_user_message() {
        assert_eq!(
            FormulaError::Syntax.user_message(),
            "Formula syntax error: Please check for missing parentheses or invalid operations."
        );
    }

    #[test]
    fn test_create_failure_message_unchanged_by_normalizer() {
        let err = FormulaError::CreateVariableFailure { name: "Wall".into(), reason: "timeout".into() };
        assert_eq!(err.user_message(), "Could not create variable \"Wall\": timeout");
    }
}
