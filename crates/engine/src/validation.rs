//! Formula validation.
//!
//! Two gates share one rule set:
//!
//! - **Append gate** (`check_append`): runs before a token is committed to a
//!   live sequence. Only checks the new adjacency, since everything already
//!   committed passed the same gate.
//! - **Completion check** (`check_complete`): runs when editing finishes.
//!   Re-runs every adjacency rule over the whole sequence (removing a middle
//!   token can create a bad pair), then checks start/end tokens, empty
//!   parentheses, and trial-parses literal-only formulas.
//!
//! ## Messages
//!
//! `Violation` renders the raw message. Anything shown to a user goes through
//! `normalize_message`, so the same condition always reads the same way no
//! matter which gate caught it.

use serde::{Deserialize, Serialize};

use crate::formula::parser;
use crate::formula::token::{Operator, Token, TokenKind};

/// Operators a formula may not start with.
pub const INVALID_START: [Operator; 4] = [Operator::Mul, Operator::Div, Operator::RParen, Operator::Pow];

/// Operators a formula may not end with.
pub const INVALID_END: [Operator; 6] = [
    Operator::Add,
    Operator::Sub,
    Operator::Mul,
    Operator::Div,
    Operator::LParen,
    Operator::Pow,
];

// ============================================================================
// Violations
// ============================================================================

/// A structural or syntax rule a token sequence broke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// Two operands back to back.
    ConsecutiveOperands { first: TokenKind, second: TokenKind },
    /// Two arithmetic operators back to back (parentheses excluded).
    ConsecutiveOperators { first: String, second: String },
    /// An operand directly followed by `(`.
    MissingOperatorBeforeParen { kind: TokenKind },
    /// `)` directly followed by an operand.
    MissingOperatorAfterParen { kind: TokenKind },
    /// `(` directly followed by `)`.
    EmptyParentheses,
    /// First token is one of `* / ) ^`.
    InvalidStart { op: String },
    /// Last token is one of `+ - * / ( ^`.
    DanglingOperator { op: String },
    /// Literal-only formula that does not parse.
    InvalidExpression,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Violation::ConsecutiveOperands { first, second } => write!(
                f,
                "Cannot have consecutive {} and {} without an operator between them",
                first.noun(),
                second.noun()
            ),
            Violation::ConsecutiveOperators { first, second } => {
                write!(f, "Cannot have consecutive operators \"{}\" and \"{}\"", first, second)
            }
            Violation::MissingOperatorBeforeParen { kind } => {
                write!(f, "Missing operator between {} and opening parenthesis", kind.noun())
            }
            Violation::MissingOperatorAfterParen { kind } => {
                write!(f, "Missing operator between closing parenthesis and {}", kind.noun())
            }
            Violation::EmptyParentheses => write!(f, "Empty parentheses () are not allowed"),
            Violation::InvalidStart { op } => write!(f, "Formula cannot start with \"{}\"", op),
            Violation::DanglingOperator { op } => {
                write!(f, "Formula ends with \"{}\" - please complete the formula", op)
            }
            Violation::InvalidExpression => write!(f, "Invalid mathematical formula"),
        }
    }
}

impl std::error::Error for Violation {}

impl Violation {
    /// The message as it should be shown to a user.
    pub fn user_message(&self) -> String {
        normalize_message(&self.to_string())
    }

    /// True for the trial-evaluation failure; everything else is structural.
    pub fn is_syntax(&self) -> bool {
        matches!(self, Violation::InvalidExpression)
    }
}

/// Map a raw validation message to its user-facing wording.
///
/// Unknown messages pass through unchanged.
pub fn normalize_message(raw: &str) -> String {
    if raw.contains("Invalid mathematical formula") {
        "Formula syntax error: Please check for missing parentheses or invalid operations.".to_string()
    } else if raw.contains("ends with") {
        format!("Incomplete formula: {}", raw)
    } else if raw.contains("consecutive") {
        format!("Syntax error: {}", raw)
    } else if raw.contains("Missing operator") {
        format!("Missing operator: {}", raw)
    } else if raw.contains("cannot start with") {
        format!("Invalid start: {}", raw)
    } else if raw.contains("Empty parentheses") {
        format!("Invalid syntax: {}", raw)
    } else if raw.contains("Missing closing parenthesis") {
        "Missing closing parenthesis".to_string()
    } else {
        raw.to_string()
    }
}

// ============================================================================
// Verdict
// ============================================================================

/// Outcome of a validation pass.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub ok: bool,
    /// Raw message when not ok. Render with `display_message`.
    pub message: Option<String>,
}

impl ValidationVerdict {
    pub fn valid() -> Self {
        Self { ok: true, message: None }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self { ok: false, message: Some(message.into()) }
    }

    /// The normalized, user-facing message.
    pub fn display_message(&self) -> Option<String> {
        self.message.as_deref().map(normalize_message)
    }
}

impl From<Result<(), Violation>> for ValidationVerdict {
    fn from(result: Result<(), Violation>) -> Self {
        match result {
            Ok(()) => Self::valid(),
            Err(v) => Self::invalid(v.to_string()),
        }
    }
}

// ============================================================================
// Rules
// ============================================================================

/// Adjacency rules for a pair of neighbouring tokens, in priority order.
fn check_adjacency(current: &Token, next: &Token) -> Result<(), Violation> {
    if current.is_operand() && next.is_operand() {
        return Err(Violation::ConsecutiveOperands { first: current.kind, second: next.kind });
    }

    if current.is_arithmetic_operator() && next.is_arithmetic_operator() {
        return Err(Violation::ConsecutiveOperators {
            first: current.raw_text.clone(),
            second: next.raw_text.clone(),
        });
    }

    if current.is_operand() && next.is_op(Operator::LParen) {
        return Err(Violation::MissingOperatorBeforeParen { kind: current.kind });
    }

    if current.is_op(Operator::RParen) && next.is_operand() {
        return Err(Violation::MissingOperatorAfterParen { kind: next.kind });
    }

    Ok(())
}

fn is_empty_pair(current: &Token, next: &Token) -> bool {
    current.is_op(Operator::LParen) && next.is_op(Operator::RParen)
}

/// Gate applied before `candidate` is appended to `tokens`.
pub fn check_append(tokens: &[Token], candidate: &Token) -> Result<(), Violation> {
    let Some(last) = tokens.last() else {
        return Ok(());
    };
    check_adjacency(last, candidate)?;
    if is_empty_pair(last, candidate) {
        return Err(Violation::EmptyParentheses);
    }
    Ok(())
}

/// Adjacency rules over a whole sequence.
pub fn check_pairs(tokens: &[Token]) -> Result<(), Violation> {
    tokens.windows(2).try_for_each(|pair| check_adjacency(&pair[0], &pair[1]))
}

/// Full check for a finished formula. An empty sequence is valid.
pub fn check_complete(tokens: &[Token]) -> Result<(), Violation> {
    let (Some(first), Some(last)) = (tokens.first(), tokens.last()) else {
        return Ok(());
    };

    check_pairs(tokens)?;

    if let Some(op) = first.as_operator() {
        if INVALID_START.contains(&op) {
            return Err(Violation::InvalidStart { op: op.to_string() });
        }
    }

    if let Some(op) = last.as_operator() {
        if INVALID_END.contains(&op) {
            return Err(Violation::DanglingOperator { op: op.to_string() });
        }
    }

    if tokens.windows(2).any(|pair| is_empty_pair(&pair[0], &pair[1])) {
        return Err(Violation::EmptyParentheses);
    }

    // Only literal formulas get a trial parse; references are left to evaluation
    let literal_only = tokens
        .iter()
        .all(|t| matches!(t.kind, TokenKind::Number | TokenKind::Operator));
    if literal_only {
        let trial = tokens
            .iter()
            .map(|t| t.raw_text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        if let Err(e) = parser::parse(&trial) {
            log::debug!("Trial parse of {:?} failed: {}", trial, e);
            return Err(Violation::InvalidExpression);
        }
    }

    Ok(())
}

/// `check_append` as a verdict.
pub fn validate_append(tokens: &[Token], candidate: &Token) -> ValidationVerdict {
    check_append(tokens, candidate).into()
}

/// `check_complete` as a verdict.
pub fn validate_complete(tokens: &[Token]) -> ValidationVerdict {
    check_complete(tokens).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Token {
        Token::variable(name, name)
    }

    fn op(c: char) -> Token {
        Token::operator(Operator::from_char(c).unwrap())
    }

    fn num(n: &str) -> Token {
        Token::number(n)
    }

    // =========================================================================
    // Append gate
    // =========================================================================

    #[test]
    fn test_append_number_after_variable_rejected() {
        let err = check_append(&[var("X")], &num("2")).unwrap_err();
        assert_eq!(err, Violation::ConsecutiveOperands { first: TokenKind::Variable, second: TokenKind::Number });
        assert_eq!(err.to_string(), "Cannot have consecutive variable and number without an operator between them");
    }

    #[test]
    fn test_append_product_after_number_rejected() {
        let err = check_append(&[num("2")], &Token::product("p", "Paint")).unwrap_err();
        assert!(err.to_string().contains("consecutive number and product"));
    }

    #[test]
    fn test_append_consecutive_operators_rejected() {
        let err = check_append(&[var("X"), op('+')], &op('*')).unwrap_err();
        assert_eq!(err.to_string(), "Cannot have consecutive operators \"+\" and \"*\"");
    }

    #[test]
    fn test_append_operator_next_to_paren_allowed() {
        assert!(check_append(&[var("X"), op('*')], &op('(')).is_ok());
        assert!(check_append(&[op('(')], &op('-')).is_ok());
        assert!(check_append(&[var("X"), op(')')], &op('+')).is_ok());
    }

    #[test]
    fn test_append_operand_before_open_paren_rejected() {
        let err = check_append(&[num("3")], &op('(')).unwrap_err();
        assert_eq!(err, Violation::MissingOperatorBeforeParen { kind: TokenKind::Number });
        assert!(err.to_string().starts_with("Missing operator between number"));
    }

    #[test]
    fn test_append_operand_after_close_paren_rejected() {
        let err = check_append(&[op('('), var("X"), op(')')], &var("Y")).unwrap_err();
        assert_eq!(err, Violation::MissingOperatorAfterParen { kind: TokenKind::Variable });
    }

    #[test]
    fn test_append_empty_parens_rejected() {
        assert_eq!(check_append(&[op('(')], &op(')')).unwrap_err(), Violation::EmptyParentheses);
    }

    #[test]
    fn test_append_to_empty_always_ok() {
        assert!(check_append(&[], &op('*')).is_ok());
        assert!(check_append(&[], &op(')')).is_ok());
    }

    // =========================================================================
    // Completion check
    // =========================================================================

    #[test]
    fn test_complete_empty_is_valid() {
        assert!(validate_complete(&[]).ok);
    }

    #[test]
    fn test_complete_dangling_operator() {
        let verdict = validate_complete(&[var("X"), op('+')]);
        assert!(!verdict.ok);
        assert!(verdict.message.as_deref().unwrap().contains("ends with"));
        assert_eq!(
            verdict.display_message().unwrap(),
            "Incomplete formula: Formula ends with \"+\" - please complete the formula"
        );
    }

    #[test]
    fn test_complete_invalid_start() {
        for c in ['*', '/', ')', '^'] {
            let err = check_complete(&[op(c), num("1")]).unwrap_err();
            assert!(matches!(err, Violation::InvalidStart { .. }), "start with {}", c);
        }
        assert!(check_complete(&[op('-'), num("1")]).is_ok());
        assert!(check_complete(&[op('('), num("1"), op(')')]).is_ok());
    }

    #[test]
    fn test_complete_empty_parens() {
        assert_eq!(check_complete(&[op('('), op(')')]).unwrap_err(), Violation::EmptyParentheses);
        let tokens = [var("X"), op('+'), op('('), op(')'), op('*'), num("2")];
        // The pair rules pass, the empty pair is caught afterwards
        assert_eq!(check_complete(&tokens).unwrap_err(), Violation::EmptyParentheses);
    }

    #[test]
    fn test_complete_rechecks_pairs() {
        let err = check_complete(&[var("X"), num("2")]).unwrap_err();
        assert!(matches!(err, Violation::ConsecutiveOperands { .. }));
    }

    #[test]
    fn test_complete_trial_parse_literal() {
        assert_eq!(
            check_complete(&[op('('), num("1"), op('+'), num("2")]).unwrap_err(),
            Violation::InvalidExpression
        );
        assert_eq!(check_complete(&[num("1.2.3")]).unwrap_err(), Violation::InvalidExpression);
        assert!(check_complete(&[op('('), num("1"), op('+'), num("2"), op(')')]).is_ok());
    }

    #[test]
    fn test_complete_deep_nesting_is_syntax_error() {
        let mut tokens: Vec<Token> = (0..10_000).map(|_| op('(')).collect();
        tokens.push(num("1"));
        tokens.extend((0..10_000).map(|_| op(')')));
        assert_eq!(check_complete(&tokens).unwrap_err(), Violation::InvalidExpression);
    }

    #[test]
    fn test_complete_division_by_zero_not_special() {
        assert!(check_complete(&[num("1"), op('/'), num("0")]).is_ok());
    }

    #[test]
    fn test_complete_skips_trial_with_references() {
        assert!(check_complete(&[op('('), var("X"), op('+'), num("2")]).is_ok());
    }

    #[test]
    fn test_syntax_message_normalized() {
        let verdict = validate_complete(&[op('('), num("1"), op('+'), num("2")]);
        assert_eq!(
            verdict.display_message().unwrap(),
            "Formula syntax error: Please check for missing parentheses or invalid operations."
        );
    }

    // =========================================================================
    // Message table
    // =========================================================================

    #[test]
    fn test_normalize_table() {
        assert_eq!(
            normalize_message("Cannot have consecutive operators \"+\" and \"-\""),
            "Syntax error: Cannot have consecutive operators \"+\" and \"-\""
        );
        assert_eq!(
            normalize_message("Missing operator between number and opening parenthesis"),
            "Missing operator: Missing operator between number and opening parenthesis"
        );
        assert_eq!(
            normalize_message("Formula cannot start with \"*\""),
            "Invalid start: Formula cannot start with \"*\""
        );
        assert_eq!(
            normalize_message("Empty parentheses () are not allowed"),
            "Invalid syntax: Empty parentheses () are not allowed"
        );
        assert_eq!(normalize_message("Missing closing parenthesis at 4"), "Missing closing parenthesis");
        assert_eq!(normalize_message("Something else"), "Something else");
    }

    #[test]
    fn test_user_message_matches_normalizer() {
        let v = Violation::EmptyParentheses;
        assert_eq!(v.user_message(), normalize_message(&v.to_string()));
        assert!(!v.is_syntax());
        assert!(Violation::InvalidExpression.is_syntax());
    }
}
